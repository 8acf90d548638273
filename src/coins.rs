//! The per-transaction UTXO record.
//!
//! A varint header code carries height, coinbase flag, and version, plus
//! a bitfield describing which outputs survive and a tail of their
//! compressed bytes.

use std::io::Cursor;
use std::sync::Arc;

use crate::entry::CoinEntry;
use crate::error::{CoinsError, Result};
use crate::output::{Coin, Output, TxLike, TxOutput};
use crate::varint;

/// Outcome of [`Coins::spend`].
#[derive(Debug)]
pub enum Spend {
    /// The slot existed and was unspent; it is now marked spent. Carries a
    /// copy of the entry (e.g. for an undo log).
    Marked(CoinEntry),
    /// The index was absent or already spent; no state change.
    NoOp,
}

/// The unspent outputs of one confirmed transaction.
#[derive(Debug, Clone)]
pub struct Coins {
    pub hash: [u8; 32],
    pub version: u32,
    pub height: i32,
    pub coinbase: bool,
    outputs: Vec<Option<CoinEntry>>,
}

impl Coins {
    /// Builds a record from a confirmed transaction, dropping
    /// provably-unspendable outputs to gaps at construction time rather
    /// than ever storing a `CoinEntry` for them.
    pub fn from_tx<T: TxLike>(hash: [u8; 32], height: i32, tx: &T) -> Self {
        let outputs = tx
            .outputs()
            .iter()
            .map(|out| {
                if out.is_unspendable() {
                    None
                } else {
                    Some(CoinEntry::from_output(Output::new(
                        out.value(),
                        out.script().to_vec(),
                    )))
                }
            })
            .collect();
        let mut coins = Self {
            hash,
            version: tx.version(),
            height,
            coinbase: tx.is_coinbase(),
            outputs,
        };
        coins.cleanup();
        coins
    }

    /// One plus the index of the highest unspent entry, or 0 if none. A
    /// spent entry does not extend this even though it may still
    /// physically occupy a slot pending [`cleanup`](Self::cleanup).
    pub fn length(&self) -> usize {
        for i in (0..self.outputs.len()).rev() {
            if self.is_unspent(i) {
                return i + 1;
            }
        }
        0
    }

    pub fn has(&self, index: usize) -> bool {
        index < self.outputs.len() && self.outputs[index].is_some()
    }

    pub fn is_unspent(&self, index: usize) -> bool {
        index < self.outputs.len()
            && matches!(&self.outputs[index], Some(entry) if !entry.is_spent())
    }

    pub fn entry(&self, index: usize) -> Option<&CoinEntry> {
        self.outputs.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut CoinEntry> {
        self.outputs.get_mut(index).and_then(|slot| slot.as_mut())
    }

    /// Materializes and projects the output at `index` into a standalone
    /// [`Coin`], or `None` if absent.
    pub fn get_coin(&mut self, index: usize) -> Result<Option<Coin>> {
        let hash = self.hash;
        let height = self.height;
        let version = self.version;
        let coinbase = self.coinbase;
        match self.entry_mut(index) {
            Some(entry) => entry.to_coin(hash, index, height, version, coinbase).map(Some),
            None => Ok(None),
        }
    }

    /// Inserts `entry` at `index`, padding with gaps if `index` is beyond
    /// the current end. The target slot must be empty.
    pub fn add(&mut self, index: usize, entry: CoinEntry) {
        if index >= self.outputs.len() {
            self.outputs.resize_with(index + 1, || None);
        }
        assert!(
            self.outputs[index].is_none(),
            "Coins::add: slot {index} is already occupied"
        );
        self.outputs[index] = Some(entry);
    }

    pub fn add_output<O: TxOutput>(&mut self, index: usize, output: &O) {
        assert!(
            !output.is_unspendable(),
            "Coins::add_output: refusing to add an unspendable output"
        );
        self.add(
            index,
            CoinEntry::from_output(Output::new(output.value(), output.script().to_vec())),
        );
    }

    pub fn add_coin(&mut self, coin: &Coin) {
        assert!(
            !coin.is_unspendable(),
            "Coins::add_coin: refusing to add an unspendable output"
        );
        self.add(coin.index, CoinEntry::from_coin(coin));
    }

    /// Marks the entry at `index` spent. No-op (returning [`Spend::NoOp`])
    /// if the index is absent or already spent.
    pub fn spend(&mut self, index: usize) -> Spend {
        match self.outputs.get_mut(index) {
            Some(Some(entry)) if !entry.is_spent() => {
                entry.mark_spent();
                Spend::Marked(entry.clone())
            }
            _ => Spend::NoOp,
        }
    }

    /// Clears the slot at `index` and runs [`cleanup`](Self::cleanup).
    /// Returns the entry that occupied it, if any.
    pub fn remove(&mut self, index: usize) -> Option<CoinEntry> {
        let previous = if index < self.outputs.len() {
            self.outputs[index].take()
        } else {
            None
        };
        self.cleanup();
        previous
    }

    /// Trims trailing slots that are not unspent (gaps or spent-but-present
    /// entries) so that the physical length matches [`length`](Self::length).
    pub fn cleanup(&mut self) {
        while let Some(last) = self.outputs.len().checked_sub(1) {
            if self.is_unspent(last) {
                break;
            }
            self.outputs.pop();
        }
    }

    /// Encodes this record into the compact header-code/extended-spent-field
    /// wire format.
    ///
    /// # Panics
    /// Panics if the record has no unspent outputs (callers must delete the
    /// key instead of persisting an empty record), if `height` is `-1`
    /// (unconfirmed records are in-memory only and must never be
    /// persisted), or if the extended spent-field size would overflow the
    /// varint's practical range.
    pub fn encode(&self) -> Vec<u8> {
        let l = self.length();
        assert!(l > 0, "cannot serialize fully-spent coins");
        assert!(
            self.height >= 0,
            "cannot serialize an unconfirmed (height = -1) record"
        );

        let first_present = self.is_unspent(0);
        let second_present = self.is_unspent(1);
        let s: u64 = ((l + 5) / 8) as u64;

        let high = if !first_present && !second_present && s >= 1 {
            s - 1
        } else {
            s
        };
        assert!(
            high <= (u64::MAX >> 3),
            "extended spent-field size overflows the header code's varint"
        );
        let code = (self.coinbase as u64)
            | ((first_present as u64) << 1)
            | ((second_present as u64) << 2)
            | (high << 3);

        let mut buf = Vec::new();
        varint::write_varint(&mut buf, self.version as u64);
        buf.extend_from_slice(&(self.height as u32).to_le_bytes());
        varint::write_varint(&mut buf, code);

        let s = s as usize;
        let mut ext = vec![0u8; s];
        for i in 0..s {
            let mut byte = 0u8;
            for j in 0..8 {
                let idx = 2 + 8 * i + j;
                if idx < l && self.is_unspent(idx) {
                    byte |= 1 << j;
                }
            }
            ext[i] = byte;
        }
        buf.extend_from_slice(&ext);

        if first_present {
            self.outputs[0].as_ref().unwrap().write(&mut buf);
        }
        if second_present {
            self.outputs[1].as_ref().unwrap().write(&mut buf);
        }
        for i in 0..s {
            for j in 0..8 {
                let idx = 2 + 8 * i + j;
                if idx < l && self.is_unspent(idx) {
                    self.outputs[idx].as_ref().unwrap().write(&mut buf);
                }
            }
        }
        buf
    }

    /// Decodes a record from its encoded bytes. `hash` is supplied by the
    /// caller (reconstructed from the database key), not read from `raw`.
    pub fn decode(raw: Arc<[u8]>, hash: [u8; 32]) -> Result<Self> {
        let mut cursor = Cursor::new(&raw[..]);
        let version = varint::read_varint(&mut cursor)? as u32;
        let height = varint::read_u32_le(&mut cursor)? as i32;
        let code = varint::read_varint(&mut cursor)?;

        let coinbase = code & 1 != 0;
        let first_present = code & 2 != 0;
        let second_present = code & 4 != 0;
        let mut s = code >> 3;
        if code & 6 == 0 {
            s += 1;
        }
        let s = s as usize;

        let spent_field_offset = cursor.position() as usize;
        let available = raw.len().saturating_sub(spent_field_offset);
        if s > available {
            return Err(CoinsError::Truncated {
                needed: s,
                available,
            });
        }
        cursor.set_position((spent_field_offset + s) as u64);

        let mut outputs = Vec::new();
        if first_present {
            outputs.push(Some(CoinEntry::from_reader(raw.clone(), &mut cursor)?));
        } else {
            outputs.push(None);
        }
        if second_present {
            outputs.push(Some(CoinEntry::from_reader(raw.clone(), &mut cursor)?));
        } else {
            outputs.push(None);
        }
        for i in 0..s {
            let byte = raw[spent_field_offset + i];
            for j in 0..8 {
                if (byte >> j) & 1 == 1 {
                    outputs.push(Some(CoinEntry::from_reader(raw.clone(), &mut cursor)?));
                } else {
                    outputs.push(None);
                }
            }
        }

        let mut coins = Self {
            hash,
            version,
            height,
            coinbase,
            outputs,
        };
        coins.cleanup();
        Ok(coins)
    }

    /// Extracts the output at `wanted_index` from an encoded buffer without
    /// building a full `Coins`.
    pub fn parse_single_coin(
        raw: &[u8],
        hash: [u8; 32],
        mut wanted_index: usize,
    ) -> Result<Option<Coin>> {
        let mut cursor = Cursor::new(raw);
        let version = varint::read_varint(&mut cursor)? as u32;
        let height = varint::read_u32_le(&mut cursor)? as i32;
        let code = varint::read_varint(&mut cursor)?;

        let coinbase = code & 1 != 0;
        let first_present = code & 2 != 0;
        let second_present = code & 4 != 0;
        let mut s = code >> 3;
        if code & 6 == 0 {
            s += 1;
        }
        let s = s as usize;

        let total_slots = 2 + 8 * s;
        if wanted_index >= total_slots {
            return Ok(None);
        }

        let spent_field_offset = cursor.position() as usize;
        let available = raw.len().saturating_sub(spent_field_offset);
        if s > available {
            return Err(CoinsError::Truncated {
                needed: s,
                available,
            });
        }
        cursor.set_position((spent_field_offset + s) as u64);

        for slot in 0..total_slots {
            let present = match slot {
                0 => first_present,
                1 => second_present,
                _ => {
                    let bit = slot - 2;
                    (raw[spent_field_offset + bit / 8] >> (bit % 8)) & 1 == 1
                }
            };
            if wanted_index == 0 {
                return if present {
                    let output = crate::script::decompress_output(&mut cursor)?;
                    Ok(Some(Coin {
                        hash,
                        index: slot,
                        height,
                        version,
                        coinbase,
                        value: output.value,
                        script: output.script,
                    }))
                } else {
                    Ok(None)
                };
            }
            if present {
                crate::script::skip(&mut cursor)?;
            }
            wanted_index -= 1;
        }
        Ok(None)
    }
}
