//! A lazy handle to one output inside an encoded `Coins` record.
//!
//! Holds an index range plus a shared reference to an immutable backing
//! buffer, using `Arc<[u8]>` as the shared-ownership primitive. This avoids
//! copying every entry's compressed bytes on decode while sidestepping the
//! self-referential-struct problem a borrow-into-parent design would hit in
//! safe Rust.

use std::io::Cursor;
use std::sync::Arc;

use crate::error::Result;
use crate::output::{Coin, Output};
use crate::script;

/// One slot in a `Coins` record: either a materialized output, a reference
/// into the backing buffer awaiting lazy decompression, or both (once a
/// `raw`-backed entry has been materialized, `output` shadows `raw` for
/// reads. `raw` is kept so `write` can still take the memcpy fast path).
#[derive(Debug, Clone)]
pub struct CoinEntry {
    output: Option<Output>,
    raw: Option<Arc<[u8]>>,
    offset: usize,
    size: usize,
    spent: bool,
}

impl CoinEntry {
    /// Wraps an already-materialized output.
    pub fn from_output(output: Output) -> Self {
        Self {
            output: Some(output),
            raw: None,
            offset: 0,
            size: 0,
            spent: false,
        }
    }

    /// Wraps a fully-constituted coin's `(value, script)`, discarding the
    /// coin-only metadata. The metadata is supplied again by the parent
    /// record when this entry is later projected back with [`to_coin`].
    ///
    /// [`to_coin`]: CoinEntry::to_coin
    pub fn from_coin(coin: &Coin) -> Self {
        Self::from_output(Output::new(coin.value, coin.script.clone()))
    }

    /// Records `offset = cursor.position()`, reads past one compressed
    /// output via [`script::skip`], and keeps a cheap handle (`raw`) to the
    /// buffer rather than decoding eagerly.
    pub fn from_reader(raw: Arc<[u8]>, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let offset = cursor.position() as usize;
        let size = script::skip(cursor)?;
        Ok(Self {
            output: None,
            raw: Some(raw),
            offset,
            size,
            spent: false,
        })
    }

    /// Materializes the output if it hasn't been already. Idempotent.
    pub fn to_output(&mut self) -> Result<&Output> {
        if self.output.is_none() {
            let raw = self
                .raw
                .as_ref()
                .expect("CoinEntry invariant violated: neither output nor raw present");
            let mut cursor = Cursor::new(&raw[self.offset..self.offset + self.size]);
            self.output = Some(script::decompress_output(&mut cursor)?);
        }
        Ok(self.output.as_ref().unwrap())
    }

    /// Combines this entry's output with the parent record's metadata into
    /// a standalone [`Coin`].
    pub fn to_coin(
        &mut self,
        hash: [u8; 32],
        index: usize,
        height: i32,
        version: u32,
        coinbase: bool,
    ) -> Result<Coin> {
        let output = self.to_output()?;
        Ok(Coin {
            hash,
            index,
            height,
            version,
            coinbase,
            value: output.value,
            script: output.script.clone(),
        })
    }

    /// The byte count this entry's compressed form occupies: the recorded
    /// skip length if loaded from bytes, or `script::size` of the
    /// materialized output otherwise.
    pub fn size(&self) -> usize {
        if self.raw.is_some() {
            self.size
        } else {
            script::size(self.output.as_ref().expect("materialized entry has no output"))
        }
    }

    /// Writes this entry's compressed bytes. Untouched raw-backed entries
    /// are byte-copied straight from the parent buffer (no recompression);
    /// materialized entries not backed by bytes are freshly compressed.
    pub fn write(&self, buf: &mut Vec<u8>) {
        if let Some(raw) = &self.raw {
            if self.output.is_none() {
                buf.extend_from_slice(&raw[self.offset..self.offset + self.size]);
                return;
            }
        }
        let output = self
            .output
            .as_ref()
            .expect("CoinEntry invariant violated: neither output nor raw present");
        script::compress_output(output, buf);
    }

    pub fn is_spent(&self) -> bool {
        self.spent
    }

    pub fn mark_spent(&mut self) {
        self.spent = true;
    }
}
