//! Script compression/decompression.
//!
//! Recognizes four standard templates (p2pkh, p2sh, p2pk-compressed,
//! p2pk-uncompressed) and collapses each to a one-byte prefix plus a
//! fixed-size payload. Anything else falls back to a length-prefixed raw
//! script. Uncompressed p2pk scripts are canonicalized on decode by
//! recovering the full point from its x-coordinate via `secp256k1`.

use std::io::Cursor;

use secp256k1::PublicKey;

use crate::error::{CoinsError, Result};
use crate::output::{Output, TxOutput};
use crate::varint;

/// Scripts larger than this are rejected on decode.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

const RAW_SCRIPT_OFFSET: u64 = 0x10;

/// Recognizes one of the four compressible templates; returns the prefix
/// byte and the payload slice to write verbatim.
fn special_prefix_for_script(script: &[u8]) -> Option<(u8, &[u8])> {
    // p2pkh: OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    if script.len() == 25
        && script[0] == 0x76
        && script[1] == 0xa9
        && script[2] == 0x14
        && script[23] == 0x88
        && script[24] == 0xac
    {
        return Some((0x00, &script[3..23]));
    }
    // p2sh: OP_HASH160 <20> OP_EQUAL
    if script.len() == 23 && script[0] == 0xa9 && script[1] == 0x14 && script[22] == 0x87 {
        return Some((0x01, &script[2..22]));
    }
    // p2pk, compressed pubkey: PUSH33 <33> OP_CHECKSIG
    if script.len() == 35
        && script[0] == 0x21
        && matches!(script[1], 0x02 | 0x03)
        && script[34] == 0xac
    {
        return Some((script[1], &script[2..34]));
    }
    // p2pk, uncompressed pubkey: PUSH65 0x04 <64> OP_CHECKSIG
    if script.len() == 67 && script[0] == 0x41 && script[1] == 0x04 && script[66] == 0xac {
        let parity = script[65] & 0x01;
        return Some((0x04 + parity, &script[2..34]));
    }
    None
}

fn compressed_script_len(script: &[u8]) -> usize {
    match special_prefix_for_script(script) {
        Some((_, payload)) => 1 + payload.len(),
        None => {
            let n = RAW_SCRIPT_OFFSET + script.len() as u64;
            varint_len(n) + script.len()
        }
    }
}

fn varint_len(mut n: u64) -> usize {
    let mut len = 1;
    loop {
        if n <= 0x7F {
            return len;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
}

fn compress_script(script: &[u8], buf: &mut Vec<u8>) {
    if let Some((prefix, payload)) = special_prefix_for_script(script) {
        buf.push(prefix);
        buf.extend_from_slice(payload);
        return;
    }
    varint::write_varint(buf, RAW_SCRIPT_OFFSET + script.len() as u64);
    buf.extend_from_slice(script);
}

fn build_p2pkh(hash: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(25);
    s.push(0x76);
    s.push(0xa9);
    s.push(0x14);
    s.extend_from_slice(hash);
    s.push(0x88);
    s.push(0xac);
    s
}

fn build_p2sh(hash: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(23);
    s.push(0xa9);
    s.push(0x14);
    s.extend_from_slice(hash);
    s.push(0x87);
    s
}

fn build_p2pk(pubkey: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(2 + pubkey.len());
    match pubkey.len() {
        33 => s.push(0x21),
        65 => s.push(0x41),
        other => unreachable!("pubkey must be 33 or 65 bytes, got {other}"),
    }
    s.extend_from_slice(pubkey);
    s.push(0xac);
    s
}

fn decompress_script(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let prefix = varint::read_varint(cursor)?;
    match prefix {
        0x00 => Ok(build_p2pkh(&varint::read_exact(cursor, 20)?)),
        0x01 => Ok(build_p2sh(&varint::read_exact(cursor, 20)?)),
        0x02 | 0x03 => {
            let x = varint::read_exact(cursor, 32)?;
            let mut pubkey = Vec::with_capacity(33);
            pubkey.push(prefix as u8);
            pubkey.extend_from_slice(&x);
            Ok(build_p2pk(&pubkey))
        }
        0x04 | 0x05 => {
            let x = varint::read_exact(cursor, 32)?;
            let mut compressed = Vec::with_capacity(33);
            compressed.push((prefix - 2) as u8);
            compressed.extend_from_slice(&x);
            let pubkey = PublicKey::from_slice(&compressed)
                .map_err(|_| CoinsError::PubkeyDecompression)?;
            Ok(build_p2pk(&pubkey.serialize_uncompressed()))
        }
        0x06..=0x0F => {
            tracing::warn!(prefix, "reserved script-compression prefix on decode");
            Err(CoinsError::ReservedScriptPrefix(prefix as u8))
        }
        n => {
            let len = (n - RAW_SCRIPT_OFFSET) as usize;
            if len > MAX_SCRIPT_SIZE {
                tracing::warn!(len, "raw script exceeds MAX_SCRIPT_SIZE on decode");
                return Err(CoinsError::Truncated {
                    needed: len,
                    available: MAX_SCRIPT_SIZE,
                });
            }
            varint::read_exact(cursor, len)
        }
    }
}

fn skip_script(cursor: &mut Cursor<&[u8]>) -> Result<()> {
    let prefix = varint::read_varint(cursor)?;
    let len = match prefix {
        0x00 | 0x01 => 20,
        0x02..=0x05 => 32,
        0x06..=0x0F => return Err(CoinsError::ReservedScriptPrefix(prefix as u8)),
        n => (n - RAW_SCRIPT_OFFSET) as usize,
    };
    varint::read_exact(cursor, len).map(|_| ())
}

/// Writes `value` then the compressed script.
pub fn compress_output<O: TxOutput>(output: &O, buf: &mut Vec<u8>) {
    varint::write_varint(buf, output.value());
    compress_script(output.script(), buf);
}

/// Reads a compressed output, reconstituting the script in canonical form.
pub fn decompress_output(cursor: &mut Cursor<&[u8]>) -> Result<Output> {
    let value = varint::read_varint(cursor)?;
    let script = decompress_script(cursor)?;
    Ok(Output::new(value, script))
}

/// Advances `cursor` past one compressed output without materializing it;
/// returns the number of bytes consumed.
pub fn skip(cursor: &mut Cursor<&[u8]>) -> Result<usize> {
    let start = cursor.position();
    let _value = varint::read_varint(cursor)?;
    skip_script(cursor)?;
    Ok((cursor.position() - start) as usize)
}

/// The byte count `compress_output` would write for `output`, without
/// writing it.
pub fn size<O: TxOutput>(output: &O) -> usize {
    varint_len(output.value()) + compressed_script_len(output.script())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Secp256k1, SecretKey};

    fn test_secret_key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    /// So the `tracing::warn!` calls on the reserved-prefix/oversized-script
    /// paths are visible under `cargo test -- --nocapture` instead of
    /// silently dropped for lack of a subscriber.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn roundtrip(output: &Output) {
        let mut buf = Vec::new();
        compress_output(output, &mut buf);
        assert_eq!(buf.len(), size(output));

        let mut cursor = Cursor::new(buf.as_slice());
        let decoded = decompress_output(&mut cursor).unwrap();
        assert_eq!(decoded, *output);
        assert_eq!(cursor.position() as usize, buf.len());

        let mut skip_cursor = Cursor::new(buf.as_slice());
        let skipped = skip(&mut skip_cursor).unwrap();
        assert_eq!(skipped, buf.len());
    }

    #[test]
    fn p2pkh_roundtrips_through_one_byte_prefix() {
        let hash = [0x11u8; 20];
        let script = build_p2pkh(&hash);
        let out = Output::new(5_000_000_000, script);
        let mut buf = Vec::new();
        compress_output(&out, &mut buf);
        assert_eq!(buf[buf.len() - 21], 0x00);
        roundtrip(&out);
    }

    #[test]
    fn p2sh_roundtrips() {
        let hash = [0x22u8; 20];
        let out = Output::new(1234, build_p2sh(&hash));
        let mut buf = Vec::new();
        compress_output(&out, &mut buf);
        assert_eq!(buf[buf.len() - 21], 0x01);
        roundtrip(&out);
    }

    #[test]
    fn p2pk_compressed_roundtrips() {
        let secp = Secp256k1::new();
        let sk = test_secret_key(0x01);
        let pk = PublicKey::from_secret_key(&secp, &sk);
        let script = build_p2pk(&pk.serialize());
        let out = Output::new(42, script);
        roundtrip(&out);
    }

    #[test]
    fn p2pk_uncompressed_canonicalizes_to_uncompressed_form() {
        let secp = Secp256k1::new();
        let sk = test_secret_key(0x02);
        let pk = PublicKey::from_secret_key(&secp, &sk);
        let uncompressed = pk.serialize_uncompressed();
        let script = build_p2pk(&uncompressed);
        let out = Output::new(7, script);
        roundtrip(&out);
    }

    #[test]
    fn nonstandard_script_falls_back_to_raw() {
        let script = vec![0x51, 0x52, 0x93]; // OP_1 OP_2 OP_ADD
        let out = Output::new(0, script.clone());
        let mut buf = Vec::new();
        compress_output(&out, &mut buf);
        // prefix should be 0x10 + 3 = 0x13
        assert_eq!(buf[0], 0x13);
        roundtrip(&out);
    }

    #[test]
    fn large_raw_script_uses_multi_byte_prefix() {
        let script = vec![0xab; 200];
        let out = Output::new(99, script);
        roundtrip(&out);
    }

    #[test]
    fn reserved_prefix_is_rejected_on_decode() {
        init_tracing();
        let mut buf = Vec::new();
        varint::write_varint(&mut buf, 3); // value
        buf.push(0x07); // reserved prefix
        let mut cursor = Cursor::new(buf.as_slice());
        let err = decompress_output(&mut cursor).unwrap_err();
        assert!(matches!(err, CoinsError::ReservedScriptPrefix(0x07)));
    }

    #[test]
    fn reserved_prefix_is_rejected_on_skip() {
        let mut buf = Vec::new();
        varint::write_varint(&mut buf, 3);
        buf.push(0x0f);
        let mut cursor = Cursor::new(buf.as_slice());
        let err = skip(&mut cursor).unwrap_err();
        assert!(matches!(err, CoinsError::ReservedScriptPrefix(0x0f)));
    }

    #[test]
    fn truncated_raw_script_is_a_decode_error() {
        let mut buf = Vec::new();
        varint::write_varint(&mut buf, 1); // value
        varint::write_varint(&mut buf, RAW_SCRIPT_OFFSET + 10); // claims 10 bytes
        buf.push(0xff); // only one byte actually present
        let mut cursor = Cursor::new(buf.as_slice());
        assert!(decompress_output(&mut cursor).is_err());
    }
}
