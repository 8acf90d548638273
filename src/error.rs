use thiserror::Error;

/// Data errors surfaced while decoding a `Coins` record or a compressed
/// output. Programming errors (serializing an empty record, adding at an
/// occupied index, adding an unspendable output) remain `assert!`/`panic!`
/// at the call site. They are bugs in the caller, not data the caller
/// should branch on.
#[derive(Error, Debug)]
pub enum CoinsError {
    /// buffer ended before the expected field could be read
    #[error("truncated buffer: expected at least {needed} more byte(s), had {available}")]
    Truncated { needed: usize, available: usize },

    /// script-compression prefix fell in the reserved range 0x06..=0x0F
    #[error("reserved script-compression prefix: {0:#04x}")]
    ReservedScriptPrefix(u8),

    /// an uncompressed p2pk x-coordinate did not lie on the curve
    #[error("failed to recover uncompressed pubkey from x-coordinate")]
    PubkeyDecompression,

    /// varint value exceeds this reader's representable range
    #[error("varint overflow")]
    VarIntOverflow,
}

pub type Result<T> = std::result::Result<T, CoinsError>;
