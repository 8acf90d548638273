//! A compact, bit-packed codec for a Bitcoin-family UTXO set: per-output
//! script compression, a lazily-decompressing entry handle, and the
//! per-transaction `Coins` record that packs them into the header-code/
//! extended-spent-field wire format real chainstate databases use.
//!
//! Three layers, bottom to top:
//! - [`script`]: compress/decompress a single output's scriptPubKey.
//! - [`entry`]: [`entry::CoinEntry`], a handle that defers decompression
//!   until an output is actually read.
//! - [`coins`]: [`coins::Coins`], the full per-transaction record, plus
//!   [`coins::Coins::parse_single_coin`] for looking up one output without
//!   materializing the rest.

pub mod coins;
pub mod entry;
pub mod error;
pub mod output;
pub mod script;
pub mod varint;

pub use coins::{Coins, Spend};
pub use entry::CoinEntry;
pub use error::{CoinsError, Result};
pub use output::{Coin, Output, TxLike, TxOutput};
