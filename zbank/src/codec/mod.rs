//! Binary bank decoding and encoding
//!
//! The decoder and encoder are independent walks over the same format: the
//! decoder resolves offsets into table indices, the encoder re-derives
//! offsets from a canonical section layout. They only meet at the
//! [`Bank`](crate::Bank) model.

mod read;
mod write;


pub use read::decode;
pub use write::encode;

use crate::bank::{Bank, BankMeta};
use crate::error::Warning;

/// Result of a successful decode
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The populated bank model
    pub bank: Bank,
    /// The sidecar metadata
    pub meta: BankMeta,
    /// Soft findings recorded along the way
    pub warnings: Vec<Warning>,
}

/// Result of a successful encode
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    /// The bank blob
    pub bank: Vec<u8>,
    /// The bankmeta sidecar blob
    pub meta: Vec<u8>,
    /// Repacked sample payload pool, present when payloads were attached
    /// to the bank (the pool is its own file, never part of the bank blob)
    pub sample_data: Option<Vec<u8>>,
    /// Soft findings recorded along the way
    pub warnings: Vec<Warning>,
}
