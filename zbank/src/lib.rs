//! zbank: Zelda64 instrument bank codec
//!
//! This crate converts the instrument-bank binary format used by the
//! Zelda64 engine ("zbank" plus its "bankmeta" sidecar blob) to and from an
//! in-memory model, and maps that model onto a structured text tree for
//! hand editing. Re-encoding a decoded bank reproduces the original bytes
//! modulo alignment padding.
//!
//! # Pipeline
//!
//! ```text
//! zbank + bankmeta bytes --decode--> Bank + BankMeta --to_text--> TextNode
//! TextNode --from_text--> Bank + BankMeta --encode--> zbank + bankmeta bytes
//! ```
//!
//! The `Bank` model is the single shared contract: the decoder and encoder
//! never talk to each other, and the text adapter only sees the model.
//! Offset-based cross-references in the binary become indices into
//! bank-owned tables; structures reached through several pointers (shared
//! envelopes, samples, loopbooks, codebooks) are decoded once and
//! referenced many times, and re-encoding emits them exactly once.
//!
//! # Usage
//!
//! ```ignore
//! let bank_bytes = std::fs::read("bank.zbank")?;
//! let meta_bytes = std::fs::read("bank.bankmeta")?;
//!
//! let decoded = zbank::decode(&bank_bytes, &meta_bytes)?;
//! let tree = zbank::to_text(&decoded.bank, &decoded.meta);
//!
//! // ... render the tree, let a human edit it, parse it back ...
//!
//! let (bank, meta) = zbank::from_text(&tree)?;
//! let encoded = zbank::encode(&bank, &meta)?;
//! std::fs::write("bank.zbank", &encoded.bank)?;
//! ```
//!
//! File I/O and the concrete XML syntax live in the CLI crate; this crate
//! works purely on byte slices and the neutral [`TextNode`] tree.

mod bank;
mod codec;
mod cursor;
mod error;
mod text;

pub use bank::{
    AdpcmBook, AdpcmLoop, Bank, BankMeta, Drum, Envelope, EnvelopePoint, Instrument, Sample,
    SampleCodec, SoundEffect, StorageMedium, TunedSample,
};
pub use codec::{decode, encode, Decoded, Encoded};
pub use cursor::{Cursor, Writer};
pub use error::{BankError, ImportError, Warning};
pub use text::{from_text, to_text, TextNode};

// =============================================================================
// Format limits
// =============================================================================

/// Maximum instrument slots in a bank (MIDI program range minus reserved ids)
pub const MAX_INSTRUMENTS: usize = 126;

/// Maximum drum slots in a bank
pub const MAX_DRUMS: usize = 64;

/// Maximum sound-effect slots in a bank
pub const MAX_EFFECTS: usize = 1024;

/// Maximum (delay, arg) pairs in one envelope, terminator included
pub const MAX_ENVELOPE_POINTS: usize = 32;

// =============================================================================
// Binary layout constants
// =============================================================================

/// Sentinel offset marking an unused slot (a null pointer in the engine)
pub const NIL_OFFSET: u32 = 0;

/// Every emitted section and pool entry is padded to this boundary
pub const SECTION_ALIGN: usize = 16;

/// Size of one instrument entry in the bank blob
pub const INSTRUMENT_SIZE: usize = 0x20;

/// Size of one drum entry in the bank blob
pub const DRUM_SIZE: usize = 0x10;

/// Size of one inline sound-effect entry in the bank blob
pub const EFFECT_SIZE: usize = 0x8;

/// Size of one sample header in the bank blob
pub const SAMPLE_SIZE: usize = 0x10;

/// Size of the bankmeta sidecar blob
pub const BANKMETA_SIZE: usize = 0x8;

/// Secondary sample-bank id meaning "no secondary bank"
pub const SAMPLE_BANK_NONE: u8 = 0xFF;

// =============================================================================
// Envelope terminator codes
// =============================================================================

/// Envelope terminator: stop the envelope entirely
pub const ADSR_DISABLE: i16 = 0;

/// Envelope terminator: hold the current level
pub const ADSR_HANG: i16 = -1;

/// Envelope terminator: jump to the point index in the arg field
pub const ADSR_GOTO: i16 = -2;

/// Envelope terminator: restart from the first point
pub const ADSR_RESTART: i16 = -3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits() {
        assert!(MAX_INSTRUMENTS <= u8::MAX as usize);
        assert!(MAX_DRUMS <= u8::MAX as usize);
        assert!(MAX_EFFECTS <= u16::MAX as usize);
    }

    #[test]
    fn test_entry_sizes_aligned() {
        // Entry sizes divide the section alignment evenly so pools stay packed
        assert_eq!(INSTRUMENT_SIZE % SECTION_ALIGN, 0);
        assert_eq!(DRUM_SIZE % SECTION_ALIGN, 0);
        assert_eq!(SAMPLE_SIZE % SECTION_ALIGN, 0);
    }
}
