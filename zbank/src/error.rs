//! Error and warning types for bank conversion

use thiserror::Error;

/// Fatal errors raised while decoding or encoding a binary bank.
///
/// Structural violations that make further parsing meaningless abort the
/// whole conversion; a `Bank` is never returned partially populated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    /// Read or write outside the blob
    #[error("access of {len} bytes at offset {offset:#x} is out of bounds (blob is {size:#x} bytes)")]
    OutOfBounds {
        /// Offset the access started at
        offset: usize,
        /// Number of bytes requested
        len: usize,
        /// Total blob size
        size: usize,
    },

    /// Bankmeta blob shorter than its fixed size
    #[error("bankmeta blob is {0} bytes, expected {expected}", expected = crate::BANKMETA_SIZE)]
    TruncatedMeta(usize),

    /// Instrument count above the format maximum
    #[error("instrument count {0} exceeds format maximum {max}", max = crate::MAX_INSTRUMENTS)]
    TooManyInstruments(usize),

    /// Drum count above the format maximum
    #[error("drum count {0} exceeds format maximum {max}", max = crate::MAX_DRUMS)]
    TooManyDrums(usize),

    /// Sound-effect count above the format maximum
    #[error("sound-effect count {0} exceeds format maximum {max}", max = crate::MAX_EFFECTS)]
    TooManyEffects(usize),

    /// Bankmeta declares drums but the bank has a null drum-list pointer
    #[error("bankmeta declares {0} drums but the drum-list pointer is null")]
    MissingDrumTable(usize),

    /// Bankmeta declares effects but the bank has a null effect-list pointer
    #[error("bankmeta declares {0} sound effects but the effect-list pointer is null")]
    MissingEffectTable(usize),

    /// Envelope that cannot be decoded as a terminated point sequence
    #[error("envelope at offset {offset:#x} is corrupt: {reason}")]
    CorruptEnvelope {
        /// Offset of the envelope in the bank blob
        offset: usize,
        /// What made the point sequence unusable
        reason: &'static str,
    },

    /// Sample header with an out-of-range codec value
    #[error("sample at offset {offset:#x} has unknown codec {value}")]
    BadSampleCodec {
        /// Offset of the sample header
        offset: usize,
        /// Raw codec bits
        value: u32,
    },

    /// Sample header with a null loopbook or codebook pointer
    #[error("sample at offset {offset:#x} has a null {what} pointer")]
    NullSamplePointer {
        /// Offset of the sample header
        offset: usize,
        /// Which sub-pointer is null
        what: &'static str,
    },

    /// Codebook with an impossible shape
    #[error("codebook at offset {offset:#x} has invalid shape (order {order}, predictors {predictors})")]
    BadCodebook {
        /// Offset of the codebook
        offset: usize,
        /// Declared prediction order
        order: u32,
        /// Declared predictor count
        predictors: u32,
    },

    /// Model references an index outside a bank-owned table.
    ///
    /// This is a consistency bug upstream of the encoder, not a data error:
    /// banks produced by the decoder or a successful text import never
    /// trigger it.
    #[error("{owner} references {table} index {index} but the table holds {len} entries")]
    UnresolvedReference {
        /// Entity holding the reference, e.g. "instrument 3"
        owner: String,
        /// Table the index points into
        table: &'static str,
        /// The dangling index
        index: usize,
        /// Current table length
        len: usize,
    },

    /// Sample payload range outside the attached sample-data blob
    #[error("sample {index} payload range {offset:#x}+{len:#x} is outside the sample-data blob ({size:#x} bytes)")]
    BadSampleRange {
        /// Sample table index
        index: usize,
        /// Pool byte offset
        offset: u32,
        /// Payload length
        len: u32,
        /// Attached blob size
        size: usize,
    },
}

/// Errors raised while building a bank from a structured-text tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// A required node is absent
    #[error("document is missing the <{0}> node")]
    MissingNode(&'static str),

    /// A required attribute is absent
    #[error("<{node}> is missing the \"{field}\" attribute")]
    MissingField {
        /// Node name (with id when it has one)
        node: String,
        /// Missing attribute name
        field: &'static str,
    },

    /// An attribute holds an unparseable or out-of-range value
    #[error("<{node}> attribute \"{field}\" has invalid value \"{value}\"")]
    BadValue {
        /// Node name (with id when it has one)
        node: String,
        /// Attribute name
        field: &'static str,
        /// The offending text
        value: String,
    },

    /// A node the format does not define at this position.
    ///
    /// Rejected rather than skipped: no part of a document is silently
    /// dropped on import.
    #[error("unexpected <{node}> inside <{parent}>")]
    UnexpectedNode {
        /// Parent node name
        parent: String,
        /// The unexpected child's name
        node: String,
    },

    /// An attribute the format does not define on this node.
    ///
    /// Catches typos in optional attribute names, which would otherwise
    /// silently drop the field they meant to set.
    #[error("<{node}> has unknown attribute \"{field}\"")]
    UnknownField {
        /// Node name (with id when it has one)
        node: String,
        /// The unknown attribute's name
        field: String,
    },

    /// Two nodes declare the same identifier
    #[error("duplicate identifier \"{0}\"")]
    DuplicateIdentifier(String),

    /// A cross-reference names an identifier no node declares
    #[error("unresolved identifier \"{0}\"")]
    UnresolvedIdentifier(String),

    /// Entity count above the format maximum, rejected before building
    #[error("{kind} count {count} exceeds format maximum {max}")]
    LimitExceeded {
        /// Entity kind, e.g. "instrument"
        kind: &'static str,
        /// Count found in the document
        count: usize,
        /// Format maximum
        max: usize,
    },
}

/// Soft findings recorded during a conversion.
///
/// These are known to occur in real-world banks and never abort: they are
/// attached to the result and logged, and the conversion continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Warning {
    /// Loop region extends past the sample's frame capacity
    #[error("sample {sample}: loop end {loop_end} exceeds the {frames} frames its payload can hold")]
    InvalidLoopRegion {
        /// Sample table index
        sample: usize,
        /// Declared loop end, in frames
        loop_end: u32,
        /// Frames the declared payload size can hold
        frames: u32,
    },

    /// Primary and secondary sample-bank ids conflict
    #[error("bankmeta sample-bank ids conflict (primary {primary}, secondary {secondary})")]
    SampleBankConflict {
        /// Primary sample-bank id
        primary: u8,
        /// Secondary sample-bank id
        secondary: u8,
    },

    /// Supplied bankmeta counts disagree with the bank's tables
    #[error("bankmeta declares {declared} {kind}s but the bank holds {actual}; encoding {actual}")]
    CountMismatch {
        /// Entity kind
        kind: &'static str,
        /// Count in the supplied bankmeta
        declared: usize,
        /// Count derived from the bank tables
        actual: usize,
    },

    /// A null sample region carries a nonzero tuning value, which is dropped
    #[error("{owner}: unused region carries tuning {tuning} which will not round-trip")]
    DanglingTuning {
        /// Entity holding the region, e.g. "instrument 4"
        owner: String,
        /// The tuning value being discarded
        tuning: f32,
    },

    /// A table entry is never reached by the instrument/drum/effect traversal
    #[error("{kind} {index} is not referenced by any instrument, drum, or effect; emitted after the referenced entries")]
    Orphan {
        /// Table kind, e.g. "envelope"
        kind: &'static str,
        /// Index in the owning table
        index: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BankError::OutOfBounds {
                offset: 0x40,
                len: 4,
                size: 0x20,
            }
            .to_string(),
            "access of 4 bytes at offset 0x40 is out of bounds (blob is 0x20 bytes)"
        );
        assert_eq!(
            BankError::TooManyInstruments(200).to_string(),
            "instrument count 200 exceeds format maximum 126"
        );
        assert_eq!(
            ImportError::DuplicateIdentifier("sample_01".into()).to_string(),
            "duplicate identifier \"sample_01\""
        );
    }
}
