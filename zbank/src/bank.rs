//! In-memory instrument bank model
//!
//! The binary format links its structures with byte offsets; the model
//! replaces every offset with an index into a bank-owned table. Instruments,
//! drums and effects hold non-owning indices into the envelope and sample
//! tables, samples hold indices into the loopbook and codebook tables, and
//! no back-references or cycles exist. Structures shared between several
//! owners in the binary (a sample used by two instruments, a codebook used
//! by every sample) appear exactly once in their table.

use crate::error::BankError;
use crate::{ADSR_RESTART, SAMPLE_BANK_NONE};

/// A decoded instrument bank
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bank {
    /// Instrument slots; `None` marks a sentinel (unused) slot
    pub instruments: Vec<Option<Instrument>>,
    /// Drum slots; `None` marks a sentinel (unused) slot
    pub drums: Vec<Option<Drum>>,
    /// Sound-effect slots; `None` marks an empty entry
    pub effects: Vec<Option<SoundEffect>>,
    /// Envelope table, in first-seen order
    pub envelopes: Vec<Envelope>,
    /// Sample-header table, in first-seen order
    pub samples: Vec<Sample>,
    /// Loopbook table, in first-seen order
    pub loopbooks: Vec<AdpcmLoop>,
    /// Codebook table, in first-seen order
    pub codebooks: Vec<AdpcmBook>,
    /// Raw sample payload pool, when attached (see [`Bank::attach_sample_data`])
    pub sample_data: Option<Vec<u8>>,
}

impl Bank {
    /// Attach the raw sample-data pool the sample headers point into.
    ///
    /// The bank blob itself never carries payload bytes (they live in a
    /// separate sample table file), so this is the only way payloads enter
    /// the model. Every sample's byte range must lie inside the blob.
    pub fn attach_sample_data(&mut self, data: Vec<u8>) -> Result<(), BankError> {
        for (index, sample) in self.samples.iter().enumerate() {
            let end = sample.pool_offset as usize + sample.size as usize;
            if end > data.len() {
                return Err(BankError::BadSampleRange {
                    index,
                    offset: sample.pool_offset,
                    len: sample.size,
                    size: data.len(),
                });
            }
        }
        self.sample_data = Some(data);
        Ok(())
    }

    /// Number of instrument slots, used slots and sentinels alike
    pub fn num_instruments(&self) -> usize {
        self.instruments.len()
    }

    /// Number of drum slots, used slots and sentinels alike
    pub fn num_drums(&self) -> usize {
        self.drums.len()
    }

    /// Number of sound-effect slots
    pub fn num_effects(&self) -> usize {
        self.effects.len()
    }
}

/// A sample reference plus the pitch multiplier it is played at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunedSample {
    /// Index into [`Bank::samples`]
    pub sample: usize,
    /// Playback pitch/tuning multiplier
    pub tuning: f32,
}

/// One playable timbre with up to three key-split regions
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    /// Highest key of the low region (exclusive split point)
    pub key_lo: u8,
    /// Lowest key of the high region (exclusive split point)
    pub key_hi: u8,
    /// Envelope release rate index
    pub release_rate: u8,
    /// Index into [`Bank::envelopes`]
    pub envelope: Option<usize>,
    /// Region played below `key_lo`
    pub low: Option<TunedSample>,
    /// Region played between the split points
    pub normal: Option<TunedSample>,
    /// Region played above `key_hi`
    pub high: Option<TunedSample>,
}

impl Instrument {
    /// The three regions in their fixed binary order
    pub fn regions(&self) -> [&Option<TunedSample>; 3] {
        [&self.low, &self.normal, &self.high]
    }
}

/// A single-region percussion voice
#[derive(Debug, Clone, PartialEq)]
pub struct Drum {
    /// Envelope release rate index
    pub release_rate: u8,
    /// Stereo pan (0 = left, 64 = center, 128 = right)
    pub pan: u8,
    /// The drum's sample and tuning
    pub sample: Option<TunedSample>,
    /// Index into [`Bank::envelopes`]
    pub envelope: Option<usize>,
}

/// An inline sound-effect voice (sample + tuning only)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundEffect {
    /// The effect's sample and tuning
    pub sample: TunedSample,
}

/// One (delay, arg) envelope control point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopePoint {
    /// Ticks to spend reaching `arg`; zero or negative values are
    /// terminator opcodes (see the `ADSR_*` constants)
    pub delay: i16,
    /// Target level, or the opcode argument on a terminator point
    pub arg: i16,
}

/// An amplitude envelope: control points ending in a terminator opcode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Control points; the final point's delay is a terminator opcode
    pub points: Vec<EnvelopePoint>,
}

impl Envelope {
    /// Whether the point sequence ends in a recognized terminator opcode
    pub fn is_terminated(&self) -> bool {
        self.points
            .last()
            .is_some_and(|p| p.delay <= 0 && p.delay >= ADSR_RESTART)
    }
}

/// Compression codec of a sample payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCodec {
    /// 9-bytes-per-16-frames ADPCM
    Adpcm,
    /// Signed 8-bit PCM
    S8,
    /// Signed 16-bit PCM, preloaded in memory
    S16InMem,
    /// 5-bytes-per-16-frames ADPCM
    SmallAdpcm,
    /// Reverb feedback buffer
    Reverb,
    /// Signed 16-bit PCM
    S16,
}

impl SampleCodec {
    /// Decode the 3-bit codec field
    pub fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            0 => Self::Adpcm,
            1 => Self::S8,
            2 => Self::S16InMem,
            3 => Self::SmallAdpcm,
            4 => Self::Reverb,
            5 => Self::S16,
            _ => return None,
        })
    }

    /// The 3-bit codec field value
    pub fn bits(self) -> u32 {
        match self {
            Self::Adpcm => 0,
            Self::S8 => 1,
            Self::S16InMem => 2,
            Self::SmallAdpcm => 3,
            Self::Reverb => 4,
            Self::S16 => 5,
        }
    }

    /// Stable text-document name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adpcm => "adpcm",
            Self::S8 => "s8",
            Self::S16InMem => "s16-inmem",
            Self::SmallAdpcm => "small-adpcm",
            Self::Reverb => "reverb",
            Self::S16 => "s16",
        }
    }

    /// Parse a text-document name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "adpcm" => Self::Adpcm,
            "s8" => Self::S8,
            "s16-inmem" => Self::S16InMem,
            "small-adpcm" => Self::SmallAdpcm,
            "reverb" => Self::Reverb,
            "s16" => Self::S16,
            _ => return None,
        })
    }
}

/// Storage medium a sample payload loads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMedium {
    /// Already resident in RAM
    Ram,
    /// Unknown/unused medium value
    Unk,
    /// Cartridge ROM
    Cart,
    /// 64DD disk
    Disk,
}

impl StorageMedium {
    /// Decode the 2-bit medium field
    pub fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            0 => Self::Ram,
            1 => Self::Unk,
            2 => Self::Cart,
            3 => Self::Disk,
            _ => return None,
        })
    }

    /// The 2-bit medium field value
    pub fn bits(self) -> u32 {
        match self {
            Self::Ram => 0,
            Self::Unk => 1,
            Self::Cart => 2,
            Self::Disk => 3,
        }
    }

    /// Stable text-document name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ram => "ram",
            Self::Unk => "unk",
            Self::Cart => "cart",
            Self::Disk => "disk",
        }
    }

    /// Parse a text-document name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ram" => Self::Ram,
            "unk" => Self::Unk,
            "cart" => Self::Cart,
            "disk" => Self::Disk,
            _ => return None,
        })
    }
}

/// Header describing one compressed sample payload.
///
/// The payload bytes themselves are opaque: they live in the shared
/// sample-data pool at `pool_offset` and are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Undocumented flag in bit 31 of the header bitfield
    pub unk_flag: bool,
    /// Payload compression codec
    pub codec: SampleCodec,
    /// Storage medium the payload loads from
    pub medium: StorageMedium,
    /// Whether the engine keeps the payload cached
    pub cached: bool,
    /// Relocation flag; always zero on disk
    pub relocated: bool,
    /// Payload size in bytes (24-bit field)
    pub size: u32,
    /// Byte offset of the payload in the shared sample-data pool
    pub pool_offset: u32,
    /// Index into [`Bank::loopbooks`]
    pub loopbook: usize,
    /// Index into [`Bank::codebooks`]
    pub codebook: usize,
}

impl Sample {
    /// Frames the declared payload size can hold, used to sanity-check
    /// loop regions
    pub fn frame_capacity(&self) -> u32 {
        match self.codec {
            SampleCodec::Adpcm => self.size / 9 * 16,
            SampleCodec::SmallAdpcm => self.size / 5 * 16,
            SampleCodec::S8 => self.size,
            SampleCodec::S16 | SampleCodec::S16InMem => self.size / 2,
            SampleCodec::Reverb => self.size,
        }
    }
}

/// ADPCM loop metadata, shared between samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdpcmLoop {
    /// First frame of the loop region
    pub start: u32,
    /// Last frame of the loop region
    pub end: u32,
    /// Iteration count; 0xFFFFFFFF loops forever, 0 means no loop
    pub count: u32,
    /// Decoder predictor state at the loop point; present iff `count != 0`
    pub state: Option<[i16; 16]>,
}

/// ADPCM codebook: shared decompression coefficients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdpcmBook {
    /// Prediction order (1..=8)
    pub order: u32,
    /// Number of predictors (1..=8)
    pub predictors: u32,
    /// Coefficient table, `8 * order * predictors` entries
    pub coefficients: Vec<i16>,
}

impl AdpcmBook {
    /// Coefficient count the declared shape requires
    pub fn expected_len(&self) -> usize {
        8 * self.order as usize * self.predictors as usize
    }
}

/// Sidecar metadata accompanying a bank.
///
/// Read once alongside the bank blob on decode and required again for every
/// encode: the bank blob alone does not carry its own entity counts or
/// sample-bank dependencies. The name and version tag only exist in the
/// text document; the binary sidecar has no room for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankMeta {
    /// Human-readable bank name (text document only)
    pub name: String,
    /// Format-version tag (text document only)
    pub version: Option<String>,
    /// Storage medium of the bank itself
    pub medium: u8,
    /// Engine cache load policy
    pub cache_policy: u8,
    /// Primary sample-bank (sample table) the bank depends on
    pub sample_bank: u8,
    /// Secondary sample-bank, or [`SAMPLE_BANK_NONE`]
    pub sample_bank_secondary: u8,
    /// Declared instrument slot count
    pub num_instruments: u8,
    /// Declared drum slot count
    pub num_drums: u8,
    /// Declared sound-effect slot count
    pub num_effects: u16,
}

impl BankMeta {
    /// Whether the bank pulls sample data from a second bank's pool
    pub fn shares_sample_data(&self) -> bool {
        self.sample_bank_secondary != SAMPLE_BANK_NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_termination() {
        let mut env = Envelope {
            points: vec![EnvelopePoint { delay: 2, arg: 32700 }],
        };
        assert!(!env.is_terminated());

        env.points.push(EnvelopePoint {
            delay: crate::ADSR_HANG,
            arg: 0,
        });
        assert!(env.is_terminated());

        // Below the last known opcode is not a terminator
        env.points.push(EnvelopePoint { delay: -4, arg: 0 });
        assert!(!env.is_terminated());
    }

    #[test]
    fn test_codec_bits_roundtrip() {
        for bits in 0..6 {
            let codec = SampleCodec::from_bits(bits).unwrap();
            assert_eq!(codec.bits(), bits);
            assert_eq!(SampleCodec::from_name(codec.as_str()), Some(codec));
        }
        assert_eq!(SampleCodec::from_bits(6), None);
    }

    #[test]
    fn test_frame_capacity() {
        let sample = Sample {
            unk_flag: false,
            codec: SampleCodec::Adpcm,
            medium: StorageMedium::Ram,
            cached: true,
            relocated: false,
            size: 9 * 100,
            pool_offset: 0,
            loopbook: 0,
            codebook: 0,
        };
        assert_eq!(sample.frame_capacity(), 1600);
    }

    #[test]
    fn test_attach_sample_data_checks_ranges() {
        let mut bank = Bank::default();
        bank.samples.push(Sample {
            unk_flag: false,
            codec: SampleCodec::Adpcm,
            medium: StorageMedium::Ram,
            cached: true,
            relocated: false,
            size: 0x20,
            pool_offset: 0x10,
            loopbook: 0,
            codebook: 0,
        });

        assert!(matches!(
            bank.attach_sample_data(vec![0; 0x20]),
            Err(BankError::BadSampleRange { index: 0, .. })
        ));
        assert!(bank.attach_sample_data(vec![0; 0x30]).is_ok());
    }

    #[test]
    fn test_meta_sharing_flag() {
        let mut meta = BankMeta {
            sample_bank_secondary: SAMPLE_BANK_NONE,
            ..Default::default()
        };
        assert!(!meta.shares_sample_data());
        meta.sample_bank_secondary = 1;
        assert!(meta.shares_sample_data());
    }
}
