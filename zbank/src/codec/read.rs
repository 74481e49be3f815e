//! Binary bank decoding
//!
//! The bank blob is a pointer-linked graph: a small header, offset tables
//! for instruments/drums/effects, and shared envelope/sample/loopbook/
//! codebook structures reached through sub-pointers. Each shared structure
//! is decoded exactly once and deduplicated by its source offset; the
//! offset -> index registries are ordered maps so discovery order (and with
//! it re-encoding) is deterministic.

use std::collections::BTreeMap;

use crate::bank::{
    AdpcmBook, AdpcmLoop, Bank, BankMeta, Drum, Envelope, EnvelopePoint, Instrument, Sample,
    SampleCodec, SoundEffect, StorageMedium, TunedSample,
};
use crate::cursor::Cursor;
use crate::error::{BankError, Warning};
use crate::{
    ADSR_RESTART, BANKMETA_SIZE, MAX_DRUMS, MAX_EFFECTS, MAX_ENVELOPE_POINTS, MAX_INSTRUMENTS,
    NIL_OFFSET,
};

use super::Decoded;

/// Decode a bank blob and its bankmeta sidecar into a populated model.
///
/// The bankmeta is parsed first: it carries the entity counts the bank
/// header does not. Structural violations (bad counts, out-of-bounds
/// pointers, unterminated envelopes) abort with a [`BankError`]; findings
/// known to occur in real-world banks are recorded as warnings on the
/// result and do not abort.
pub fn decode(bank_bytes: &[u8], meta_bytes: &[u8]) -> Result<Decoded, BankError> {
    let meta = parse_meta(meta_bytes)?;

    let num_instruments = meta.num_instruments as usize;
    let num_drums = meta.num_drums as usize;
    let num_effects = meta.num_effects as usize;

    if num_instruments > MAX_INSTRUMENTS {
        return Err(BankError::TooManyInstruments(num_instruments));
    }
    if num_drums > MAX_DRUMS {
        return Err(BankError::TooManyDrums(num_drums));
    }
    if num_effects > MAX_EFFECTS {
        return Err(BankError::TooManyEffects(num_effects));
    }

    tracing::debug!(
        instruments = num_instruments,
        drums = num_drums,
        effects = num_effects,
        "decoding bank ({} bytes)",
        bank_bytes.len()
    );

    let mut decoder = Decoder::new(bank_bytes);

    let mut header = Cursor::new(bank_bytes);
    let drum_list = header.read_u32()?;
    let effect_list = header.read_u32()?;

    for slot in 0..num_instruments {
        let offset = header.read_u32()?;
        let instrument = if offset == NIL_OFFSET {
            None
        } else {
            Some(decoder.decode_instrument(offset, slot)?)
        };
        decoder.bank.instruments.push(instrument);
    }

    if num_drums > 0 {
        if drum_list == NIL_OFFSET {
            return Err(BankError::MissingDrumTable(num_drums));
        }
        let mut list = Cursor::at(bank_bytes, drum_list as usize);
        for slot in 0..num_drums {
            let offset = list.read_u32()?;
            let drum = if offset == NIL_OFFSET {
                None
            } else {
                Some(decoder.decode_drum(offset, slot)?)
            };
            decoder.bank.drums.push(drum);
        }
    }

    if num_effects > 0 {
        if effect_list == NIL_OFFSET {
            return Err(BankError::MissingEffectTable(num_effects));
        }
        let mut list = Cursor::at(bank_bytes, effect_list as usize);
        for slot in 0..num_effects {
            let effect = decoder.decode_effect(&mut list, slot)?;
            decoder.bank.effects.push(effect);
        }
    }

    if meta.shares_sample_data() && meta.sample_bank == meta.sample_bank_secondary {
        decoder.warn(Warning::SampleBankConflict {
            primary: meta.sample_bank,
            secondary: meta.sample_bank_secondary,
        });
    }

    tracing::debug!(
        envelopes = decoder.bank.envelopes.len(),
        samples = decoder.bank.samples.len(),
        loopbooks = decoder.bank.loopbooks.len(),
        codebooks = decoder.bank.codebooks.len(),
        warnings = decoder.warnings.len(),
        "bank decoded"
    );

    Ok(Decoded {
        bank: decoder.bank,
        meta,
        warnings: decoder.warnings,
    })
}

/// Parse the fixed-size bankmeta sidecar blob
pub(crate) fn parse_meta(bytes: &[u8]) -> Result<BankMeta, BankError> {
    if bytes.len() < BANKMETA_SIZE {
        return Err(BankError::TruncatedMeta(bytes.len()));
    }
    let mut cursor = Cursor::new(bytes);
    Ok(BankMeta {
        name: String::new(),
        version: None,
        medium: cursor.read_u8()?,
        cache_policy: cursor.read_u8()?,
        sample_bank: cursor.read_u8()?,
        sample_bank_secondary: cursor.read_u8()?,
        num_instruments: cursor.read_u8()?,
        num_drums: cursor.read_u8()?,
        num_effects: cursor.read_u16()?,
    })
}

/// Decode state: the growing bank plus one offset -> index registry per
/// shared table
struct Decoder<'a> {
    data: &'a [u8],
    bank: Bank,
    warnings: Vec<Warning>,
    envelope_offsets: BTreeMap<u32, usize>,
    sample_offsets: BTreeMap<u32, usize>,
    loopbook_offsets: BTreeMap<u32, usize>,
    codebook_offsets: BTreeMap<u32, usize>,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bank: Bank::default(),
            warnings: Vec::new(),
            envelope_offsets: BTreeMap::new(),
            sample_offsets: BTreeMap::new(),
            loopbook_offsets: BTreeMap::new(),
            codebook_offsets: BTreeMap::new(),
        }
    }

    fn warn(&mut self, warning: Warning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    fn decode_instrument(&mut self, offset: u32, slot: usize) -> Result<Instrument, BankError> {
        let mut cursor = Cursor::at(self.data, offset as usize);
        let _relocated = cursor.read_u8()?;
        let key_lo = cursor.read_u8()?;
        let key_hi = cursor.read_u8()?;
        let release_rate = cursor.read_u8()?;
        let envelope_ptr = cursor.read_u32()?;

        let envelope = if envelope_ptr == NIL_OFFSET {
            None
        } else {
            Some(self.envelope_at(envelope_ptr)?)
        };

        let low = self.read_region(&mut cursor, || format!("instrument {slot} (low)"))?;
        let normal = self.read_region(&mut cursor, || format!("instrument {slot} (normal)"))?;
        let high = self.read_region(&mut cursor, || format!("instrument {slot} (high)"))?;

        Ok(Instrument {
            key_lo,
            key_hi,
            release_rate,
            envelope,
            low,
            normal,
            high,
        })
    }

    fn decode_drum(&mut self, offset: u32, slot: usize) -> Result<Drum, BankError> {
        let mut cursor = Cursor::at(self.data, offset as usize);
        let release_rate = cursor.read_u8()?;
        let pan = cursor.read_u8()?;
        let _relocated = cursor.read_u8()?;
        let _pad = cursor.read_u8()?;

        let sample = self.read_region(&mut cursor, || format!("drum {slot}"))?;
        let envelope_ptr = cursor.read_u32()?;
        let envelope = if envelope_ptr == NIL_OFFSET {
            None
        } else {
            Some(self.envelope_at(envelope_ptr)?)
        };

        Ok(Drum {
            release_rate,
            pan,
            sample,
            envelope,
        })
    }

    fn decode_effect(
        &mut self,
        list: &mut Cursor<'a>,
        slot: usize,
    ) -> Result<Option<SoundEffect>, BankError> {
        let sample = self.read_region(list, || format!("effect {slot}"))?;
        Ok(sample.map(|sample| SoundEffect { sample }))
    }

    /// Read one (sample pointer, tuning) pair, resolving the pointer to a
    /// sample index. A null pointer is an unused region; its tuning cannot
    /// round-trip, so a nonzero one is reported.
    fn read_region(
        &mut self,
        cursor: &mut Cursor<'a>,
        owner: impl Fn() -> String,
    ) -> Result<Option<TunedSample>, BankError> {
        let sample_ptr = cursor.read_u32()?;
        let tuning = cursor.read_f32()?;

        if sample_ptr == NIL_OFFSET {
            if tuning != 0.0 {
                self.warn(Warning::DanglingTuning {
                    owner: owner(),
                    tuning,
                });
            }
            return Ok(None);
        }

        let sample = self.sample_at(sample_ptr)?;
        Ok(Some(TunedSample { sample, tuning }))
    }

    fn envelope_at(&mut self, offset: u32) -> Result<usize, BankError> {
        if let Some(&index) = self.envelope_offsets.get(&offset) {
            return Ok(index);
        }

        let mut cursor = Cursor::at(self.data, offset as usize);
        let mut points = Vec::new();
        let mut terminated = false;
        while points.len() < MAX_ENVELOPE_POINTS {
            let delay = cursor.read_i16()?;
            let arg = cursor.read_i16()?;
            points.push(EnvelopePoint { delay, arg });
            if delay <= 0 {
                if delay < ADSR_RESTART {
                    return Err(BankError::CorruptEnvelope {
                        offset: offset as usize,
                        reason: "delay opcode below the restart code",
                    });
                }
                terminated = true;
                break;
            }
        }
        if !terminated {
            return Err(BankError::CorruptEnvelope {
                offset: offset as usize,
                reason: "no terminator within the maximum point count",
            });
        }

        let index = self.bank.envelopes.len();
        self.bank.envelopes.push(Envelope { points });
        self.envelope_offsets.insert(offset, index);
        Ok(index)
    }

    fn sample_at(&mut self, offset: u32) -> Result<usize, BankError> {
        if let Some(&index) = self.sample_offsets.get(&offset) {
            return Ok(index);
        }

        let mut cursor = Cursor::at(self.data, offset as usize);
        let bits = cursor.read_u32()?;
        let pool_offset = cursor.read_u32()?;
        let loopbook_ptr = cursor.read_u32()?;
        let codebook_ptr = cursor.read_u32()?;

        let codec_bits = (bits >> 28) & 0b111;
        let codec = SampleCodec::from_bits(codec_bits).ok_or(BankError::BadSampleCodec {
            offset: offset as usize,
            value: codec_bits,
        })?;
        // The medium field is two bits wide, so every value is a known medium
        let medium = StorageMedium::from_bits((bits >> 26) & 0b11).unwrap_or(StorageMedium::Ram);

        if loopbook_ptr == NIL_OFFSET {
            return Err(BankError::NullSamplePointer {
                offset: offset as usize,
                what: "loopbook",
            });
        }
        if codebook_ptr == NIL_OFFSET {
            return Err(BankError::NullSamplePointer {
                offset: offset as usize,
                what: "codebook",
            });
        }

        let loopbook = self.loopbook_at(loopbook_ptr)?;
        let codebook = self.codebook_at(codebook_ptr)?;

        let sample = Sample {
            unk_flag: (bits >> 31) & 1 != 0,
            codec,
            medium,
            cached: (bits >> 25) & 1 != 0,
            relocated: (bits >> 24) & 1 != 0,
            size: bits & 0x00FF_FFFF,
            pool_offset,
            loopbook,
            codebook,
        };

        let index = self.bank.samples.len();
        let loop_end = self.bank.loopbooks[loopbook].end;
        let frames = sample.frame_capacity();
        if loop_end > frames {
            // Real-world banks are known to over-declare loop regions;
            // record and continue rather than abort.
            self.warn(Warning::InvalidLoopRegion {
                sample: index,
                loop_end,
                frames,
            });
        }

        self.bank.samples.push(sample);
        self.sample_offsets.insert(offset, index);
        Ok(index)
    }

    fn loopbook_at(&mut self, offset: u32) -> Result<usize, BankError> {
        if let Some(&index) = self.loopbook_offsets.get(&offset) {
            return Ok(index);
        }

        let mut cursor = Cursor::at(self.data, offset as usize);
        let start = cursor.read_u32()?;
        let end = cursor.read_u32()?;
        let count = cursor.read_u32()?;
        let _pad = cursor.read_u32()?;

        let state = if count != 0 {
            let mut state = [0i16; 16];
            for entry in &mut state {
                *entry = cursor.read_i16()?;
            }
            Some(state)
        } else {
            None
        };

        let index = self.bank.loopbooks.len();
        self.bank.loopbooks.push(AdpcmLoop {
            start,
            end,
            count,
            state,
        });
        self.loopbook_offsets.insert(offset, index);
        Ok(index)
    }

    fn codebook_at(&mut self, offset: u32) -> Result<usize, BankError> {
        if let Some(&index) = self.codebook_offsets.get(&offset) {
            return Ok(index);
        }

        let mut cursor = Cursor::at(self.data, offset as usize);
        let order = cursor.read_u32()?;
        let predictors = cursor.read_u32()?;

        if !(1..=8).contains(&order) || !(1..=8).contains(&predictors) {
            return Err(BankError::BadCodebook {
                offset: offset as usize,
                order,
                predictors,
            });
        }

        let len = 8 * order as usize * predictors as usize;
        let mut coefficients = Vec::with_capacity(len);
        for _ in 0..len {
            coefficients.push(cursor.read_i16()?);
        }

        let index = self.bank.codebooks.len();
        self.bank.codebooks.push(AdpcmBook {
            order,
            predictors,
            coefficients,
        });
        self.codebook_offsets.insert(offset, index);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta() {
        let bytes = [0x02, 0x01, 0x03, 0xFF, 0x10, 0x40, 0x00, 0x08];
        let meta = parse_meta(&bytes).unwrap();
        assert_eq!(meta.medium, 2);
        assert_eq!(meta.cache_policy, 1);
        assert_eq!(meta.sample_bank, 3);
        assert_eq!(meta.sample_bank_secondary, crate::SAMPLE_BANK_NONE);
        assert_eq!(meta.num_instruments, 0x10);
        assert_eq!(meta.num_drums, 0x40);
        assert_eq!(meta.num_effects, 8);
        assert!(!meta.shares_sample_data());
    }

    #[test]
    fn test_parse_meta_truncated() {
        assert_eq!(
            parse_meta(&[0u8; 7]),
            Err(BankError::TruncatedMeta(7))
        );
    }
}
