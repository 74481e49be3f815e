//! Binary bank encoding
//!
//! Encoding mirrors decoding in reverse, plus the layout decisions the
//! decoder never had to make: every section is placed in one canonical
//! order and every pointer field is filled from the resulting offsets.
//! Shared structures are emitted exactly once, in the order a deterministic
//! traversal of instruments, then drums, then effects first reaches them,
//! so a decoded bank re-encodes to the same layout it came from.

use crate::bank::{Bank, BankMeta, TunedSample};
use crate::cursor::Writer;
use crate::error::{BankError, Warning};
use crate::{
    DRUM_SIZE, EFFECT_SIZE, INSTRUMENT_SIZE, MAX_DRUMS, MAX_EFFECTS, MAX_INSTRUMENTS, NIL_OFFSET,
    SAMPLE_SIZE, SECTION_ALIGN,
};

use super::Encoded;

/// Encode a bank model and its sidecar metadata into binary blobs.
///
/// Fails with [`BankError::UnresolvedReference`] when the model holds an
/// index outside its own tables; that indicates an invariant violation
/// upstream, never a property of well-formed input data.
pub fn encode(bank: &Bank, meta: &BankMeta) -> Result<Encoded, BankError> {
    if bank.instruments.len() > MAX_INSTRUMENTS {
        return Err(BankError::TooManyInstruments(bank.instruments.len()));
    }
    if bank.drums.len() > MAX_DRUMS {
        return Err(BankError::TooManyDrums(bank.drums.len()));
    }
    if bank.effects.len() > MAX_EFFECTS {
        return Err(BankError::TooManyEffects(bank.effects.len()));
    }
    check_references(bank)?;

    let mut warnings = Vec::new();
    let emission = discover(bank, &mut warnings);
    let (pool, pool_offsets) = build_sample_pool(bank, &emission)?;
    let layout = assign_offsets(bank, &emission);

    tracing::debug!(
        instruments = bank.instruments.len(),
        drums = bank.drums.len(),
        effects = bank.effects.len(),
        size = layout.total,
        "encoding bank"
    );

    let bank_bytes = write_bank(bank, &layout, pool_offsets.as_deref());
    debug_assert_eq!(bank_bytes.len(), layout.total);

    let meta_bytes = write_meta(bank, meta, &mut warnings);

    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    Ok(Encoded {
        bank: bank_bytes,
        meta: meta_bytes,
        sample_data: pool,
        warnings,
    })
}

/// Verify that every index held by the model lands inside its table
fn check_references(bank: &Bank) -> Result<(), BankError> {
    let check = |owner: &dyn Fn() -> String,
                 table: &'static str,
                 index: usize,
                 len: usize|
     -> Result<(), BankError> {
        if index >= len {
            return Err(BankError::UnresolvedReference {
                owner: owner(),
                table,
                index,
                len,
            });
        }
        Ok(())
    };

    let check_region = |owner: &dyn Fn() -> String,
                        region: &Option<TunedSample>|
     -> Result<(), BankError> {
        if let Some(tuned) = region {
            check(owner, "sample", tuned.sample, bank.samples.len())?;
        }
        Ok(())
    };

    for (slot, instrument) in bank.instruments.iter().enumerate() {
        let Some(instrument) = instrument else { continue };
        let owner = || format!("instrument {slot}");
        if let Some(envelope) = instrument.envelope {
            check(&owner, "envelope", envelope, bank.envelopes.len())?;
        }
        for region in instrument.regions() {
            check_region(&owner, region)?;
        }
    }

    for (slot, drum) in bank.drums.iter().enumerate() {
        let Some(drum) = drum else { continue };
        let owner = || format!("drum {slot}");
        if let Some(envelope) = drum.envelope {
            check(&owner, "envelope", envelope, bank.envelopes.len())?;
        }
        check_region(&owner, &drum.sample)?;
    }

    for (slot, effect) in bank.effects.iter().enumerate() {
        let Some(effect) = effect else { continue };
        let owner = || format!("effect {slot}");
        check(&owner, "sample", effect.sample.sample, bank.samples.len())?;
    }

    for (index, sample) in bank.samples.iter().enumerate() {
        let owner = || format!("sample {index}");
        check(&owner, "loopbook", sample.loopbook, bank.loopbooks.len())?;
        check(&owner, "codebook", sample.codebook, bank.codebooks.len())?;
    }

    Ok(())
}

/// Pool emission order: table indices in the order the traversal first
/// reaches them
struct Emission {
    envelopes: Vec<usize>,
    samples: Vec<usize>,
    loopbooks: Vec<usize>,
    codebooks: Vec<usize>,
}

/// Walk instruments, drums, then effects, collecting shared structures
/// first-seen-first. Table entries the walk never reaches still get
/// emitted (appended in table order) so nothing is silently dropped, but
/// each is reported as an orphan.
fn discover(bank: &Bank, warnings: &mut Vec<Warning>) -> Emission {
    let mut emission = Emission {
        envelopes: Vec::new(),
        samples: Vec::new(),
        loopbooks: Vec::new(),
        codebooks: Vec::new(),
    };
    let mut seen_envelopes = vec![false; bank.envelopes.len()];
    let mut seen_samples = vec![false; bank.samples.len()];
    let mut seen_loopbooks = vec![false; bank.loopbooks.len()];
    let mut seen_codebooks = vec![false; bank.codebooks.len()];

    let mut visit_sample = |index: usize, emission: &mut Emission| {
        if seen_samples[index] {
            return;
        }
        seen_samples[index] = true;
        emission.samples.push(index);

        let sample = &bank.samples[index];
        if !seen_loopbooks[sample.loopbook] {
            seen_loopbooks[sample.loopbook] = true;
            emission.loopbooks.push(sample.loopbook);
        }
        if !seen_codebooks[sample.codebook] {
            seen_codebooks[sample.codebook] = true;
            emission.codebooks.push(sample.codebook);
        }
    };
    let mut visit_envelope = |index: usize, emission: &mut Emission| {
        if !seen_envelopes[index] {
            seen_envelopes[index] = true;
            emission.envelopes.push(index);
        }
    };

    for instrument in bank.instruments.iter().flatten() {
        if let Some(envelope) = instrument.envelope {
            visit_envelope(envelope, &mut emission);
        }
        for region in instrument.regions().into_iter().flatten() {
            visit_sample(region.sample, &mut emission);
        }
    }
    for drum in bank.drums.iter().flatten() {
        if let Some(tuned) = &drum.sample {
            visit_sample(tuned.sample, &mut emission);
        }
        if let Some(envelope) = drum.envelope {
            visit_envelope(envelope, &mut emission);
        }
    }
    for effect in bank.effects.iter().flatten() {
        visit_sample(effect.sample.sample, &mut emission);
    }

    let mut orphan = |kind: &'static str, index: usize| {
        warnings.push(Warning::Orphan { kind, index });
    };
    for (index, seen) in seen_envelopes.iter().enumerate() {
        if !seen {
            orphan("envelope", index);
            emission.envelopes.push(index);
        }
    }
    for (index, seen) in seen_samples.iter().enumerate() {
        if !seen {
            orphan("sample", index);
            emission.samples.push(index);
            let sample = &bank.samples[index];
            if !seen_loopbooks[sample.loopbook] {
                seen_loopbooks[sample.loopbook] = true;
                emission.loopbooks.push(sample.loopbook);
            }
            if !seen_codebooks[sample.codebook] {
                seen_codebooks[sample.codebook] = true;
                emission.codebooks.push(sample.codebook);
            }
        }
    }
    for (index, seen) in seen_loopbooks.iter().enumerate() {
        if !seen {
            orphan("loopbook", index);
            emission.loopbooks.push(index);
        }
    }
    for (index, seen) in seen_codebooks.iter().enumerate() {
        if !seen {
            orphan("codebook", index);
            emission.codebooks.push(index);
        }
    }

    emission
}

/// Final offsets for every entity, indexed by table index (slot index for
/// instruments and drums)
struct Layout {
    drum_list: u32,
    effect_list: u32,
    instruments: Vec<Option<u32>>,
    drums: Vec<Option<u32>>,
    envelopes: Vec<u32>,
    samples: Vec<u32>,
    loopbooks: Vec<u32>,
    codebooks: Vec<u32>,
    total: usize,
}

fn align_up(pos: usize) -> usize {
    pos.div_ceil(SECTION_ALIGN) * SECTION_ALIGN
}

/// Assign output offsets by walking the canonical section order:
/// header + instrument pointers, instrument entries, drum pointer table,
/// drum entries, effect list, envelope pool, sample-header pool, loopbook
/// pool, codebook pool.
fn assign_offsets(bank: &Bank, emission: &Emission) -> Layout {
    let mut pos = align_up(8 + 4 * bank.instruments.len());

    let mut instruments = Vec::with_capacity(bank.instruments.len());
    for slot in &bank.instruments {
        instruments.push(slot.as_ref().map(|_| {
            let offset = pos as u32;
            pos += INSTRUMENT_SIZE;
            offset
        }));
    }
    pos = align_up(pos);

    let drum_list = if bank.drums.is_empty() {
        NIL_OFFSET
    } else {
        let offset = pos as u32;
        pos = align_up(pos + 4 * bank.drums.len());
        offset
    };
    let mut drums = Vec::with_capacity(bank.drums.len());
    for slot in &bank.drums {
        drums.push(slot.as_ref().map(|_| {
            let offset = pos as u32;
            pos += DRUM_SIZE;
            offset
        }));
    }
    pos = align_up(pos);

    let effect_list = if bank.effects.is_empty() {
        NIL_OFFSET
    } else {
        let offset = pos as u32;
        pos = align_up(pos + EFFECT_SIZE * bank.effects.len());
        offset
    };

    let mut envelopes = vec![0u32; bank.envelopes.len()];
    for &index in &emission.envelopes {
        envelopes[index] = pos as u32;
        pos = align_up(pos + 4 * bank.envelopes[index].points.len());
    }

    let mut samples = vec![0u32; bank.samples.len()];
    for &index in &emission.samples {
        samples[index] = pos as u32;
        pos += SAMPLE_SIZE;
    }
    pos = align_up(pos);

    let mut loopbooks = vec![0u32; bank.loopbooks.len()];
    for &index in &emission.loopbooks {
        loopbooks[index] = pos as u32;
        pos += if bank.loopbooks[index].state.is_some() {
            0x30
        } else {
            0x10
        };
    }
    pos = align_up(pos);

    let mut codebooks = vec![0u32; bank.codebooks.len()];
    for &index in &emission.codebooks {
        codebooks[index] = pos as u32;
        pos = align_up(pos + 8 + 2 * bank.codebooks[index].coefficients.len());
    }

    Layout {
        drum_list,
        effect_list,
        instruments,
        drums,
        envelopes,
        samples,
        loopbooks,
        codebooks,
        total: align_up(pos),
    }
}

/// Emit the bank blob against a precomputed layout
fn write_bank(bank: &Bank, layout: &Layout, pool_offsets: Option<&[u32]>) -> Vec<u8> {
    let mut out = Writer::new();

    // ========== Header: drum/effect list pointers + instrument table ==========

    out.write_u32(layout.drum_list);
    out.write_u32(layout.effect_list);
    for offset in &layout.instruments {
        out.write_u32(offset.unwrap_or(NIL_OFFSET));
    }
    out.align_section();

    // ========== Instrument entries ==========

    let write_region = |out: &mut Writer, region: &Option<TunedSample>, layout: &Layout| {
        match region {
            Some(tuned) => {
                out.write_u32(layout.samples[tuned.sample]);
                out.write_f32(tuned.tuning);
            }
            None => {
                out.write_u32(NIL_OFFSET);
                out.write_f32(0.0);
            }
        }
    };

    for (slot, instrument) in bank.instruments.iter().enumerate() {
        let Some(instrument) = instrument else { continue };
        debug_assert_eq!(out.pos() as u32, layout.instruments[slot].unwrap());
        out.write_u8(0); // relocation flag, always clear on disk
        out.write_u8(instrument.key_lo);
        out.write_u8(instrument.key_hi);
        out.write_u8(instrument.release_rate);
        out.write_u32(match instrument.envelope {
            Some(envelope) => layout.envelopes[envelope],
            None => NIL_OFFSET,
        });
        for region in instrument.regions() {
            write_region(&mut out, region, layout);
        }
    }
    out.align_section();

    // ========== Drum pointer table + drum entries ==========

    if !bank.drums.is_empty() {
        debug_assert_eq!(out.pos() as u32, layout.drum_list);
        for offset in &layout.drums {
            out.write_u32(offset.unwrap_or(NIL_OFFSET));
        }
        out.align_section();

        for (slot, drum) in bank.drums.iter().enumerate() {
            let Some(drum) = drum else { continue };
            debug_assert_eq!(out.pos() as u32, layout.drums[slot].unwrap());
            out.write_u8(drum.release_rate);
            out.write_u8(drum.pan);
            out.write_u8(0); // relocation flag
            out.write_u8(0); // pad
            write_region(&mut out, &drum.sample, layout);
            out.write_u32(match drum.envelope {
                Some(envelope) => layout.envelopes[envelope],
                None => NIL_OFFSET,
            });
        }
        out.align_section();
    }

    // ========== Effect list (inline entries) ==========

    if !bank.effects.is_empty() {
        debug_assert_eq!(out.pos() as u32, layout.effect_list);
        for effect in &bank.effects {
            write_region(&mut out, &effect.map(|e| e.sample), layout);
        }
        out.align_section();
    }

    // ========== Envelope pool ==========

    for (index, envelope) in layout_order(&layout.envelopes) {
        debug_assert_eq!(out.pos() as u32, envelope);
        for point in &bank.envelopes[index].points {
            out.write_i16(point.delay);
            out.write_i16(point.arg);
        }
        out.align_section();
    }

    // ========== Sample-header pool ==========

    for (index, offset) in layout_order(&layout.samples) {
        debug_assert_eq!(out.pos() as u32, offset);
        let sample = &bank.samples[index];
        let mut bits = (sample.unk_flag as u32) << 31;
        bits |= sample.codec.bits() << 28;
        bits |= sample.medium.bits() << 26;
        bits |= (sample.cached as u32) << 25;
        bits |= (sample.relocated as u32) << 24;
        bits |= sample.size & 0x00FF_FFFF;
        out.write_u32(bits);
        out.write_u32(match pool_offsets {
            Some(offsets) => offsets[index],
            None => sample.pool_offset,
        });
        out.write_u32(layout.loopbooks[sample.loopbook]);
        out.write_u32(layout.codebooks[sample.codebook]);
    }
    out.align_section();

    // ========== Loopbook pool ==========

    for (index, offset) in layout_order(&layout.loopbooks) {
        debug_assert_eq!(out.pos() as u32, offset);
        let loopbook = &bank.loopbooks[index];
        out.write_u32(loopbook.start);
        out.write_u32(loopbook.end);
        out.write_u32(loopbook.count);
        out.write_u32(0); // struct padding
        if let Some(state) = &loopbook.state {
            for &entry in state {
                out.write_i16(entry);
            }
        }
    }
    out.align_section();

    // ========== Codebook pool ==========

    for (index, offset) in layout_order(&layout.codebooks) {
        debug_assert_eq!(out.pos() as u32, offset);
        let codebook = &bank.codebooks[index];
        out.write_u32(codebook.order);
        out.write_u32(codebook.predictors);
        for &coefficient in &codebook.coefficients {
            out.write_i16(coefficient);
        }
        out.align_section();
    }

    out.align_section();
    out.into_bytes()
}

/// Iterate a layout table in emission (offset) order.
///
/// Offsets are unique and strictly increasing along the emission order, so
/// sorting by offset recovers it without threading the emission lists
/// through the writer.
fn layout_order(offsets: &[u32]) -> impl Iterator<Item = (usize, u32)> {
    let mut entries: Vec<(usize, u32)> = offsets.iter().copied().enumerate().collect();
    entries.sort_by_key(|&(_, offset)| offset);
    entries.into_iter()
}

/// Re-serialize the sidecar metadata; counts come from the bank's tables,
/// and a disagreement with the supplied record is reported rather than
/// silently corrected.
fn write_meta(bank: &Bank, meta: &BankMeta, warnings: &mut Vec<Warning>) -> Vec<u8> {
    let counts = [
        ("instrument", meta.num_instruments as usize, bank.instruments.len()),
        ("drum", meta.num_drums as usize, bank.drums.len()),
        ("effect", meta.num_effects as usize, bank.effects.len()),
    ];
    for (kind, declared, actual) in counts {
        if declared != actual {
            warnings.push(Warning::CountMismatch {
                kind,
                declared,
                actual,
            });
        }
    }

    let mut out = Writer::new();
    out.write_u8(meta.medium);
    out.write_u8(meta.cache_policy);
    out.write_u8(meta.sample_bank);
    out.write_u8(meta.sample_bank_secondary);
    out.write_u8(bank.instruments.len() as u8);
    out.write_u8(bank.drums.len() as u8);
    out.write_u16(bank.effects.len() as u16);
    out.into_bytes()
}

/// Repack attached sample payloads into a fresh pool, one copy per sample
/// in emission order, and return the rewritten per-sample pool offsets.
fn build_sample_pool(
    bank: &Bank,
    emission: &Emission,
) -> Result<(Option<Vec<u8>>, Option<Vec<u32>>), BankError> {
    let Some(blob) = &bank.sample_data else {
        return Ok((None, None));
    };

    let mut pool = Writer::new();
    let mut offsets = vec![0u32; bank.samples.len()];
    for &index in &emission.samples {
        let sample = &bank.samples[index];
        let start = sample.pool_offset as usize;
        let end = start + sample.size as usize;
        if end > blob.len() {
            return Err(BankError::BadSampleRange {
                index,
                offset: sample.pool_offset,
                len: sample.size,
                size: blob.len(),
            });
        }
        offsets[index] = pool.pos() as u32;
        pool.write_bytes(&blob[start..end]);
        pool.align_section();
    }

    Ok((Some(pool.into_bytes()), Some(offsets)))
}
