//! Structured-text -> model import
//!
//! Two passes: collect every declared identifier first, then build
//! entities while resolving cross-references against the collected maps.
//! Format limits are enforced before any entity is built, so an over-limit
//! document is rejected without producing a partial bank.

use std::collections::HashMap;
use std::str::FromStr;

use crate::bank::{
    AdpcmBook, AdpcmLoop, Bank, BankMeta, Drum, Envelope, EnvelopePoint, Instrument, Sample,
    SampleCodec, SoundEffect, StorageMedium, TunedSample,
};
use crate::error::ImportError;
use crate::{MAX_DRUMS, MAX_EFFECTS, MAX_ENVELOPE_POINTS, MAX_INSTRUMENTS};

use super::TextNode;

/// Identifier -> fresh table index, per entity kind
type IdMap = HashMap<String, usize>;

/// Build a bank and its sidecar metadata from a structured-text tree
pub fn from_text(root: &TextNode) -> Result<(Bank, BankMeta), ImportError> {
    if root.name != "bank" {
        return Err(ImportError::MissingNode("bank"));
    }
    check_attrs(
        root,
        &[
            "name",
            "version",
            "medium",
            "cache_policy",
            "sample_bank",
            "sample_bank_secondary",
        ],
    )?;

    let instruments = section(root, "instruments")?;
    let drums = section(root, "drums")?;
    let effects = section(root, "effects")?;
    let envelopes = section(root, "envelopes")?;
    let samples = section(root, "samples")?;
    let loopbooks = section(root, "loopbooks")?;
    let codebooks = section(root, "codebooks")?;

    // Limits are checked before anything is built
    check_limit("instrument", instruments.children.len(), MAX_INSTRUMENTS)?;
    check_limit("drum", drums.children.len(), MAX_DRUMS)?;
    check_limit("effect", effects.children.len(), MAX_EFFECTS)?;

    // Pass one: identifiers
    let envelope_ids = collect_ids(envelopes, "envelope")?;
    let sample_ids = collect_ids(samples, "sample")?;
    let loopbook_ids = collect_ids(loopbooks, "loopbook")?;
    let codebook_ids = collect_ids(codebooks, "codebook")?;
    collect_ids(instruments, "instrument")?;
    collect_ids(drums, "drum")?;
    collect_ids(effects, "effect")?;

    // Pass two: entities
    let mut bank = Bank::default();

    for node in &envelopes.children {
        bank.envelopes.push(import_envelope(node)?);
    }
    for node in &loopbooks.children {
        bank.loopbooks.push(import_loopbook(node)?);
    }
    for node in &codebooks.children {
        bank.codebooks.push(import_codebook(node)?);
    }
    for node in &samples.children {
        bank.samples
            .push(import_sample(node, &loopbook_ids, &codebook_ids)?);
    }
    for node in &instruments.children {
        bank.instruments
            .push(import_instrument(node, &envelope_ids, &sample_ids)?);
    }
    for node in &drums.children {
        bank.drums.push(import_drum(node, &envelope_ids, &sample_ids)?);
    }
    for node in &effects.children {
        bank.effects.push(import_effect(node, &sample_ids)?);
    }

    let meta = BankMeta {
        name: root.attr("name").unwrap_or_default().to_string(),
        version: root.attr("version").map(str::to_string),
        medium: parse(root, "medium")?,
        cache_policy: parse(root, "cache_policy")?,
        sample_bank: parse(root, "sample_bank")?,
        sample_bank_secondary: parse(root, "sample_bank_secondary")?,
        num_instruments: bank.instruments.len() as u8,
        num_drums: bank.drums.len() as u8,
        num_effects: bank.effects.len() as u16,
    };

    Ok((bank, meta))
}

fn section<'a>(root: &'a TextNode, name: &'static str) -> Result<&'a TextNode, ImportError> {
    let node = root.child(name).ok_or(ImportError::MissingNode(name))?;
    check_attrs(node, &[])?;
    Ok(node)
}

/// Reject attribute names the format does not define on this node, so a
/// typo in an optional attribute errors instead of dropping the field
fn check_attrs(node: &TextNode, allowed: &[&str]) -> Result<(), ImportError> {
    for (key, _) in &node.attrs {
        if !allowed.contains(&key.as_str()) {
            return Err(ImportError::UnknownField {
                node: label(node),
                field: key.clone(),
            });
        }
    }
    Ok(())
}

fn check_limit(kind: &'static str, count: usize, max: usize) -> Result<(), ImportError> {
    if count > max {
        return Err(ImportError::LimitExceeded { kind, count, max });
    }
    Ok(())
}

/// Collect `id` attributes of a section's children, rejecting foreign node
/// names and duplicate identifiers
fn collect_ids(parent: &TextNode, child_name: &str) -> Result<IdMap, ImportError> {
    let mut ids = IdMap::with_capacity(parent.children.len());
    for (index, node) in parent.children.iter().enumerate() {
        if node.name != child_name {
            return Err(ImportError::UnexpectedNode {
                parent: parent.name.clone(),
                node: node.name.clone(),
            });
        }
        let id = require(node, "id")?;
        if ids.insert(id.to_string(), index).is_some() {
            return Err(ImportError::DuplicateIdentifier(id.to_string()));
        }
    }
    Ok(ids)
}

/// Node name plus its identifier, for error messages
fn label(node: &TextNode) -> String {
    match node.attr("id") {
        Some(id) => format!("{} {id}", node.name),
        None => node.name.clone(),
    }
}

fn require<'a>(node: &'a TextNode, field: &'static str) -> Result<&'a str, ImportError> {
    node.attr(field).ok_or_else(|| ImportError::MissingField {
        node: label(node),
        field,
    })
}

fn bad_value(node: &TextNode, field: &'static str, value: &str) -> ImportError {
    ImportError::BadValue {
        node: label(node),
        field,
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(node: &TextNode, field: &'static str) -> Result<T, ImportError> {
    let text = require(node, field)?;
    text.parse().map_err(|_| bad_value(node, field, text))
}

fn parse_opt<T: FromStr>(node: &TextNode, field: &'static str) -> Result<Option<T>, ImportError> {
    match node.attr(field) {
        None => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| bad_value(node, field, text)),
    }
}

/// Parse a comma-separated i16 list attribute of an exact length
fn parse_list(
    node: &TextNode,
    field: &'static str,
    expected: usize,
) -> Result<Vec<i16>, ImportError> {
    let text = require(node, field)?;
    let values: Result<Vec<i16>, _> = text.split(',').map(|v| v.trim().parse()).collect();
    let values = values.map_err(|_| bad_value(node, field, text))?;
    if values.len() != expected {
        return Err(bad_value(node, field, text));
    }
    Ok(values)
}

fn resolve(node: &TextNode, field: &'static str, ids: &IdMap) -> Result<usize, ImportError> {
    let id = require(node, field)?;
    ids.get(id)
        .copied()
        .ok_or_else(|| ImportError::UnresolvedIdentifier(id.to_string()))
}

fn resolve_opt(
    node: &TextNode,
    field: &'static str,
    ids: &IdMap,
) -> Result<Option<usize>, ImportError> {
    match node.attr(field) {
        None => Ok(None),
        Some(id) => ids
            .get(id)
            .copied()
            .map(Some)
            .ok_or_else(|| ImportError::UnresolvedIdentifier(id.to_string())),
    }
}

fn is_unused(node: &TextNode) -> bool {
    node.attr("unused") == Some("true")
}

fn import_envelope(node: &TextNode) -> Result<Envelope, ImportError> {
    check_attrs(node, &["id"])?;
    let mut points = Vec::with_capacity(node.children.len());
    for point in &node.children {
        if point.name != "point" {
            return Err(ImportError::UnexpectedNode {
                parent: node.name.clone(),
                node: point.name.clone(),
            });
        }
        check_attrs(point, &["delay", "arg"])?;
        points.push(EnvelopePoint {
            delay: parse(point, "delay")?,
            arg: parse(point, "arg")?,
        });
    }

    check_limit("envelope point", points.len(), MAX_ENVELOPE_POINTS)?;
    let envelope = Envelope { points };
    if !envelope.is_terminated() {
        return Err(bad_value(node, "points", "missing terminator point"));
    }
    // Only the final point may carry a terminator opcode
    if envelope.points[..envelope.points.len() - 1]
        .iter()
        .any(|p| p.delay <= 0)
    {
        return Err(bad_value(node, "points", "terminator before final point"));
    }
    Ok(envelope)
}

fn import_loopbook(node: &TextNode) -> Result<AdpcmLoop, ImportError> {
    check_attrs(node, &["id", "start", "end", "count", "state"])?;
    let count: u32 = parse(node, "count")?;
    let state = if count != 0 {
        let values = parse_list(node, "state", 16)?;
        let mut state = [0i16; 16];
        state.copy_from_slice(&values);
        Some(state)
    } else {
        if node.attr("state").is_some() {
            return Err(bad_value(node, "state", "state requires a nonzero count"));
        }
        None
    };

    Ok(AdpcmLoop {
        start: parse(node, "start")?,
        end: parse(node, "end")?,
        count,
        state,
    })
}

fn import_codebook(node: &TextNode) -> Result<AdpcmBook, ImportError> {
    check_attrs(node, &["id", "order", "predictors", "coefficients"])?;
    let order: u32 = parse(node, "order")?;
    let predictors: u32 = parse(node, "predictors")?;
    if !(1..=8).contains(&order) {
        return Err(bad_value(node, "order", require(node, "order")?));
    }
    if !(1..=8).contains(&predictors) {
        return Err(bad_value(node, "predictors", require(node, "predictors")?));
    }

    let coefficients = parse_list(
        node,
        "coefficients",
        8 * order as usize * predictors as usize,
    )?;

    Ok(AdpcmBook {
        order,
        predictors,
        coefficients,
    })
}

fn import_sample(
    node: &TextNode,
    loopbook_ids: &IdMap,
    codebook_ids: &IdMap,
) -> Result<Sample, ImportError> {
    check_attrs(
        node,
        &[
            "id",
            "codec",
            "medium",
            "cached",
            "relocated",
            "unk",
            "size",
            "pool_offset",
            "loopbook",
            "codebook",
        ],
    )?;
    let codec_name = require(node, "codec")?;
    let codec =
        SampleCodec::from_name(codec_name).ok_or_else(|| bad_value(node, "codec", codec_name))?;
    let medium_name = require(node, "medium")?;
    let medium = StorageMedium::from_name(medium_name)
        .ok_or_else(|| bad_value(node, "medium", medium_name))?;

    let size: u32 = parse(node, "size")?;
    if size > 0x00FF_FFFF {
        return Err(bad_value(node, "size", require(node, "size")?));
    }

    Ok(Sample {
        unk_flag: parse(node, "unk")?,
        codec,
        medium,
        cached: parse(node, "cached")?,
        relocated: parse(node, "relocated")?,
        size,
        pool_offset: parse(node, "pool_offset")?,
        loopbook: resolve(node, "loopbook", loopbook_ids)?,
        codebook: resolve(node, "codebook", codebook_ids)?,
    })
}

fn import_region(
    node: &TextNode,
    sample_ids: &IdMap,
) -> Result<TunedSample, ImportError> {
    Ok(TunedSample {
        sample: resolve(node, "sample", sample_ids)?,
        tuning: parse(node, "tuning")?,
    })
}

fn import_instrument(
    node: &TextNode,
    envelope_ids: &IdMap,
    sample_ids: &IdMap,
) -> Result<Option<Instrument>, ImportError> {
    check_attrs(
        node,
        &["id", "unused", "key_lo", "key_hi", "release", "envelope"],
    )?;
    if is_unused(node) {
        return Ok(None);
    }

    let mut low = None;
    let mut normal = None;
    let mut high = None;
    for region in &node.children {
        if region.name != "region" {
            return Err(ImportError::UnexpectedNode {
                parent: node.name.clone(),
                node: region.name.clone(),
            });
        }
        check_attrs(region, &["zone", "sample", "tuning"])?;
        let zone = require(region, "zone")?;
        let target = match zone {
            "low" => &mut low,
            "normal" => &mut normal,
            "high" => &mut high,
            _ => return Err(bad_value(region, "zone", zone)),
        };
        if target.is_some() {
            return Err(bad_value(region, "zone", zone));
        }
        *target = Some(import_region(region, sample_ids)?);
    }

    Ok(Some(Instrument {
        key_lo: parse(node, "key_lo")?,
        key_hi: parse(node, "key_hi")?,
        release_rate: parse(node, "release")?,
        envelope: resolve_opt(node, "envelope", envelope_ids)?,
        low,
        normal,
        high,
    }))
}

fn import_drum(
    node: &TextNode,
    envelope_ids: &IdMap,
    sample_ids: &IdMap,
) -> Result<Option<Drum>, ImportError> {
    check_attrs(
        node,
        &["id", "unused", "release", "pan", "sample", "tuning", "envelope"],
    )?;
    if is_unused(node) {
        return Ok(None);
    }

    let sample = match node.attr("sample") {
        Some(_) => Some(import_region(node, sample_ids)?),
        None => None,
    };

    Ok(Some(Drum {
        release_rate: parse(node, "release")?,
        pan: parse(node, "pan")?,
        sample,
        envelope: resolve_opt(node, "envelope", envelope_ids)?,
    }))
}

fn import_effect(
    node: &TextNode,
    sample_ids: &IdMap,
) -> Result<Option<SoundEffect>, ImportError> {
    check_attrs(node, &["id", "unused", "sample", "tuning"])?;
    if is_unused(node) {
        return Ok(None);
    }
    Ok(Some(SoundEffect {
        sample: import_region(node, sample_ids)?,
    }))
}
