//! Model -> structured-text export
//!
//! Field-for-field: every model field appears in the tree, nothing derived
//! is invented. Unused slots become explicit `unused="true"` nodes so slot
//! positions survive the round trip.

use crate::bank::{Bank, BankMeta, TunedSample};

use super::{ident, TextNode};

/// Map a bank and its sidecar metadata onto the structured-text tree
pub fn to_text(bank: &Bank, meta: &BankMeta) -> TextNode {
    let mut root = TextNode::new("bank").with("name", &meta.name);
    if let Some(version) = &meta.version {
        root.set("version", version);
    }
    root.set("medium", meta.medium);
    root.set("cache_policy", meta.cache_policy);
    root.set("sample_bank", meta.sample_bank);
    root.set("sample_bank_secondary", meta.sample_bank_secondary);

    let mut instruments = TextNode::new("instruments");
    for (slot, instrument) in bank.instruments.iter().enumerate() {
        let mut node = TextNode::new("instrument").with("id", ident("instrument", slot));
        match instrument {
            None => node.set("unused", true),
            Some(instrument) => {
                node.set("key_lo", instrument.key_lo);
                node.set("key_hi", instrument.key_hi);
                node.set("release", instrument.release_rate);
                if let Some(envelope) = instrument.envelope {
                    node.set("envelope", ident("envelope", envelope));
                }
                for (zone, region) in [
                    ("low", &instrument.low),
                    ("normal", &instrument.normal),
                    ("high", &instrument.high),
                ] {
                    if let Some(tuned) = region {
                        node.push(region_node(zone, tuned));
                    }
                }
            }
        }
        instruments.push(node);
    }
    root.push(instruments);

    let mut drums = TextNode::new("drums");
    for (slot, drum) in bank.drums.iter().enumerate() {
        let mut node = TextNode::new("drum").with("id", ident("drum", slot));
        match drum {
            None => node.set("unused", true),
            Some(drum) => {
                node.set("release", drum.release_rate);
                node.set("pan", drum.pan);
                if let Some(tuned) = &drum.sample {
                    node.set("sample", ident("sample", tuned.sample));
                    node.set("tuning", tuned.tuning);
                }
                if let Some(envelope) = drum.envelope {
                    node.set("envelope", ident("envelope", envelope));
                }
            }
        }
        drums.push(node);
    }
    root.push(drums);

    let mut effects = TextNode::new("effects");
    for (slot, effect) in bank.effects.iter().enumerate() {
        let mut node = TextNode::new("effect").with("id", ident("effect", slot));
        match effect {
            None => node.set("unused", true),
            Some(effect) => {
                node.set("sample", ident("sample", effect.sample.sample));
                node.set("tuning", effect.sample.tuning);
            }
        }
        effects.push(node);
    }
    root.push(effects);

    let mut envelopes = TextNode::new("envelopes");
    for (index, envelope) in bank.envelopes.iter().enumerate() {
        let mut node = TextNode::new("envelope").with("id", ident("envelope", index));
        for point in &envelope.points {
            node.push(
                TextNode::new("point")
                    .with("delay", point.delay)
                    .with("arg", point.arg),
            );
        }
        envelopes.push(node);
    }
    root.push(envelopes);

    let mut samples = TextNode::new("samples");
    for (index, sample) in bank.samples.iter().enumerate() {
        samples.push(
            TextNode::new("sample")
                .with("id", ident("sample", index))
                .with("codec", sample.codec.as_str())
                .with("medium", sample.medium.as_str())
                .with("cached", sample.cached)
                .with("relocated", sample.relocated)
                .with("unk", sample.unk_flag)
                .with("size", sample.size)
                .with("pool_offset", sample.pool_offset)
                .with("loopbook", ident("loopbook", sample.loopbook))
                .with("codebook", ident("codebook", sample.codebook)),
        );
    }
    root.push(samples);

    let mut loopbooks = TextNode::new("loopbooks");
    for (index, loopbook) in bank.loopbooks.iter().enumerate() {
        let mut node = TextNode::new("loopbook")
            .with("id", ident("loopbook", index))
            .with("start", loopbook.start)
            .with("end", loopbook.end)
            .with("count", loopbook.count);
        if let Some(state) = &loopbook.state {
            node.set("state", join(state.iter()));
        }
        loopbooks.push(node);
    }
    root.push(loopbooks);

    let mut codebooks = TextNode::new("codebooks");
    for (index, codebook) in bank.codebooks.iter().enumerate() {
        codebooks.push(
            TextNode::new("codebook")
                .with("id", ident("codebook", index))
                .with("order", codebook.order)
                .with("predictors", codebook.predictors)
                .with("coefficients", join(codebook.coefficients.iter())),
        );
    }
    root.push(codebooks);

    root
}

fn region_node(zone: &str, tuned: &TunedSample) -> TextNode {
    TextNode::new("region")
        .with("zone", zone)
        .with("sample", ident("sample", tuned.sample))
        .with("tuning", tuned.tuning)
}

fn join<'a>(values: impl Iterator<Item = &'a i16>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
