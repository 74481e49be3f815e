use crate::bank::{
    AdpcmBook, AdpcmLoop, Bank, BankMeta, Drum, Envelope, EnvelopePoint, Instrument, Sample,
    SampleCodec, SoundEffect, StorageMedium, TunedSample,
};
use crate::error::ImportError;
use crate::{ADSR_HANG, SAMPLE_BANK_NONE};

use super::{from_text, to_text, TextNode};

/// A small but fully-featured bank: two instruments (one sentinel), one
/// drum, one effect, shared sample, loopbook with state
fn fixture() -> (Bank, BankMeta) {
    let mut bank = Bank::default();

    bank.envelopes.push(Envelope {
        points: vec![
            EnvelopePoint { delay: 2, arg: 32700 },
            EnvelopePoint { delay: 298, arg: 29430 },
            EnvelopePoint { delay: ADSR_HANG, arg: 0 },
        ],
    });
    bank.codebooks.push(AdpcmBook {
        order: 2,
        predictors: 2,
        coefficients: (0..32).map(|c| c * 3 - 40).collect(),
    });
    bank.loopbooks.push(AdpcmLoop {
        start: 0,
        end: 1480,
        count: 0xFFFF_FFFF,
        state: Some([7i16; 16]),
    });
    bank.loopbooks.push(AdpcmLoop {
        start: 0,
        end: 500,
        count: 0,
        state: None,
    });
    bank.samples.push(Sample {
        unk_flag: false,
        codec: SampleCodec::Adpcm,
        medium: StorageMedium::Ram,
        cached: true,
        relocated: false,
        size: 0x360,
        pool_offset: 0x1000,
        loopbook: 0,
        codebook: 0,
    });
    bank.samples.push(Sample {
        unk_flag: false,
        codec: SampleCodec::SmallAdpcm,
        medium: StorageMedium::Ram,
        cached: false,
        relocated: false,
        size: 0xFA,
        pool_offset: 0x2000,
        loopbook: 1,
        codebook: 0,
    });

    bank.instruments.push(None);
    bank.instruments.push(Some(Instrument {
        key_lo: 0,
        key_hi: 0x7F,
        release_rate: 208,
        envelope: Some(0),
        low: None,
        normal: Some(TunedSample {
            sample: 0,
            tuning: 1.0,
        }),
        high: Some(TunedSample {
            sample: 1,
            tuning: 1.5,
        }),
    }));
    bank.drums.push(Some(Drum {
        release_rate: 238,
        pan: 64,
        sample: Some(TunedSample {
            sample: 0,
            tuning: 0.7,
        }),
        envelope: Some(0),
    }));
    bank.effects.push(None);
    bank.effects.push(Some(SoundEffect {
        sample: TunedSample {
            sample: 1,
            tuning: 2.0,
        },
    }));

    let meta = BankMeta {
        name: "fanfare".to_string(),
        version: Some("1".to_string()),
        medium: 2,
        cache_policy: 2,
        sample_bank: 1,
        sample_bank_secondary: SAMPLE_BANK_NONE,
        num_instruments: 2,
        num_drums: 1,
        num_effects: 2,
    };
    (bank, meta)
}

#[test]
fn test_text_round_trip() {
    let (bank, meta) = fixture();
    let tree = to_text(&bank, &meta);
    let (bank2, meta2) = from_text(&tree).unwrap();
    assert_eq!(bank, bank2);
    assert_eq!(meta, meta2);
}

#[test]
fn test_export_shape() {
    let (bank, meta) = fixture();
    let tree = to_text(&bank, &meta);

    assert_eq!(tree.name, "bank");
    assert_eq!(tree.attr("name"), Some("fanfare"));
    assert_eq!(tree.attr("sample_bank_secondary"), Some("255"));

    let instruments = tree.child("instruments").unwrap();
    assert_eq!(instruments.children.len(), 2);
    assert_eq!(instruments.children[0].attr("unused"), Some("true"));
    let inst = &instruments.children[1];
    assert_eq!(inst.attr("envelope"), Some("envelope_00"));
    // The missing low region leaves two region children
    assert_eq!(inst.children_named("region").count(), 2);
    assert_eq!(inst.children[0].attr("zone"), Some("normal"));

    let samples = tree.child("samples").unwrap();
    assert_eq!(samples.children[1].attr("codec"), Some("small-adpcm"));
    assert_eq!(samples.children[1].attr("loopbook"), Some("loopbook_01"));

    // A zero loop count exports no state list
    let loopbooks = tree.child("loopbooks").unwrap();
    assert!(loopbooks.children[0].attr("state").is_some());
    assert!(loopbooks.children[1].attr("state").is_none());
}

#[test]
fn test_import_rejects_missing_section() {
    let (bank, meta) = fixture();
    let mut tree = to_text(&bank, &meta);
    tree.children.retain(|c| c.name != "codebooks");

    assert_eq!(
        from_text(&tree),
        Err(ImportError::MissingNode("codebooks"))
    );
}

#[test]
fn test_import_rejects_duplicate_identifier() {
    let (bank, meta) = fixture();
    let mut tree = to_text(&bank, &meta);
    let samples = tree
        .children
        .iter_mut()
        .find(|c| c.name == "samples")
        .unwrap();
    samples.children[1].attrs[0].1 = "sample_00".to_string();

    assert_eq!(
        from_text(&tree),
        Err(ImportError::DuplicateIdentifier("sample_00".to_string()))
    );
}

#[test]
fn test_import_rejects_unresolved_identifier() {
    let (bank, meta) = fixture();
    let mut tree = to_text(&bank, &meta);
    let drums = tree
        .children
        .iter_mut()
        .find(|c| c.name == "drums")
        .unwrap();
    for (key, value) in &mut drums.children[0].attrs {
        if key == "envelope" {
            *value = "envelope_99".to_string();
        }
    }

    assert_eq!(
        from_text(&tree),
        Err(ImportError::UnresolvedIdentifier("envelope_99".to_string()))
    );
}

#[test]
fn test_import_rejects_misspelled_attribute() {
    let (bank, meta) = fixture();
    let mut tree = to_text(&bank, &meta);
    let drums = tree
        .children
        .iter_mut()
        .find(|c| c.name == "drums")
        .unwrap();
    // A typo in an optional attribute must error, not drop the reference
    for (key, _) in &mut drums.children[0].attrs {
        if key == "envelope" {
            *key = "envelop".to_string();
        }
    }

    assert_eq!(
        from_text(&tree),
        Err(ImportError::UnknownField {
            node: "drum drum_00".to_string(),
            field: "envelop".to_string(),
        })
    );
}

#[test]
fn test_import_rejects_unexpected_node() {
    let (bank, meta) = fixture();
    let mut tree = to_text(&bank, &meta);
    let envelopes = tree
        .children
        .iter_mut()
        .find(|c| c.name == "envelopes")
        .unwrap();
    envelopes.children[0].push(TextNode::new("mystery"));

    assert_eq!(
        from_text(&tree),
        Err(ImportError::UnexpectedNode {
            parent: "envelope".to_string(),
            node: "mystery".to_string(),
        })
    );
}

#[test]
fn test_import_rejects_too_many_instruments() {
    let (bank, meta) = fixture();
    let mut tree = to_text(&bank, &meta);
    let instruments = tree
        .children
        .iter_mut()
        .find(|c| c.name == "instruments")
        .unwrap();
    for slot in 2..200 {
        instruments.push(
            TextNode::new("instrument")
                .with("id", super::ident("instrument", slot))
                .with("unused", true),
        );
    }

    assert_eq!(
        from_text(&tree),
        Err(ImportError::LimitExceeded {
            kind: "instrument",
            count: 200,
            max: crate::MAX_INSTRUMENTS,
        })
    );
}

#[test]
fn test_import_rejects_unterminated_envelope() {
    let (bank, meta) = fixture();
    let mut tree = to_text(&bank, &meta);
    let envelopes = tree
        .children
        .iter_mut()
        .find(|c| c.name == "envelopes")
        .unwrap();
    envelopes.children[0].children.pop();

    assert!(matches!(
        from_text(&tree),
        Err(ImportError::BadValue { field: "points", .. })
    ));
}

#[test]
fn test_import_rejects_bad_codebook_shape() {
    let (bank, meta) = fixture();
    let mut tree = to_text(&bank, &meta);
    let codebooks = tree
        .children
        .iter_mut()
        .find(|c| c.name == "codebooks")
        .unwrap();
    for (key, value) in &mut codebooks.children[0].attrs {
        if key == "order" {
            *value = "9".to_string();
        }
    }

    assert!(matches!(
        from_text(&tree),
        Err(ImportError::BadValue { field: "order", .. })
    ));
}

#[test]
fn test_import_rejects_state_without_count() {
    let (bank, meta) = fixture();
    let mut tree = to_text(&bank, &meta);
    let loopbooks = tree
        .children
        .iter_mut()
        .find(|c| c.name == "loopbooks")
        .unwrap();
    // loopbook_01 has count 0; a state list on it is contradictory
    loopbooks.children[1].set("state", "0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0");

    assert!(matches!(
        from_text(&tree),
        Err(ImportError::BadValue { field: "state", .. })
    ));
}
