//! zbank - Zelda64 instrument bank converter
//!
//! Converts instrument banks (.zbank + .bankmeta sidecar) to editable XML
//! and back

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

mod xml;

#[derive(Parser)]
#[command(name = "zbank")]
#[command(about = "Zelda64 instrument bank converter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a binary bank to XML
    Export {
        /// Input .zbank file
        bank: PathBuf,

        /// Bankmeta sidecar (default: the bank path with a .bankmeta extension)
        #[arg(short, long)]
        meta: Option<PathBuf>,

        /// Output .xml file (default: the bank path with an .xml extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a binary bank from XML
    Build {
        /// Input .xml file
        input: PathBuf,

        /// Output .zbank file (default: the input path with a .zbank extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a bank or an XML document without writing anything
    Check {
        /// Input .zbank or .xml file
        input: PathBuf,

        /// Bankmeta sidecar, for binary input
        #[arg(short, long)]
        meta: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export { bank, meta, output } => {
            let meta = meta.unwrap_or_else(|| bank.with_extension("bankmeta"));
            let output = output.unwrap_or_else(|| bank.with_extension("xml"));
            tracing::info!("Exporting {:?} -> {:?}", bank, output);

            let decoded = decode_files(&bank, &meta)?;
            report(&decoded.warnings);

            let mut bank_meta = decoded.meta;
            if bank_meta.name.is_empty() {
                bank_meta.name = stem(&bank);
            }

            let tree = zbank::to_text(&decoded.bank, &bank_meta);
            let rendered = xml::render(&tree)?;
            fs::write(&output, rendered)
                .with_context(|| format!("writing {}", output.display()))?;
            tracing::info!("Done!");
        }

        Commands::Build { input, output } => {
            let output = output.unwrap_or_else(|| input.with_extension("zbank"));
            let meta_out = output.with_extension("bankmeta");
            tracing::info!("Building {:?} -> {:?}", input, output);

            let tree = parse_file(&input)?;
            let (bank, meta) = zbank::from_text(&tree)?;
            let encoded = zbank::encode(&bank, &meta)?;
            report(&encoded.warnings);

            fs::write(&output, &encoded.bank)
                .with_context(|| format!("writing {}", output.display()))?;
            fs::write(&meta_out, &encoded.meta)
                .with_context(|| format!("writing {}", meta_out.display()))?;
            tracing::info!("Done!");
        }

        Commands::Check { input, meta } => {
            let ext = input
                .extension()
                .and_then(|e| e.to_str())
                .map(|s| s.to_lowercase())
                .unwrap_or_default();

            let (bank, warnings) = match ext.as_str() {
                "xml" => {
                    let tree = parse_file(&input)?;
                    let (bank, meta) = zbank::from_text(&tree)?;
                    // A full encode catches anything import alone cannot
                    let encoded = zbank::encode(&bank, &meta)?;
                    (bank, encoded.warnings)
                }
                "zbank" => {
                    let meta = meta.unwrap_or_else(|| input.with_extension("bankmeta"));
                    let decoded = decode_files(&input, &meta)?;
                    (decoded.bank, decoded.warnings)
                }
                _ => bail!("Unsupported input: {:?} (use .zbank or .xml)", input),
            };

            report(&warnings);
            tracing::info!(
                "{:?} is valid: {} instruments, {} drums, {} effects, {} samples",
                input,
                bank.num_instruments(),
                bank.num_drums(),
                bank.num_effects(),
                bank.samples.len()
            );
        }
    }

    Ok(())
}

fn decode_files(bank: &Path, meta: &Path) -> Result<zbank::Decoded> {
    let bank_bytes =
        fs::read(bank).with_context(|| format!("reading {}", bank.display()))?;
    let meta_bytes =
        fs::read(meta).with_context(|| format!("reading {}", meta.display()))?;
    zbank::decode(&bank_bytes, &meta_bytes)
        .with_context(|| format!("decoding {}", bank.display()))
}

fn parse_file(input: &Path) -> Result<zbank::TextNode> {
    let text =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    xml::parse(&text).with_context(|| format!("parsing {}", input.display()))
}

fn report(warnings: &[zbank::Warning]) {
    for warning in warnings {
        tracing::warn!("{warning}");
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bank")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_export_build_round_trip() {
        // A one-instrument bank straight through both converters
        let mut bank = zbank::Bank::default();
        bank.envelopes.push(zbank::Envelope {
            points: vec![
                zbank::EnvelopePoint {
                    delay: 2,
                    arg: 32700,
                },
                zbank::EnvelopePoint {
                    delay: zbank::ADSR_HANG,
                    arg: 0,
                },
            ],
        });
        bank.codebooks.push(zbank::AdpcmBook {
            order: 1,
            predictors: 1,
            coefficients: vec![0; 8],
        });
        bank.loopbooks.push(zbank::AdpcmLoop {
            start: 0,
            end: 16,
            count: 0,
            state: None,
        });
        bank.samples.push(zbank::Sample {
            unk_flag: false,
            codec: zbank::SampleCodec::Adpcm,
            medium: zbank::StorageMedium::Ram,
            cached: true,
            relocated: false,
            size: 0x90,
            pool_offset: 0,
            loopbook: 0,
            codebook: 0,
        });
        bank.instruments.push(Some(zbank::Instrument {
            key_lo: 0,
            key_hi: 0x7F,
            release_rate: 208,
            envelope: Some(0),
            low: None,
            normal: Some(zbank::TunedSample {
                sample: 0,
                tuning: 1.0,
            }),
            high: None,
        }));
        let meta = zbank::BankMeta {
            name: "roundtrip".to_string(),
            medium: 2,
            cache_policy: 2,
            sample_bank: 1,
            sample_bank_secondary: zbank::SAMPLE_BANK_NONE,
            num_instruments: 1,
            ..Default::default()
        };

        let dir = tempfile::tempdir().unwrap();
        let xml_path = dir.path().join("roundtrip.xml");
        let rendered = xml::render(&zbank::to_text(&bank, &meta)).unwrap();
        fs::write(&xml_path, &rendered).unwrap();

        let tree = parse_file(&xml_path).unwrap();
        let (bank2, meta2) = zbank::from_text(&tree).unwrap();
        assert_eq!(bank, bank2);
        assert_eq!(meta, meta2);

        let encoded = zbank::encode(&bank2, &meta2).unwrap();
        let decoded = zbank::decode(&encoded.bank, &encoded.meta).unwrap();
        assert_eq!(decoded.bank, bank);
    }
}
