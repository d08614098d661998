use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use scopecapture::acquisition::{AcquisitionSource, WavFileSource, spawn_ingestion};
use scopecapture::config::{CaptureMode, StoreConfig};
use scopecapture::snapshot::{EnvelopeSample, EnvelopeStore, SessionSetup, Snapshot};

/// Mid-scale code of the unsigned 8-bit sample range
const ZERO_OFFSET: f64 = 128.0;

#[derive(Parser, Debug)]
#[command(name = "scopecapture")]
#[command(about = "Replay a WAV file through the scope capture store and summarise it", long_about = None)]
struct Args {
    /// WAV file to replay
    file: PathBuf,

    /// TOML store configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Samples per channel in each ingested block
    #[arg(long, default_value_t = 4096)]
    chunk: usize,

    /// Write semantics: instant, block
    #[arg(short, long, value_enum, default_value = "instant")]
    mode: CaptureMode,

    /// Minimum raw samples per envelope entry when summarising
    #[arg(long, default_value_t = 65536.0)]
    min_length: f64,

    /// Skip envelope generation
    #[arg(long)]
    no_envelope: bool,

    /// Output format: text, json
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct ChannelSummary {
    channel: usize,
    mean: f64,
    rms: f64,
    min: Option<u8>,
    max: Option<u8>,
    envelope_entries: usize,
    envelope_scale: u64,
}

#[derive(Debug, Serialize)]
struct CaptureSummary {
    file: String,
    sample_rate: u32,
    samples: u64,
    blocks_ingested: usize,
    export_blocks: usize,
    channels: Vec<ChannelSummary>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = match args.config {
        Some(ref path) => StoreConfig::load(path).context("Failed to load store config")?,
        None => StoreConfig::default(),
    };

    let source = WavFileSource::new(&args.file, args.chunk)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let sample_rate = source.sample_rate();
    let total = source.total_samples().unwrap_or(0);
    if total == 0 {
        anyhow::bail!("{} contains no samples", args.file.display());
    }
    let setup = SessionSetup::new(total, source.channel_count(), args.mode);

    let store = Arc::new(EnvelopeStore::new(config)?);
    store.enable_envelope(!args.no_envelope);

    let report = spawn_ingestion(source, Arc::clone(&store), setup)?.join()?;

    let summary = summarize(&args, &store, sample_rate, report.blocks)?;
    match args.format {
        OutputFormat::Text => print_text(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

fn summarize(
    args: &Args,
    store: &EnvelopeStore,
    sample_rate: u32,
    blocks_ingested: usize,
) -> anyhow::Result<CaptureSummary> {
    let samples = store.sample_count();
    let mut channels = Vec::new();

    for channel in store.enabled_channels() {
        let (entries, scale, bounds) = if samples == 0 {
            (0, 0, None)
        } else {
            store.get_envelope_section(0, samples - 1, args.min_length, channel, |section| {
                let bounds = section
                    .samples
                    .iter()
                    .copied()
                    .reduce(EnvelopeSample::merge);
                (section.len(), section.scale, bounds)
            })?
        };

        channels.push(ChannelSummary {
            channel,
            mean: store.cal_vmean(channel)?,
            rms: store.cal_vrms(ZERO_OFFSET, channel)?,
            min: bounds.map(|b| b.min),
            max: bounds.map(|b| b.max),
            envelope_entries: entries,
            envelope_scale: scale,
        });
    }

    Ok(CaptureSummary {
        file: args.file.display().to_string(),
        sample_rate,
        samples,
        blocks_ingested,
        export_blocks: store.get_block_num(),
        channels,
    })
}

fn print_text(summary: &CaptureSummary) {
    println!("=== {} ===", summary.file);
    println!(
        "Samples: {} @ {} Hz ({} blocks ingested, {} export blocks)",
        summary.samples, summary.sample_rate, summary.blocks_ingested, summary.export_blocks
    );
    for ch in &summary.channels {
        let range = match (ch.min, ch.max) {
            (Some(min), Some(max)) => format!("{:>3}..{:<3}", min, max),
            _ => "  n/a   ".to_string(),
        };
        println!(
            "  ch{}: mean {:>7.2}  rms {:>7.2}  range {}  envelope {} x {}",
            ch.channel, ch.mean, ch.rms, range, ch.envelope_entries, ch.envelope_scale
        );
    }
}
