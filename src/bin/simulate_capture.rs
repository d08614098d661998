use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{TryRecvError, bounded};
use rolling_stats::Stats;

use scopecapture::acquisition::AcquisitionSource;
use scopecapture::config::{CaptureMode, StoreConfig};
use scopecapture::simulation::{SimulatedSource, SimulationConfig, Waveform};
use scopecapture::snapshot::{EnvelopeStore, SessionSetup, Snapshot};

#[derive(Parser, Debug)]
#[command(name = "simulate_capture")]
#[command(about = "Stream a synthetic scope capture while a reader queries envelopes")]
struct Args {
    /// Samples per channel in the whole capture
    #[arg(short, long, default_value_t = 4_000_000)]
    total: u64,

    /// Samples per channel in each block
    #[arg(long, default_value_t = 8192)]
    chunk: usize,

    /// Number of channels
    #[arg(long, default_value_t = 2)]
    channels: usize,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 1_000_000)]
    sample_rate: u32,

    /// Tone frequency of channel 0 in Hz
    #[arg(long, default_value_t = 1000.0)]
    freq: f32,

    /// Gaussian noise standard deviation (normalised units)
    #[arg(long, default_value_t = 0.02)]
    noise: f32,

    /// Seed for reproducible noise
    #[arg(short, long)]
    seed: Option<u64>,

    /// Write semantics: instant, block
    #[arg(short, long, value_enum, default_value = "instant")]
    mode: CaptureMode,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if args.channels == 0 {
        anyhow::bail!("At least one channel is required");
    }

    let waveforms = (0..args.channels)
        .map(|ch| match ch % 3 {
            0 => Waveform::Sine {
                freq_hz: args.freq,
                amplitude: 0.8,
            },
            1 => Waveform::Square {
                freq_hz: args.freq / 4.0,
                amplitude: 0.5,
            },
            _ => Waveform::Dc { level: 0.25 },
        })
        .collect();
    let mut sim = SimulationConfig::new(args.sample_rate, waveforms).with_noise(args.noise);
    if let Some(seed) = args.seed {
        sim = sim.with_seed(seed);
    }

    let mut source = SimulatedSource::new(sim, args.total, args.chunk);
    let setup = SessionSetup::new(args.total, args.channels, args.mode);
    let store = Arc::new(EnvelopeStore::new(StoreConfig::default())?);
    store.enable_envelope(true);

    let (done_tx, done_rx) = bounded::<()>(1);
    let reader_store = Arc::clone(&store);
    let reader = thread::Builder::new()
        .name("reader".into())
        .spawn(move || {
            let mut queries = 0usize;
            loop {
                match done_rx.try_recv() {
                    Err(TryRecvError::Empty) => {}
                    _ => break,
                }
                let samples = reader_store.sample_count();
                if samples == 0 {
                    thread::yield_now();
                    continue;
                }
                let visible = reader_store
                    .get_envelope_section(0, samples - 1, 65536.0, 0, |section| section.len())
                    .unwrap_or(0);
                log::trace!("{} samples visible as {} envelope entries", samples, visible);
                queries += 1;
            }
            queries
        })
        .context("Failed to spawn reader thread")?;

    let mut append_us: Stats<f32> = Stats::new();
    let mut first = true;
    let started = Instant::now();
    while let Some(block) = source.next_block()? {
        let t0 = Instant::now();
        if first {
            store.first_payload(&block, &setup)?;
            if store.memory_failed() {
                anyhow::bail!("Could not allocate a {}-sample capture", args.total);
            }
            first = false;
        } else {
            store.append_payload(&block)?;
        }
        append_us.update(t0.elapsed().as_secs_f32() * 1e6);
    }
    store.capture_ended();
    let elapsed = started.elapsed();

    let _ = done_tx.send(());
    let queries = reader
        .join()
        .map_err(|_| anyhow::anyhow!("Reader thread panicked"))?;

    println!("=== Simulated capture ===");
    println!(
        "Samples: {} x {} channels in {:.1} ms",
        store.sample_count(),
        store.channel_count(),
        elapsed.as_secs_f64() * 1e3
    );
    println!(
        "Append latency: mean {:.1} us, std {:.1} us, min {:.1} us, max {:.1} us ({} blocks)",
        append_us.mean, append_us.std_dev, append_us.min, append_us.max, append_us.count
    );
    println!("Concurrent envelope queries: {}", queries);
    for ch in store.enabled_channels() {
        println!(
            "  ch{}: mean {:>7.2}  rms {:>7.2}",
            ch,
            store.cal_vmean(ch)?,
            store.cal_vrms(128.0, ch)?
        );
    }
    Ok(())
}
