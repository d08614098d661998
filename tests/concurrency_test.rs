mod test_signals;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use approx::assert_relative_eq;
use scopecapture::acquisition::spawn_ingestion;
use scopecapture::config::{CaptureMode, StoreConfig};
use scopecapture::simulation::{SimulatedSource, SimulationConfig, Waveform};
use scopecapture::snapshot::{EnvelopeStore, SessionSetup, Snapshot};
use test_signals::{naive_level0, scrambled, split_blocks};

#[test]
fn test_readers_never_see_partial_envelopes() {
    let total = 200_000usize;
    let data = scrambled(total, 2, 21);
    let blocks = split_blocks(&data, 2, &vec![1000; total / 1000]);

    let store = Arc::new(EnvelopeStore::new(StoreConfig::default()).unwrap());
    store.enable_envelope(true);
    let setup = SessionSetup::new(total as u64, 2, CaptureMode::Instant);

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3)
        .map(|channel| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let channel = channel % 2;
                let mut checks = 0usize;
                while !done.load(Ordering::Acquire) {
                    let samples = store.sample_count();
                    let Ok(consistent) =
                        store.get_envelope_section(0, samples, 256.0, channel, |s| {
                            s.samples.iter().all(|e| e.min <= e.max)
                                && s.len() as u64 <= store_entries_bound(samples)
                        })
                    else {
                        continue;
                    };
                    assert!(consistent);
                    if samples > 0 {
                        let mean = store.cal_vmean(channel).unwrap();
                        assert!((0.0..=255.0).contains(&mean));
                    }
                    checks += 1;
                }
                checks
            })
        })
        .collect();

    let (first, rest) = blocks.split_first().unwrap();
    store.first_payload(first, &setup).unwrap();
    for block in rest {
        store.append_payload(block).unwrap();
    }
    store.capture_ended();
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(store.sample_count(), total as u64);
    for channel in 0..2 {
        let entries = store
            .get_envelope_section(0, total as u64 - 1, 256.0, channel, |s| s.samples.to_vec())
            .unwrap();
        assert_eq!(entries, naive_level0(&data, 2, channel, 256));
    }
}

/// Level-0 entries can only lag the sample count, never lead it
fn store_entries_bound(samples_seen: u64) -> u64 {
    samples_seen / 256 + 1
}

#[test]
fn test_simulated_ingestion_end_to_end() {
    let sim = SimulationConfig::new(
        100_000,
        vec![
            Waveform::Dc { level: 0.0 },
            Waveform::Square {
                freq_hz: 50.0,
                amplitude: 1.0,
            },
        ],
    )
    .with_seed(3);
    let total = 100_000u64;
    let source = SimulatedSource::new(sim, total, 3000);

    let store = Arc::new(EnvelopeStore::default());
    store.enable_envelope(true);
    let setup = SessionSetup::new(total, 2, CaptureMode::Instant);

    let report = spawn_ingestion(source, Arc::clone(&store), setup)
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.samples, total);
    assert_eq!(report.blocks, 34);
    assert!(store.last_ended());
    assert_relative_eq!(store.cal_vmean(0).unwrap(), 128.0, epsilon = 1e-9);
    assert_eq!(store.cal_vrms(128.0, 0).unwrap(), 0.0);

    assert_relative_eq!(store.cal_vrms(127.5, 1).unwrap(), 127.5, epsilon = 1e-9);

    let (len, bounds) = store
        .get_envelope_section(0, total - 1, 256.0, 1, |s| {
            let min = s.samples.iter().map(|e| e.min).min();
            let max = s.samples.iter().map(|e| e.max).max();
            (s.len(), (min, max))
        })
        .unwrap();
    assert_eq!(len as u64, total / 256);
    assert_eq!(bounds, (Some(0), Some(255)));
}
