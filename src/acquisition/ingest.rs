use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use crossbeam_channel::{Receiver, bounded};

use super::AcquisitionSource;
use crate::snapshot::{EnvelopeStore, SampleBlock, SessionSetup, Snapshot};

/// Totals for one finished capture session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub blocks: usize,
    pub samples: u64,
}

/// Handle to a running acquisition: a producer thread reading the source and
/// an ingest thread writing into the store
pub struct Ingestion {
    producer: JoinHandle<anyhow::Result<()>>,
    ingest: JoinHandle<anyhow::Result<IngestReport>>,
}

impl Ingestion {
    /// Wait for the session to drain and report what was ingested
    pub fn join(self) -> anyhow::Result<IngestReport> {
        let produced = self
            .producer
            .join()
            .map_err(|_| anyhow::anyhow!("Acquisition thread panicked"))?;
        let report = self
            .ingest
            .join()
            .map_err(|_| anyhow::anyhow!("Ingest thread panicked"))??;
        produced?;
        Ok(report)
    }
}

/// Start streaming `source` into `store` as one capture session
pub fn spawn_ingestion<S>(
    mut source: S,
    store: Arc<EnvelopeStore>,
    setup: SessionSetup,
) -> anyhow::Result<Ingestion>
where
    S: AcquisitionSource + 'static,
{
    if setup.enabled_channel_count() != source.channel_count() {
        anyhow::bail!(
            "Source delivers {} channels but session enables {}",
            source.channel_count(),
            setup.enabled_channel_count()
        );
    }

    let (tx, rx) = bounded::<SampleBlock>(10);

    let producer = thread::Builder::new()
        .name("acquisition".into())
        .spawn(move || -> anyhow::Result<()> {
            while let Some(block) = source.next_block()? {
                if tx.send(block).is_err() {
                    log::warn!("Ingest receiver dropped");
                    break;
                }
            }
            Ok(())
        })
        .context("Failed to spawn acquisition thread")?;

    let ingest = thread::Builder::new()
        .name("ingest".into())
        .spawn(move || run_ingest(rx, &store, &setup))
        .context("Failed to spawn ingest thread")?;

    Ok(Ingestion { producer, ingest })
}

fn run_ingest(
    rx: Receiver<SampleBlock>,
    store: &EnvelopeStore,
    setup: &SessionSetup,
) -> anyhow::Result<IngestReport> {
    let mut report = IngestReport::default();

    for block in rx.iter() {
        if report.blocks == 0 {
            store.first_payload(&block, setup)?;
            if store.memory_failed() {
                anyhow::bail!(
                    "Could not allocate a {}-sample capture",
                    setup.total_sample_count
                );
            }
        } else {
            store.append_payload(&block)?;
        }
        report.blocks += 1;
        report.samples += block.num_samples;
    }

    store.capture_ended();
    log::info!(
        "Capture ended after {} blocks ({} samples stored)",
        report.blocks,
        store.sample_count()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureMode;

    struct CountingSource {
        remaining: usize,
        value: u8,
    }

    impl AcquisitionSource for CountingSource {
        fn next_block(&mut self) -> anyhow::Result<Option<SampleBlock>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            self.value = self.value.wrapping_add(1);
            Ok(Some(SampleBlock::new(vec![self.value; 512], 2)))
        }

        fn channel_count(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_ingestion_fills_store() {
        let store = Arc::new(EnvelopeStore::default());
        store.enable_envelope(true);
        let source = CountingSource {
            remaining: 8,
            value: 0,
        };
        let setup = SessionSetup::new(2048, 2, CaptureMode::Instant);

        let report = spawn_ingestion(source, Arc::clone(&store), setup)
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(
            report,
            IngestReport {
                blocks: 8,
                samples: 2048
            }
        );
        assert_eq!(store.sample_count(), 2048);
        assert!(store.last_ended());
        assert_eq!(store.envelope_level_len(1, 0).map(|(len, _)| len), Some(8));
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let store = Arc::new(EnvelopeStore::default());
        let source = CountingSource {
            remaining: 1,
            value: 0,
        };
        let setup = SessionSetup::new(2048, 3, CaptureMode::Instant);
        assert!(spawn_ingestion(source, store, setup).is_err());
    }
}
