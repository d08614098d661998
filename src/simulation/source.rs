use rand_chacha::ChaCha8Rng;

use super::signal::{SimulationConfig, create_rng, generate_interleaved};
use crate::acquisition::AcquisitionSource;
use crate::snapshot::SampleBlock;

/// Synthetic scope that emits `total_samples` per channel in fixed chunks
pub struct SimulatedSource {
    config: SimulationConfig,
    rng: ChaCha8Rng,
    position: u64,
    total_samples: u64,
    chunk_samples: usize,
}

impl SimulatedSource {
    pub fn new(config: SimulationConfig, total_samples: u64, chunk_samples: usize) -> Self {
        let rng = create_rng(config.seed);
        Self {
            config,
            rng,
            position: 0,
            total_samples,
            chunk_samples: chunk_samples.max(1),
        }
    }
}

impl AcquisitionSource for SimulatedSource {
    fn next_block(&mut self) -> anyhow::Result<Option<SampleBlock>> {
        if self.position >= self.total_samples {
            return Ok(None);
        }
        let count = (self.total_samples - self.position).min(self.chunk_samples as u64);
        let data = generate_interleaved(&self.config, self.position, count as usize, &mut self.rng);
        self.position += count;
        Ok(Some(SampleBlock::new(data, self.config.channels.len())))
    }

    fn channel_count(&self) -> usize {
        self.config.channels.len()
    }

    fn total_samples(&self) -> Option<u64> {
        Some(self.total_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::Waveform;

    #[test]
    fn test_chunks_cover_total() {
        let config = SimulationConfig::new(1000, vec![Waveform::Dc { level: 0.0 }; 3]);
        let mut source = SimulatedSource::new(config, 1000, 300);

        let mut counts = Vec::new();
        while let Some(block) = source.next_block().unwrap() {
            assert_eq!(block.data.len(), block.num_samples as usize * 3);
            counts.push(block.num_samples);
        }
        assert_eq!(counts, vec![300, 300, 300, 100]);
    }
}
