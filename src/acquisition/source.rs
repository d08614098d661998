use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::WavReader;

use crate::snapshot::SampleBlock;

/// Producer of interleaved sample blocks for a capture session
pub trait AcquisitionSource: Send {
    fn next_block(&mut self) -> anyhow::Result<Option<SampleBlock>>;
    fn channel_count(&self) -> usize;
    /// Total samples per channel this source will deliver, if known
    fn total_samples(&self) -> Option<u64> {
        None
    }
}

/// Map a normalised sample in `[-1, 1]` onto the unsigned 8-bit scope range
pub fn quantize(value: f32) -> u8 {
    ((value.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8
}

/// Replays a WAV file as if it were streamed from a scope
pub struct WavFileSource {
    samples: Vec<u8>,
    channels: usize,
    position: usize,
    chunk_samples: usize,
    sample_rate: u32,
}

impl WavFileSource {
    /// `chunk_samples` is the number of samples per channel in each block
    pub fn new<P: AsRef<Path>>(path: P, chunk_samples: usize) -> anyhow::Result<Self> {
        let reader = WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        if spec.channels == 0 {
            anyhow::bail!("WAV file has no channels");
        }
        if chunk_samples == 0 {
            anyhow::bail!("Chunk size must be positive");
        }

        let sample_rate = spec.sample_rate;
        let samples = Self::read_samples(reader, &spec)?;
        log::info!(
            "Loaded {} samples x {} channels at {} Hz",
            samples.len() / spec.channels as usize,
            spec.channels,
            sample_rate
        );

        Ok(Self {
            samples,
            channels: spec.channels as usize,
            position: 0,
            chunk_samples,
            sample_rate,
        })
    }

    fn read_samples(
        mut reader: WavReader<BufReader<File>>,
        spec: &hound::WavSpec,
    ) -> anyhow::Result<Vec<u8>> {
        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(quantize))
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let max_val = 2_i32.pow(spec.bits_per_sample as u32 - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| quantize(v as f32 / max_val)))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl AcquisitionSource for WavFileSource {
    fn next_block(&mut self) -> anyhow::Result<Option<SampleBlock>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }

        let end = (self.position + self.chunk_samples * self.channels).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(Some(SampleBlock::new(chunk, self.channels)))
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn total_samples(&self) -> Option<u64> {
        Some((self.samples.len() / self.channels) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(-1.0), 0);
        assert_eq!(quantize(0.0), 128);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(7.5), 255);
    }

    #[test]
    fn test_wav_replay_in_chunks() {
        let path = std::env::temp_dir().join(format!(
            "scopecapture_source_{}.wav",
            std::process::id()
        ));
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(i16::MIN).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = WavFileSource::new(&path, 4).unwrap();
        assert_eq!(source.channel_count(), 2);
        assert_eq!(source.total_samples(), Some(10));
        assert_eq!(source.sample_rate(), 8000);

        let mut sizes = Vec::new();
        while let Some(block) = source.next_block().unwrap() {
            assert_eq!(block.data[0], 0);
            assert_eq!(block.data[1], 128);
            sizes.push(block.num_samples);
        }
        assert_eq!(sizes, vec![4, 4, 2]);

        let _ = std::fs::remove_file(&path);
    }
}
