use std::collections::BTreeMap;

use crate::config::CaptureMode;

/// One block of interleaved samples from the acquisition side
///
/// `data` holds `num_samples * channel_count` bytes laid out as
/// `[ch0, ch1, .., ch0, ch1, ..]`.
#[derive(Debug, Clone, Default)]
pub struct SampleBlock {
    pub data: Vec<u8>,
    pub num_samples: u64,
    pub samplerate_changed: bool,
}

impl SampleBlock {
    pub fn new(data: Vec<u8>, channel_count: usize) -> Self {
        let num_samples = if channel_count == 0 {
            0
        } else {
            (data.len() / channel_count) as u64
        };
        Self {
            data,
            num_samples,
            samplerate_changed: false,
        }
    }

    pub fn with_samplerate_changed(mut self, changed: bool) -> Self {
        self.samplerate_changed = changed;
        self
    }
}

/// Per-session sizing handed to `first_payload`
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub total_sample_count: u64,
    pub channel_enable: BTreeMap<usize, bool>,
    pub mode: CaptureMode,
}

impl SessionSetup {
    /// Session with channels `0..channel_count` enabled
    pub fn new(total_sample_count: u64, channel_count: usize, mode: CaptureMode) -> Self {
        Self {
            total_sample_count,
            channel_enable: (0..channel_count).map(|ch| (ch, true)).collect(),
            mode,
        }
    }

    pub fn enabled_channel_count(&self) -> usize {
        self.channel_enable.values().filter(|&&on| on).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sample_count() {
        let block = SampleBlock::new(vec![0; 12], 3);
        assert_eq!(block.num_samples, 4);
        assert!(!block.samplerate_changed);
    }

    #[test]
    fn test_enabled_channel_count() {
        let mut setup = SessionSetup::new(1024, 4, CaptureMode::Instant);
        setup.channel_enable.insert(2, false);
        assert_eq!(setup.enabled_channel_count(), 3);
    }
}
