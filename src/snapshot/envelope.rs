use std::collections::TryReserveError;

use crate::config::EnvelopeConfig;
use crate::snapshot::ChannelView;

/// Min/max summary of a run of samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeSample {
    pub min: u8,
    pub max: u8,
}

impl EnvelopeSample {
    pub fn from_value(value: u8) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Fold a non-empty run of raw values into one summary
    fn from_values(mut values: impl Iterator<Item = u8>) -> Option<Self> {
        let first = Self::from_value(values.next()?);
        Some(values.fold(first, |acc, v| acc.merge(Self::from_value(v))))
    }

    /// Fold a non-empty run of summaries into one coarser summary
    fn from_summaries(summaries: &[Self]) -> Option<Self> {
        let (first, rest) = summaries.split_first()?;
        Some(rest.iter().fold(*first, |acc, s| acc.merge(*s)))
    }
}

/// One pyramid level for one channel
///
/// `len()` entries are valid; `data_length()` entries are reserved, always a
/// multiple of the allocation unit so appends rarely reallocate.
#[derive(Debug, Default)]
pub struct Envelope {
    samples: Vec<EnvelopeSample>,
    data_length: u64,
}

impl Envelope {
    pub(crate) fn with_capacity(entries: u64) -> Result<Self, TryReserveError> {
        let mut samples = Vec::new();
        samples.try_reserve_exact(usize::try_from(entries).unwrap_or(usize::MAX))?;
        Ok(Self {
            samples,
            data_length: entries,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn data_length(&self) -> u64 {
        self.data_length
    }

    pub fn as_slice(&self) -> &[EnvelopeSample] {
        &self.samples
    }

    pub(crate) fn reset(&mut self) {
        self.samples.clear();
    }

    /// Make room for `needed` entries, growing by whole allocation units
    fn reserve_for(
        &mut self,
        needed: u64,
        config: &EnvelopeConfig,
    ) -> Result<(), TryReserveError> {
        let new_length = config.round_to_unit(needed);
        if new_length > self.data_length {
            let extra = new_length as usize - self.samples.len();
            self.samples.try_reserve_exact(extra)?;
            self.data_length = new_length;
        }
        Ok(())
    }
}

/// Slice of one pyramid level mapped back to raw-sample coordinates
///
/// Borrowed from the store, so it can only live inside the locked query that
/// produced it.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeSection<'a> {
    /// Raw sample index of the first entry
    pub start: u64,
    /// Raw samples summarised by each entry
    pub scale: u64,
    pub level: usize,
    pub samples: &'a [EnvelopeSample],
}

impl EnvelopeSection<'_> {
    pub fn empty(start: u64, scale: u64, level: usize) -> Self {
        Self {
            start,
            scale,
            level,
            samples: &[],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Coarsest level that still resolves `min_length` raw samples
///
/// `floor(log_factor(min_length)) - 1`, floored at zero and capped at the
/// coarsest level whose scale fits in a `u64`.
pub fn level_for_min_length(config: &EnvelopeConfig, min_length: f64) -> usize {
    let factor = config.scale_factor() as f64;
    let mut exponent = 0usize;
    let mut reach = factor;
    while reach <= min_length && exponent <= config.level_count {
        exponent += 1;
        reach *= factor;
    }
    exponent.saturating_sub(1).min(config.max_query_level())
}

/// Extend one channel's pyramid to cover `raw`
///
/// Only windows completed since the last call are scanned. With `header`
/// set every level is cleared first and rebuilt from sample zero.
pub(crate) fn extend_pyramid(
    levels: &mut [Envelope],
    raw: ChannelView<'_>,
    config: &EnvelopeConfig,
    header: bool,
) -> Result<(), TryReserveError> {
    if header {
        levels.iter_mut().for_each(Envelope::reset);
    }
    let Some(base) = levels.first_mut() else {
        return Ok(());
    };

    let factor = config.scale_factor() as usize;
    let prev_length = base.len();
    let new_length = raw.len() / factor;
    if new_length <= prev_length {
        return Ok(());
    }

    base.reserve_for(new_length as u64, config)?;
    for window in prev_length..new_length {
        let run = raw.slice(window * factor, (window + 1) * factor);
        if let Some(summary) = EnvelopeSample::from_values(run.iter()) {
            base.samples.push(summary);
        }
    }

    for level in 1..levels.len() {
        let (lower, upper) = levels.split_at_mut(level);
        let below = &lower[level - 1];
        let current = &mut upper[0];

        let prev_length = current.len();
        let new_length = below.len() / factor;
        if new_length <= prev_length {
            break;
        }

        current.reserve_for(new_length as u64, config)?;
        for window in prev_length..new_length {
            let run = &below.samples[window * factor..(window + 1) * factor];
            if let Some(summary) = EnvelopeSample::from_summaries(run) {
                current.samples.push(summary);
            }
        }
        log::trace!("Envelope level {} extended to {} entries", level, new_length);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureMode;
    use crate::snapshot::SampleBuffer;

    fn small_config() -> EnvelopeConfig {
        EnvelopeConfig {
            scale_power: 2,
            level_count: 3,
            data_unit: 8,
        }
    }

    fn empty_levels(config: &EnvelopeConfig) -> Vec<Envelope> {
        (0..config.level_count).map(|_| Envelope::default()).collect()
    }

    fn filled_buffer(values: &[u8], channels: usize) -> SampleBuffer {
        let mut buffer = SampleBuffer::new();
        let samples = (values.len() / channels) as u64;
        buffer.allocate(1, samples, channels).unwrap();
        buffer.reserve(values.len() as u64).unwrap();
        buffer.write(values, samples, CaptureMode::Instant);
        buffer
    }

    #[test]
    fn test_merge() {
        let a = EnvelopeSample { min: 3, max: 9 };
        let b = EnvelopeSample { min: 1, max: 5 };
        assert_eq!(a.merge(b), EnvelopeSample { min: 1, max: 9 });
    }

    #[test]
    fn test_level_for_min_length() {
        let config = EnvelopeConfig::default();
        assert_eq!(level_for_min_length(&config, 1.0), 0);
        assert_eq!(level_for_min_length(&config, 255.9), 0);
        assert_eq!(level_for_min_length(&config, 256.0), 0);
        assert_eq!(level_for_min_length(&config, 65536.0), 1);
        assert_eq!(level_for_min_length(&config, 65535.0), 0);
        assert_eq!(level_for_min_length(&config, 1e300), config.max_query_level());
    }

    #[test]
    fn test_level0_windows_skip_other_channels() {
        let config = small_config();
        // channel 0 ramps 0..8, channel 1 is constant 100
        let values: Vec<u8> = (0..8).flat_map(|v| [v, 100]).collect();
        let buffer = filled_buffer(&values, 2);
        let mut levels = empty_levels(&config);

        extend_pyramid(
            &mut levels,
            buffer.channel_view(0, 0, buffer.sample_count()),
            &config,
            false,
        )
        .unwrap();

        assert_eq!(
            levels[0].as_slice(),
            &[
                EnvelopeSample { min: 0, max: 3 },
                EnvelopeSample { min: 4, max: 7 }
            ]
        );
        assert!(levels[1].is_empty());
        assert_eq!(levels[0].data_length(), 8);
    }

    #[test]
    fn test_incremental_matches_rebuild() {
        let config = small_config();
        let values: Vec<u8> = (0..80u32).map(|i| ((i * 37) % 251) as u8).collect();
        let buffer = filled_buffer(&values, 1);

        let mut incremental = empty_levels(&config);
        for end in [3u64, 4, 9, 17, 40, 63, 64, 80] {
            extend_pyramid(
                &mut incremental,
                buffer.channel_view(0, 0, end),
                &config,
                false,
            )
            .unwrap();
        }

        let mut rebuilt = empty_levels(&config);
        extend_pyramid(&mut rebuilt, buffer.channel_view(0, 0, 80), &config, true).unwrap();

        for level in 0..config.level_count {
            assert_eq!(incremental[level].as_slice(), rebuilt[level].as_slice());
        }
        assert_eq!(rebuilt[0].len(), 20);
        assert_eq!(rebuilt[1].len(), 5);
        assert_eq!(rebuilt[2].len(), 1);
    }

    #[test]
    fn test_header_rebuild_clears_stale_levels() {
        let config = small_config();
        let values = vec![7u8; 64];
        let buffer = filled_buffer(&values, 1);
        let mut levels = empty_levels(&config);

        extend_pyramid(&mut levels, buffer.channel_view(0, 0, 64), &config, false).unwrap();
        assert_eq!(levels[2].len(), 1);

        extend_pyramid(&mut levels, buffer.channel_view(0, 0, 8), &config, true).unwrap();
        assert_eq!(levels[0].len(), 2);
        assert!(levels[1].is_empty());
        assert!(levels[2].is_empty());
    }

    #[test]
    fn test_growth_by_allocation_unit() {
        let config = small_config();
        let values = vec![1u8; 4 * 20];
        let buffer = filled_buffer(&values, 1);
        let mut levels = empty_levels(&config);

        extend_pyramid(&mut levels, buffer.channel_view(0, 0, 36), &config, false).unwrap();
        assert_eq!(levels[0].data_length(), 16);
        extend_pyramid(&mut levels, buffer.channel_view(0, 0, 80), &config, false).unwrap();
        assert_eq!(levels[0].data_length(), 24);
    }
}
