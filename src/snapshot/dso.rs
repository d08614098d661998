use std::collections::TryReserveError;
use std::sync::{Mutex, MutexGuard};

use crate::config::{CaptureMode, StoreConfig};
use crate::constants::UNIT_BYTES;
use crate::error::{CaptureError, Result};
use crate::snapshot::envelope::{extend_pyramid, level_for_min_length};
use crate::snapshot::{
    ChannelView, Envelope, EnvelopeSection, SampleBlock, SampleBuffer, SessionSetup, Snapshot,
    stats,
};

struct DsoState {
    buffer: SampleBuffer,
    /// `levels[channel][level]`
    levels: Vec<Vec<Envelope>>,
    mode: CaptureMode,
    envelope_enabled: bool,
    envelope_ready: bool,
}

impl DsoState {
    fn new() -> Self {
        Self {
            buffer: SampleBuffer::new(),
            levels: Vec::new(),
            mode: CaptureMode::Instant,
            envelope_enabled: false,
            envelope_ready: false,
        }
    }

    fn start_session(&mut self) {
        self.buffer.reset_counters();
        self.levels.iter_mut().flatten().for_each(Envelope::reset);
        self.envelope_ready = false;
    }

    fn release(&mut self) {
        self.buffer.free_data();
        self.buffer.clear_dimensions();
        self.levels = Vec::new();
        self.envelope_ready = false;
    }

    fn fail_allocation(&mut self, err: TryReserveError) {
        log::error!("Capture buffer allocation failed: {}", err);
        self.release();
        self.buffer.memory_failed = true;
    }

    fn reallocate(
        &mut self,
        size: u64,
        config: &StoreConfig,
    ) -> std::result::Result<(), TryReserveError> {
        self.buffer.reserve(size)?;
        self.levels = Vec::new();

        let factor = config.envelope.scale_factor();
        for _ in 0..self.buffer.channel_count() {
            let mut count = self.buffer.total_sample_count() / factor;
            let mut levels = Vec::with_capacity(config.envelope.level_count);
            for _ in 0..config.envelope.level_count {
                count = config.envelope.round_to_unit(count);
                levels.push(Envelope::with_capacity(count)?);
                count /= factor;
            }
            self.levels.push(levels);
        }
        Ok(())
    }

    fn append(&mut self, block: &SampleBlock, config: &StoreConfig) -> Result<()> {
        let channel_count = self.buffer.channel_count();
        if channel_count == 0 || block.num_samples == 0 || self.buffer.memory_failed {
            return Ok(());
        }
        let expected = block.num_samples as usize * channel_count;
        if block.data.len() != expected {
            return Err(CaptureError::BlockLength {
                expected,
                actual: block.data.len(),
            });
        }

        self.buffer.write(&block.data, block.num_samples, self.mode);

        if self.envelope_enabled {
            let header = self.mode == CaptureMode::Block || block.samplerate_changed;
            self.extend_envelopes(header, config);
        } else {
            self.envelope_ready = false;
        }
        self.buffer.have_data = true;
        Ok(())
    }

    fn extend_envelopes(&mut self, header: bool, config: &StoreConfig) {
        let sample_count = self.buffer.sample_count();
        let extended = self
            .levels
            .iter_mut()
            .enumerate()
            .try_for_each(|(slot, levels)| {
                let raw = self.buffer.channel_view(slot, 0, sample_count);
                extend_pyramid(levels, raw, &config.envelope, header)
            });
        match extended {
            Ok(()) => self.envelope_ready = true,
            Err(e) => self.fail_allocation(e),
        }
    }

    fn byte_count(&self) -> u64 {
        self.buffer.sample_count() * UNIT_BYTES * self.buffer.channel_count() as u64
    }
}

/// Capture store with per-channel min/max envelope pyramids
///
/// One acquisition thread drives [`first_payload`](Self::first_payload) and
/// [`append_payload`](Self::append_payload); any number of readers may query
/// concurrently. All state sits behind a single mutex and every public method
/// takes it exactly once.
///
/// # Example
/// ```
/// use scopecapture::config::{CaptureMode, StoreConfig};
/// use scopecapture::snapshot::{EnvelopeStore, SampleBlock, SessionSetup};
///
/// let store = EnvelopeStore::new(StoreConfig::default()).unwrap();
/// store.enable_envelope(true);
///
/// let setup = SessionSetup::new(1024, 1, CaptureMode::Instant);
/// let block = SampleBlock::new(vec![128; 1024], 1);
/// store.first_payload(&block, &setup).unwrap();
///
/// let entries = store
///     .get_envelope_section(0, 1023, 256.0, 0, |section| section.len())
///     .unwrap();
/// assert_eq!(entries, 4);
/// assert_eq!(store.cal_vmean(0).unwrap(), 128.0);
/// ```
pub struct EnvelopeStore {
    config: StoreConfig,
    state: Mutex<DsoState>,
}

impl EnvelopeStore {
    /// Build a store, rejecting configurations that `validate` refuses
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DsoState::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, DsoState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Size the store for a new session and ingest its first block
    ///
    /// Buffers are reallocated when the sample count or enabled channel count
    /// changes. If allocation fails the store is left fully freed with
    /// [`memory_failed`](Snapshot::memory_failed) set, and `Ok(())` is
    /// returned; callers poll that flag after this call.
    pub fn first_payload(&self, block: &SampleBlock, setup: &SessionSetup) -> Result<()> {
        let channel_count = setup.enabled_channel_count();
        if channel_count == 0 {
            return Err(CaptureError::NoEnabledChannels);
        }
        let expected = block.num_samples as usize * channel_count;
        if block.data.len() != expected {
            return Err(CaptureError::BlockLength {
                expected,
                actual: block.data.len(),
            });
        }

        let mut state = self.lock();
        let state = &mut *state;

        let resized = setup.total_sample_count != state.buffer.total_sample_count()
            || channel_count != state.buffer.channel_count();
        let size = setup
            .total_sample_count
            .saturating_mul(channel_count as u64)
            .saturating_add(self.config.header_reserve);

        state
            .buffer
            .allocate(self.config.unit_size, setup.total_sample_count, channel_count)?;
        state.mode = setup.mode;

        if resized || size != state.buffer.capacity() {
            log::debug!(
                "Allocating capture of {} samples x {} channels ({} bytes)",
                setup.total_sample_count,
                channel_count,
                size
            );
            if let Err(e) = state.reallocate(size, &self.config) {
                state.fail_allocation(e);
                return Ok(());
            }
        }

        state.start_session();
        state.buffer.channel_enable = setup.channel_enable.clone();
        state.append(block, &self.config)?;
        state.buffer.last_ended = false;
        Ok(())
    }

    /// Ingest one more block of the current session
    pub fn append_payload(&self, block: &SampleBlock) -> Result<()> {
        self.lock().append(block, &self.config)
    }

    /// Toggle envelope maintenance for future appends
    ///
    /// Enabling on a store whose pyramid is stale rebuilds it from sample zero.
    pub fn enable_envelope(&self, enabled: bool) {
        let mut state = self.lock();
        if enabled
            && !state.envelope_ready
            && state.buffer.sample_count() > 0
            && !state.buffer.memory_failed
        {
            state.extend_envelopes(true, &self.config);
        }
        state.envelope_enabled = enabled;
    }

    pub fn envelope_enabled(&self) -> bool {
        self.lock().envelope_enabled
    }

    pub fn envelope_ready(&self) -> bool {
        self.lock().envelope_ready
    }

    /// Valid entries and reserved entries of one pyramid level
    pub fn envelope_level_len(&self, channel: usize, level: usize) -> Option<(usize, u64)> {
        let state = self.lock();
        let slot = state.buffer.slot(channel).ok()?;
        state
            .levels
            .get(slot)
            .and_then(|levels| levels.get(level))
            .map(|e| (e.len(), e.data_length()))
    }

    /// Run `f` over the envelope covering samples `start..=end`
    ///
    /// The level is the coarsest one that still resolves `min_length` raw
    /// samples per entry. While the pyramid is not ready, or the chosen level
    /// holds no data yet, `f` receives an empty section.
    pub fn get_envelope_section<R>(
        &self,
        start: u64,
        end: u64,
        min_length: f64,
        channel: usize,
        f: impl FnOnce(EnvelopeSection<'_>) -> R,
    ) -> Result<R> {
        if min_length.is_nan() || min_length <= 0.0 {
            return Err(CaptureError::InvalidMinLength(min_length));
        }
        let state = self.lock();
        let sample_count = state.buffer.sample_count();
        if start > end || end > sample_count {
            return Err(CaptureError::SampleRange {
                start,
                end,
                sample_count,
            });
        }

        let slot = state.buffer.slot(channel)?;

        let level = level_for_min_length(&self.config.envelope, min_length);
        let power = self.config.envelope.scale_power * (level as u32 + 1);
        let first = start >> power;
        let aligned_start = first << power;
        let scale = 1u64 << power;

        if !state.envelope_ready {
            return Ok(f(EnvelopeSection::empty(aligned_start, scale, level)));
        }

        let entries = state.levels[slot][level].as_slice();
        let stop = ((end >> power) + 1).min(entries.len() as u64);
        let section = if stop > first {
            EnvelopeSection {
                start: aligned_start,
                scale,
                level,
                samples: &entries[first as usize..stop as usize],
            }
        } else {
            EnvelopeSection::empty(aligned_start, scale, level)
        };
        Ok(f(section))
    }

    /// Run `f` over raw samples `start..=end` of one channel
    pub fn get_samples<R>(
        &self,
        start: u64,
        end: u64,
        channel: usize,
        f: impl FnOnce(ChannelView<'_>) -> R,
    ) -> Result<R> {
        let state = self.lock();
        let sample_count = state.buffer.sample_count();
        if start > end || end >= sample_count {
            return Err(CaptureError::SampleRange {
                start,
                end,
                sample_count,
            });
        }
        let slot = state.buffer.slot(channel)?;
        Ok(f(state.buffer.channel_view(slot, start, end - start + 1)))
    }

    pub fn copy_samples(&self, start: u64, end: u64, channel: usize) -> Result<Vec<u8>> {
        self.get_samples(start, end, channel, |view| view.to_vec())
    }

    /// RMS deviation of one channel from `zero_offset`; zero on an empty store
    pub fn cal_vrms(&self, zero_offset: f64, channel: usize) -> Result<f64> {
        let state = self.lock();
        let sample_count = state.buffer.sample_count();
        if sample_count == 0 {
            return Ok(0.0);
        }
        let slot = state.buffer.slot(channel)?;
        let view = state.buffer.channel_view(slot, 0, sample_count);
        Ok(stats::vrms(view, zero_offset, self.config.stats_block as usize))
    }

    /// Mean of one channel; zero on an empty store
    pub fn cal_vmean(&self, channel: usize) -> Result<f64> {
        let state = self.lock();
        let sample_count = state.buffer.sample_count();
        if sample_count == 0 {
            return Ok(0.0);
        }
        let slot = state.buffer.slot(channel)?;
        let view = state.buffer.channel_view(slot, 0, sample_count);
        Ok(stats::vmean(view, self.config.stats_block as usize))
    }

    /// Whether `channel_id` was enabled for the current session
    pub fn has_data(&self, channel_id: usize) -> bool {
        self.lock().buffer.slot(channel_id).is_ok()
    }

    /// Number of leaf blocks the captured bytes span
    pub fn get_block_num(&self) -> usize {
        let size = self.lock().byte_count();
        let power = self.config.leaf_block_power;
        let mask = (1u64 << power) - 1;
        ((size >> power) + u64::from((size & mask) != 0)) as usize
    }

    /// Byte size of leaf block `index`; only the last block may be short
    pub fn get_block_size(&self, index: usize) -> Result<u64> {
        let size = self.lock().byte_count();
        let leaf = 1u64 << self.config.leaf_block_power;
        let block_count = size.div_ceil(leaf) as usize;
        if index >= block_count {
            return Err(CaptureError::BlockIndex { index, block_count });
        }
        if index + 1 < block_count || size % leaf == 0 {
            Ok(leaf)
        } else {
            Ok(size % leaf)
        }
    }

    /// Reset counters for a new session, keeping allocations
    pub fn init(&self) {
        let mut state = self.lock();
        state.start_session();
        state.buffer.channel_enable.clear();
    }

    /// Release every buffer and return to the empty state
    pub fn clear(&self) {
        let mut state = self.lock();
        state.release();
        state.start_session();
        state.buffer.have_data = false;
    }
}

impl Default for EnvelopeStore {
    fn default() -> Self {
        Self::with_config(StoreConfig::default())
    }
}

impl Snapshot for EnvelopeStore {
    fn with_buffer<R>(&self, f: impl FnOnce(&SampleBuffer) -> R) -> R {
        let state = self.lock();
        f(&state.buffer)
    }

    fn with_buffer_mut<R>(&self, f: impl FnOnce(&mut SampleBuffer) -> R) -> R {
        let mut state = self.lock();
        f(&mut state.buffer)
    }
}
