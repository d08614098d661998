use std::collections::BTreeMap;
use std::collections::TryReserveError;
use std::sync::{Mutex, MutexGuard};

use crate::config::CaptureMode;
use crate::error::{CaptureError, Result};
use crate::snapshot::Snapshot;

/// Raw interleaved capture buffer and its ring bookkeeping
///
/// This is the unlocked state shared by [`SampleStore`] and
/// [`crate::snapshot::EnvelopeStore`]; every access goes through the owning
/// store's mutex.
#[derive(Debug)]
pub struct SampleBuffer {
    data: Vec<u8>,
    capacity: u64,
    channel_count: usize,
    unit_size: usize,
    sample_count: u64,
    total_sample_count: u64,
    ring_sample_count: u64,
    pub(crate) memory_failed: bool,
    pub(crate) last_ended: bool,
    pub(crate) have_data: bool,
    pub(crate) channel_enable: BTreeMap<usize, bool>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            capacity: 0,
            channel_count: 0,
            unit_size: 0,
            sample_count: 0,
            total_sample_count: 0,
            ring_sample_count: 0,
            memory_failed: false,
            last_ended: true,
            have_data: false,
            channel_enable: BTreeMap::new(),
        }
    }

    /// Record session sizing without touching the raw buffer
    pub fn allocate(
        &mut self,
        unit_size: usize,
        total_sample_count: u64,
        channel_count: usize,
    ) -> Result<()> {
        if unit_size == 0 {
            self.unit_size = 0;
            self.total_sample_count = 0;
            self.channel_count = 0;
            return Err(CaptureError::InvalidUnitSize);
        }
        self.unit_size = unit_size;
        self.total_sample_count = total_sample_count;
        self.channel_count = channel_count;
        Ok(())
    }

    /// Replace the raw buffer with a zeroed one of `size` bytes
    pub(crate) fn reserve(&mut self, size: u64) -> std::result::Result<(), TryReserveError> {
        self.free_data();
        let bytes = usize::try_from(size).unwrap_or(usize::MAX);
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)?;
        data.resize(bytes, 0);
        self.data = data;
        self.capacity = size;
        Ok(())
    }

    pub fn free_data(&mut self) {
        self.data = Vec::new();
        self.capacity = 0;
        self.sample_count = 0;
        self.channel_enable.clear();
    }

    /// Forget the session sizing after its buffers were released
    pub(crate) fn clear_dimensions(&mut self) {
        self.total_sample_count = 0;
        self.channel_count = 0;
    }

    /// Reset per-session counters, keeping allocations
    pub(crate) fn reset_counters(&mut self) {
        self.sample_count = 0;
        self.ring_sample_count = 0;
        self.memory_failed = false;
        self.last_ended = true;
    }

    /// Copy a block of interleaved samples into the buffer
    ///
    /// Returns the number of samples actually stored. Instant mode appends at
    /// the write cursor and drops whatever would overflow the session; block
    /// mode replaces the capture from sample zero.
    pub(crate) fn write(&mut self, data: &[u8], num_samples: u64, mode: CaptureMode) -> u64 {
        let (first, count) = match mode {
            CaptureMode::Instant => {
                let room = self.total_sample_count.saturating_sub(self.sample_count);
                (self.sample_count, num_samples.min(room))
            }
            CaptureMode::Block => (0, num_samples.min(self.total_sample_count)),
        };
        if count < num_samples {
            log::warn!(
                "Dropping {} samples past the end of a {}-sample capture",
                num_samples - count,
                self.total_sample_count
            );
        }

        let from = self.offset(first, 0);
        let len = count as usize * self.channel_count;
        self.data[from..from + len].copy_from_slice(&data[..len]);

        self.sample_count = match mode {
            CaptureMode::Instant => self.sample_count + count,
            CaptureMode::Block => count,
        };
        count
    }

    /// Byte offset of `(sample, channel)` in the interleaved buffer
    #[inline]
    pub fn offset(&self, sample: u64, channel: usize) -> usize {
        sample as usize * self.channel_count + channel
    }

    pub fn ring_start(&self) -> u64 {
        if self.sample_count < self.total_sample_count {
            0
        } else {
            self.ring_sample_count
        }
    }

    pub fn ring_end(&self) -> u64 {
        if self.sample_count == 0 {
            0
        } else if self.ring_sample_count == 0 {
            self.total_sample_count - 1
        } else {
            self.ring_sample_count - 1
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn total_sample_count(&self) -> u64 {
        self.total_sample_count
    }

    pub fn ring_sample_count(&self) -> u64 {
        self.ring_sample_count
    }

    /// Position of channel `channel_id` among the interleaved channels
    ///
    /// Only enabled channels are stored, so the position is the number of
    /// enabled ids below `channel_id`.
    pub fn slot(&self, channel_id: usize) -> Result<usize> {
        match self.channel_enable.get(&channel_id) {
            Some(true) => Ok(self
                .channel_enable
                .range(..channel_id)
                .filter(|&(_, &on)| on)
                .count()),
            Some(false) => Err(CaptureError::ChannelDisabled(channel_id)),
            None => Err(CaptureError::ChannelOutOfRange {
                index: channel_id,
                channel_count: self.channel_enable.len(),
            }),
        }
    }

    /// Ids of the channels stored in this session, in slot order
    pub fn enabled_channels(&self) -> Vec<usize> {
        self.channel_enable
            .iter()
            .filter(|&(_, &on)| on)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Strided view of the channel in `slot` over `start..start + len` samples
    pub fn channel_view(&self, slot: usize, start: u64, len: u64) -> ChannelView<'_> {
        ChannelView {
            data: &self.data,
            channel_count: self.channel_count,
            channel: slot,
            start,
            len,
        }
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of a single channel inside the interleaved buffer
#[derive(Debug, Clone, Copy)]
pub struct ChannelView<'a> {
    data: &'a [u8],
    channel_count: usize,
    channel: usize,
    start: u64,
    len: u64,
}

impl<'a> ChannelView<'a> {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First sample index covered by the view
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        if index >= self.len() {
            return None;
        }
        let at = (self.start as usize + index) * self.channel_count + self.channel;
        self.data.get(at).copied()
    }

    pub fn iter(self) -> impl Iterator<Item = u8> + 'a {
        let from = self.start as usize * self.channel_count + self.channel;
        let to = (self.start + self.len) as usize * self.channel_count;
        let slice: &'a [u8] = if self.len == 0 {
            &[]
        } else {
            &self.data[from..to]
        };
        slice.iter().step_by(self.channel_count.max(1)).copied()
    }

    /// Sub-view over `from..to`, relative to this view
    pub fn slice(&self, from: usize, to: usize) -> ChannelView<'a> {
        let to = to.min(self.len());
        let from = from.min(to);
        ChannelView {
            start: self.start + from as u64,
            len: (to - from) as u64,
            ..*self
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

/// Base capture store: raw buffer sizing and ring queries under one mutex
#[derive(Debug, Default)]
pub struct SampleStore {
    buffer: Mutex<SampleBuffer>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SampleBuffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn allocate(
        &self,
        unit_size: usize,
        total_sample_count: u64,
        channel_count: usize,
    ) -> Result<()> {
        self.lock()
            .allocate(unit_size, total_sample_count, channel_count)
    }

    pub fn free_data(&self) {
        self.lock().free_data();
    }

    pub fn init(&self) {
        let mut buffer = self.lock();
        buffer.reset_counters();
        buffer.channel_enable.clear();
    }
}

impl Snapshot for SampleStore {
    fn with_buffer<R>(&self, f: impl FnOnce(&SampleBuffer) -> R) -> R {
        let buffer = self.lock();
        f(&*buffer)
    }

    fn with_buffer_mut<R>(&self, f: impl FnOnce(&mut SampleBuffer) -> R) -> R {
        let mut buffer = self.lock();
        f(&mut *buffer)
    }
}
