//! Capture snapshots: the raw interleaved sample store and the derived
//! envelope store that renderers query.

pub mod buffer;
pub mod dso;
pub mod envelope;
pub mod payload;
pub mod stats;

pub use buffer::{ChannelView, SampleBuffer, SampleStore};
pub use dso::EnvelopeStore;
pub use envelope::{Envelope, EnvelopeSample, EnvelopeSection};
pub use payload::{SampleBlock, SessionSetup};

/// Query surface shared by every capture store
///
/// Implementors only provide locked access to their [`SampleBuffer`]; each
/// provided method takes the store's mutex exactly once.
pub trait Snapshot {
    fn with_buffer<R>(&self, f: impl FnOnce(&SampleBuffer) -> R) -> R;

    fn with_buffer_mut<R>(&self, f: impl FnOnce(&mut SampleBuffer) -> R) -> R;

    fn sample_count(&self) -> u64 {
        self.with_buffer(|b| b.sample_count())
    }

    fn ring_start(&self) -> u64 {
        self.with_buffer(|b| b.ring_start())
    }

    fn ring_end(&self) -> u64 {
        self.with_buffer(|b| b.ring_end())
    }

    fn empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Mark the current session closed; no further appends will arrive
    fn capture_ended(&self) {
        self.with_buffer_mut(|b| b.last_ended = true)
    }

    fn last_ended(&self) -> bool {
        self.with_buffer(|b| b.last_ended)
    }

    /// Sticky until the next successful session setup
    fn memory_failed(&self) -> bool {
        self.with_buffer(|b| b.memory_failed)
    }

    fn have_data(&self) -> bool {
        self.with_buffer(|b| b.have_data)
    }

    fn channel_count(&self) -> usize {
        self.with_buffer(|b| b.channel_count())
    }

    /// Ids of the channels captured in the current session
    fn enabled_channels(&self) -> Vec<usize> {
        self.with_buffer(|b| b.enabled_channels())
    }

    fn total_sample_count(&self) -> u64 {
        self.with_buffer(|b| b.total_sample_count())
    }

    fn capacity(&self) -> u64 {
        self.with_buffer(|b| b.capacity())
    }

    fn unit_size(&self) -> usize {
        self.with_buffer(|b| b.unit_size())
    }
}
