//! Sizing constants for capture buffers and envelope pyramids
//!
//! These are the defaults used by [`crate::config::StoreConfig`]; a store can
//! be configured away from them, but the values below match what scope
//! front-ends expect to render against.

/// Each envelope level decimates the level below by `1 << ENVELOPE_SCALE_POWER`.
pub const ENVELOPE_SCALE_POWER: u32 = 8;

/// Number of pyramid levels kept per channel.
pub const ENVELOPE_LEVEL_COUNT: usize = 10;

/// Envelope arrays grow in multiples of this many entries.
pub const ENVELOPE_DATA_UNIT: u64 = 4 * 1024;

/// Samples per partial sum when computing RMS and mean.
pub const STATS_BLOCK_SAMPLES: u64 = 1 << 8;

/// Chunked export uses leaf blocks of `1 << LEAF_BLOCK_POWER` bytes.
pub const LEAF_BLOCK_POWER: u32 = 21;

/// Bytes reserved past the end of the raw sample area.
pub const HEADER_RESERVE_BYTES: u64 = std::mem::size_of::<u64>() as u64;

/// Bytes per channel sample in the raw buffer.
pub const UNIT_BYTES: u64 = 1;
