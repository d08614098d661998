//! Configuration for capture stores.
//!
//! Defaults match the sizing in [`crate::constants`]. A store configuration
//! can also be read from TOML:
//!
//! ```
//! use scopecapture::config::StoreConfig;
//!
//! let config = StoreConfig::from_toml_str(
//!     r#"
//!     stats_block = 512
//!
//!     [envelope]
//!     scale_power = 4
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.envelope.scale_factor(), 16);
//! assert_eq!(config.envelope.level_count, 10);
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::constants::{
    ENVELOPE_DATA_UNIT, ENVELOPE_LEVEL_COUNT, ENVELOPE_SCALE_POWER, HEADER_RESERVE_BYTES,
    LEAF_BLOCK_POWER, STATS_BLOCK_SAMPLES,
};
use crate::error::{CaptureError, Result};

/// Write semantics for a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Blocks accumulate at the write cursor until the session is full
    #[default]
    Instant,
    /// Each block replaces the whole capture
    Block,
}

/// Envelope pyramid sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Each level decimates the one below by `1 << scale_power`
    pub scale_power: u32,
    /// Number of pyramid levels per channel
    pub level_count: usize,
    /// Envelope arrays grow in multiples of this many entries
    pub data_unit: u64,
}

impl EnvelopeConfig {
    /// Number of entries folded into one summary entry
    pub fn scale_factor(&self) -> u64 {
        1 << self.scale_power
    }

    /// Round `count` up to the next multiple of the allocation unit
    pub fn round_to_unit(&self, count: u64) -> u64 {
        count.div_ceil(self.data_unit) * self.data_unit
    }

    /// Coarsest level whose raw-sample scale still fits in a `u64`
    pub fn max_query_level(&self) -> usize {
        let fits = (63 / self.scale_power) as usize;
        self.level_count.min(fits).saturating_sub(1)
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            scale_power: ENVELOPE_SCALE_POWER,
            level_count: ENVELOPE_LEVEL_COUNT,
            data_unit: ENVELOPE_DATA_UNIT,
        }
    }
}

/// Store-wide configuration
///
/// Use `StoreConfig::default()` for the standard scope layout: one byte per
/// channel sample, 256x decimation per envelope level, ten levels.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Size of one sample unit as reported to collaborators
    pub unit_size: usize,
    /// Envelope pyramid sizing
    pub envelope: EnvelopeConfig,
    /// Samples per partial sum for RMS and mean
    pub stats_block: u64,
    /// Bytes reserved past the raw sample area
    pub header_reserve: u64,
    /// Chunked export block size is `1 << leaf_block_power` bytes
    pub leaf_block_power: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            unit_size: 1,
            envelope: EnvelopeConfig::default(),
            stats_block: STATS_BLOCK_SAMPLES,
            header_reserve: HEADER_RESERVE_BYTES,
            leaf_block_power: LEAF_BLOCK_POWER,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| CaptureError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            CaptureError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.unit_size == 0 {
            return Err(CaptureError::InvalidUnitSize);
        }
        if self.envelope.scale_power == 0 || self.envelope.scale_power > 16 {
            return Err(CaptureError::Config(format!(
                "envelope scale_power must be in 1..=16, got {}",
                self.envelope.scale_power
            )));
        }
        if self.envelope.level_count == 0 {
            return Err(CaptureError::Config("envelope level_count must be positive".into()));
        }
        if self.envelope.data_unit == 0 {
            return Err(CaptureError::Config("envelope data_unit must be positive".into()));
        }
        if self.stats_block == 0 {
            return Err(CaptureError::Config("stats_block must be positive".into()));
        }
        if self.leaf_block_power == 0 || self.leaf_block_power > 40 {
            return Err(CaptureError::Config(format!(
                "leaf_block_power must be in 1..=40, got {}",
                self.leaf_block_power
            )));
        }
        Ok(())
    }
}
