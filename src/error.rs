use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Unit size must be positive")]
    InvalidUnitSize,

    #[error("Session has no enabled channels")]
    NoEnabledChannels,

    #[error("Block length mismatch: expected {expected} bytes, got {actual}")]
    BlockLength { expected: usize, actual: usize },

    #[error("Sample range {start}..={end} outside capture of {sample_count} samples")]
    SampleRange {
        start: u64,
        end: u64,
        sample_count: u64,
    },

    #[error("Channel {index} out of range ({channel_count} channels)")]
    ChannelOutOfRange { index: usize, channel_count: usize },

    #[error("Channel {0} is disabled in this session")]
    ChannelDisabled(usize),

    #[error("Minimum visual length must be positive, got {0}")]
    InvalidMinLength(f64),

    #[error("Block {index} out of range ({block_count} blocks)")]
    BlockIndex { index: usize, block_count: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
