pub mod acquisition;
pub mod config;
pub mod constants;
pub mod error;
pub mod snapshot;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use config::{CaptureMode, StoreConfig};
pub use error::{CaptureError, Result};
pub use snapshot::{EnvelopeStore, SampleStore, Snapshot};
