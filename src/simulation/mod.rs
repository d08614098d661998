mod signal;
mod source;

pub use signal::{SimulationConfig, Waveform, generate_interleaved};
pub use source::SimulatedSource;
