pub mod ingest;
pub mod source;

pub use ingest::{IngestReport, Ingestion, spawn_ingestion};
pub use source::{AcquisitionSource, WavFileSource};
