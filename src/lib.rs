pub mod artifact;
pub mod chirp;
pub mod config;
pub mod downconvert;
pub mod error;
pub mod ionogram;
pub mod mfbank;
pub mod paramrecord;
pub mod sample_source;
pub mod scheduler;
pub mod staging;
pub mod whiten;
pub mod window;
pub mod worker;

// Re-exports for convenience
pub use config::{Config, SounderTiming};
pub use downconvert::StreamingDownconverter;
pub use error::ChirpError;
pub use ionogram::{build_ionogram, Ionogram, WaitOutcome};
pub use mfbank::ChirpMatchedFilterBank;
pub use paramrecord::{detection_record_stem, DetectionRecord, ParameterRecord};
pub use sample_source::{SampleSource, SourceMetadata};
pub use scheduler::{batch_partition, next_analytic_chirp, try_claim, ScheduledChirp};
