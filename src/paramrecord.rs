//! Parameter record and detection record data types.

use serde::{Deserialize, Serialize};

/// Persistent tuple produced by the matched-filter bank (C4) and consumed
/// by the work scheduler (C7). Immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub t0: f64,
    pub chirp_rate: f64,
    pub id: u16,
    pub detected_snr: f32,
    pub detected_at: i64,
}

/// The on-disk detection record written by the matched-filter bank:
/// `chirp-<rate_khz:.2f>-<i0>.h5` in the original; here the filename is
/// produced by [`detection_record_stem`] and the payload by this struct.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub f0: f64,
    pub i0: i64,
    pub sample_rate: f64,
    pub n_samples: usize,
    pub chirp_time: f64,
    pub chirp_rate: f64,
}

/// `chirp-<rate_khz:.2f>-<i0>.h5`, minus the HDF5 extension —
/// see `artifact.rs` for the concrete container format this crate uses.
pub fn detection_record_stem(chirp_rate: f64, i0: i64) -> String {
    format!("chirp-{:.2}-{}", chirp_rate / 1e3, i0)
}
