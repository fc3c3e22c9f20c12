//! Immutable session configuration.
//!
//! The Python reference passes a mutable `chirp_config` object around by
//! attribute access. This is the replacement: a single value, validated once
//! at construction, immutable for the lifetime of a session.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ChirpError;

/// Speed of light, m/s — used only to sanity-check the range-axis formula
/// at config-validation time.
const C: f64 = 299_792_458.0;

/// One externally-scheduled sounder timing entry, used by analytic-realtime scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SounderTiming {
    /// Repeat period, seconds.
    pub rep: f64,
    /// Phase offset of the chirp's virtual zero-crossing within `rep`, seconds.
    pub chirpt: f64,
    #[serde(rename = "chirp-rate")]
    pub chirp_rate: f64,
    pub id: u16,
}

/// Every field the receiver's modules need at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub sample_rate: f64,
    pub center_freq: f64,
    pub n_samples_per_block: usize,
    /// Block-skip in the matched-filter scan (blocks analyzed = 1 every `step`).
    pub step: usize,
    pub chirp_rates: Vec<f64>,
    pub threshold_snr: f32,
    pub max_simultaneous_detections: usize,
    /// Exclusion half-width in bins for CLEAN peak picking.
    pub mfsi: usize,
    /// Number of bins either side of a detection to archive as a snippet.
    pub save_freq_idx: i64,
    pub decimation: usize,
    pub n_downconversion_threads: usize,
    pub range_resolution: f64,
    pub frequency_resolution: f64,
    pub max_range_extent: f64,
    pub maximum_analysis_frequency: f64,
    pub output_dir: String,
    pub channel: String,
    pub realtime: bool,
    pub serendipitous: bool,
    pub save_raw_voltage: bool,
    pub save_chirp_iq: bool,
    #[serde(default)]
    pub sounder_timings: Vec<Vec<SounderTiming>>,
    /// Output samples produced per `StreamingDownconverter::consume` call.
    pub sdc_step: usize,
}

impl Config {
    /// Validate cross-field invariants and return the value, or an
    /// error naming the first invariant violated.
    pub fn validate(self) -> Result<Self, ChirpError> {
        if self.sample_rate <= 0.0 {
            return Err(ChirpError::InvalidConfig("sample_rate must be > 0".into()));
        }
        if self.n_samples_per_block == 0 {
            return Err(ChirpError::InvalidConfig(
                "n_samples_per_block must be > 0".into(),
            ));
        }
        if self.chirp_rates.is_empty() {
            return Err(ChirpError::InvalidConfig(
                "chirp_rates must not be empty".into(),
            ));
        }
        if self.max_simultaneous_detections == 0 {
            return Err(ChirpError::InvalidConfig(
                "max_simultaneous_detections must be > 0".into(),
            ));
        }
        if self.decimation == 0 {
            return Err(ChirpError::InvalidConfig("decimation must be > 0".into()));
        }
        if self.sdc_step == 0 {
            return Err(ChirpError::InvalidConfig("sdc_step must be > 0".into()));
        }
        if self.n_downconversion_threads == 0 {
            return Err(ChirpError::InvalidConfig(
                "n_downconversion_threads must be > 0".into(),
            ));
        }
        if self.max_range_extent <= 0.0 {
            return Err(ChirpError::InvalidConfig(
                "max_range_extent must be > 0".into(),
            ));
        }
        if self.maximum_analysis_frequency <= 0.0 {
            return Err(ChirpError::InvalidConfig(
                "maximum_analysis_frequency must be > 0".into(),
            ));
        }
        if self.range_resolution <= 0.0 {
            return Err(ChirpError::InvalidConfig(
                "range_resolution must be > 0".into(),
            ));
        }
        if self.frequency_resolution <= 0.0 {
            return Err(ChirpError::InvalidConfig(
                "frequency_resolution must be > 0".into(),
            ));
        }
        if self.n_samples_per_block % self.decimation != 0 {
            return Err(ChirpError::InvalidConfig(format!(
                "decimation ({}) must evenly divide n_samples_per_block ({})",
                self.decimation, self.n_samples_per_block
            )));
        }
        let sr_dec = self.sample_rate / self.decimation as f64;
        for &rate in &self.chirp_rates {
            if rate <= 0.0 {
                return Err(ChirpError::InvalidConfig(
                    "chirp_rates entries must be > 0".into(),
                ));
            }
            // Mirrors the ionogram builder's fftlen derivation
            // (sr_dec * ds / range_resolution / 2, doubled to stay even).
            // A value below 2 here means the builder would silently clamp
            // to a degenerate 2-bin spectrogram for this rate.
            let ds = C / (2.0 * rate);
            let unclamped_fftlen = ((sr_dec * ds / self.range_resolution / 2.0) as i64) * 2;
            if unclamped_fftlen < 2 {
                return Err(ChirpError::InvalidConfig(format!(
                    "chirp_rate {} with decimation {} and range_resolution {} yields a degenerate fftlen",
                    rate, self.decimation, self.range_resolution
                )));
            }
        }
        Ok(self)
    }

    /// Load and validate a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ChirpError> {
        let file = File::open(path)
            .map_err(|e| ChirpError::InvalidConfig(format!("cannot open config: {}", e)))?;
        let reader = BufReader::new(file);
        let conf: Config = serde_json::from_reader(reader)
            .map_err(|e| ChirpError::InvalidConfig(format!("cannot parse config: {}", e)))?;
        conf.validate()
    }

    /// `fvec[k] = (k - N/2) * sample_rate / N`, the frequency axis after
    /// `fftshift` used throughout matched-filter detection.
    pub fn fvec(&self) -> Vec<f64> {
        let n = self.n_samples_per_block;
        let half = n as f64 / 2.0;
        (0..n)
            .map(|k| (k as f64 - half) * self.sample_rate / n as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            sample_rate: 100e3,
            center_freq: 0.0,
            n_samples_per_block: 1_000_000,
            step: 1,
            chirp_rates: vec![100e3],
            threshold_snr: 10.0,
            max_simultaneous_detections: 5,
            mfsi: 100,
            save_freq_idx: 0,
            decimation: 2500,
            n_downconversion_threads: 2,
            range_resolution: 1500.0,
            frequency_resolution: 30e3,
            max_range_extent: 1.5e6,
            maximum_analysis_frequency: 30e6,
            output_dir: "/tmp/chirpsounder".into(),
            channel: "ch0".into(),
            realtime: false,
            serendipitous: false,
            save_raw_voltage: false,
            save_chirp_iq: false,
            sounder_timings: Vec::new(),
            sdc_step: 1000,
        }
    }

    #[test]
    fn test_validates_ok_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_chirp_rates() {
        let mut c = base_config();
        c.chirp_rates.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_decimation() {
        let mut c = base_config();
        c.decimation = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rejects_decimation_that_does_not_divide_block_size() {
        let mut c = base_config();
        c.n_samples_per_block = 1_000_001;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rejects_degenerate_fftlen() {
        let mut c = base_config();
        // A very coarse range_resolution collapses sr_dec*ds/range_resolution
        // below the fftlen floor the ionogram builder would otherwise clamp
        // to silently.
        c.range_resolution = 1.0e12;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_fvec_is_centered_and_monotonic() {
        let c = base_config();
        let fv = c.fvec();
        assert_eq!(fv.len(), c.n_samples_per_block);
        assert!(fv[0] < 0.0);
        assert!(fv.windows(2).all(|w| w[0] < w[1]));
    }
}
