//! Artifact store: detection-record and ionogram persistence.
//!
//! Two artifact kinds, both best-effort: a write failure is logged and
//! does not abort the pipeline. The Python reference stores each as an
//! HDF5 file; HDF5 itself is out of scope here, so this crate uses
//! `serde_json` as the concrete container format.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ionogram::Ionogram;
use crate::paramrecord::{detection_record_stem, DetectionRecord};

/// Day-bucketed directory name for a unix timestamp, `YYYY-MM-DD`
/// (`chirp_det.py::unix2dirname`).
pub fn day_dir_name(unix_time: f64) -> String {
    let days = (unix_time / 86_400.0).floor() as i64;
    let (y, m, d) = civil_from_days(days);
    format!("{:04}-{:02}-{:02}", y, m, d)
}

/// Howard Hinnant's `civil_from_days`: days since the Unix epoch to a
/// proleptic Gregorian `(year, month, day)`. No external date crate is
/// needed for a single day-bucket computation.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

/// Writes detection records, ionograms, and parameter files into
/// `<output_dir>/<YYYY-MM-DD>/...`, logging and swallowing I/O
/// failures rather than propagating them.
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn day_dir(&self, t0: f64) -> PathBuf {
        self.output_dir.join(day_dir_name(t0))
    }

    fn ensure_day_dir(&self, t0: f64) -> std::io::Result<PathBuf> {
        let dir = self.day_dir(t0);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// `chirp-<rate_khz:.2f>-<i0>.h5`, JSON-encoded.
    pub fn write_detection_record(&self, t0: f64, record: &DetectionRecord) {
        match self.ensure_day_dir(t0) {
            Ok(dir) => {
                let path = dir.join(format!("{}.json", detection_record_stem(record.chirp_rate, record.i0)));
                if let Err(e) = write_json(&path, record) {
                    log::warn!("failed to write detection record {}: {}", path.display(), e);
                }
            }
            Err(e) => log::warn!("failed to create output directory for t0={}: {}", t0, e),
        }
    }

    /// `lfm_ionogram-<id:03d>-<t0:.2f>.h5`, JSON-encoded.
    pub fn write_ionogram(&self, ionogram: &Ionogram) {
        match self.ensure_day_dir(ionogram.t0) {
            Ok(dir) => {
                let path = dir.join(format!("lfm_ionogram-{:03}-{:.2}.json", ionogram.id, ionogram.t0));
                if let Err(e) = write_json(&path, &IonogramRecord::from(ionogram)) {
                    log::warn!("failed to write ionogram {}: {}", path.display(), e);
                }
            }
            Err(e) => log::warn!(
                "failed to create output directory for t0={}: {}",
                ionogram.t0,
                e
            ),
        }
    }

    /// `par-<rate_khz:.2f>-<i0>.h5` equivalent, written by C4's caller so
    /// the work scheduler has something to glob/claim.
    pub fn write_parameter_file(&self, t0: f64, chirp_rate: f64, i0: i64) -> std::io::Result<PathBuf> {
        let dir = self.ensure_day_dir(t0)?;
        let path = dir.join(format!("par-{:.2}-{}.json", chirp_rate / 1e3, i0));
        write_json(&path, &ParameterFile { t0, chirp_rate })?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ParameterFile {
    t0: f64,
    chirp_rate: f64,
}

/// On-disk shape of an ionogram artifact: `S` flattened row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IonogramRecord {
    s: Vec<f32>,
    n_freq: usize,
    n_range: usize,
    freqs: Vec<f64>,
    rate: f64,
    ranges: Vec<f64>,
    t0: f64,
    id: u16,
    sr: f64,
    ch: String,
}

impl From<&Ionogram> for IonogramRecord {
    fn from(iono: &Ionogram) -> Self {
        Self {
            s: iono.s.clone(),
            n_freq: iono.n_freq,
            n_range: iono.n_range,
            freqs: iono.freqs.clone(),
            rate: iono.rate,
            ranges: iono.ranges.clone(),
            t0: iono.t0,
            id: iono.id,
            sr: iono.sr_dec,
            ch: iono.channel.clone(),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer(file, value).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}
