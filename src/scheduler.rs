//! Work scheduler: batch, analytic-realtime, and serendipitous modes.
//!
//! Three disjoint modes decide *which* parameter record to feed to C5/C6
//! next. None of them touch the sample-processing hot path; all state here
//! is filesystem metadata and wall-clock bookkeeping.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::config::SounderTiming;

/// One unit of scheduled work: where to find the parameter record and the
/// `(t0, chirp_rate, id)` it names.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledChirp {
    pub t0: f64,
    pub chirp_rate: f64,
    pub id: u16,
    pub source_path: Option<PathBuf>,
}

/// Batch mode: enumerate parameter records under the output tree and
/// partition them `idx mod worker_count == worker_id`.
///
/// `par_files` is the full sorted listing (glob `par-*.h5` in the original);
/// callers own the directory walk so this function stays pure and testable.
pub fn batch_partition(
    par_files: &[(PathBuf, f64, f64)],
    worker_id: usize,
    worker_count: usize,
) -> Vec<ScheduledChirp> {
    assert!(worker_count > 0);
    par_files
        .iter()
        .enumerate()
        .filter(|(idx, _)| idx % worker_count == worker_id)
        .map(|(_, (path, t0, chirp_rate))| ScheduledChirp {
            t0: *t0,
            chirp_rate: *chirp_rate,
            id: 0,
            source_path: Some(path.clone()),
        })
        .collect()
}

/// Analytic realtime mode: given the sounder timings assigned to this
/// worker and the current time, pick the sounder with the soonest next
/// firing time (`calc_ionograms.py::analyze_realtime`).
///
/// Ties (two sounders with identical `wait_time`) resolve to the first
/// entry in `timings`, matching the original's strict `<` comparison.
pub fn next_analytic_chirp(timings: &[SounderTiming], t_now: f64) -> Option<ScheduledChirp> {
    let mut best: Option<(f64, &SounderTiming)> = None;
    for timing in timings {
        let mut try_t0 = timing.rep * (t_now / timing.rep).floor() + timing.chirpt;
        while try_t0 < t_now {
            try_t0 += timing.rep;
        }
        let wait_time = try_t0 - t_now;
        match best {
            Some((best_wait, _)) if wait_time >= best_wait => {}
            _ => best = Some((wait_time, timing)),
        }
    }
    best.map(|(wait_time, timing)| ScheduledChirp {
        t0: t_now + wait_time,
        chirp_rate: timing.chirp_rate,
        id: timing.id,
        source_path: None,
    })
}

/// Serendipitous mode: claim an unclaimed parameter file by atomically
/// creating its `.done` sentinel.
///
/// The original creates `<parfile>.done` *after* deciding to process,
/// which races two workers against the same file on some filesystems.
/// Here the create *is* the claim: exactly
/// one concurrent caller observes `Ok(true)`.
pub fn try_claim(par_file: &Path) -> std::io::Result<bool> {
    let done_path = done_sentinel_path(par_file);
    match OpenOptions::new().write(true).create_new(true).open(&done_path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn done_sentinel_path(par_file: &Path) -> PathBuf {
    let mut s = par_file.as_os_str().to_os_string();
    s.push(".done");
    PathBuf::from(s)
}

/// Decide whether a claimed parameter record is still analyzable: the
/// ring buffer's lower bound must still be before the chirp's sweep ends.
///
/// `dur = maximum_analysis_frequency / chirp_rate`.
pub fn still_in_buffer(buffer_t0: f64, t0: f64, dur: f64) -> bool {
    buffer_t0 < t0 + dur
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_batch_partition_splits_by_index_modulo_worker_count() {
        let files: Vec<(PathBuf, f64, f64)> = (0..6)
            .map(|i| (PathBuf::from(format!("par-{}.h5", i)), i as f64, 100e3))
            .collect();
        let w0 = batch_partition(&files, 0, 3);
        let w1 = batch_partition(&files, 1, 3);
        let w2 = batch_partition(&files, 2, 3);
        assert_eq!(w0.len() + w1.len() + w2.len(), 6);
        assert_eq!(w0.iter().map(|c| c.t0 as i64).collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(w1.iter().map(|c| c.t0 as i64).collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(w2.iter().map(|c| c.t0 as i64).collect::<Vec<_>>(), vec![2, 5]);
    }

    fn timing(rep: f64, chirpt: f64, rate: f64, id: u16) -> SounderTiming {
        SounderTiming {
            rep,
            chirpt,
            chirp_rate: rate,
            id,
        }
    }

    #[test]
    fn test_picks_soonest_firing_sounder() {
        let timings = vec![
            timing(60.0, 0.0, 100e3, 1),  // next fire at t=60
            timing(10.0, 2.0, 150e3, 2),  // next fire at t=12
        ];
        let sched = next_analytic_chirp(&timings, 5.0).unwrap();
        assert_eq!(sched.id, 2);
        assert!((sched.t0 - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_break_favors_first_entry() {
        let timings = vec![timing(10.0, 0.0, 100e3, 1), timing(10.0, 0.0, 200e3, 2)];
        let sched = next_analytic_chirp(&timings, 0.0).unwrap();
        assert_eq!(sched.id, 1);
    }

    #[test]
    fn test_schedule_miss_when_buffer_has_moved_past() {
        assert!(!still_in_buffer(100.0, 0.0, 50.0));
        assert!(still_in_buffer(40.0, 0.0, 50.0));
    }

    /// Invariant 7: two concurrent claims on the same parameter file — only
    /// one succeeds.
    #[test]
    fn test_only_one_claim_succeeds() {
        let dir = std::env::temp_dir().join(format!("chirpsounder-claim-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let par_file = dir.join("par-test.h5");
        std::fs::write(&par_file, b"").unwrap();
        let done = done_sentinel_path(&par_file);
        let _ = std::fs::remove_file(&done);

        let first = try_claim(&par_file).unwrap();
        let second = try_claim(&par_file).unwrap();
        assert!(first);
        assert!(!second);

        let _ = std::fs::remove_file(&done);
        let _ = std::fs::remove_file(&par_file);
        let _ = std::fs::remove_dir(&dir);
    }
}
