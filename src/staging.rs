//! Optional raw-IQ staging pipeline (copy-then-move mirroring of ring-buffer
//! files through a staging area, reimplemented over typed channels).
//!
//! The original mirrors in-use ring-buffer files into a staging directory
//! then into an archive using two `multiprocessing.Queue`s terminated by an
//! empty-string sentinel. This replaces that with a pair of bounded
//! `mpsc` channels and a typed [`StagingMsg::Close`] marker, each stage
//! run on its own thread and joined on shutdown.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::JoinHandle;

/// A unit of work on a staging channel, or the typed shutdown marker that
/// replaces the original's `""` sentinel.
pub enum StagingMsg {
    File(PathBuf),
    Close,
}

/// Handles to the two staging-pipeline threads and their input channels.
pub struct StagingPipeline {
    copy_tx: SyncSender<StagingMsg>,
    copy_thread: Option<JoinHandle<()>>,
    move_thread: Option<JoinHandle<()>>,
    staging_dir: PathBuf,
}

impl StagingPipeline {
    /// Spawns the copy and move worker threads. `data_dir`/`channel` locate
    /// the source ring-buffer files; `staging_dir` is the scratch area
    /// (`calc_ionograms.py::copy_data_files`'s `conf.data_staging_dir/<rank>`);
    /// `archive_dir` is where files land when `save_chirp_iq` is set,
    /// otherwise copied files are simply deleted after staging
    /// (`move_data_files`).
    pub fn spawn(
        data_dir: PathBuf,
        channel: String,
        staging_dir: PathBuf,
        archive_dir: PathBuf,
        save_chirp_iq: bool,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&staging_dir)?;

        let (copy_tx, copy_rx) = sync_channel::<StagingMsg>(64);
        let (move_tx, move_rx) = sync_channel::<StagingMsg>(64);

        let move_thread = std::thread::spawn(move || {
            run_move_stage(move_rx, &archive_dir, save_chirp_iq);
        });

        let copy_thread_staging_dir = staging_dir.clone();
        let copy_thread = std::thread::spawn(move || {
            run_copy_stage(copy_rx, move_tx, &data_dir, &channel, &copy_thread_staging_dir);
        });

        Ok(Self {
            copy_tx,
            copy_thread: Some(copy_thread),
            move_thread: Some(move_thread),
            staging_dir,
        })
    }

    /// Queue a ring-buffer-relative filename (e.g. `rf@1620150628.000.h5`)
    /// for staging.
    pub fn stage(&self, filename: impl Into<PathBuf>) -> Result<(), std::sync::mpsc::SendError<StagingMsg>> {
        self.copy_tx.send(StagingMsg::File(filename.into()))
    }

    /// Signal both stages to stop and wait for them to drain and exit.
    /// The staging directory is removed only after both threads have
    /// joined, so a file mid-move can never be deleted out from under it.
    pub fn shutdown(mut self) {
        let _ = self.copy_tx.send(StagingMsg::Close);
        if let Some(t) = self.copy_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.move_thread.take() {
            let _ = t.join();
        }
        let _ = std::fs::remove_dir_all(&self.staging_dir);
    }
}

fn run_copy_stage(
    rx: Receiver<StagingMsg>,
    move_tx: SyncSender<StagingMsg>,
    data_dir: &Path,
    channel: &str,
    staging_dir: &Path,
) {
    for msg in rx {
        match msg {
            StagingMsg::Close => {
                let _ = move_tx.send(StagingMsg::Close);
                break;
            }
            StagingMsg::File(filename) => {
                let src = data_dir.join(channel).join(&filename);
                let dst = staging_dir.join(&filename);
                if let Err(e) = std::fs::copy(&src, &dst) {
                    log::warn!("failed to copy {} -> {}: {}", src.display(), dst.display(), e);
                    continue;
                }
                if move_tx.send(StagingMsg::File(dst)).is_err() {
                    break;
                }
            }
        }
    }
}

fn run_move_stage(rx: Receiver<StagingMsg>, archive_dir: &Path, save_chirp_iq: bool) {
    for msg in rx {
        match msg {
            StagingMsg::Close => break,
            StagingMsg::File(staged_path) => {
                if save_chirp_iq {
                    if let Err(e) = std::fs::create_dir_all(archive_dir) {
                        log::warn!("failed to create archive dir {}: {}", archive_dir.display(), e);
                        continue;
                    }
                    let dst = archive_dir.join(staged_path.file_name().unwrap_or_default());
                    if let Err(e) = std::fs::rename(&staged_path, &dst) {
                        log::warn!("failed to move {} -> {}: {}", staged_path.display(), dst.display(), e);
                    }
                } else {
                    let _ = std::fs::remove_file(&staged_path);
                }
            }
        }
    }
}
