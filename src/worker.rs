//! Supervisor loop: retry/backoff around a worker's per-mode processing loop.
//!
//! The original's `__main__` wraps each mode's infinite loop in a bare
//! `try/except` that logs, sleeps one second, and restarts. This is the
//! same shape with a typed backoff and `anyhow` at the boundary: anything
//! below this point that isn't a deterministic [`crate::error::ChirpError`]
//! surfaces here as a transient failure to retry.

use std::time::Duration;

/// Runs `body` forever, restarting it after `backoff` whenever it returns
/// an error. `body` owns its own termination condition (there is none at
/// the algorithmic level; this only exists to survive transient
/// I/O and source errors without taking the worker process down.
pub fn supervise<F>(worker_name: &str, backoff: Duration, mut body: F)
where
    F: FnMut() -> anyhow::Result<()>,
{
    loop {
        match body() {
            Ok(()) => {
                log::info!("{} finished without error; restarting", worker_name);
            }
            Err(e) => {
                log::error!("{} failed: {:#}", worker_name, e);
            }
        }
        std::thread::sleep(backoff);
    }
}

/// Same as [`supervise`] but returns after `max_restarts` failed attempts
/// instead of looping forever, for tests and bounded batch runs.
pub fn supervise_bounded<F>(worker_name: &str, backoff: Duration, max_restarts: usize, mut body: F) -> anyhow::Result<()>
where
    F: FnMut() -> anyhow::Result<()>,
{
    let mut attempts = 0;
    loop {
        match body() {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempts += 1;
                log::error!("{} failed (attempt {}/{}): {:#}", worker_name, attempts, max_restarts, e);
                if attempts >= max_restarts {
                    return Err(e.context(format!("{} exhausted {} restart attempts", worker_name, max_restarts)));
                }
                std::thread::sleep(backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_bounded_supervisor_retries_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let result = supervise_bounded("test-worker", Duration::from_millis(1), 5, move || {
            let n = calls2.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                anyhow::bail!("transient failure {}", n);
            }
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_bounded_supervisor_gives_up_after_max_restarts() {
        let result = supervise_bounded("test-worker", Duration::from_millis(1), 3, || {
            anyhow::bail!("always fails")
        });
        assert!(result.is_err());
    }
}
