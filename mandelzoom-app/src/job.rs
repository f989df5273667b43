//! Single-flight guard for long-running batch jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("a batch job is already running")]
    AlreadyRunning,

    #[error("failed to spawn job thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("job thread panicked")]
    Panicked,
}

/// At most one job may hold the slot at a time.
#[derive(Debug, Default)]
pub struct JobSlot {
    running: AtomicBool,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the slot, or fail if another job holds it.
    pub fn try_acquire(self: &Arc<Self>) -> Result<JobTicket, JobError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| JobError::AlreadyRunning)?;
        Ok(JobTicket {
            slot: Arc::clone(self),
        })
    }
}

/// Holds the slot until dropped, including during a panic unwind.
#[derive(Debug)]
pub struct JobTicket {
    slot: Arc<JobSlot>,
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
    }
}

/// Run `job` on a named background thread while holding `slot`.
pub fn spawn_job<T, F>(slot: &Arc<JobSlot>, name: &str, job: F) -> Result<JoinHandle<T>, JobError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let ticket = slot.try_acquire()?;
    let thread_name = name.to_string();
    let handle = std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            let _ticket = ticket;
            debug!(job = %thread_name, "Job thread started");
            let out = job();
            info!(job = %thread_name, "Job thread finished");
            out
        })?;
    Ok(handle)
}

/// Wait for a job thread, mapping a panic to [`JobError::Panicked`].
pub fn join_job<T>(handle: JoinHandle<T>) -> Result<T, JobError> {
    handle.join().map_err(|_| JobError::Panicked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn second_acquire_is_rejected() {
        let slot = Arc::new(JobSlot::new());
        let ticket = slot.try_acquire().unwrap();
        assert!(slot.is_running());
        assert!(matches!(slot.try_acquire(), Err(JobError::AlreadyRunning)));
        drop(ticket);
        assert!(!slot.is_running());
        assert!(slot.try_acquire().is_ok());
    }

    #[test]
    fn spawn_rejects_while_running() {
        let slot = Arc::new(JobSlot::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let handle = spawn_job(&slot, "blocking-job", move || {
            let _ = release_rx.recv();
            7
        })
        .unwrap();

        assert!(matches!(
            spawn_job(&slot, "second-job", || 0),
            Err(JobError::AlreadyRunning)
        ));
        release_tx.send(()).unwrap();
        assert_eq!(join_job(handle).unwrap(), 7);
        assert!(!slot.is_running());
    }

    #[test]
    fn slot_is_released_after_panic() {
        let slot = Arc::new(JobSlot::new());
        let handle = spawn_job(&slot, "panicking-job", || -> u32 { panic!("boom") }).unwrap();
        assert!(matches!(join_job(handle), Err(JobError::Panicked)));
        assert!(!slot.is_running());
    }
}
