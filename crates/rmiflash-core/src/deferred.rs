//! One-shot deferred check
//!
//! Runs a job once on a worker thread after a delay, unless cancelled
//! first. Used to schedule the start-up firmware check without blocking
//! device initialization.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A job scheduled to run once after a delay
pub struct DeferredCheck<T> {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<Option<T>>>,
}

impl<T: Send + 'static> DeferredCheck<T> {
    /// Schedule `job` to run after `delay`
    pub fn schedule<F>(delay: Duration, job: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let handle = thread::spawn(move || match cancelled.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => Some(job()),
            // Cancelled, or the handle was dropped
            Ok(()) | Err(RecvTimeoutError::Disconnected) => None,
        });

        Self {
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }

    /// Cancel the job if it has not started yet
    ///
    /// Returns the job's result if it already ran, `None` otherwise. A job
    /// that is running when this is called is waited for.
    pub fn cancel(mut self) -> Option<T> {
        if let Some(cancel) = self.cancel.take() {
            // Fails only if the worker already finished waiting
            let _ = cancel.send(());
        }
        self.join()
    }

    /// Wait for the job to run and return its result
    ///
    /// Returns `None` if the job was cancelled or panicked.
    pub fn wait(mut self) -> Option<T> {
        self.join()
    }

    fn join(&mut self) -> Option<T> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                log::error!("Deferred check panicked");
                None
            }
        }
    }
}

impl<T> Drop for DeferredCheck<T> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_after_delay() {
        let check = DeferredCheck::schedule(Duration::from_millis(10), || 42);
        assert_eq!(check.wait(), Some(42));
    }

    #[test]
    fn test_cancel_before_run() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let check = DeferredCheck::schedule(Duration::from_secs(60), move || {
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(check.cancel(), None);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_cancels() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        drop(DeferredCheck::schedule(Duration::from_secs(60), move || {
            flag.store(true, Ordering::SeqCst);
        }));
        assert!(!ran.load(Ordering::SeqCst));
    }
}
