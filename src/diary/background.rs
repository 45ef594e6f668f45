//! Off-path execution of slow key derivations.
//!
//! Argon2id is meant to take hundreds of milliseconds. A caller on an
//! interactive path spawns the work here and either waits, polls, or cancels.
//! Cancelling drops the receiver; the worker still finishes, and whatever it
//! produced (a `Session` and its key included) is dropped and zeroed.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::debug;

#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<T>,
    handle: Option<JoinHandle<()>>,
}

/// Why a pending result is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PendingError {
    /// The worker panicked before producing a value.
    #[error("background task ended without a result")]
    Lost,
}

impl<T: Send + 'static> Pending<T> {
    pub fn spawn<F>(name: &str, work: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let label = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("quietquill-{name}"))
            .spawn(move || {
                let value = work();
                if tx.send(value).is_err() {
                    debug!(task = %label, "result dropped after cancel");
                }
            })
            .ok();

        // Spawning a thread only fails under resource exhaustion; with no
        // handle the receiver reports `Lost`.
        Self { rx, handle }
    }

    /// Block until the work completes.
    pub fn wait(mut self) -> Result<T, PendingError> {
        let value = self.rx.recv().map_err(|_| PendingError::Lost);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        value
    }

    /// Non-blocking poll. `Ok(None)` means still running.
    pub fn try_take(&mut self) -> Result<Option<T>, PendingError> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PendingError::Lost),
        }
    }

    /// Abandon the result without waiting.
    pub fn cancel(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn wait_returns_the_value() {
        let pending = Pending::spawn("test", || 40 + 2);
        assert_eq!(pending.wait(), Ok(42));
    }

    #[test]
    fn try_take_polls_until_ready() {
        let mut pending = Pending::spawn("test", || {
            thread::sleep(Duration::from_millis(50));
            "done"
        });
        let mut polls = 0;
        let value = loop {
            if let Some(value) = pending.try_take().unwrap() {
                break value;
            }
            polls += 1;
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(value, "done");
        assert!(polls > 0);
    }

    #[test]
    fn cancel_does_not_block_and_worker_still_finishes() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let pending = Pending::spawn("test", move || {
            thread::sleep(Duration::from_millis(30));
            flag.store(true, Ordering::SeqCst);
        });
        pending.cancel();
        assert!(!finished.load(Ordering::SeqCst));

        for _ in 0..100 {
            if finished.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("worker never finished");
    }

    #[test]
    fn panicking_worker_is_reported_lost() {
        let pending: Pending<u8> = Pending::spawn("test", || panic!("boom"));
        assert_eq!(pending.wait(), Err(PendingError::Lost));
    }
}
