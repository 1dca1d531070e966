//! Bounded-time execution of blocking backend round-trips.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use tracing::{debug, warn};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs a blocking task on a worker thread and gives up after `timeout`.
///
/// A timed-out worker is left to finish on its own; its result is discarded.
#[derive(Clone, Copy, Debug)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the task result, or `default` on timeout or worker failure.
    pub fn run<T, F>(&self, task: F, default: T) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let spawned = thread::Builder::new()
            .name("peppy-command".to_string())
            .spawn(move || {
                let _ = tx.send(task());
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn command worker");
            return default;
        }

        match rx.recv_timeout(self.timeout) {
            Ok(value) => value,
            Err(RecvTimeoutError::Timeout) => {
                debug!(timeout = ?self.timeout, "Command timed out");
                default
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Command worker ended without a result");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_returns_task_result() {
        let executor = CommandExecutor::new(Duration::from_secs(1));
        assert_eq!(executor.run(|| 7, 0), 7);
    }

    #[test]
    fn test_stuck_worker_yields_default() {
        let executor = CommandExecutor::new(Duration::from_millis(100));
        // never fed: the worker stays blocked until the sender is dropped
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let started = Instant::now();
        let value = executor.run(
            move || {
                let _ = gate_rx.recv();
                vec![1]
            },
            Vec::<i32>::new(),
        );
        assert!(value.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(gate_tx);
    }

    #[test]
    fn test_panicking_worker_yields_default() {
        let executor = CommandExecutor::new(Duration::from_secs(1));
        let value = executor.run(|| -> Option<u8> { panic!("boom") }, None);
        assert_eq!(value, None);
    }
}
