//! Start/stop/join wrapper for the one listener thread an adapter owns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Shared stop flag handed to the thread body.
///
/// The body must check it after every blocking read and return once it is
/// set.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.is_stopped()
    }

    fn set(&self, stopped: bool) {
        self.0.store(stopped, Ordering::SeqCst);
    }

    /// Sleeps `total` in short slices, returning early when stopped.
    /// Returns `true` if the flag was raised.
    pub fn sleep(&self, total: std::time::Duration) -> bool {
        let slice = std::time::Duration::from_millis(50);
        let deadline = std::time::Instant::now() + total;
        while std::time::Instant::now() < deadline {
            if self.is_stopped() {
                return true;
            }
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            thread::sleep(left.min(slice));
        }
        self.is_stopped()
    }
}

#[derive(Debug)]
pub struct ListenerThread {
    name: String,
    stop_flag: StopFlag,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerThread {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stop_flag: StopFlag::default(),
            handle: Mutex::new(None),
        }
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop_flag.clone()
    }

    /// Returns true if a thread was started and has not been stopped.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Spawns `body` unless a thread is already alive.
    ///
    /// Returns `false` when nothing was started.
    pub fn start<F>(&self, body: F) -> bool
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        let mut handle_guard = self.handle.lock();
        if let Some(handle) = handle_guard.as_ref() {
            if !handle.is_finished() {
                return false; // Already running
            }
        }
        if let Some(finished) = handle_guard.take() {
            let _ = finished.join();
        }

        self.stop_flag.set(false);
        let flag = self.stop_flag.clone();
        match thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || body(flag))
        {
            Ok(handle) => {
                debug!(thread = %self.name, "Listener thread started");
                *handle_guard = Some(handle);
                true
            }
            Err(e) => {
                warn!(thread = %self.name, error = %e, "Failed to spawn listener thread");
                self.stop_flag.set(true);
                false
            }
        }
    }

    /// Raises the stop flag and joins the thread.
    pub fn stop(&self) -> bool {
        self.stop_with(|| {})
    }

    /// Raises the stop flag, runs `wake` to unblock a pending read, then joins.
    ///
    /// Idempotent: returns `false` when no thread was running.
    pub fn stop_with(&self, wake: impl FnOnce()) -> bool {
        self.stop_flag.set(true);
        let Some(handle) = self.handle.lock().take() else {
            return false;
        };
        wake();
        if handle.thread().id() == thread::current().id() {
            // Stopped from its own callback; the loop exits on the flag.
            return true;
        }
        if handle.join().is_err() {
            warn!(thread = %self.name, "Listener thread panicked");
        }
        debug!(thread = %self.name, "Listener thread stopped");
        true
    }
}

impl Drop for ListenerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_stop_without_start_is_noop() {
        let thread = ListenerThread::new("test-idle");
        assert!(!thread.stop());
        assert!(!thread.stop());
        assert!(!thread.is_running());
    }

    #[test]
    fn test_start_twice_spawns_once() {
        let thread = ListenerThread::new("test-loop");
        let spawned = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let spawned = Arc::clone(&spawned);
            thread.start(move |flag| {
                spawned.fetch_add(1, Ordering::SeqCst);
                while flag.is_running() {
                    std::thread::sleep(Duration::from_millis(5));
                }
            });
        }

        assert!(thread.is_running());
        assert!(thread.stop());
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert!(!thread.is_running());
    }

    #[test]
    fn test_restart_after_stop() {
        let thread = ListenerThread::new("test-restart");
        assert!(thread.start(|flag| while flag.is_running() {
            std::thread::sleep(Duration::from_millis(5));
        }));
        thread.stop();
        assert!(thread.start(|_| {}));
        thread.stop();
    }

    #[test]
    fn test_stop_flag_sleep_returns_early() {
        let flag = StopFlag::default();
        flag.set(true);
        let started = std::time::Instant::now();
        assert!(flag.sleep(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
