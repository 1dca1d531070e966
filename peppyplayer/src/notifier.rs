//! Dedicated end-of-track notifier thread.
//!
//! Listener loops must not run end-of-track callbacks inline: those callbacks
//! usually start the next track, which talks to the same backend. Events are
//! queued on a bounded channel and delivered from a separate thread instead.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::listeners::ListenerRegistry;

const QUEUE_CAPACITY: usize = 16;

struct Worker {
    sender: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct EndOfTrackNotifier {
    name: String,
    worker: Mutex<Option<Worker>>,
}

impl EndOfTrackNotifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker: Mutex::new(None),
        }
    }

    /// Starts the notifier thread delivering to `listeners`. Idempotent.
    pub fn start(&self, listeners: Arc<ListenerRegistry>) {
        let mut guard = self.worker.lock();
        if guard.is_some() {
            return;
        }
        let (sender, receiver) = bounded::<()>(QUEUE_CAPACITY);
        let spawned = thread::Builder::new()
            .name(format!("{}-eot", self.name))
            .spawn(move || {
                for () in receiver.iter() {
                    listeners.notify_end_of_track_listeners();
                }
            });
        match spawned {
            Ok(handle) => *guard = Some(Worker { sender, handle }),
            Err(e) => warn!(notifier = %self.name, error = %e, "Failed to spawn end-of-track notifier"),
        }
    }

    /// Queues one end-of-track event. Dropped with a warning when the queue
    /// is full or the notifier is not running.
    pub fn notify(&self) {
        let guard = self.worker.lock();
        let Some(worker) = guard.as_ref() else {
            debug!(notifier = %self.name, "End of track ignored, notifier not running");
            return;
        };
        match worker.sender.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {
                warn!(notifier = %self.name, "End-of-track queue full, event dropped")
            }
            Err(TrySendError::Disconnected(())) => {
                debug!(notifier = %self.name, "End-of-track queue closed")
            }
        }
    }

    /// Closes the queue and joins the thread once pending events are delivered.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let Worker { sender, handle } = worker;
        drop(sender);
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!(notifier = %self.name, "End-of-track notifier panicked");
        }
    }
}

impl Drop for EndOfTrackNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_events_run_on_notifier_thread() {
        let registry = Arc::new(ListenerRegistry::new());
        let count = Arc::new(AtomicUsize::new(0));
        let names = Arc::new(Mutex::new(Vec::new()));
        {
            let count = Arc::clone(&count);
            let names = Arc::clone(&names);
            registry.add_end_of_track_listener(Arc::new(move |_: &()| {
                count.fetch_add(1, Ordering::SeqCst);
                names
                    .lock()
                    .push(thread::current().name().map(str::to_string));
            }));
        }

        let notifier = EndOfTrackNotifier::new("test");
        notifier.start(Arc::clone(&registry));
        notifier.notify();
        notifier.notify();
        notifier.shutdown();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(
            names
                .lock()
                .iter()
                .all(|n| n.as_deref() == Some("test-eot"))
        );
    }

    #[test]
    fn test_notify_before_start_is_dropped() {
        let notifier = EndOfTrackNotifier::new("idle");
        notifier.notify();
        notifier.shutdown();
        notifier.shutdown();
    }
}
