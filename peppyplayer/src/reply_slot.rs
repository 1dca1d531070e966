//! Single-value rendezvous between a command issuer and a listener thread.
//!
//! The issuer sends a query to the backend and blocks on the slot; the
//! listener thread fills it when the matching answer line shows up.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::trace;

pub struct ReplySlot<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> Default for ReplySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReplySlot<T> {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    /// Discards a stale reply, runs `send`, then waits up to `timeout`.
    ///
    /// Returns `None` if `send` reports failure or no reply arrives in time.
    pub fn request(&self, send: impl FnOnce() -> bool, timeout: Duration) -> Option<T> {
        while self.receiver.try_recv().is_ok() {}
        if !send() {
            return None;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(_) => {
                trace!(?timeout, "Reply slot timed out");
                None
            }
        }
    }

    /// Fills the slot. An unclaimed earlier value is kept and `value` dropped.
    pub fn resolve(&self, value: T) {
        let _ = self.sender.try_send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_reply_from_other_thread() {
        let slot = Arc::new(ReplySlot::<f64>::new());
        let filler = Arc::clone(&slot);
        let answer = slot.request(
            move || {
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(20));
                    filler.resolve(12.5);
                });
                true
            },
            Duration::from_secs(2),
        );
        assert_eq!(answer, Some(12.5));
    }

    #[test]
    fn test_stale_reply_is_discarded() {
        let slot = ReplySlot::<u8>::new();
        slot.resolve(1);
        assert_eq!(slot.request(|| true, Duration::from_millis(20)), None);
    }

    #[test]
    fn test_failed_send_returns_none() {
        let slot = ReplySlot::<u8>::new();
        assert_eq!(slot.request(|| false, Duration::from_secs(5)), None);
    }
}
