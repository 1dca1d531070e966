//! Listener registry shared by every backend adapter.
//!
//! Three independent categories are kept: volume, player status and end of
//! track. Registration goes through a per-registry reentrant lock.
//! Notification only holds that lock long enough to clone an `Arc` snapshot of
//! the list, so a callback that adds or removes listeners cannot deadlock, and
//! sees its change applied from the next notification on.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::ReentrantMutex;
use tracing::trace;

use crate::model::PlayerStatus;

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type VolumeListener = Listener<u8>;
pub type PlayerListener = Listener<PlayerStatus>;
pub type EndOfTrackListener = Listener<()>;

/// Ordered set of callbacks, compared by `Arc` identity.
struct ListenerSet<T> {
    entries: Arc<Vec<Listener<T>>>,
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Vec::new()),
        }
    }
}

fn same_listener<T>(a: &Listener<T>, b: &Listener<T>) -> bool {
    // Compare data pointers only; vtable pointers are not unique.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl<T> ListenerSet<T> {
    fn contains(&self, listener: &Listener<T>) -> bool {
        self.entries.iter().any(|l| same_listener(l, listener))
    }

    fn add(&mut self, listener: Listener<T>) -> bool {
        if self.contains(&listener) {
            return false;
        }
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend(self.entries.iter().cloned());
        entries.push(listener);
        self.entries = Arc::new(entries);
        true
    }

    fn remove(&mut self, listener: &Listener<T>) -> bool {
        if !self.contains(listener) {
            return false;
        }
        let entries: Vec<_> = self
            .entries
            .iter()
            .filter(|l| !same_listener(l, listener))
            .cloned()
            .collect();
        self.entries = Arc::new(entries);
        true
    }

    fn snapshot(&self) -> Arc<Vec<Listener<T>>> {
        Arc::clone(&self.entries)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Default)]
struct ListenerTables {
    volume: ListenerSet<u8>,
    player: ListenerSet<PlayerStatus>,
    end_of_track: ListenerSet<()>,
}

/// Volume / player-status / end-of-track fan-out for one adapter.
pub struct ListenerRegistry {
    tables: ReentrantMutex<RefCell<ListenerTables>>,
    enabled: AtomicBool,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("enabled", &self.is_enabled())
            .field("volume", &self.volume_listener_count())
            .field("player", &self.player_listener_count())
            .field("end_of_track", &self.end_of_track_listener_count())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            tables: ReentrantMutex::new(RefCell::new(ListenerTables::default())),
            enabled: AtomicBool::new(true),
        }
    }

    fn with_tables<R>(&self, f: impl FnOnce(&mut ListenerTables) -> R) -> R {
        let guard = self.tables.lock();
        let mut tables = guard.borrow_mut();
        f(&mut tables)
    }

    /// Globally silences (or re-enables) every notification of this registry.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn add_volume_listener(&self, listener: VolumeListener) -> bool {
        self.with_tables(|t| t.volume.add(listener))
    }

    pub fn remove_volume_listener(&self, listener: &VolumeListener) -> bool {
        self.with_tables(|t| t.volume.remove(listener))
    }

    pub fn add_player_listener(&self, listener: PlayerListener) -> bool {
        self.with_tables(|t| t.player.add(listener))
    }

    pub fn remove_player_listener(&self, listener: &PlayerListener) -> bool {
        self.with_tables(|t| t.player.remove(listener))
    }

    pub fn add_end_of_track_listener(&self, listener: EndOfTrackListener) -> bool {
        self.with_tables(|t| t.end_of_track.add(listener))
    }

    pub fn remove_end_of_track_listener(&self, listener: &EndOfTrackListener) -> bool {
        self.with_tables(|t| t.end_of_track.remove(listener))
    }

    pub fn notify_volume_listeners(&self, volume: u8) {
        if !self.is_enabled() {
            return;
        }
        let listeners = self.with_tables(|t| t.volume.snapshot());
        trace!(count = listeners.len(), volume, "Notifying volume listeners");
        for listener in listeners.iter() {
            listener(&volume);
        }
    }

    pub fn notify_player_listeners(&self, status: &PlayerStatus) {
        if !self.is_enabled() {
            return;
        }
        let listeners = self.with_tables(|t| t.player.snapshot());
        trace!(count = listeners.len(), status = %status.to_json(), "Notifying player listeners");
        for listener in listeners.iter() {
            listener(status);
        }
    }

    pub fn notify_end_of_track_listeners(&self) {
        if !self.is_enabled() {
            return;
        }
        let listeners = self.with_tables(|t| t.end_of_track.snapshot());
        trace!(count = listeners.len(), "Notifying end-of-track listeners");
        for listener in listeners.iter() {
            listener(&());
        }
    }

    pub fn volume_listener_count(&self) -> usize {
        self.with_tables(|t| t.volume.len())
    }

    pub fn player_listener_count(&self) -> usize {
        self.with_tables(|t| t.player.len())
    }

    pub fn end_of_track_listener_count(&self) -> usize {
        self.with_tables(|t| t.end_of_track.len())
    }

    /// Registers every listener of `other` here, keeping its order.
    pub fn absorb(&self, other: &ListenerRegistry) {
        let (volume, player, end_of_track) = other.with_tables(|t| {
            (
                t.volume.snapshot(),
                t.player.snapshot(),
                t.end_of_track.snapshot(),
            )
        });
        self.with_tables(|t| {
            for l in volume.iter() {
                t.volume.add(Arc::clone(l));
            }
            for l in player.iter() {
                t.player.add(Arc::clone(l));
            }
            for l in end_of_track.iter() {
                t.end_of_track.add(Arc::clone(l));
            }
        });
    }

    /// Drops every registration, e.g. once they moved to a replacement backend.
    pub fn clear(&self) {
        self.with_tables(|t| *t = ListenerTables::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> VolumeListener {
        let log = Arc::clone(log);
        let name = name.to_string();
        Arc::new(move |v: &u8| log.lock().push(format!("{}:{}", name, v)))
    }

    #[test]
    fn test_add_is_idempotent_and_ordered() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");

        assert!(registry.add_volume_listener(Arc::clone(&a)));
        assert!(registry.add_volume_listener(Arc::clone(&b)));
        assert!(!registry.add_volume_listener(Arc::clone(&a)));
        assert_eq!(registry.volume_listener_count(), 2);

        registry.notify_volume_listeners(7);
        assert_eq!(*log.lock(), vec!["a:7".to_string(), "b:7".to_string()]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&log, "a");
        let never_added = recorder(&log, "x");

        registry.add_volume_listener(Arc::clone(&a));
        assert!(!registry.remove_volume_listener(&never_added));
        assert!(registry.remove_volume_listener(&a));
        assert!(!registry.remove_volume_listener(&a));

        registry.notify_volume_listeners(1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_disabled_registry_does_not_notify() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.add_volume_listener(recorder(&log, "a"));

        registry.set_enabled(false);
        registry.notify_volume_listeners(3);
        assert!(log.lock().is_empty());

        registry.set_enabled(true);
        registry.notify_volume_listeners(4);
        assert_eq!(*log.lock(), vec!["a:4".to_string()]);
    }

    #[test]
    fn test_callback_may_mutate_registry() {
        let registry = Arc::new(ListenerRegistry::new());
        let calls = Arc::new(Mutex::new(0usize));

        let self_removing: PlayerListener = {
            let registry = Arc::clone(&registry);
            let calls = Arc::clone(&calls);
            let slot: Arc<Mutex<Option<PlayerListener>>> = Arc::new(Mutex::new(None));
            let inner_slot = Arc::clone(&slot);
            let listener: PlayerListener = Arc::new(move |_status: &PlayerStatus| {
                *calls.lock() += 1;
                if let Some(me) = inner_slot.lock().take() {
                    registry.remove_player_listener(&me);
                }
            });
            *slot.lock() = Some(Arc::clone(&listener));
            listener
        };

        registry.add_player_listener(self_removing);
        registry.notify_player_listeners(&PlayerStatus::default());
        registry.notify_player_listeners(&PlayerStatus::default());

        assert_eq!(*calls.lock(), 1);
        assert_eq!(registry.player_listener_count(), 0);
    }

    #[test]
    fn test_absorb_copies_all_categories() {
        let old = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        old.add_volume_listener(recorder(&log, "a"));
        old.add_end_of_track_listener(Arc::new(|_: &()| {}));

        let new = ListenerRegistry::new();
        new.absorb(&old);
        new.absorb(&old);

        assert_eq!(new.volume_listener_count(), 1);
        assert_eq!(new.end_of_track_listener_count(), 1);
        assert_eq!(new.player_listener_count(), 0);
    }
}
