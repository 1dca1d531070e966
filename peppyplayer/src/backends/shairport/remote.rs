//! shairport-sync remote control over the system D-Bus.

use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use zbus::blocking::{Connection, Proxy};

use crate::errors::PlayerError;

pub const DBUS_DESTINATION: &str = "org.gnome.ShairportSync";
pub const DBUS_PATH: &str = "/org/gnome/ShairportSync";
pub const DBUS_INTERFACE: &str = "org.gnome.ShairportSync.RemoteControl";

/// Command side of the Shairport backend.
pub trait RemoteControl: Send + Sync {
    /// Invokes a no-argument method (`Play`, `Pause`, `Next`, `VolumeUp`, ...).
    fn call(&self, method: &str) -> Result<(), PlayerError>;

    /// `AirplayVolume` property (about -30.0 to 0.0).
    fn airplay_volume(&self) -> Result<f64, PlayerError>;

    /// `PlayerState` property (`Playing`, `Paused`, `Stopped`).
    fn player_state(&self) -> Result<String, PlayerError>;
}

pub struct DbusRemoteControl {
    proxy: Mutex<Option<Proxy<'static>>>,
    attempts: u32,
    delay: Duration,
}

fn open_proxy() -> Result<Proxy<'static>, PlayerError> {
    let connection = Connection::system()?;
    Ok(Proxy::new(
        &connection,
        DBUS_DESTINATION,
        DBUS_PATH,
        DBUS_INTERFACE,
    )?)
}

impl DbusRemoteControl {
    /// Acquires the proxy, retrying `attempts` times `delay` apart. When every
    /// attempt fails the remote stays usable in degraded mode and retries on
    /// the next call.
    pub fn connect(attempts: u32, delay: Duration) -> Self {
        let remote = Self {
            proxy: Mutex::new(None),
            attempts: attempts.max(1),
            delay,
        };
        let mut proxy = None;
        for attempt in 1..=remote.attempts {
            match open_proxy() {
                Ok(p) => {
                    info!(attempt, "Shairport D-Bus remote acquired");
                    proxy = Some(p);
                    break;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Shairport D-Bus remote unavailable");
                    if attempt < remote.attempts {
                        thread::sleep(remote.delay);
                    }
                }
            }
        }
        if proxy.is_none() {
            warn!(attempts = remote.attempts, "Shairport remote control unavailable");
        }
        *remote.proxy.lock() = proxy;
        remote
    }

    fn with_proxy<T>(
        &self,
        op: impl Fn(&Proxy<'static>) -> Result<T, PlayerError>,
    ) -> Result<T, PlayerError> {
        let mut guard = self.proxy.lock();
        if guard.is_none() {
            *guard = Some(open_proxy()?);
        }
        let Some(proxy) = guard.as_ref() else {
            return Err(PlayerError::Dbus("No D-Bus proxy".to_string()));
        };
        match op(proxy) {
            Ok(value) => Ok(value),
            Err(first) => {
                debug!(error = %first, "Shairport D-Bus call failed, reinitializing");
                let fresh = open_proxy()?;
                let result = op(&fresh);
                *guard = Some(fresh);
                result
            }
        }
    }
}

impl RemoteControl for DbusRemoteControl {
    fn call(&self, method: &str) -> Result<(), PlayerError> {
        self.with_proxy(|p| {
            p.call_method(method, &())?;
            Ok(())
        })
    }

    fn airplay_volume(&self) -> Result<f64, PlayerError> {
        self.with_proxy(|p| Ok(p.get_property::<f64>("AirplayVolume")?))
    }

    fn player_state(&self) -> Result<String, PlayerError> {
        self.with_proxy(|p| Ok(p.get_property::<String>("PlayerState")?))
    }
}
