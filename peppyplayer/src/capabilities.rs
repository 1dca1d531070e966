// peppyplayer/src/capabilities.rs
//! Uniform player contract.
//!
//! Every backend adapter implements the same family of traits. Operations a
//! backend cannot perform keep the default body, which returns
//! [`PlayerError::Unsupported`] so callers can tell "did nothing" apart from
//! "cannot do this".

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::PlayerError;
use crate::listeners::ListenerRegistry;
use crate::model::{Capability, PlayRequest, PlayerKind, TrackDescriptor};

/// Identity shared by all contract traits.
pub trait BackendIdentity {
    fn kind(&self) -> PlayerKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn unsupported(&self, operation: &str) -> PlayerError {
        PlayerError::unsupported(operation, self.name())
    }
}

/// Listener-thread lifecycle.
///
/// Both methods are idempotent and never fail: a backend that cannot reach
/// its transport keeps running in degraded mode.
pub trait ClientLifecycle {
    fn start_client(&self);
    fn stop_client(&self);
}

/// Transport capabilities (play / pause / stop / seek).
pub trait TransportControl: BackendIdentity {
    /// Plays a single file or stream, or jumps to a playlist index.
    fn play(&self, request: &PlayRequest) -> Result<(), PlayerError> {
        let _ = request;
        Err(self.unsupported("play"))
    }

    /// Toggles between paused and playing.
    fn pause(&self) -> Result<(), PlayerError> {
        Err(self.unsupported("pause"))
    }

    /// `Some(true)` asks for pause, `Some(false)` for resume. Backends without
    /// an explicit primitive query their state and toggle.
    fn play_pause(&self, pause: Option<bool>) -> Result<(), PlayerError> {
        let _ = pause;
        self.pause()
    }

    fn stop(&self, source: Option<&str>) -> Result<(), PlayerError> {
        let _ = source;
        Err(self.unsupported("stop"))
    }

    /// Seeks to an absolute position given as `HH:MM:SS` or seconds.
    fn seek(&self, time: &str) -> Result<(), PlayerError> {
        let _ = time;
        Err(self.unsupported("seek"))
    }

    /// Elapsed seconds of the current track, `None` when unknown.
    fn current_track_time(&self) -> Result<Option<f64>, PlayerError> {
        Err(self.unsupported("current_track_time"))
    }
}

/// Local mute bookkeeping: the level to restore when unmuting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MuteState {
    pub muted: bool,
    pub cached_level: Option<u8>,
}

/// Volume on a 0-100 scale, translated by each backend to its native range.
pub trait VolumeControl: BackendIdentity {
    fn get_volume(&self) -> Result<Option<u8>, PlayerError> {
        Err(self.unsupported("get_volume"))
    }

    /// Sends `level` (already clamped to 0-100) to the backend without
    /// touching the mute state.
    fn apply_volume(&self, level: u8) -> Result<(), PlayerError> {
        let _ = level;
        Err(self.unsupported("set_volume"))
    }

    /// Per-adapter mute state; `None` for backends without volume.
    fn mute_state(&self) -> Option<&Mutex<MuteState>> {
        None
    }

    fn set_volume(&self, level: u8) -> Result<(), PlayerError> {
        self.apply_volume(level.min(100))?;
        if let Some(state) = self.mute_state() {
            state.lock().muted = false;
        }
        Ok(())
    }

    /// Toggles mute: muting remembers the current level and sets 0, unmuting
    /// restores the remembered level.
    fn mute(&self) -> Result<(), PlayerError> {
        let Some(state) = self.mute_state() else {
            return Err(self.unsupported("mute"));
        };
        let mut state = state.lock();
        if state.muted {
            let level = state.cached_level.unwrap_or(0);
            self.apply_volume(level)?;
            state.muted = false;
            debug!(backend = self.name(), level, "Unmuted");
        } else {
            match self.get_volume()? {
                Some(level) => {
                    state.cached_level = Some(level);
                    self.apply_volume(0)?;
                    state.muted = true;
                    debug!(backend = self.name(), cached = level, "Muted");
                }
                None => {
                    debug!(backend = self.name(), "Volume unknown, mute skipped");
                }
            }
        }
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.mute_state().map(|s| s.lock().muted).unwrap_or(false)
    }
}

/// Playlist loading and inspection.
pub trait PlaylistControl: BackendIdentity {
    /// Loads the playlist named by `request` and returns its entries.
    fn load_playlist(&self, request: &PlayRequest) -> Result<Vec<TrackDescriptor>, PlayerError> {
        let _ = request;
        Err(self.unsupported("load_playlist"))
    }

    fn current_playlist(&self) -> Result<Vec<TrackDescriptor>, PlayerError> {
        Err(self.unsupported("current_playlist"))
    }
}

/// The full contract driven by [`crate::facade::PlayerFacade`].
pub trait Player:
    ClientLifecycle + TransportControl + VolumeControl + PlaylistControl + Send + Sync
{
    fn listeners(&self) -> &ListenerRegistry;

    fn capabilities(&self) -> &'static [Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Last URL handed to `play`.
    fn current_url(&self) -> Option<String>;
}
