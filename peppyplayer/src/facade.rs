//! Stable entry point for the rest of the application.
//!
//! The facade owns the active backend and forwards every contract operation
//! to it. Switching backends silences and stops the old one, carries the
//! registered listeners over and starts the new one.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use peppyconfig::Config;
use tracing::info;

use crate::backends::PlayerBackend;
use crate::capabilities::{
    ClientLifecycle, Player, PlaylistControl, TransportControl, VolumeControl,
};
use crate::config_ext::{PlayerConfigExt, PlayerSettings};
use crate::errors::PlayerError;
use crate::listeners::{EndOfTrackListener, PlayerListener, VolumeListener};
use crate::model::{Capability, PlayRequest, PlayerKind, TrackDescriptor};
use crate::process::{CommandRunner, SystemRunner};

pub struct PlayerFacade {
    settings: PlayerSettings,
    runner: Arc<dyn CommandRunner>,
    active: RwLock<Arc<PlayerBackend>>,
}

impl PlayerFacade {
    /// Wraps an already built backend.
    pub fn new(
        backend: PlayerBackend,
        settings: PlayerSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            settings,
            runner,
            active: RwLock::new(Arc::new(backend)),
        }
    }

    pub fn from_settings(settings: PlayerSettings) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let backend = PlayerBackend::with_runner(settings.kind, &settings, Arc::clone(&runner));
        Self::new(backend, settings, runner)
    }

    /// Builds the facade for the backend configured under `player`.
    ///
    /// # Errors
    ///
    /// Fails on an unknown `player.type` or invalid backend settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = config.get_player_settings()?;
        info!(backend = %settings.kind, "Player backend selected");
        Ok(Self::from_settings(settings))
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    /// The active backend. The returned handle stays valid across a switch.
    pub fn backend(&self) -> Arc<PlayerBackend> {
        self.active.read().clone()
    }

    pub fn kind(&self) -> PlayerKind {
        self.backend().kind()
    }

    /// Replaces the active backend with a freshly built one of `kind`.
    /// Switching to the current kind does nothing.
    pub fn switch_to(&self, kind: PlayerKind) {
        if self.kind() == kind {
            return;
        }
        let backend = PlayerBackend::with_runner(kind, &self.settings, Arc::clone(&self.runner));
        self.switch_to_backend(backend);
    }

    /// Makes `backend` the active one.
    pub fn switch_to_backend(&self, backend: PlayerBackend) {
        let new = Arc::new(backend);
        let old = {
            let mut active = self.active.write();
            let old = std::mem::replace(&mut *active, Arc::clone(&new));
            old.player().listeners().set_enabled(false);
            new.player().listeners().absorb(old.player().listeners());
            old.player().listeners().clear();
            old
        };

        // Joins the old listener and notifier threads. Their callbacks may
        // still be running and calling back into the facade, so `active`
        // must not be held here.
        old.player().stop_client();
        new.player().start_client();
        info!(from = %old.kind(), to = %new.kind(), "Player backend switched");
    }

    pub fn start_client(&self) {
        self.backend().player().start_client();
    }

    pub fn stop_client(&self) {
        self.backend().player().stop_client();
    }

    pub fn play(&self, request: &PlayRequest) -> Result<(), PlayerError> {
        self.backend().player().play(request)
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.backend().player().pause()
    }

    pub fn play_pause(&self, pause: Option<bool>) -> Result<(), PlayerError> {
        self.backend().player().play_pause(pause)
    }

    pub fn stop(&self, source: Option<&str>) -> Result<(), PlayerError> {
        self.backend().player().stop(source)
    }

    pub fn mute(&self) -> Result<(), PlayerError> {
        self.backend().player().mute()
    }

    pub fn is_muted(&self) -> bool {
        self.backend().player().is_muted()
    }

    pub fn set_volume(&self, level: u8) -> Result<(), PlayerError> {
        self.backend().player().set_volume(level)
    }

    pub fn get_volume(&self) -> Result<Option<u8>, PlayerError> {
        self.backend().player().get_volume()
    }

    pub fn seek(&self, time: &str) -> Result<(), PlayerError> {
        self.backend().player().seek(time)
    }

    pub fn get_current_track_time(&self) -> Result<Option<f64>, PlayerError> {
        self.backend().player().current_track_time()
    }

    pub fn load_playlist(&self, request: &PlayRequest) -> Result<Vec<TrackDescriptor>, PlayerError> {
        self.backend().player().load_playlist(request)
    }

    pub fn get_current_playlist(&self) -> Result<Vec<TrackDescriptor>, PlayerError> {
        self.backend().player().current_playlist()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.backend().player().supports(capability)
    }

    pub fn current_url(&self) -> Option<String> {
        self.backend().player().current_url()
    }

    pub fn add_volume_listener(&self, listener: VolumeListener) -> bool {
        self.backend().player().listeners().add_volume_listener(listener)
    }

    pub fn remove_volume_listener(&self, listener: &VolumeListener) -> bool {
        self.backend().player().listeners().remove_volume_listener(listener)
    }

    pub fn add_player_listener(&self, listener: PlayerListener) -> bool {
        self.backend().player().listeners().add_player_listener(listener)
    }

    pub fn remove_player_listener(&self, listener: &PlayerListener) -> bool {
        self.backend().player().listeners().remove_player_listener(listener)
    }

    pub fn add_end_of_track_listener(&self, listener: EndOfTrackListener) -> bool {
        self.backend()
            .player()
            .listeners()
            .add_end_of_track_listener(listener)
    }

    pub fn remove_end_of_track_listener(&self, listener: &EndOfTrackListener) -> bool {
        self.backend()
            .player()
            .listeners()
            .remove_end_of_track_listener(listener)
    }
}
