//! Placeholder backend used when no player is configured.

use crate::capabilities::{
    BackendIdentity, ClientLifecycle, Player, PlaylistControl, TransportControl, VolumeControl,
};
use crate::listeners::ListenerRegistry;
use crate::model::{Capability, PlayerKind};

#[derive(Debug, Default)]
pub struct NullBackend {
    listeners: ListenerRegistry,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendIdentity for NullBackend {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Null
    }
}

impl ClientLifecycle for NullBackend {
    fn start_client(&self) {}
    fn stop_client(&self) {}
}

impl TransportControl for NullBackend {}

impl VolumeControl for NullBackend {}

impl PlaylistControl for NullBackend {}

impl Player for NullBackend {
    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    fn current_url(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayRequest;

    #[test]
    fn test_everything_is_unsupported() {
        let backend = NullBackend::new();
        backend.start_client();
        assert!(backend.play(&PlayRequest::from_url("x")).unwrap_err().is_unsupported());
        assert!(backend.pause().unwrap_err().is_unsupported());
        assert!(backend.play_pause(Some(true)).unwrap_err().is_unsupported());
        assert!(backend.set_volume(10).unwrap_err().is_unsupported());
        assert!(backend.mute().unwrap_err().is_unsupported());
        assert!(backend.current_playlist().unwrap_err().is_unsupported());
        assert!(!backend.supports(Capability::Play));
        assert!(!backend.is_muted());
        backend.stop_client();
    }
}
