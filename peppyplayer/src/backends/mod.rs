//! Concrete player backends and the closed [`PlayerBackend`] sum over them.

pub mod bluetooth;
pub mod mpc;
pub mod mpd;
pub mod mplayer;
pub mod null;
pub mod shairport;

use std::sync::Arc;

pub use bluetooth::BluetoothBackend;
pub use mpc::MpcBackend;
pub use mpd::MpdBackend;
pub use mplayer::MplayerBackend;
pub use null::NullBackend;
pub use shairport::ShairportBackend;

use crate::capabilities::{BackendIdentity, Player};
use crate::config_ext::PlayerSettings;
use crate::model::PlayerKind;
use crate::process::{CommandRunner, SystemRunner};

/// Every backend the facade can drive.
pub enum PlayerBackend {
    /// MPD over its TCP text protocol.
    Mpd(MpdBackend),
    /// MPD through the `mpc` command-line client.
    Mpc(MpcBackend),
    /// mplayer child process in slave mode.
    Mplayer(MplayerBackend),
    /// shairport-sync metadata pipe plus D-Bus remote control.
    Shairport(ShairportBackend),
    /// Bluetooth A2DP agent service.
    Bluetooth(BluetoothBackend),
    /// No player configured.
    Null(NullBackend),
}

impl PlayerBackend {
    /// Builds the backend selected by `kind` from `settings`, with real
    /// subprocesses.
    pub fn from_settings(kind: PlayerKind, settings: &PlayerSettings) -> Self {
        Self::with_runner(kind, settings, Arc::new(SystemRunner))
    }

    /// Same as [`from_settings`](Self::from_settings) with an explicit
    /// subprocess runner.
    pub fn with_runner(
        kind: PlayerKind,
        settings: &PlayerSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        match kind {
            PlayerKind::Mpd => {
                PlayerBackend::Mpd(MpdBackend::new(settings.mpd.clone(), &settings.music_folder))
            }
            PlayerKind::Mpc => PlayerBackend::Mpc(MpcBackend::new(
                &settings.mpc_binary,
                &settings.music_folder,
                runner,
            )),
            PlayerKind::Mplayer => PlayerBackend::Mplayer(MplayerBackend::new(
                settings.mplayer.clone(),
                &settings.music_folder,
                runner,
            )),
            PlayerKind::Shairport => {
                PlayerBackend::Shairport(ShairportBackend::new(&settings.shairport))
            }
            PlayerKind::Bluetooth => PlayerBackend::Bluetooth(BluetoothBackend::new(
                &settings.bluetooth_service,
                runner,
            )),
            PlayerKind::Null => PlayerBackend::Null(NullBackend::new()),
        }
    }

    pub fn kind(&self) -> PlayerKind {
        self.player().kind()
    }

    /// The backend seen through the uniform contract.
    pub fn player(&self) -> &dyn Player {
        match self {
            PlayerBackend::Mpd(b) => b,
            PlayerBackend::Mpc(b) => b,
            PlayerBackend::Mplayer(b) => b,
            PlayerBackend::Shairport(b) => b,
            PlayerBackend::Bluetooth(b) => b,
            PlayerBackend::Null(b) => b,
        }
    }
}

impl std::fmt::Debug for PlayerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PlayerBackend").field(&self.kind()).finish()
    }
}
