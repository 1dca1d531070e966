//! # peppyplayer
//!
//! Audio backend abstraction for the PeppyPi media player.
//!
//! Each backend (MPD socket, `mpc`, mplayer slave mode, shairport-sync,
//! Bluetooth A2DP) is driven through the same contract
//! ([`capabilities::Player`]) and runs at most one listener thread that turns
//! backend notifications into [`PlayerStatus`] events, fanned out to the
//! callbacks registered in its [`ListenerRegistry`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use peppyconfig::get_config;
//! use peppyplayer::{PlayRequest, PlayerFacade};
//!
//! let player = PlayerFacade::from_config(&get_config())?;
//! player.add_player_listener(Arc::new(|status| println!("{}", status.to_json())));
//! player.start_client();
//! player.play(&PlayRequest::from_url("http://radio.example/stream"))?;
//! ```

pub mod backends;
pub mod capabilities;
pub mod config_ext;
pub mod errors;
pub mod executor;
pub mod facade;
pub mod listener_thread;
pub mod listeners;
pub mod model;
pub mod notifier;
pub mod playlist_file;
pub mod process;
pub mod reply_slot;
pub mod time_utils;
pub mod track_url;

pub use backends::PlayerBackend;
pub use capabilities::{
    BackendIdentity, ClientLifecycle, MuteState, Player, PlaylistControl, TransportControl,
    VolumeControl,
};
pub use config_ext::{PlayerConfigExt, PlayerSettings};
pub use errors::PlayerError;
pub use facade::PlayerFacade;
pub use listeners::ListenerRegistry;
pub use model::{
    Capability, PlayRequest, PlaybackMode, PlaybackState, PlayerKind, PlayerStatus,
    TrackDescriptor,
};
