//! Extension that reads the `player` section of a peppyconfig file.
//!
//! The trait adds typed accessors to `peppyconfig::Config`, and
//! [`PlayerConfigExt::get_player_settings`] gathers everything needed to build
//! a backend into one [`PlayerSettings`] value.
//!
//! ```rust,ignore
//! use peppyconfig::get_config;
//! use peppyplayer::PlayerConfigExt;
//!
//! let settings = get_config().get_player_settings()?;
//! println!("Player backend: {}", settings.kind);
//! ```

use std::time::Duration;

use anyhow::Result;
use peppyconfig::Config;

use crate::errors::PlayerError;
use crate::model::PlayerKind;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MpdSettings {
    pub host: String,
    pub port: u16,
    pub command_timeout: Duration,
    pub idle_timeout: Duration,
    pub connect_attempts: u32,
    pub connect_delay: Duration,
}

impl Default for MpdSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6600,
            command_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(3600),
            connect_attempts: 3,
            connect_delay: Duration::from_millis(2000),
        }
    }
}

impl MpdSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MplayerSettings {
    pub binary: String,
    pub reply_timeout: Duration,
}

impl Default for MplayerSettings {
    fn default() -> Self {
        Self {
            binary: "mplayer".to_string(),
            reply_timeout: Duration::from_millis(1000),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShairportSettings {
    pub pipe: String,
    pub dbus_attempts: u32,
    pub dbus_delay: Duration,
}

impl Default for ShairportSettings {
    fn default() -> Self {
        Self {
            pipe: "/tmp/shairport-sync-metadata".to_string(),
            dbus_attempts: 5,
            dbus_delay: Duration::from_millis(1000),
        }
    }
}

/// Everything needed to build any backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerSettings {
    pub kind: PlayerKind,
    pub music_folder: String,
    pub mpd: MpdSettings,
    pub mpc_binary: String,
    pub mplayer: MplayerSettings,
    pub shairport: ShairportSettings,
    pub bluetooth_service: String,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            kind: PlayerKind::Mpd,
            music_folder: "/home/pi/music".to_string(),
            mpd: MpdSettings::default(),
            mpc_binary: "mpc".to_string(),
            mplayer: MplayerSettings::default(),
            shairport: ShairportSettings::default(),
            bluetooth_service: "bt-agent-a2dp.service".to_string(),
        }
    }
}

pub trait PlayerConfigExt {
    /// Backend selected by `player.type`.
    ///
    /// # Errors
    ///
    /// Fails on an unknown backend name.
    fn get_player_kind(&self) -> Result<PlayerKind>;

    fn set_player_kind(&self, kind: PlayerKind) -> Result<()>;

    fn get_music_folder(&self) -> String;

    fn set_music_folder(&self, folder: &str) -> Result<()>;

    fn get_mpd_settings(&self) -> Result<MpdSettings>;

    fn get_mplayer_settings(&self) -> MplayerSettings;

    fn get_shairport_settings(&self) -> ShairportSettings;

    /// Collects the whole `player` section.
    fn get_player_settings(&self) -> Result<PlayerSettings>;
}

impl PlayerConfigExt for Config {
    fn get_player_kind(&self) -> Result<PlayerKind> {
        let name = self.get_string_or(&["player", "type"], "mpd");
        Ok(name.parse::<PlayerKind>()?)
    }

    fn set_player_kind(&self, kind: PlayerKind) -> Result<()> {
        self.set_string(&["player", "type"], kind.as_str())
    }

    fn get_music_folder(&self) -> String {
        let defaults = PlayerSettings::default();
        self.get_string_or(&["player", "music_folder"], &defaults.music_folder)
    }

    fn set_music_folder(&self, folder: &str) -> Result<()> {
        self.set_string(&["player", "music_folder"], folder)
    }

    fn get_mpd_settings(&self) -> Result<MpdSettings> {
        let d = MpdSettings::default();
        let port = self.get_u64_or(&["player", "mpd", "port"], d.port as u64);
        let port = u16::try_from(port)
            .map_err(|_| PlayerError::Config(format!("Invalid MPD port {}", port)))?;
        let attempts = self.get_u64_or(
            &["player", "mpd", "connect_attempts"],
            d.connect_attempts as u64,
        );
        if attempts == 0 {
            return Err(PlayerError::Config("player.mpd.connect_attempts must be > 0".into()).into());
        }
        Ok(MpdSettings {
            host: self.get_string_or(&["player", "mpd", "host"], &d.host),
            port,
            command_timeout: Duration::from_secs(self.get_u64_or(
                &["player", "mpd", "command_timeout_secs"],
                d.command_timeout.as_secs(),
            )),
            idle_timeout: Duration::from_secs(self.get_u64_or(
                &["player", "mpd", "idle_timeout_secs"],
                d.idle_timeout.as_secs(),
            )),
            connect_attempts: attempts.min(u32::MAX as u64) as u32,
            connect_delay: Duration::from_millis(self.get_u64_or(
                &["player", "mpd", "connect_delay_ms"],
                d.connect_delay.as_millis() as u64,
            )),
        })
    }

    fn get_mplayer_settings(&self) -> MplayerSettings {
        let d = MplayerSettings::default();
        MplayerSettings {
            binary: self.get_string_or(&["player", "mplayer", "binary"], &d.binary),
            reply_timeout: Duration::from_millis(self.get_u64_or(
                &["player", "mplayer", "reply_timeout_ms"],
                d.reply_timeout.as_millis() as u64,
            )),
        }
    }

    fn get_shairport_settings(&self) -> ShairportSettings {
        let d = ShairportSettings::default();
        ShairportSettings {
            pipe: self.get_string_or(&["player", "shairport", "pipe"], &d.pipe),
            dbus_attempts: self
                .get_u64_or(&["player", "shairport", "dbus_attempts"], d.dbus_attempts as u64)
                .clamp(1, 100) as u32,
            dbus_delay: Duration::from_millis(self.get_u64_or(
                &["player", "shairport", "dbus_delay_ms"],
                d.dbus_delay.as_millis() as u64,
            )),
        }
    }

    fn get_player_settings(&self) -> Result<PlayerSettings> {
        let d = PlayerSettings::default();
        Ok(PlayerSettings {
            kind: self.get_player_kind()?,
            music_folder: self.get_music_folder(),
            mpd: self.get_mpd_settings()?,
            mpc_binary: self.get_string_or(&["player", "mpc", "binary"], &d.mpc_binary),
            mplayer: self.get_mplayer_settings(),
            shairport: self.get_shairport_settings(),
            bluetooth_service: self
                .get_string_or(&["player", "bluetooth", "service"], &d.bluetooth_service),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_from_embedded_config() {
        let dir = tempfile::tempdir().unwrap();
        let settings = config_in(&dir).get_player_settings().unwrap();

        assert_eq!(settings.kind, PlayerKind::Mpd);
        assert_eq!(settings.mpd.address(), "localhost:6600");
        assert_eq!(settings.mpd.connect_delay, Duration::from_millis(2000));
        assert_eq!(settings.mplayer.reply_timeout, Duration::from_millis(1000));
        assert_eq!(settings.shairport.dbus_attempts, 5);
    }

    #[test]
    fn test_invalid_mpd_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        config.set_u64(&["player", "mpd", "port"], 70000).unwrap();
        assert!(config.get_mpd_settings().is_err());

        config.set_u64(&["player", "mpd", "port"], 6601).unwrap();
        config
            .set_u64(&["player", "mpd", "connect_attempts"], 0)
            .unwrap();
        assert!(config.get_player_settings().is_err());
    }

    #[test]
    fn test_player_kind_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        config.set_player_kind(PlayerKind::Shairport).unwrap();
        assert_eq!(config.get_player_kind().unwrap(), PlayerKind::Shairport);
        config.set_music_folder("/srv/music").unwrap();
        assert_eq!(config.get_music_folder(), "/srv/music");
    }
}
