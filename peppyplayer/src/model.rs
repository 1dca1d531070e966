//! Data types shared by every backend: playback state, status events, play
//! requests and playlist entries.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::errors::PlayerError;

/// Normalized transport state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Paused,
    Playing,
    Unknown,
}

impl PlaybackState {
    /// Maps the MPD / mpc vocabulary (`play`, `pause`, `stop`, `[playing]`, ...).
    pub fn from_backend_token(token: &str) -> Self {
        let token = token.trim().trim_start_matches('[').trim_end_matches(']');
        match token.to_ascii_lowercase().as_str() {
            "play" | "playing" => PlaybackState::Playing,
            "pause" | "paused" => PlaybackState::Paused,
            "stop" | "stopped" => PlaybackState::Stopped,
            _ => PlaybackState::Unknown,
        }
    }
}

/// Event payload delivered to player-status listeners.
///
/// Every field is optional: backends only fill what they know, and the
/// mplayer adapter deliberately sends partial updates.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlayerStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PlaybackState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    /// 0-100, or -1 when the backend reports no mixer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seek_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip)]
    pub picture: Option<Arc<Vec<u8>>>,
}

impl PlayerStatus {
    pub fn from_source(source: &str) -> Self {
        PlayerStatus {
            source: Some(source.to_string()),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: PlaybackState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.current_title = Some(title.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == PlayerStatus::default()
    }

    /// Compact JSON rendering used in log lines.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// How a [`PlayRequest`] should be interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Replace the backend queue with a single file or stream.
    #[default]
    Track,
    /// Play an entry of the already loaded playlist by index.
    Playlist,
}

/// Caller-provided description of what to play.
///
/// Different call sites fill different subsets, so adapters read every field
/// defensively.
#[derive(Clone, Debug, Default)]
pub struct PlayRequest {
    pub url: Option<String>,
    pub folder: Option<String>,
    pub file_name: Option<String>,
    pub music_folder: Option<String>,
    /// Resume position (`HH:MM:SS` or seconds).
    pub track_time: Option<String>,
    pub playback_mode: PlaybackMode,
    /// Zero-based position inside the loaded playlist.
    pub playlist_track_number: Option<u32>,
    pub dont_parse_track_name: bool,
}

impl PlayRequest {
    pub fn from_url(url: impl Into<String>) -> Self {
        PlayRequest {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn from_file(folder: impl Into<String>, file_name: impl Into<String>) -> Self {
        PlayRequest {
            folder: Some(folder.into()),
            file_name: Some(file_name.into()),
            ..Default::default()
        }
    }

    pub fn playlist_index(index: u32) -> Self {
        PlayRequest {
            playback_mode: PlaybackMode::Playlist,
            playlist_track_number: Some(index),
            ..Default::default()
        }
    }

    /// The playlist index to jump to, when this is an index request.
    pub fn playlist_position(&self) -> Option<u32> {
        match self.playback_mode {
            PlaybackMode::Playlist => self.playlist_track_number,
            PlaybackMode::Track => None,
        }
    }

    /// Resume position, ignoring empty and zero values.
    pub fn resume_time(&self) -> Option<&str> {
        self.track_time
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != "0" && *t != "00:00:00")
    }
}

/// One entry of a backend playlist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackDescriptor {
    pub index: u32,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Backends known to the player facade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayerKind {
    Mpd,
    Mpc,
    Mplayer,
    Shairport,
    Bluetooth,
    Null,
}

impl PlayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerKind::Mpd => "mpd",
            PlayerKind::Mpc => "mpc",
            PlayerKind::Mplayer => "mplayer",
            PlayerKind::Shairport => "shairport",
            PlayerKind::Bluetooth => "bluetooth",
            PlayerKind::Null => "none",
        }
    }
}

impl fmt::Display for PlayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerKind {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mpd" => Ok(PlayerKind::Mpd),
            "mpc" => Ok(PlayerKind::Mpc),
            "mplayer" => Ok(PlayerKind::Mplayer),
            "shairport" | "shairport-sync" | "airplay" => Ok(PlayerKind::Shairport),
            "bluetooth" | "bluetooth-sink" => Ok(PlayerKind::Bluetooth),
            "none" | "null" => Ok(PlayerKind::Null),
            other => Err(PlayerError::Config(format!("Unknown player type '{}'", other))),
        }
    }
}

/// Optional abilities a caller may probe before issuing a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Play,
    Pause,
    Stop,
    Seek,
    Volume,
    Mute,
    Playlist,
    TrackTime,
    Events,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_state_tokens() {
        assert_eq!(PlaybackState::from_backend_token("play"), PlaybackState::Playing);
        assert_eq!(PlaybackState::from_backend_token("[paused]"), PlaybackState::Paused);
        assert_eq!(PlaybackState::from_backend_token("stop"), PlaybackState::Stopped);
        assert_eq!(PlaybackState::from_backend_token("???"), PlaybackState::Unknown);
    }

    #[test]
    fn test_status_json_omits_absent_fields() {
        let status = PlayerStatus::from_source("mpd")
            .with_state(PlaybackState::Playing)
            .with_title("A - B");
        assert_eq!(
            status.to_json(),
            r#"{"state":"playing","current_title":"A - B","source":"mpd"}"#
        );
    }

    #[test]
    fn test_player_kind_parse() {
        assert_eq!("MPD".parse::<PlayerKind>().unwrap(), PlayerKind::Mpd);
        assert_eq!("shairport".parse::<PlayerKind>().unwrap(), PlayerKind::Shairport);
        assert_eq!("none".parse::<PlayerKind>().unwrap(), PlayerKind::Null);
        assert!(matches!(
            "vlc".parse::<PlayerKind>(),
            Err(PlayerError::Config(_))
        ));
    }

    #[test]
    fn test_play_request_positions() {
        assert_eq!(PlayRequest::playlist_index(4).playlist_position(), Some(4));

        let mut request = PlayRequest::from_url("http://x");
        request.playlist_track_number = Some(2);
        assert_eq!(request.playlist_position(), None);

        request.track_time = Some("00:00:00".to_string());
        assert_eq!(request.resume_time(), None);
        request.track_time = Some("00:01:10".to_string());
        assert_eq!(request.resume_time(), Some("00:01:10"));
    }
}
