//! MPD backend over the text protocol on TCP.
//!
//! Commands use short-lived connections; a dedicated idle connection, owned
//! by the listener thread, waits for `changed: player` / `changed: mixer`
//! notifications.

pub mod connection;

use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

pub use connection::{MpdConnection, parse_dictionary};

use crate::capabilities::{
    BackendIdentity, ClientLifecycle, MuteState, Player, PlaylistControl, TransportControl,
    VolumeControl,
};
use crate::config_ext::MpdSettings;
use crate::errors::PlayerError;
use crate::executor::CommandExecutor;
use crate::listener_thread::{ListenerThread, StopFlag};
use crate::listeners::ListenerRegistry;
use crate::model::{
    Capability, PlayRequest, PlaybackState, PlayerKind, PlayerStatus, TrackDescriptor,
};
use crate::notifier::EndOfTrackNotifier;
use crate::playlist_file::is_cue_request;
use crate::time_utils::{format_seconds, seek_seconds};
use crate::track_url::{library_url, quoted};

const SOURCE: &str = "mpd";

const CAPABILITIES: &[Capability] = &[
    Capability::Play,
    Capability::Pause,
    Capability::Stop,
    Capability::Seek,
    Capability::Volume,
    Capability::Mute,
    Capability::Playlist,
    Capability::TrackTime,
    Capability::Events,
];

/// State shared with the idle thread.
struct MpdInner {
    settings: MpdSettings,
    executor: CommandExecutor,
    listeners: Arc<ListenerRegistry>,
    notifier: EndOfTrackNotifier,
    dont_parse_track_name: AtomicBool,
}

impl MpdInner {
    fn command(&self, command: &str) -> Option<String> {
        debug!(backend = SOURCE, command, "MPD command");
        MpdConnection::for_commands(&self.settings).command(command)
    }

    fn dictionary(&self, command: &str) -> HashMap<String, String> {
        let settings = self.settings.clone();
        let command = command.to_string();
        self.executor.run(
            move || MpdConnection::for_commands(&settings).read_dictionary(&command),
            HashMap::new(),
        )
    }

    fn status(&self) -> PlayerStatus {
        status_from_dictionary(&self.dictionary("status"))
    }

    fn on_player_change(&self) {
        let mut status = self.status();
        let song = self.dictionary("currentsong");
        let title = track_title(
            &song,
            self.dont_parse_track_name.load(Ordering::SeqCst),
        );
        status.file_name = song.get("file").cloned();
        match title {
            Some(title) => {
                status.current_title = Some(title);
                self.listeners.notify_player_listeners(&status);
            }
            // Nothing is loaded any more: the queue ran out.
            None => self.notifier.notify(),
        }
    }

    fn on_mixer_change(&self) {
        if let Some(volume) = self.status().volume.and_then(|v| u8::try_from(v).ok()) {
            self.listeners.notify_volume_listeners(volume);
        }
    }
}

pub struct MpdBackend {
    inner: Arc<MpdInner>,
    music_folder: String,
    idle: ListenerThread,
    idle_socket: Arc<Mutex<Option<TcpStream>>>,
    current_url: Mutex<Option<String>>,
    mute: Mutex<MuteState>,
}

impl MpdBackend {
    pub fn new(settings: MpdSettings, music_folder: impl Into<String>) -> Self {
        let executor = CommandExecutor::new(settings.command_timeout);
        Self {
            inner: Arc::new(MpdInner {
                settings,
                executor,
                listeners: Arc::new(ListenerRegistry::new()),
                notifier: EndOfTrackNotifier::new("mpd"),
                dont_parse_track_name: AtomicBool::new(false),
            }),
            music_folder: music_folder.into(),
            idle: ListenerThread::new("mpd-idle"),
            idle_socket: Arc::new(Mutex::new(None)),
            current_url: Mutex::new(None),
            mute: Mutex::new(MuteState::default()),
        }
    }

    /// Current `status` as a normalized event.
    pub fn status(&self) -> PlayerStatus {
        self.inner.status()
    }

    /// Raw `currentsong` dictionary.
    pub fn current_song(&self) -> HashMap<String, String> {
        self.inner.dictionary("currentsong")
    }

    fn command(&self, command: &str) {
        self.inner.command(command);
    }
}

/// Derives the normalized status from an MPD `status` dictionary.
///
/// `state` may carry a `#N/M` marker after the state word; it wins over the
/// zero-based `song` field.
pub fn status_from_dictionary(status: &HashMap<String, String>) -> PlayerStatus {
    let mut result = PlayerStatus::from_source(SOURCE);

    if let Some(state) = status.get("state") {
        let mut tokens = state.split_whitespace();
        result.state = tokens.next().map(PlaybackState::from_backend_token);
        result.track = state
            .split_once('#')
            .and_then(|(_, rest)| rest.split('/').next())
            .and_then(|n| n.trim().parse().ok());
    }
    if result.track.is_none() {
        result.track = status
            .get("song")
            .and_then(|s| s.parse::<u32>().ok())
            .map(|s| s + 1);
    }
    result.volume = status.get("volume").and_then(|v| v.parse().ok());

    let time = status.get("time").map(|t| t.split(':').collect::<Vec<_>>());
    result.seek_time = status
        .get("elapsed")
        .cloned()
        .or_else(|| time.as_ref().and_then(|t| t.first()).map(|s| s.to_string()));
    result.track_time = status
        .get("duration")
        .cloned()
        .or_else(|| time.as_ref().and_then(|t| t.get(1)).map(|s| s.to_string()));
    result
}

/// `Title` tag, else the last segment of `file` (or the whole `file` when
/// name parsing is disabled).
fn track_title(song: &HashMap<String, String>, dont_parse_track_name: bool) -> Option<String> {
    if let Some(title) = song.get("Title").filter(|t| !t.is_empty()) {
        return Some(title.clone());
    }
    let file = song.get("file").filter(|f| !f.is_empty())?;
    if dont_parse_track_name {
        return Some(file.clone());
    }
    file.rsplit('/').next().map(str::to_string)
}

/// `playlist` answer (`0:file: a.mp3`) sorted by position.
pub fn playlist_from_lines(lines: &[String]) -> Vec<TrackDescriptor> {
    let mut entries: Vec<TrackDescriptor> = lines
        .iter()
        .filter_map(|line| {
            let (key, file) = line.split_once(": ")?;
            let index = key.strip_suffix(":file").unwrap_or(key).trim().parse().ok()?;
            Some(TrackDescriptor {
                index,
                file: file.trim_end().to_string(),
                title: None,
            })
        })
        .collect();
    entries.sort_by_key(|e| e.index);
    entries
}

fn idle_loop(inner: Arc<MpdInner>, socket: Arc<Mutex<Option<TcpStream>>>, stop: StopFlag) {
    let retry_delay = inner.settings.connect_delay;
    while stop.is_running() {
        let mut conn = MpdConnection::for_idle(&inner.settings);
        if !conn.connect() {
            if stop.sleep(retry_delay) {
                break;
            }
            continue;
        }
        *socket.lock() = conn.shutdown_handle();
        // stop_client may have run before the handle was published
        if stop.is_stopped() {
            break;
        }

        while stop.is_running() && conn.write_line("idle") {
            let changes = conn.read_block();
            if stop.is_stopped() {
                break;
            }
            if changes.is_empty() && !conn.is_connected() {
                debug!(backend = SOURCE, "Idle connection lost, reconnecting");
                break;
            }
            if changes.iter().any(|c| c.contains("player")) {
                inner.on_player_change();
            }
            if changes.iter().any(|c| c.contains("mixer")) {
                inner.on_mixer_change();
            }
        }

        socket.lock().take();
        conn.disconnect();
        if stop.is_running() {
            stop.sleep(retry_delay);
        }
    }
    debug!(backend = SOURCE, "Idle loop finished");
}

impl BackendIdentity for MpdBackend {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Mpd
    }
}

impl ClientLifecycle for MpdBackend {
    fn start_client(&self) {
        self.inner.notifier.start(Arc::clone(&self.inner.listeners));
        let inner = Arc::clone(&self.inner);
        let socket = Arc::clone(&self.idle_socket);
        if self.idle.start(move |stop| idle_loop(inner, socket, stop)) {
            info!(backend = SOURCE, address = %self.inner.settings.address(), "MPD client started");
        }
    }

    fn stop_client(&self) {
        let socket = Arc::clone(&self.idle_socket);
        let stopped = self.idle.stop_with(|| {
            if let Some(stream) = socket.lock().take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        });
        self.inner.notifier.shutdown();
        if stopped {
            info!(backend = SOURCE, "MPD client stopped");
        }
    }
}

impl TransportControl for MpdBackend {
    fn play(&self, request: &PlayRequest) -> Result<(), PlayerError> {
        self.inner
            .dont_parse_track_name
            .store(request.dont_parse_track_name, Ordering::SeqCst);

        if let Some(index) = request.playlist_position() {
            self.command(&format!("play {}", index));
            return Ok(());
        }

        let Some(url) = library_url(request, &self.music_folder) else {
            debug!(backend = SOURCE, ?request, "Nothing to play");
            return Ok(());
        };
        self.command("clear");
        self.command(&format!("add {}", quoted(&url)));
        self.command("play 0");
        if let Some(time) = request.resume_time() {
            match seek_seconds(time) {
                Ok(secs) => self.command(&format!("seekcur {}", format_seconds(secs))),
                Err(e) => debug!(backend = SOURCE, error = %e, "Resume position ignored"),
            }
        }
        *self.current_url.lock() = Some(url);
        Ok(())
    }

    fn pause(&self) -> Result<(), PlayerError> {
        match self.status().state {
            Some(PlaybackState::Playing) => self.command("pause"),
            _ => self.command("play"),
        }
        Ok(())
    }

    fn play_pause(&self, pause: Option<bool>) -> Result<(), PlayerError> {
        let playing = self.status().state == Some(PlaybackState::Playing);
        match pause {
            Some(true) if playing => self.command("pause"),
            Some(false) if !playing => self.command("play"),
            Some(_) => {}
            None => return self.pause(),
        }
        Ok(())
    }

    fn stop(&self, source: Option<&str>) -> Result<(), PlayerError> {
        debug!(backend = SOURCE, source, "Stop requested");
        self.command("stop");
        Ok(())
    }

    fn seek(&self, time: &str) -> Result<(), PlayerError> {
        match seek_seconds(time) {
            Ok(secs) => self.command(&format!("seekcur {}", format_seconds(secs))),
            Err(e) => debug!(backend = SOURCE, error = %e, "Seek ignored"),
        }
        Ok(())
    }

    fn current_track_time(&self) -> Result<Option<f64>, PlayerError> {
        Ok(self.status().seek_time.and_then(|t| t.parse().ok()))
    }
}

impl VolumeControl for MpdBackend {
    fn get_volume(&self) -> Result<Option<u8>, PlayerError> {
        Ok(self.status().volume.and_then(|v| u8::try_from(v).ok()))
    }

    fn apply_volume(&self, level: u8) -> Result<(), PlayerError> {
        self.command(&format!("setvol {}", level));
        Ok(())
    }

    fn mute_state(&self) -> Option<&Mutex<MuteState>> {
        Some(&self.mute)
    }
}

impl PlaylistControl for MpdBackend {
    fn load_playlist(&self, request: &PlayRequest) -> Result<Vec<TrackDescriptor>, PlayerError> {
        if is_cue_request(request) {
            debug!(backend = SOURCE, "Cue sheets are not loaded");
            return Ok(Vec::new());
        }
        let Some(name) = request.file_name.as_deref().or(request.url.as_deref()) else {
            return Ok(Vec::new());
        };
        let name = name.strip_suffix(".m3u").unwrap_or(name);
        self.command(&format!("load {}", quoted(name)));
        self.current_playlist()
    }

    fn current_playlist(&self) -> Result<Vec<TrackDescriptor>, PlayerError> {
        let lines = MpdConnection::for_commands(&self.inner.settings).multiline("playlist");
        Ok(playlist_from_lines(&lines))
    }
}

impl Player for MpdBackend {
    fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn current_url(&self) -> Option<String> {
        self.current_url.lock().clone()
    }
}

impl Drop for MpdBackend {
    fn drop(&mut self) {
        self.stop_client();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_status_with_track_marker() {
        let status = status_from_dictionary(&dict(&[("volume", "42"), ("state", "play #3/10")]));
        assert_eq!(status.state, Some(PlaybackState::Playing));
        assert_eq!(status.track, Some(3));
        assert_eq!(status.volume, Some(42));
    }

    #[test]
    fn test_status_song_and_time_fallbacks() {
        let status = status_from_dictionary(&dict(&[
            ("state", "pause"),
            ("song", "4"),
            ("time", "17:240"),
            ("volume", "-1"),
        ]));
        assert_eq!(status.state, Some(PlaybackState::Paused));
        assert_eq!(status.track, Some(5));
        assert_eq!(status.seek_time.as_deref(), Some("17"));
        assert_eq!(status.track_time.as_deref(), Some("240"));
        assert_eq!(status.volume, Some(-1));
    }

    #[test]
    fn test_status_prefers_elapsed() {
        let status = status_from_dictionary(&dict(&[("elapsed", "17.204"), ("time", "17:240")]));
        assert_eq!(status.seek_time.as_deref(), Some("17.204"));
        assert_eq!(status.state, None);
    }

    #[test]
    fn test_track_title() {
        let song = dict(&[("file", "rock/band/song.mp3")]);
        assert_eq!(track_title(&song, false).as_deref(), Some("song.mp3"));
        assert_eq!(track_title(&song, true).as_deref(), Some("rock/band/song.mp3"));

        let tagged = dict(&[("file", "x.mp3"), ("Title", "Real Title")]);
        assert_eq!(track_title(&tagged, false).as_deref(), Some("Real Title"));

        assert_eq!(track_title(&HashMap::new(), false), None);
    }

    #[test]
    fn test_playlist_sorted_by_position() {
        let lines = vec![
            "10:file: k.mp3".to_string(),
            "2:file: c.mp3".to_string(),
            "0:file: a.mp3".to_string(),
        ];
        let entries = playlist_from_lines(&lines);
        let order: Vec<_> = entries.iter().map(|e| e.index).collect();
        assert_eq!(order, vec![0, 2, 10]);
        assert_eq!(entries[1].file, "c.mp3");
    }
}
