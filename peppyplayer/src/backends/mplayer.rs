//! mplayer in slave mode (`-slave -idle -quiet`).
//!
//! Commands are written to the child's stdin. The listener thread reads its
//! stdout, turns the `ANS_*` / `ICY Info` / `EOF code` lines into partial
//! status events and fills the reply slots that `get_property` callers wait
//! on.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::capabilities::{
    BackendIdentity, ClientLifecycle, MuteState, Player, PlaylistControl, TransportControl,
    VolumeControl,
};
use crate::config_ext::MplayerSettings;
use crate::errors::PlayerError;
use crate::listener_thread::{ListenerThread, StopFlag};
use crate::listeners::ListenerRegistry;
use crate::model::{
    Capability, PlayRequest, PlaybackState, PlayerKind, PlayerStatus, TrackDescriptor,
};
use crate::notifier::EndOfTrackNotifier;
use crate::playlist_file::{get_m3u_playlist, is_cue_request, playlist_path};
use crate::process::{CommandRunner, Killer, read_trimmed_line};
use crate::reply_slot::ReplySlot;
use crate::time_utils::{format_seconds, seek_seconds};
use crate::track_url::{absolute_url, quoted};

const SOURCE: &str = "mplayer";

const SLAVE_ARGS: &[&str] = &["-slave", "-idle", "-quiet"];

const RESTART_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

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

/// Recognized mplayer output lines.
#[derive(Clone, Debug, PartialEq)]
pub enum MplayerEvent {
    StreamTitle(String),
    FileName(String),
    Length(String),
    TimePos(f64),
    Volume(f64),
    EndOfFile,
    StartingPlayback,
}

/// Classifies one stdout line; unrelated chatter yields `None`.
pub fn parse_output_line(line: &str) -> Option<MplayerEvent> {
    let line = line.trim();
    if let Some(info) = line.strip_prefix("ICY Info:") {
        let start = info.find("StreamTitle='")? + "StreamTitle='".len();
        let rest = &info[start..];
        let end = rest.find("';").or_else(|| rest.rfind('\''))?;
        return Some(MplayerEvent::StreamTitle(rest[..end].to_string()));
    }
    if let Some(name) = line.strip_prefix("ANS_filename=") {
        return Some(MplayerEvent::FileName(name.trim_matches('\'').to_string()));
    }
    if let Some(length) = line.strip_prefix("ANS_length=") {
        return Some(MplayerEvent::Length(length.to_string()));
    }
    if let Some(pos) = line.strip_prefix("ANS_time_pos=") {
        return pos.parse().ok().map(MplayerEvent::TimePos);
    }
    if let Some(volume) = line.strip_prefix("ANS_volume=") {
        return volume.parse().ok().map(MplayerEvent::Volume);
    }
    if line.starts_with("EOF code: 1") {
        return Some(MplayerEvent::EndOfFile);
    }
    if line.starts_with("Starting playback") {
        return Some(MplayerEvent::StartingPlayback);
    }
    None
}

struct MplayerInner {
    listeners: Arc<ListenerRegistry>,
    notifier: EndOfTrackNotifier,
    stdin: Mutex<Option<Box<dyn Write + Send>>>,
    time_pos: ReplySlot<f64>,
    volume: ReplySlot<u8>,
}

impl MplayerInner {
    /// Writes one slave command; `false` when mplayer is not running.
    fn send(&self, command: &str) -> bool {
        let mut stdin = self.stdin.lock();
        let Some(pipe) = stdin.as_mut() else {
            debug!(backend = SOURCE, command, "mplayer not running, command dropped");
            return false;
        };
        match writeln!(pipe, "{}", command).and_then(|_| pipe.flush()) {
            Ok(()) => true,
            Err(e) => {
                debug!(backend = SOURCE, command, error = %e, "mplayer write failed");
                *stdin = None;
                false
            }
        }
    }

    fn handle(&self, event: MplayerEvent) {
        let mut status = PlayerStatus::from_source(SOURCE);
        match event {
            MplayerEvent::StreamTitle(title) | MplayerEvent::FileName(title) => {
                status.current_title = Some(title);
            }
            MplayerEvent::Length(length) => status.track_time = Some(length),
            MplayerEvent::TimePos(pos) => {
                self.time_pos.resolve(pos);
                status.seek_time = Some(format_seconds(pos));
            }
            MplayerEvent::Volume(volume) => {
                let level = volume.round().clamp(0.0, 100.0) as u8;
                self.volume.resolve(level);
                self.listeners.notify_volume_listeners(level);
                return;
            }
            MplayerEvent::EndOfFile => {
                self.notifier.notify();
                return;
            }
            MplayerEvent::StartingPlayback => {
                self.send("get_property filename");
                self.send("get_property length");
                status.state = Some(PlaybackState::Playing);
            }
        }
        self.listeners.notify_player_listeners(&status);
    }
}

fn reader_loop(
    inner: Arc<MplayerInner>,
    runner: Arc<dyn CommandRunner>,
    binary: String,
    killer: Arc<Mutex<Option<Killer>>>,
    stop: StopFlag,
) {
    while stop.is_running() {
        let process = match runner.spawn_interactive(&binary, SLAVE_ARGS) {
            Ok(p) => p,
            Err(e) => {
                warn!(backend = SOURCE, binary = %binary, error = %e, "Cannot start mplayer");
                if stop.sleep(RESTART_DELAY) {
                    break;
                }
                continue;
            }
        };
        let mut stdout = process.stdout;
        *inner.stdin.lock() = Some(process.stdin);
        *killer.lock() = Some(process.killer);
        if stop.is_stopped() {
            break;
        }

        while stop.is_running() {
            match read_trimmed_line(stdout.as_mut()) {
                Ok(Some(line)) => {
                    if let Some(event) = parse_output_line(&line) {
                        inner.handle(event);
                    }
                }
                Ok(None) => {
                    debug!(backend = SOURCE, "mplayer output closed");
                    break;
                }
                Err(e) => {
                    debug!(backend = SOURCE, error = %e, "mplayer read failed");
                    break;
                }
            }
        }

        inner.stdin.lock().take();
        if let Some(mut kill) = killer.lock().take() {
            kill();
        }
        if stop.is_running() {
            stop.sleep(RESTART_DELAY);
        }
    }
}

pub struct MplayerBackend {
    inner: Arc<MplayerInner>,
    settings: MplayerSettings,
    runner: Arc<dyn CommandRunner>,
    reader: ListenerThread,
    killer: Arc<Mutex<Option<Killer>>>,
    current_url: Mutex<Option<String>>,
    playlist: Mutex<Vec<TrackDescriptor>>,
    music_folder: String,
    mute: Mutex<MuteState>,
}

impl MplayerBackend {
    pub fn new(
        settings: MplayerSettings,
        music_folder: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            inner: Arc::new(MplayerInner {
                listeners: Arc::new(ListenerRegistry::new()),
                notifier: EndOfTrackNotifier::new("mplayer"),
                stdin: Mutex::new(None),
                time_pos: ReplySlot::new(),
                volume: ReplySlot::new(),
            }),
            settings,
            runner,
            reader: ListenerThread::new("mplayer-reader"),
            killer: Arc::new(Mutex::new(None)),
            current_url: Mutex::new(None),
            playlist: Mutex::new(Vec::new()),
            music_folder: music_folder.into(),
            mute: Mutex::new(MuteState::default()),
        }
    }

    fn send(&self, command: &str) -> bool {
        self.inner.send(command)
    }

    fn load(&self, url: &str) {
        self.send(&format!("loadfile {}", quoted(url)));
        *self.current_url.lock() = Some(url.to_string());
    }
}

impl BackendIdentity for MplayerBackend {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Mplayer
    }
}

impl ClientLifecycle for MplayerBackend {
    fn start_client(&self) {
        self.inner.notifier.start(Arc::clone(&self.inner.listeners));
        let inner = Arc::clone(&self.inner);
        let runner = Arc::clone(&self.runner);
        let binary = self.settings.binary.clone();
        let killer = Arc::clone(&self.killer);
        if self
            .reader
            .start(move |stop| reader_loop(inner, runner, binary, killer, stop))
        {
            info!(backend = SOURCE, binary = %self.settings.binary, "mplayer client started");
        }
    }

    fn stop_client(&self) {
        let inner = Arc::clone(&self.inner);
        let killer = Arc::clone(&self.killer);
        let stopped = self.reader.stop_with(|| {
            inner.send("quit");
            inner.stdin.lock().take();
            if let Some(mut kill) = killer.lock().take() {
                kill();
            }
        });
        self.inner.notifier.shutdown();
        if stopped {
            info!(backend = SOURCE, "mplayer client stopped");
        }
    }
}

impl TransportControl for MplayerBackend {
    fn play(&self, request: &PlayRequest) -> Result<(), PlayerError> {
        if let Some(index) = request.playlist_position() {
            let entry = self
                .playlist
                .lock()
                .iter()
                .find(|e| e.index == index)
                .map(|e| e.file.clone());
            match entry {
                Some(file) => self.load(&file),
                None => debug!(backend = SOURCE, index, "No such playlist entry"),
            }
            return Ok(());
        }

        let Some(url) = absolute_url(request) else {
            debug!(backend = SOURCE, ?request, "Nothing to play");
            return Ok(());
        };
        self.load(&url);
        if let Some(time) = request.resume_time() {
            match seek_seconds(time) {
                Ok(secs) => {
                    self.send(&format!("set_property time_pos {}", format_seconds(secs)));
                }
                Err(e) => debug!(backend = SOURCE, error = %e, "Resume position ignored"),
            }
        }
        Ok(())
    }

    /// mplayer toggles pause natively.
    fn pause(&self) -> Result<(), PlayerError> {
        self.send("pause");
        Ok(())
    }

    fn stop(&self, source: Option<&str>) -> Result<(), PlayerError> {
        debug!(backend = SOURCE, source, "Stop requested");
        self.send("stop");
        Ok(())
    }

    fn seek(&self, time: &str) -> Result<(), PlayerError> {
        match seek_seconds(time) {
            Ok(secs) => {
                self.send(&format!("set_property time_pos {}", format_seconds(secs)));
            }
            Err(e) => debug!(backend = SOURCE, error = %e, "Seek ignored"),
        }
        Ok(())
    }

    fn current_track_time(&self) -> Result<Option<f64>, PlayerError> {
        Ok(self.inner.time_pos.request(
            || self.send("get_property time_pos"),
            self.settings.reply_timeout,
        ))
    }
}

impl VolumeControl for MplayerBackend {
    fn get_volume(&self) -> Result<Option<u8>, PlayerError> {
        Ok(self.inner.volume.request(
            || self.send("get_property volume"),
            self.settings.reply_timeout,
        ))
    }

    fn apply_volume(&self, level: u8) -> Result<(), PlayerError> {
        self.send(&format!("volume {} 100", level));
        Ok(())
    }

    fn mute_state(&self) -> Option<&Mutex<MuteState>> {
        Some(&self.mute)
    }
}

impl PlaylistControl for MplayerBackend {
    fn load_playlist(&self, request: &PlayRequest) -> Result<Vec<TrackDescriptor>, PlayerError> {
        if is_cue_request(request) {
            debug!(backend = SOURCE, "Cue sheets are not loaded");
            return Ok(Vec::new());
        }
        let Some(path) = playlist_path(request, &self.music_folder) else {
            return Ok(Vec::new());
        };
        let entries = get_m3u_playlist(&path);
        *self.playlist.lock() = entries.clone();
        Ok(entries)
    }

    fn current_playlist(&self) -> Result<Vec<TrackDescriptor>, PlayerError> {
        Ok(self.playlist.lock().clone())
    }
}

impl Player for MplayerBackend {
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

impl Drop for MplayerBackend {
    fn drop(&mut self) {
        self.stop_client();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_icy_title() {
        assert_eq!(
            parse_output_line("ICY Info: StreamTitle='Band - Tune';StreamUrl='';"),
            Some(MplayerEvent::StreamTitle("Band - Tune".to_string()))
        );
    }

    #[test]
    fn test_parse_answers() {
        assert_eq!(
            parse_output_line("ANS_filename='song.mp3'"),
            Some(MplayerEvent::FileName("song.mp3".to_string()))
        );
        assert_eq!(
            parse_output_line("ANS_length=215.00"),
            Some(MplayerEvent::Length("215.00".to_string()))
        );
        assert_eq!(
            parse_output_line("ANS_time_pos=12.5"),
            Some(MplayerEvent::TimePos(12.5))
        );
        assert_eq!(
            parse_output_line("ANS_volume=49.000000"),
            Some(MplayerEvent::Volume(49.0))
        );
    }

    #[test]
    fn test_parse_playback_markers() {
        assert_eq!(parse_output_line("EOF code: 1  "), Some(MplayerEvent::EndOfFile));
        assert_eq!(parse_output_line("EOF code: 4"), None);
        assert_eq!(
            parse_output_line("Starting playback..."),
            Some(MplayerEvent::StartingPlayback)
        );
        assert_eq!(parse_output_line("AO: [pulse] 44100Hz 2ch s16le"), None);
    }
}
