//! MPD driven through the `mpc` command-line client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::capabilities::{
    BackendIdentity, ClientLifecycle, MuteState, Player, PlaylistControl, TransportControl,
    VolumeControl,
};
use crate::errors::PlayerError;
use crate::listener_thread::{ListenerThread, StopFlag};
use crate::listeners::ListenerRegistry;
use crate::model::{
    Capability, PlayRequest, PlaybackState, PlayerKind, PlayerStatus, TrackDescriptor,
};
use crate::notifier::EndOfTrackNotifier;
use crate::playlist_file::{get_m3u_playlist, is_cue_request, playlist_path};
use crate::process::{CommandRunner, Killer, read_trimmed_line};
use crate::time_utils::{format_clock, parse_elapsed_total, seek_seconds};
use crate::track_url::library_url;

const SOURCE: &str = "mpc";

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

const IDLE_RETRY: std::time::Duration = std::time::Duration::from_secs(2);

struct MpcInner {
    binary: String,
    runner: Arc<dyn CommandRunner>,
    listeners: Arc<ListenerRegistry>,
    notifier: EndOfTrackNotifier,
    dont_parse_track_name: AtomicBool,
}

impl MpcInner {
    /// Runs `mpc <args>`; failures are logged and read as empty output.
    fn mpc(&self, args: &[&str]) -> String {
        match self.runner.run(&self.binary, args) {
            Ok(out) => out,
            Err(e) => {
                debug!(backend = SOURCE, ?args, error = %e, "mpc failed");
                String::new()
            }
        }
    }

    fn status(&self) -> PlayerStatus {
        parse_status(&self.mpc(&["status"]))
    }

    fn on_player_change(&self) {
        let mut status = self.status();
        let current = if self.dont_parse_track_name.load(Ordering::SeqCst) {
            self.mpc(&["-f", "%file%", "current"])
        } else {
            self.mpc(&["current"])
        };
        match current.lines().next().map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => {
                status.current_title = Some(title.to_string());
                self.listeners.notify_player_listeners(&status);
            }
            None => self.notifier.notify(),
        }
    }

    fn on_mixer_change(&self) {
        if let Some(volume) = self.status().volume.and_then(|v| u8::try_from(v).ok()) {
            self.listeners.notify_volume_listeners(volume);
        }
    }
}

/// Parses `mpc status` output.
///
/// ```text
/// Artist - Title
/// [playing] #3/10   0:05/3:20 (2%)
/// volume: 42%   repeat: off   random: off   single: off   consume: off
/// ```
///
/// Without a `[state]` line the player is stopped.
pub fn parse_status(output: &str) -> PlayerStatus {
    let mut status = PlayerStatus::from_source(SOURCE);
    let mut saw_volume = false;

    for line in output.lines().map(str::trim) {
        if line.starts_with('[') {
            let mut tokens = line.split_whitespace();
            status.state = tokens.next().map(PlaybackState::from_backend_token);
            for token in tokens {
                if let Some(rest) = token.strip_prefix('#') {
                    status.track = rest.split('/').next().and_then(|n| n.parse().ok());
                } else if let Some((elapsed, total)) = parse_elapsed_total(token) {
                    status.seek_time = Some(elapsed.to_string());
                    status.track_time = Some(total.to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("volume:") {
            saw_volume = true;
            let value = rest.split_whitespace().next().unwrap_or("");
            status.volume = Some(value.trim_end_matches('%').parse().unwrap_or(-1));
        }
    }

    if status.state.is_none() && saw_volume {
        status.state = Some(PlaybackState::Stopped);
    }
    status
}

/// One `idleloop` event: a line, plus the next one when the first is blank.
fn read_event(reader: &mut dyn std::io::BufRead) -> std::io::Result<Option<Vec<String>>> {
    let Some(first) = read_trimmed_line(reader)? else {
        return Ok(None);
    };
    let mut frame = vec![first];
    if frame[0].trim().is_empty() {
        match read_trimmed_line(reader)? {
            Some(second) => frame.push(second),
            None => return Ok(None),
        }
    }
    Ok(Some(frame))
}

fn idle_loop(inner: Arc<MpcInner>, killer: Arc<Mutex<Option<Killer>>>, stop: StopFlag) {
    while stop.is_running() {
        let mut process = match inner.runner.spawn_lines(&inner.binary, &["idleloop"]) {
            Ok(p) => p,
            Err(e) => {
                debug!(backend = SOURCE, error = %e, "Cannot start mpc idleloop");
                if stop.sleep(IDLE_RETRY) {
                    break;
                }
                continue;
            }
        };
        *killer.lock() = Some(process.killer);
        if stop.is_stopped() {
            break;
        }

        while stop.is_running() {
            match read_event(process.stdout.as_mut()) {
                Ok(Some(frame)) => {
                    if frame.iter().any(|l| l.contains("player")) {
                        inner.on_player_change();
                    }
                    if frame.iter().any(|l| l.contains("mixer")) {
                        inner.on_mixer_change();
                    }
                }
                Ok(None) => {
                    debug!(backend = SOURCE, "mpc idleloop ended");
                    break;
                }
                Err(e) => {
                    debug!(backend = SOURCE, error = %e, "mpc idleloop read failed");
                    break;
                }
            }
        }

        if let Some(mut kill) = killer.lock().take() {
            kill();
        }
        if stop.is_running() {
            stop.sleep(IDLE_RETRY);
        }
    }
}

pub struct MpcBackend {
    inner: Arc<MpcInner>,
    music_folder: String,
    idle: ListenerThread,
    killer: Arc<Mutex<Option<Killer>>>,
    current_url: Mutex<Option<String>>,
    playlist: Mutex<Vec<TrackDescriptor>>,
    mute: Mutex<MuteState>,
}

impl MpcBackend {
    pub fn new(
        binary: impl Into<String>,
        music_folder: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            inner: Arc::new(MpcInner {
                binary: binary.into(),
                runner,
                listeners: Arc::new(ListenerRegistry::new()),
                notifier: EndOfTrackNotifier::new("mpc"),
                dont_parse_track_name: AtomicBool::new(false),
            }),
            music_folder: music_folder.into(),
            idle: ListenerThread::new("mpc-idleloop"),
            killer: Arc::new(Mutex::new(None)),
            current_url: Mutex::new(None),
            playlist: Mutex::new(Vec::new()),
            mute: Mutex::new(MuteState::default()),
        }
    }

    pub fn status(&self) -> PlayerStatus {
        self.inner.status()
    }

    fn mpc(&self, args: &[&str]) -> String {
        self.inner.mpc(args)
    }
}

impl BackendIdentity for MpcBackend {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Mpc
    }
}

impl ClientLifecycle for MpcBackend {
    fn start_client(&self) {
        self.inner.notifier.start(Arc::clone(&self.inner.listeners));
        let inner = Arc::clone(&self.inner);
        let killer = Arc::clone(&self.killer);
        if self.idle.start(move |stop| idle_loop(inner, killer, stop)) {
            info!(backend = SOURCE, binary = %self.inner.binary, "mpc client started");
        }
    }

    fn stop_client(&self) {
        let killer = Arc::clone(&self.killer);
        let stopped = self.idle.stop_with(|| {
            if let Some(mut kill) = killer.lock().take() {
                kill();
            }
        });
        self.inner.notifier.shutdown();
        if stopped {
            info!(backend = SOURCE, "mpc client stopped");
        }
    }
}

impl TransportControl for MpcBackend {
    fn play(&self, request: &PlayRequest) -> Result<(), PlayerError> {
        self.inner
            .dont_parse_track_name
            .store(request.dont_parse_track_name, Ordering::SeqCst);

        if let Some(index) = request.playlist_position() {
            // mpc numbers playlist entries from 1
            self.mpc(&["play", &(index + 1).to_string()]);
            return Ok(());
        }

        let Some(url) = library_url(request, &self.music_folder) else {
            debug!(backend = SOURCE, ?request, "Nothing to play");
            return Ok(());
        };
        self.mpc(&["clear"]);
        self.mpc(&["add", &url]);
        self.mpc(&["play"]);
        if let Some(time) = request.resume_time() {
            match seek_seconds(time) {
                Ok(secs) => {
                    self.mpc(&["seek", &format_clock(secs)]);
                }
                Err(e) => debug!(backend = SOURCE, error = %e, "Resume position ignored"),
            }
        }
        *self.current_url.lock() = Some(url);
        Ok(())
    }

    fn pause(&self) -> Result<(), PlayerError> {
        match self.status().state {
            Some(PlaybackState::Playing) => self.mpc(&["pause"]),
            _ => self.mpc(&["play"]),
        };
        Ok(())
    }

    fn stop(&self, source: Option<&str>) -> Result<(), PlayerError> {
        debug!(backend = SOURCE, source, "Stop requested");
        self.mpc(&["stop"]);
        Ok(())
    }

    fn seek(&self, time: &str) -> Result<(), PlayerError> {
        match seek_seconds(time) {
            Ok(secs) => {
                self.mpc(&["seek", &format_clock(secs)]);
            }
            Err(e) => debug!(backend = SOURCE, error = %e, "Seek ignored"),
        }
        Ok(())
    }

    fn current_track_time(&self) -> Result<Option<f64>, PlayerError> {
        Ok(self.status().seek_time.and_then(|t| t.parse().ok()))
    }
}

impl VolumeControl for MpcBackend {
    fn get_volume(&self) -> Result<Option<u8>, PlayerError> {
        Ok(self.status().volume.and_then(|v| u8::try_from(v).ok()))
    }

    fn apply_volume(&self, level: u8) -> Result<(), PlayerError> {
        self.mpc(&["volume", &level.to_string()]);
        Ok(())
    }

    fn mute_state(&self) -> Option<&Mutex<MuteState>> {
        Some(&self.mute)
    }
}

impl PlaylistControl for MpcBackend {
    fn load_playlist(&self, request: &PlayRequest) -> Result<Vec<TrackDescriptor>, PlayerError> {
        if is_cue_request(request) {
            debug!(backend = SOURCE, "Cue sheets are not loaded");
            return Ok(Vec::new());
        }
        let Some(path) = playlist_path(request, &self.music_folder) else {
            return Ok(Vec::new());
        };
        let entries = get_m3u_playlist(&path);
        self.mpc(&["clear"]);
        for entry in &entries {
            self.mpc(&["add", &entry.file]);
        }
        *self.playlist.lock() = entries.clone();
        Ok(entries)
    }

    fn current_playlist(&self) -> Result<Vec<TrackDescriptor>, PlayerError> {
        Ok(self.playlist.lock().clone())
    }
}

impl Player for MpcBackend {
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

impl Drop for MpcBackend {
    fn drop(&mut self) {
        self.stop_client();
    }
}
