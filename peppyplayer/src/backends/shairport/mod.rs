//! AirPlay through shairport-sync.
//!
//! Events come from the metadata named pipe; commands go through the D-Bus
//! remote control interface.

pub mod metadata;
pub mod remote;

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

pub use metadata::{MetadataDecoder, MetadataEvent, airplay_to_percent};
pub use remote::{DbusRemoteControl, RemoteControl};

use crate::capabilities::{
    BackendIdentity, ClientLifecycle, MuteState, Player, PlaylistControl, TransportControl,
    VolumeControl,
};
use crate::config_ext::ShairportSettings;
use crate::errors::PlayerError;
use crate::listener_thread::{ListenerThread, StopFlag};
use crate::listeners::ListenerRegistry;
use crate::model::{Capability, PlayRequest, PlaybackState, PlayerKind, PlayerStatus};
use crate::process::read_trimmed_line;

const SOURCE: &str = "shairport";

const PIPE_RETRY: Duration = Duration::from_secs(1);

/// Volume change produced by one `VolumeUp` / `VolumeDown` call.
const VOLUME_STEP: f64 = 6.25;
const MAX_VOLUME_STEPS: u32 = 16;

const CAPABILITIES: &[Capability] = &[
    Capability::Play,
    Capability::Pause,
    Capability::Stop,
    Capability::Volume,
    Capability::Mute,
    Capability::Events,
];

struct ShairportInner {
    listeners: Arc<ListenerRegistry>,
    /// Cleared by a local volume change so the echo from the pipe is skipped.
    volume_callback_enabled: AtomicBool,
    picture: Mutex<Option<Arc<Vec<u8>>>>,
}

impl ShairportInner {
    fn handle(&self, event: MetadataEvent) {
        let mut status = PlayerStatus::from_source(SOURCE);
        match event {
            MetadataEvent::Title(title) => {
                status.current_title = Some(title);
                status.picture = self.picture.lock().clone();
            }
            MetadataEvent::Picture(bytes) => {
                let picture = Arc::new(bytes);
                *self.picture.lock() = Some(Arc::clone(&picture));
                status.picture = Some(picture);
            }
            MetadataEvent::Volume(volume) => {
                if !self.volume_callback_enabled.swap(true, Ordering::SeqCst) {
                    debug!(backend = SOURCE, volume, "Volume echo suppressed");
                    return;
                }
                self.listeners.notify_volume_listeners(volume);
                return;
            }
            MetadataEvent::Begin | MetadataEvent::Resume => {
                status.state = Some(PlaybackState::Playing);
            }
            MetadataEvent::End => status.state = Some(PlaybackState::Stopped),
        }
        self.listeners.notify_player_listeners(&status);
    }
}

/// Opened read+write so `open` does not block waiting for a writer.
fn open_pipe(path: &PathBuf) -> std::io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

fn pipe_loop(
    inner: Arc<ShairportInner>,
    path: PathBuf,
    waker: Arc<Mutex<Option<File>>>,
    stop: StopFlag,
) {
    while stop.is_running() {
        let file = match open_pipe(&path) {
            Ok(f) => f,
            Err(e) => {
                debug!(backend = SOURCE, pipe = %path.display(), error = %e, "Cannot open metadata pipe");
                if stop.sleep(PIPE_RETRY) {
                    break;
                }
                continue;
            }
        };
        *waker.lock() = file.try_clone().ok();
        if stop.is_stopped() {
            break;
        }

        let mut reader = BufReader::new(file);
        let mut decoder = MetadataDecoder::new();
        while stop.is_running() {
            match read_trimmed_line(&mut reader) {
                Ok(Some(line)) => {
                    if let Some(event) = decoder.feed_line(&line) {
                        inner.handle(event);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(backend = SOURCE, error = %e, "Metadata pipe read failed");
                    break;
                }
            }
        }

        waker.lock().take();
        if stop.is_running() {
            stop.sleep(PIPE_RETRY);
        }
    }
}

pub struct ShairportBackend {
    inner: Arc<ShairportInner>,
    remote: Arc<dyn RemoteControl>,
    pipe: PathBuf,
    reader: ListenerThread,
    waker: Arc<Mutex<Option<File>>>,
    mute: Mutex<MuteState>,
}

impl ShairportBackend {
    /// Builds the backend with the system D-Bus remote control.
    pub fn new(settings: &ShairportSettings) -> Self {
        let remote = DbusRemoteControl::connect(settings.dbus_attempts, settings.dbus_delay);
        Self::with_remote(&settings.pipe, Arc::new(remote))
    }

    pub fn with_remote(pipe: impl Into<PathBuf>, remote: Arc<dyn RemoteControl>) -> Self {
        Self {
            inner: Arc::new(ShairportInner {
                listeners: Arc::new(ListenerRegistry::new()),
                volume_callback_enabled: AtomicBool::new(true),
                picture: Mutex::new(None),
            }),
            remote,
            pipe: pipe.into(),
            reader: ListenerThread::new("shairport-pipe"),
            waker: Arc::new(Mutex::new(None)),
            mute: Mutex::new(MuteState::default()),
        }
    }

    /// Last cover art received from the pipe.
    pub fn picture(&self) -> Option<Arc<Vec<u8>>> {
        self.inner.picture.lock().clone()
    }

    pub fn next_track(&self) {
        self.call("Next");
    }

    pub fn previous_track(&self) {
        self.call("Previous");
    }

    fn call(&self, method: &str) {
        if let Err(e) = self.remote.call(method) {
            debug!(backend = SOURCE, method, error = %e, "Remote call failed");
        }
    }

    fn is_playing(&self) -> bool {
        match self.remote.player_state() {
            Ok(state) => state.eq_ignore_ascii_case("playing"),
            Err(e) => {
                debug!(backend = SOURCE, error = %e, "PlayerState unavailable");
                false
            }
        }
    }
}

impl BackendIdentity for ShairportBackend {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Shairport
    }
}

impl ClientLifecycle for ShairportBackend {
    fn start_client(&self) {
        let inner = Arc::clone(&self.inner);
        let path = self.pipe.clone();
        let waker = Arc::clone(&self.waker);
        if self
            .reader
            .start(move |stop| pipe_loop(inner, path, waker, stop))
        {
            info!(backend = SOURCE, pipe = %self.pipe.display(), "Shairport client started");
        }
    }

    fn stop_client(&self) {
        let waker = Arc::clone(&self.waker);
        let stopped = self.reader.stop_with(|| {
            if let Some(mut pipe) = waker.lock().take() {
                // Unblocks the reader waiting on the pipe
                let _ = pipe.write_all(b"\n").and_then(|_| pipe.flush());
            }
        });
        if stopped {
            info!(backend = SOURCE, "Shairport client stopped");
        }
    }
}

impl TransportControl for ShairportBackend {
    /// Resumes the AirPlay session; the request content is chosen by the
    /// sender, not by us.
    fn play(&self, _request: &PlayRequest) -> Result<(), PlayerError> {
        self.call("Play");
        Ok(())
    }

    fn pause(&self) -> Result<(), PlayerError> {
        if self.is_playing() {
            self.call("Pause");
        } else {
            self.call("Play");
        }
        Ok(())
    }

    fn stop(&self, source: Option<&str>) -> Result<(), PlayerError> {
        debug!(backend = SOURCE, source, "Stop requested");
        if self.is_playing() {
            self.call("Pause");
        }
        Ok(())
    }
}

impl VolumeControl for ShairportBackend {
    fn get_volume(&self) -> Result<Option<u8>, PlayerError> {
        match self.remote.airplay_volume() {
            Ok(volume) => Ok(Some(airplay_to_percent(volume))),
            Err(e) => {
                debug!(backend = SOURCE, error = %e, "AirplayVolume unavailable");
                Ok(None)
            }
        }
    }

    /// AirPlay has no absolute setter: step with `VolumeUp` / `VolumeDown`.
    fn apply_volume(&self, level: u8) -> Result<(), PlayerError> {
        let Some(current) = self.get_volume()? else {
            return Ok(());
        };
        let delta = level as f64 - current as f64;
        let steps = ((delta.abs() / VOLUME_STEP).round() as u32).min(MAX_VOLUME_STEPS);
        if steps == 0 {
            return Ok(());
        }
        self.inner
            .volume_callback_enabled
            .store(false, Ordering::SeqCst);
        let method = if delta > 0.0 { "VolumeUp" } else { "VolumeDown" };
        for _ in 0..steps {
            self.call(method);
        }
        Ok(())
    }

    fn mute_state(&self) -> Option<&Mutex<MuteState>> {
        Some(&self.mute)
    }
}

impl PlaylistControl for ShairportBackend {}

impl Player for ShairportBackend {
    fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn current_url(&self) -> Option<String> {
        None
    }
}

impl Drop for ShairportBackend {
    fn drop(&mut self) {
        self.stop_client();
    }
}
