#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use peppyplayer::PlayerError;
use peppyplayer::backends::shairport::RemoteControl;
use peppyplayer::config_ext::MpdSettings;
use peppyplayer::process::{CommandRunner, InteractiveProcess, LineProcess};

pub const WAIT: Duration = Duration::from_secs(3);

/// `Read` over chunks pushed through a channel; `None` closes the stream.
///
/// The first read announces the child on `ready`: by then the backend has
/// stored its stdin and killer.
struct ChannelReader {
    rx: Receiver<Option<Vec<u8>>>,
    pending: Vec<u8>,
    pos: usize,
    closed: bool,
    ready: Option<(Sender<String>, String)>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if let Some((tx, command)) = self.ready.take() {
            let _ = tx.send(command);
        }
        while self.pos >= self.pending.len() {
            if self.closed {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(Some(bytes)) => {
                    self.pending = bytes;
                    self.pos = 0;
                }
                Ok(None) | Err(_) => {
                    self.closed = true;
                    return Ok(0);
                }
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Splits what a backend writes to a child's stdin into lines.
struct LineSink {
    buf: Vec<u8>,
    tx: Sender<String>,
}

impl Write for LineSink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let _ = self
                .tx
                .send(String::from_utf8_lossy(&line).trim_end().to_string());
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// [`CommandRunner`] whose children are scripted by the test.
///
/// `run` answers from a table keyed by the joined arguments. Spawned
/// children read their stdout from [`emit`](Self::emit); what the backend
/// writes to their stdin comes back through [`next_written`](Self::next_written).
pub struct ScriptedRunner {
    calls: Mutex<Vec<String>>,
    outputs: Mutex<HashMap<String, String>>,
    failures: Mutex<HashSet<String>>,
    feed: Mutex<Option<Sender<Option<Vec<u8>>>>>,
    spawned_tx: Sender<String>,
    spawned_rx: Receiver<String>,
    stdin_tx: Sender<String>,
    stdin_rx: Receiver<String>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        let (spawned_tx, spawned_rx) = unbounded();
        let (stdin_tx, stdin_rx) = unbounded();
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            outputs: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashSet::new()),
            feed: Mutex::new(None),
            spawned_tx,
            spawned_rx,
            stdin_tx,
            stdin_rx,
        })
    }

    pub fn respond(&self, args: &str, output: &str) {
        self.outputs
            .lock()
            .insert(args.to_string(), output.to_string());
    }

    /// Makes the next `run` with these arguments fail.
    pub fn fail_once(&self, args: &str) {
        self.failures.lock().insert(args.to_string());
    }

    /// Every `run` invocation as `"program arg1 arg2"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Waits until the next spawned child is being read and returns its
    /// command line.
    pub fn wait_spawn(&self) -> Option<String> {
        self.spawned_rx.recv_timeout(WAIT).ok()
    }

    /// Writes one line on the stdout of the last spawned child.
    pub fn emit(&self, line: &str) -> bool {
        match self.feed.lock().as_ref() {
            Some(tx) => tx.send(Some(format!("{}\n", line).into_bytes())).is_ok(),
            None => false,
        }
    }

    /// Next line the backend wrote to a child's stdin.
    pub fn next_written(&self) -> Option<String> {
        self.stdin_rx.recv_timeout(WAIT).ok()
    }

    fn new_child(
        &self,
        program: &str,
        args: &[&str],
    ) -> (Box<dyn BufRead + Send>, Box<dyn FnMut() + Send>) {
        let (tx, rx) = unbounded();
        let reader = ChannelReader {
            rx,
            pending: Vec::new(),
            pos: 0,
            closed: false,
            ready: Some((
                self.spawned_tx.clone(),
                format!("{} {}", program, args.join(" ")),
            )),
        };
        let closer = tx.clone();
        *self.feed.lock() = Some(tx);
        (
            Box::new(BufReader::new(reader)),
            Box::new(move || {
                let _ = closer.send(None);
            }),
        )
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, PlayerError> {
        self.calls
            .lock()
            .push(format!("{} {}", program, args.join(" ")));
        if self.failures.lock().remove(&args.join(" ")) {
            return Err(PlayerError::transport(format!("{} exited with status 1", program)));
        }
        Ok(self
            .outputs
            .lock()
            .get(&args.join(" "))
            .cloned()
            .unwrap_or_default())
    }

    fn spawn_lines(&self, program: &str, args: &[&str]) -> Result<LineProcess, PlayerError> {
        let (stdout, killer) = self.new_child(program, args);
        Ok(LineProcess { stdout, killer })
    }

    fn spawn_interactive(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<InteractiveProcess, PlayerError> {
        let (stdout, killer) = self.new_child(program, args);
        Ok(InteractiveProcess {
            stdin: Box::new(LineSink {
                buf: Vec::new(),
                tx: self.stdin_tx.clone(),
            }),
            stdout,
            killer,
        })
    }
}

/// In-memory shairport-sync remote control. `VolumeUp` / `VolumeDown` move
/// the AirPlay volume by 1.875 dB within -30.0..=0.0.
pub struct FakeRemote {
    pub calls: Mutex<Vec<String>>,
    pub volume: Mutex<f64>,
    pub state: Mutex<String>,
}

impl FakeRemote {
    pub fn new(volume: f64, state: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            volume: Mutex::new(volume),
            state: Mutex::new(state.to_string()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl RemoteControl for FakeRemote {
    fn call(&self, method: &str) -> Result<(), PlayerError> {
        self.calls.lock().push(method.to_string());
        let mut volume = self.volume.lock();
        match method {
            "VolumeUp" => *volume = (*volume + 1.875).min(0.0),
            "VolumeDown" => *volume = (*volume - 1.875).max(-30.0),
            _ => {}
        }
        Ok(())
    }

    fn airplay_volume(&self) -> Result<f64, PlayerError> {
        Ok(*self.volume.lock())
    }

    fn player_state(&self) -> Result<String, PlayerError> {
        Ok(self.state.lock().clone())
    }
}

/// MPD server on `127.0.0.1:0` answering from canned text.
///
/// Commands other than `idle` are recorded. An `idle` blocks until
/// [`trigger`](Self::trigger) names a subsystem.
pub struct FakeMpdServer {
    port: u16,
    commands: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<HashMap<String, String>>>,
    idle_tx: Sender<String>,
    closed: Arc<AtomicBool>,
}

impl FakeMpdServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(Mutex::new(HashMap::new()));
        let (idle_tx, idle_rx) = unbounded::<String>();
        let closed = Arc::new(AtomicBool::new(false));

        {
            let commands = Arc::clone(&commands);
            let responses = Arc::clone(&responses);
            let closed = Arc::clone(&closed);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    if closed.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(stream) = stream else { continue };
                    let commands = Arc::clone(&commands);
                    let responses = Arc::clone(&responses);
                    let idle_rx = idle_rx.clone();
                    let closed = Arc::clone(&closed);
                    thread::spawn(move || serve(stream, commands, responses, idle_rx, closed));
                }
            });
        }

        Self {
            port,
            commands,
            responses,
            idle_tx,
            closed,
        }
    }

    pub fn settings(&self) -> MpdSettings {
        MpdSettings {
            host: "127.0.0.1".to_string(),
            port: self.port,
            command_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(30),
            connect_attempts: 1,
            connect_delay: Duration::from_millis(100),
        }
    }

    /// Body returned for `command`, without the trailing `OK`.
    pub fn respond(&self, command: &str, body: &str) {
        self.responses
            .lock()
            .insert(command.to_string(), body.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn trigger(&self, subsystem: &str) {
        let _ = self.idle_tx.send(subsystem.to_string());
    }
}

impl Drop for FakeMpdServer {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(("127.0.0.1", self.port));
    }
}

fn serve(
    stream: TcpStream,
    commands: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<HashMap<String, String>>>,
    idle_rx: Receiver<String>,
    closed: Arc<AtomicBool>,
) {
    let Ok(mut writer) = stream.try_clone() else {
        return;
    };
    if writer.write_all(b"OK MPD 0.23.5\n").is_err() {
        return;
    }
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim_end().to_string();
        let reply = if command == "idle" {
            loop {
                if closed.load(Ordering::SeqCst) {
                    return;
                }
                if let Ok(subsystem) = idle_rx.recv_timeout(Duration::from_millis(100)) {
                    break format!("changed: {}\nOK\n", subsystem);
                }
            }
        } else {
            let body = responses.lock().get(&command).cloned().unwrap_or_default();
            commands.lock().push(command);
            if body.is_empty() {
                "OK\n".to_string()
            } else {
                format!("{}\nOK\n", body.trim_end())
            }
        };
        if writer.write_all(reply.as_bytes()).is_err() {
            return;
        }
    }
}
