//! Line-oriented MPD transport.
//!
//! A connection is opened per command: connect, consume the `OK MPD x.y.z`
//! greeting, write one line, read the answer, disconnect. Failures never
//! escape; a connection that could not be opened turns every later write and
//! read into a no-op.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use socket2::SockRef;
use tracing::{debug, warn};

use crate::config_ext::MpdSettings;
use crate::errors::PlayerError;

pub struct MpdConnection {
    address: String,
    timeout: Duration,
    attempts: u32,
    retry_delay: Duration,
    reader: Option<BufReader<TcpStream>>,
    writer: Option<TcpStream>,
}

impl MpdConnection {
    /// Command connection: `command_timeout` on reads and writes.
    pub fn for_commands(settings: &MpdSettings) -> Self {
        Self::new(settings, settings.command_timeout)
    }

    /// Idle connection: long read timeout, a single connect attempt (the
    /// caller owns the retry loop).
    pub fn for_idle(settings: &MpdSettings) -> Self {
        let mut conn = Self::new(settings, settings.idle_timeout);
        conn.attempts = 1;
        conn
    }

    fn new(settings: &MpdSettings, timeout: Duration) -> Self {
        Self {
            address: settings.address(),
            timeout: timeout.max(Duration::from_millis(1)),
            attempts: settings.connect_attempts.max(1),
            retry_delay: settings.connect_delay,
            reader: None,
            writer: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// Opens the transport. Returns `false` once every attempt failed.
    pub fn connect(&mut self) -> bool {
        self.disconnect();
        for attempt in 1..=self.attempts {
            match self.open() {
                Ok(()) => return true,
                Err(e) => {
                    debug!(address = %self.address, attempt, error = %e, "MPD connect failed");
                    self.disconnect();
                    if attempt < self.attempts {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        warn!(address = %self.address, attempts = self.attempts, "MPD unreachable, commands are ignored");
        false
    }

    fn open(&mut self) -> Result<(), PlayerError> {
        let addrs = self
            .address
            .to_socket_addrs()
            .map_err(|e| PlayerError::transport(format!("Failed to resolve {}: {}", self.address, e)))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout.min(Duration::from_secs(10))) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    SockRef::from(&stream).set_keepalive(true)?;

                    let writer = stream.try_clone()?;
                    let mut reader = BufReader::new(stream);
                    let mut greeting = String::new();
                    reader.read_line(&mut greeting)?;
                    if !greeting.starts_with("OK MPD") {
                        return Err(PlayerError::protocol(format!(
                            "Unexpected MPD greeting '{}'",
                            greeting.trim_end()
                        )));
                    }
                    self.reader = Some(reader);
                    self.writer = Some(writer);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => PlayerError::transport(format!("Failed to connect to {}: {}", self.address, e)),
            None => PlayerError::transport(format!("No address resolved for {}", self.address)),
        })
    }

    pub fn disconnect(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.shutdown(Shutdown::Both);
        }
        self.reader = None;
    }

    /// Handle another thread can use to shut the socket down and unblock a
    /// pending read.
    pub fn shutdown_handle(&self) -> Option<TcpStream> {
        self.writer.as_ref().and_then(|w| w.try_clone().ok())
    }

    pub fn write_line(&mut self, line: &str) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        let sent = writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        match sent {
            Ok(()) => true,
            Err(e) => {
                debug!(address = %self.address, command = line, error = %e, "MPD write failed");
                self.disconnect();
                false
            }
        }
    }

    /// One response line without its terminator; `None` on EOF or error.
    pub fn read_line(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                self.disconnect();
                None
            }
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                debug!(address = %self.address, error = %e, "MPD read failed");
                self.disconnect();
                None
            }
        }
    }

    /// Reads lines up to the `OK` terminator (excluded).
    ///
    /// An empty first line ends the block at once; an `ACK` error line also
    /// ends it.
    pub fn read_block(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line() {
            if line == "OK" {
                break;
            }
            if line.is_empty() && lines.is_empty() {
                break;
            }
            if line.starts_with("ACK") {
                debug!(address = %self.address, error = %line, "MPD command rejected");
                break;
            }
            lines.push(line);
        }
        lines
    }

    /// Single-line exchange on a fresh connection.
    pub fn command(&mut self, command: &str) -> Option<String> {
        if !self.connect() {
            return None;
        }
        let reply = if self.write_line(command) {
            self.read_line()
        } else {
            None
        };
        self.disconnect();
        reply
    }

    /// Multi-line exchange on a fresh connection.
    pub fn multiline(&mut self, command: &str) -> Vec<String> {
        if !self.connect() {
            return Vec::new();
        }
        let lines = if self.write_line(command) {
            self.read_block()
        } else {
            Vec::new()
        };
        self.disconnect();
        lines
    }

    /// `key: value` answer of `command` as a map.
    pub fn read_dictionary(&mut self, command: &str) -> HashMap<String, String> {
        parse_dictionary_lines(self.multiline(command).iter().map(String::as_str))
    }
}

/// Splits `key: value` lines on the first `": "`, drops a `:file` key suffix
/// and right-trims both sides. Reading stops at `OK`.
pub fn parse_dictionary(text: &str) -> HashMap<String, String> {
    parse_dictionary_lines(text.lines())
}

fn parse_dictionary_lines<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line == "OK" {
            break;
        }
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        let key = key.strip_suffix(":file").unwrap_or(key).trim_end();
        map.insert(key.to_string(), value.trim_end().to_string());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dictionary() {
        let map = parse_dictionary("key1: val1\nkey2:file: val2\nOK\n");
        assert_eq!(map.len(), 2);
        assert_eq!(map["key1"], "val1");
        assert_eq!(map["key2"], "val2");
    }

    #[test]
    fn test_parse_dictionary_keeps_colons_in_values() {
        let map = parse_dictionary("file: http://radio:8000/stream  \nignored line\n");
        assert_eq!(map["file"], "http://radio:8000/stream");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_parse_dictionary_stops_at_ok() {
        let map = parse_dictionary("a: 1\nOK\nb: 2\n");
        assert!(map.contains_key("a"));
        assert!(!map.contains_key("b"));
    }

    #[test]
    fn test_unreachable_server_degrades() {
        let settings = MpdSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_attempts: 1,
            connect_delay: Duration::from_millis(1),
            ..MpdSettings::default()
        };
        let mut conn = MpdConnection::for_commands(&settings);
        assert_eq!(conn.command("status"), None);
        assert!(conn.multiline("status").is_empty());
        assert!(!conn.write_line("status"));
        assert_eq!(conn.read_line(), None);
    }
}
