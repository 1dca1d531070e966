//! Subprocess plumbing for the command-line backends (mpc, mplayer,
//! systemctl).
//!
//! Backends talk to a [`CommandRunner`] instead of `std::process` directly so
//! tests can script the child's output.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::PlayerError;

/// Terminates a spawned child; safe to call more than once.
pub type Killer = Box<dyn FnMut() + Send>;

/// Long-running child whose stdout is read line by line.
pub struct LineProcess {
    pub stdout: Box<dyn BufRead + Send>,
    pub killer: Killer,
}

/// Long-running child driven through stdin (mplayer slave mode).
pub struct InteractiveProcess {
    pub stdin: Box<dyn Write + Send>,
    pub stdout: Box<dyn BufRead + Send>,
    pub killer: Killer,
}

pub trait CommandRunner: Send + Sync {
    /// Runs `program` to completion and returns its stdout.
    fn run(&self, program: &str, args: &[&str]) -> Result<String, PlayerError>;

    /// Starts `program` and hands back its stdout.
    fn spawn_lines(&self, program: &str, args: &[&str]) -> Result<LineProcess, PlayerError>;

    /// Starts `program` with both stdin and stdout piped.
    fn spawn_interactive(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<InteractiveProcess, PlayerError>;
}

/// [`CommandRunner`] backed by real processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

fn killer_for(child: Arc<Mutex<Child>>) -> Killer {
    Box::new(move || {
        let mut child = child.lock();
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
        }
        let _ = child.wait();
    })
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, PlayerError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(program, ?args, status = %output.status, stderr = %stderr.trim(), "Command failed");
            return Err(PlayerError::transport(format!(
                "{} exited with {}",
                program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_lines(&self, program: &str, args: &[&str]) -> Result<LineProcess, PlayerError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlayerError::transport(format!("{} has no stdout", program)))?;
        Ok(LineProcess {
            stdout: Box::new(BufReader::new(stdout)),
            killer: killer_for(Arc::new(Mutex::new(child))),
        })
    }

    fn spawn_interactive(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<InteractiveProcess, PlayerError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PlayerError::transport(format!("{} has no stdin", program)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlayerError::transport(format!("{} has no stdout", program)))?;
        Ok(InteractiveProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(BufReader::new(stdout)),
            killer: killer_for(Arc::new(Mutex::new(child))),
        })
    }
}

/// Reads one line without the trailing newline; `None` at end of stream.
pub fn read_trimmed_line(reader: &mut dyn BufRead) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
