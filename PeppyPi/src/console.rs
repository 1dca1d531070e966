//! Line-oriented control console read from stdin.

use anyhow::{Result, anyhow, bail};
use peppyplayer::{PlayRequest, PlayerFacade, PlayerKind};
use tracing::{info, warn};

#[derive(Debug, PartialEq)]
pub enum ConsoleCommand {
    Play(String),
    Track(u32),
    Pause,
    Resume,
    Toggle,
    Stop,
    Volume(Option<u8>),
    Mute,
    Seek(String),
    Time,
    Load(String),
    List,
    Switch(PlayerKind),
    Help,
    Quit,
}

pub const HELP: &str = "\
play <url|path>   play a stream or file
track <n>         play entry n of the loaded playlist
pause | resume    pause or resume
toggle            toggle pause
stop              stop playback
vol [n]           show or set volume (0-100)
mute              toggle mute
seek <hh:mm:ss>   seek in the current track
time              show elapsed time
load <file.m3u>   load a playlist
list              show the loaded playlist
switch <backend>  change backend (mpd, mpc, mplayer, shairport, bluetooth, none)
quit              exit";

pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let arg = |name: &str| -> Result<String> {
        if rest.is_empty() {
            bail!("'{}' needs an argument", name);
        }
        Ok(rest.to_string())
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "play" => ConsoleCommand::Play(arg("play")?),
        "track" => ConsoleCommand::Track(
            arg("track")?
                .parse()
                .map_err(|_| anyhow!("Invalid track number '{}'", rest))?,
        ),
        "pause" => ConsoleCommand::Pause,
        "resume" => ConsoleCommand::Resume,
        "toggle" => ConsoleCommand::Toggle,
        "stop" => ConsoleCommand::Stop,
        "vol" | "volume" if rest.is_empty() => ConsoleCommand::Volume(None),
        "vol" | "volume" => {
            let level: u8 = rest
                .parse()
                .map_err(|_| anyhow!("Invalid volume '{}'", rest))?;
            if level > 100 {
                bail!("Volume must be between 0 and 100");
            }
            ConsoleCommand::Volume(Some(level))
        }
        "mute" => ConsoleCommand::Mute,
        "seek" => ConsoleCommand::Seek(arg("seek")?),
        "time" => ConsoleCommand::Time,
        "load" => ConsoleCommand::Load(arg("load")?),
        "list" => ConsoleCommand::List,
        "switch" => ConsoleCommand::Switch(arg("switch")?.parse()?),
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => bail!("Unknown command '{}'", other),
    };
    Ok(Some(command))
}

fn request_for(target: &str) -> PlayRequest {
    if target.contains("://") {
        return PlayRequest::from_url(target);
    }
    let path = std::path::Path::new(target);
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => PlayRequest::from_file(
            parent.to_string_lossy(),
            name.to_string_lossy(),
        ),
        _ => PlayRequest::from_url(target),
    }
}

/// Runs one command. Returns `false` on `quit`.
pub fn execute(player: &PlayerFacade, command: ConsoleCommand) -> Result<bool> {
    match command {
        ConsoleCommand::Play(target) => {
            let mut request = request_for(&target);
            request.music_folder = Some(player.settings().music_folder.clone());
            player.play(&request)?;
        }
        ConsoleCommand::Track(n) => player.play(&PlayRequest::playlist_index(n))?,
        ConsoleCommand::Pause => player.play_pause(Some(true))?,
        ConsoleCommand::Resume => player.play_pause(Some(false))?,
        ConsoleCommand::Toggle => player.pause()?,
        ConsoleCommand::Stop => player.stop(Some("console"))?,
        ConsoleCommand::Volume(Some(level)) => player.set_volume(level)?,
        ConsoleCommand::Volume(None) => match player.get_volume()? {
            Some(level) => println!("volume: {}", level),
            None => println!("volume: unavailable"),
        },
        ConsoleCommand::Mute => {
            player.mute()?;
            println!("muted: {}", player.is_muted());
        }
        ConsoleCommand::Seek(time) => player.seek(&time)?,
        ConsoleCommand::Time => match player.get_current_track_time()? {
            Some(secs) => println!("elapsed: {:.1}s", secs),
            None => println!("elapsed: unknown"),
        },
        ConsoleCommand::Load(file) => {
            let mut request = request_for(&file);
            request.music_folder = Some(player.settings().music_folder.clone());
            let entries = player.load_playlist(&request)?;
            info!("📜 Loaded {} playlist entries", entries.len());
        }
        ConsoleCommand::List => {
            for entry in player.get_current_playlist()? {
                println!(
                    "{:>3}  {}",
                    entry.index,
                    entry.title.as_deref().unwrap_or(&entry.file)
                );
            }
        }
        ConsoleCommand::Switch(kind) => player.switch_to(kind),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Reads commands from stdin until `quit` or end of input.
pub fn run(player: &PlayerFacade) -> Result<()> {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let command = match parse_command(&line) {
            Ok(Some(c)) => c,
            Ok(None) => continue,
            Err(e) => {
                warn!("⚠️ {}", e);
                continue;
            }
        };
        match execute(player, command) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => warn!("⚠️ {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("play http://radio/x").unwrap(),
            Some(ConsoleCommand::Play("http://radio/x".to_string()))
        );
        assert_eq!(parse_command("vol").unwrap(), Some(ConsoleCommand::Volume(None)));
        assert_eq!(
            parse_command("VOL 42").unwrap(),
            Some(ConsoleCommand::Volume(Some(42)))
        );
        assert_eq!(
            parse_command("switch mplayer").unwrap(),
            Some(ConsoleCommand::Switch(PlayerKind::Mplayer))
        );
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("vol 250").is_err());
        assert!(parse_command("seek").is_err());
        assert!(parse_command("track x").is_err());
        assert!(parse_command("dance").is_err());
        assert!(parse_command("switch vlc").is_err());
    }

    #[test]
    fn test_request_for() {
        let request = request_for("/music/rock/song.mp3");
        assert_eq!(request.folder.as_deref(), Some("/music/rock"));
        assert_eq!(request.file_name.as_deref(), Some("song.mp3"));

        let stream = request_for("http://radio/x");
        assert_eq!(stream.url.as_deref(), Some("http://radio/x"));
    }
}
