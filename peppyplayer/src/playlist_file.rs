//! Local m3u playlist reader.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::model::{PlayRequest, TrackDescriptor};

/// True when the request names a cue sheet; those are never loaded.
pub fn is_cue_request(request: &PlayRequest) -> bool {
    request
        .file_name
        .as_deref()
        .or(request.url.as_deref())
        .is_some_and(|name| name.trim().to_ascii_lowercase().ends_with(".cue"))
}

/// Location of the playlist file named by `request`.
pub fn playlist_path(request: &PlayRequest, default_music_root: &str) -> Option<PathBuf> {
    if let Some(url) = request.url.as_deref().filter(|u| !u.is_empty()) {
        return Some(PathBuf::from(url));
    }
    let file_name = request.file_name.as_deref()?;
    let folder = request
        .folder
        .as_deref()
        .or(request.music_folder.as_deref())
        .unwrap_or(default_music_root);
    Some(Path::new(folder).join(file_name))
}

/// Reads an m3u file into ordered entries.
///
/// `#EXTINF:<secs>,<title>` lines name the entry that follows them; other
/// comment and blank lines are skipped. Unreadable files give an empty list.
pub fn get_m3u_playlist(path: &Path) -> Vec<TrackDescriptor> {
    let content = match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot read playlist");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    let mut pending_title: Option<String> = None;
    for line in content.lines() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            pending_title = info
                .split_once(',')
                .map(|(_, title)| title.trim().to_string())
                .filter(|t| !t.is_empty());
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        entries.push(TrackDescriptor {
            index: entries.len() as u32,
            file: line.to_string(),
            title: pending_title.take(),
        });
    }
    entries
}
