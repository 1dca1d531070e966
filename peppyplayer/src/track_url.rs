//! Builds the URL handed to a backend from a [`PlayRequest`].

use crate::model::PlayRequest;

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// URL relative to the music root, as the MPD database knows it.
///
/// A request carrying `url` (radio stations, explicit paths) wins. Otherwise
/// the music-root prefix is stripped from `folder` and `file_name` appended.
pub fn library_url(request: &PlayRequest, default_music_root: &str) -> Option<String> {
    if let Some(url) = request.url.as_deref().filter(|u| !u.trim().is_empty()) {
        return Some(normalize(url.trim()));
    }
    let file_name = request.file_name.as_deref()?;
    let folder = normalize(request.folder.as_deref().unwrap_or(""));
    let root = normalize(
        request
            .music_folder
            .as_deref()
            .unwrap_or(default_music_root),
    );

    let relative = folder
        .strip_prefix(root.trim_end_matches('/'))
        .unwrap_or(&folder)
        .trim_matches('/');

    let url = if relative.is_empty() {
        normalize(file_name)
    } else {
        format!("{}/{}", relative, normalize(file_name))
    };
    Some(url)
}

/// Full filesystem path (or stream URL) for players that open files directly.
pub fn absolute_url(request: &PlayRequest) -> Option<String> {
    if let Some(url) = request.url.as_deref().filter(|u| !u.trim().is_empty()) {
        return Some(normalize(url.trim()));
    }
    let file_name = request.file_name.as_deref()?;
    match request.folder.as_deref().map(normalize) {
        Some(folder) if !folder.is_empty() => Some(format!(
            "{}/{}",
            folder.trim_end_matches('/'),
            normalize(file_name)
        )),
        _ => Some(normalize(file_name)),
    }
}

/// Wraps an argument in MPD protocol double quotes.
pub fn quoted(argument: &str) -> String {
    format!(
        "\"{}\"",
        argument.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_request(folder: &str, file: &str) -> PlayRequest {
        PlayRequest::from_file(folder, file)
    }

    #[test]
    fn test_library_url_strips_music_root() {
        let request = file_request("/home/pi/music/rock/", "song.mp3");
        assert_eq!(
            library_url(&request, "/home/pi/music/").as_deref(),
            Some("rock/song.mp3")
        );
    }

    #[test]
    fn test_library_url_prefers_explicit_url() {
        let request = PlayRequest::from_url("http://radio/stream");
        assert_eq!(
            library_url(&request, "/home/pi/music").as_deref(),
            Some("http://radio/stream")
        );
    }

    #[test]
    fn test_library_url_normalizes_backslashes() {
        let mut request = file_request("C:\\music\\jazz", "a.flac");
        request.music_folder = Some("C:\\music".to_string());
        assert_eq!(
            library_url(&request, "/unused").as_deref(),
            Some("jazz/a.flac")
        );
    }

    #[test]
    fn test_absolute_url() {
        let request = file_request("/home/pi/music/rock", "song.mp3");
        assert_eq!(
            absolute_url(&request).as_deref(),
            Some("/home/pi/music/rock/song.mp3")
        );
        assert_eq!(absolute_url(&PlayRequest::default()), None);
    }

    #[test]
    fn test_quoted() {
        assert_eq!(quoted("http://x"), "\"http://x\"");
        assert_eq!(quoted("say \"hi\""), "\"say \\\"hi\\\"\"");
    }
}
