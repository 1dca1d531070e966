//! Decoder for the shairport-sync metadata pipe.
//!
//! Each item arrives as a header line
//! `<item><type>636f7265</type><code>61736172</code><length>12</length>`,
//! then (when `length > 0`) a `<data encoding="base64">` line and a payload
//! line. Type and code are four ASCII bytes written as eight hex digits.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, trace};

/// Decoded, user-relevant metadata.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataEvent {
    /// `"{artist} - {title}"` (or whichever is known), on `mden`.
    Title(String),
    /// Volume on a 0-100 scale.
    Volume(u8),
    Picture(Vec<u8>),
    Begin,
    End,
    Resume,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemHeader {
    pub item_type: String,
    pub code: String,
    pub length: usize,
}

#[derive(Debug)]
enum DecoderState {
    AwaitHeader,
    AwaitData(ItemHeader),
    AwaitPayload(ItemHeader),
}

fn tag_content<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = line.find(&open)? + open.len();
    let end = start + line[start..].find(&close)?;
    Some(&line[start..end])
}

fn decode_fourcc(hex_text: &str) -> Option<String> {
    if hex_text.len() != 8 {
        return None;
    }
    let bytes = hex::decode(hex_text).ok()?;
    String::from_utf8(bytes).ok()
}

/// Parses an `<item>` header line.
pub fn parse_header(line: &str) -> Option<ItemHeader> {
    let line = line.trim();
    if !line.starts_with("<item>") {
        return None;
    }
    Some(ItemHeader {
        item_type: decode_fourcc(tag_content(line, "type")?)?,
        code: decode_fourcc(tag_content(line, "code")?)?,
        length: tag_content(line, "length")?.trim().parse().ok()?,
    })
}

/// Keeps the `4 * ceil(length / 3)` base64 characters that encode `length`
/// bytes, dropping the closing tags that follow them.
pub fn truncate_payload(payload: &str, length: usize) -> &str {
    let keep = 4 * length.div_ceil(3);
    match payload.char_indices().nth(keep) {
        Some((idx, _)) => &payload[..idx],
        None => payload,
    }
}

fn decode_text(payload: &str) -> String {
    STANDARD
        .decode(payload.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

/// Maps the AirPlay volume (about -30.0 to 0.0, -144.0 for mute) to 0-100.
pub fn airplay_to_percent(volume: f64) -> u8 {
    let percent = 100.0 - volume.abs() * 100.0 / 30.0;
    percent.round().clamp(0.0, 100.0) as u8
}

/// Line-fed state machine over the metadata pipe.
#[derive(Debug)]
pub struct MetadataDecoder {
    state: DecoderState,
    artist: Option<String>,
    title: Option<String>,
}

impl Default for MetadataDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::AwaitHeader,
            artist: None,
            title: None,
        }
    }

    /// Consumes one line; returns at most one event.
    pub fn feed_line(&mut self, line: &str) -> Option<MetadataEvent> {
        match std::mem::replace(&mut self.state, DecoderState::AwaitHeader) {
            DecoderState::AwaitHeader => self.on_header(line),
            DecoderState::AwaitData(header) => {
                if line.trim_start().starts_with("<data") {
                    self.state = DecoderState::AwaitPayload(header);
                    None
                } else {
                    trace!(code = %header.code, "Item without data, dropped");
                    self.on_header(line)
                }
            }
            DecoderState::AwaitPayload(header) => {
                let payload = truncate_payload(line.trim(), header.length);
                self.process(&header, payload)
            }
        }
    }

    fn on_header(&mut self, line: &str) -> Option<MetadataEvent> {
        let header = parse_header(line)?;
        match header.code.as_str() {
            "pbeg" => return Some(MetadataEvent::Begin),
            "pend" => return Some(MetadataEvent::End),
            "prsm" => return Some(MetadataEvent::Resume),
            _ => {}
        }
        if header.length == 0 {
            return self.process(&header, "");
        }
        self.state = DecoderState::AwaitData(header);
        None
    }

    fn process(&mut self, header: &ItemHeader, payload: &str) -> Option<MetadataEvent> {
        match header.code.as_str() {
            "asar" => {
                self.artist = Some(decode_text(payload));
                None
            }
            "minm" => {
                self.title = Some(decode_text(payload));
                None
            }
            "mden" => Some(MetadataEvent::Title(self.take_title())),
            "pvol" => {
                let text = decode_text(payload);
                let first = text.split(',').next().unwrap_or("").trim();
                match first.parse::<f64>() {
                    Ok(volume) => Some(MetadataEvent::Volume(airplay_to_percent(volume))),
                    Err(_) => {
                        debug!(payload = %text, "Unreadable pvol item");
                        None
                    }
                }
            }
            "PICT" => match STANDARD.decode(payload.trim()) {
                Ok(bytes) if !bytes.is_empty() => Some(MetadataEvent::Picture(bytes)),
                Ok(_) => None,
                Err(e) => {
                    debug!(error = %e, "Undecodable cover art");
                    None
                }
            },
            _ => None,
        }
    }

    fn take_title(&mut self) -> String {
        let artist = self.artist.take().filter(|a| !a.is_empty());
        let title = self.title.take().filter(|t| !t.is_empty());
        match (artist, title) {
            (Some(a), Some(t)) => format!("{} - {}", a, t),
            (Some(a), None) => a,
            (None, Some(t)) => t,
            (None, None) => String::new(),
        }
    }
}
