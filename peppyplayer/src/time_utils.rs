//! Time formatting and parsing utilities for player backends.
//!
//! Callers hand positions around as `HH:MM:SS` strings while MPD, mplayer and
//! Shairport want decimal seconds; mpc prints `m:ss/m:ss`.

use crate::errors::PlayerError;

/// Zero-padded `HH:MM:SS` for a position in seconds, as mpc expects it.
/// Fractions are rounded and negative input clamps to zero.
///
/// ```
/// # use peppyplayer::time_utils::format_clock;
/// assert_eq!(format_clock(70.0), "00:01:10");
/// assert_eq!(format_clock(7322.6), "02:02:03");
/// ```
pub fn format_clock(seconds: f64) -> String {
    let whole = seconds.max(0.0).round() as u64;
    let (h, rest) = (whole / 3600, whole % 3600);
    format!("{:02}:{:02}:{:02}", h, rest / 60, rest % 60)
}

/// Seconds from `H:M:S`, `M:S` or a bare number of seconds.
///
/// Each field is an unsigned integer; fields are not range-checked, so
/// `1:75` is 135.
pub fn parse_clock(input: &str) -> Result<u32, PlayerError> {
    let input = input.trim();
    let invalid = || PlayerError::InvalidTimeFormat(format!("'{}' is not a H:M:S time", input));

    let fields = input.split(':').collect::<Vec<_>>();
    if fields.len() > 3 {
        return Err(invalid());
    }
    fields.iter().try_fold(0u32, |acc, field| {
        let n: u32 = field.parse().map_err(|_| invalid())?;
        acc.checked_mul(60)
            .and_then(|acc| acc.checked_add(n))
            .ok_or_else(invalid)
    })
}

/// Converts a seek target to decimal seconds.
///
/// Accepts `HH:MM:SS` / `MM:SS` or a plain (possibly fractional) number of
/// seconds such as `"83.5"`.
pub fn seek_seconds(input: &str) -> Result<f64, PlayerError> {
    let input = input.trim();
    if input.contains(':') {
        return parse_clock(input).map(f64::from);
    }
    match input.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(PlayerError::InvalidTimeFormat(format!(
            "Invalid seek position '{}'",
            input
        ))),
    }
}

/// Renders seconds the way MPD and mplayer accept them (`70`, `70.5`).
pub fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{}", seconds as u64)
    } else {
        format!("{:.3}", seconds)
            .trim_end_matches('0')
            .to_string()
    }
}

/// Splits an mpc `elapsed/total` field (`0:05/3:20`) into seconds.
pub fn parse_elapsed_total(field: &str) -> Option<(u32, u32)> {
    let (elapsed, total) = field.trim().split_once('/')?;
    Some((
        parse_clock(elapsed).ok()?,
        parse_clock(total).ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "00:00:00");
        assert_eq!(format_clock(59.4), "00:00:59");
        assert_eq!(format_clock(59.5), "00:01:00");
        assert_eq!(format_clock(36000.0), "10:00:00");
        assert_eq!(format_clock(-12.0), "00:00:00");
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("1:00:05").unwrap(), 3605);
        assert_eq!(parse_clock(" 4:30 ").unwrap(), 270);
        assert_eq!(parse_clock("1:75").unwrap(), 135);
        assert_eq!(parse_clock("9").unwrap(), 9);

        for bad in ["", "::", "1:2:3:4", "4:x", "-5"] {
            assert!(
                matches!(parse_clock(bad), Err(PlayerError::InvalidTimeFormat(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_seek_seconds() {
        assert_eq!(seek_seconds("00:01:10").unwrap(), 70.0);
        assert_eq!(seek_seconds("83.5").unwrap(), 83.5);
        assert!(seek_seconds("-1").is_err());
        assert!(seek_seconds("soon").is_err());
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(70.0), "70");
        assert_eq!(format_seconds(70.5), "70.5");
        assert_eq!(format_seconds(1.25), "1.25");
    }

    #[test]
    fn test_parse_elapsed_total() {
        assert_eq!(parse_elapsed_total("0:05/3:20"), Some((5, 200)));
        assert_eq!(parse_elapsed_total("garbage"), None);
    }
}
