//! Marker timestamp encoding: RFC3339 in UTC with nanosecond precision and
//! trailing zeros trimmed from the fractional second.

use chrono::{DateTime, SecondsFormat, Utc};

/// Encode an instant as it is stored in a marker file (without the newline).
///
/// `2024-05-01T12:00:00.1234Z`, or `2024-05-01T12:00:00Z` when the
/// fractional second is zero.
pub fn encode(instant: DateTime<Utc>) -> String {
    let full = instant.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let Some((seconds, frac)) = full.strip_suffix('Z').and_then(|s| s.split_once('.')) else {
        return full;
    };
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{seconds}Z")
    } else {
        format!("{seconds}.{frac}Z")
    }
}

/// Errors from decoding a marker timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// Date and time are not joined by an uppercase `T`.
    Separator,
    /// Offset is neither `Z` nor `+hh:mm` / `-hh:mm`.
    Offset,
    /// The layout is right but a field is invalid.
    Parse(chrono::ParseError),
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimestampError::Separator => write!(f, "date and time must be separated by 'T'"),
            TimestampError::Offset => write!(f, "offset must be 'Z' or ±hh:mm"),
            TimestampError::Parse(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TimestampError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimestampError::Parse(e) => Some(e),
            TimestampError::Separator | TimestampError::Offset => None,
        }
    }
}

/// Decode a marker timestamp.
///
/// Only the exact layout [`encode`] produces is accepted, with any numeric
/// offset normalized to UTC. chrono's RFC3339 parser alone also takes a
/// space or lowercase `t`/`z`, so the layout is checked first.
pub fn decode(text: &str) -> Result<DateTime<Utc>, TimestampError> {
    let bytes = text.as_bytes();
    if bytes.get(10) != Some(&b'T') {
        return Err(TimestampError::Separator);
    }
    if !(text.ends_with('Z') || has_numeric_offset(bytes)) {
        return Err(TimestampError::Offset);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(TimestampError::Parse)
}

/// Trailing `+hh:mm` or `-hh:mm`.
fn has_numeric_offset(bytes: &[u8]) -> bool {
    let Some(offset) = bytes.len().checked_sub(6).map(|start| &bytes[start..]) else {
        return false;
    };
    matches!(offset[0], b'+' | b'-')
        && offset[1].is_ascii_digit()
        && offset[2].is_ascii_digit()
        && offset[3] == b':'
        && offset[4].is_ascii_digit()
        && offset[5].is_ascii_digit()
}
