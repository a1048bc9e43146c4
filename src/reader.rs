//! Reader role: find out when the marker was last updated and classify it
//! as fresh or stale against the probe interval.

use crate::duration;
use crate::timestamp::{self, TimestampError};
use chrono::{DateTime, TimeDelta, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Where the reader takes "last updated" from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Parse the timestamp on the last line of the file.
    Content,
    /// Use the file's modification time; the content is ignored.
    Mtime,
}

impl std::fmt::Display for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSource::Content => write!(f, "content"),
            TimeSource::Mtime => write!(f, "mtime"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fresh,
    Stale,
}

/// Result of one freshness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    /// `now - timestamp`. Negative when the marker lies in the future.
    pub elapsed: TimeDelta,
    pub verdict: Verdict,
}

/// Errors that can occur while reading a marker.
#[derive(Debug)]
pub enum ReadError {
    /// Failed to read the file content.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to stat the file.
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The platform does not report a modification time for the file.
    Modified {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The modification time is outside the range chrono can represent.
    OutOfRange { path: PathBuf },
    /// The last line is not an RFC3339 timestamp.
    Parse {
        path: PathBuf,
        text: String,
        source: TimestampError,
    },
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Read { path, source } => {
                write!(f, "failed to read marker {}: {}", path.display(), source)
            }
            ReadError::Stat { path, source } => {
                write!(f, "failed to stat marker {}: {}", path.display(), source)
            }
            ReadError::Modified { path, source } => {
                write!(
                    f,
                    "no modification time for marker {}: {}",
                    path.display(),
                    source
                )
            }
            ReadError::OutOfRange { path } => {
                write!(
                    f,
                    "modification time of marker {} is out of range",
                    path.display()
                )
            }
            ReadError::Parse { path, text, source } => {
                write!(
                    f,
                    "invalid timestamp {:?} in marker {}: {}",
                    text,
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadError::Read { source, .. } => Some(source),
            ReadError::Stat { source, .. } => Some(source),
            ReadError::Modified { source, .. } => Some(source),
            ReadError::OutOfRange { .. } => None,
            ReadError::Parse { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerReader {
    path: PathBuf,
    source: TimeSource,
}

impl MarkerReader {
    pub fn new(path: impl Into<PathBuf>, source: TimeSource) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> TimeSource {
        self.source
    }

    /// When the marker was last updated, according to the time source.
    pub fn last_updated(&self) -> Result<DateTime<Utc>, ReadError> {
        match self.source {
            TimeSource::Content => self.content_timestamp(),
            TimeSource::Mtime => self.modified_time(),
        }
    }

    /// Read the marker and classify it against `interval` at `now`.
    pub fn check(&self, now: DateTime<Utc>, interval: Duration) -> Result<Reading, ReadError> {
        let timestamp = self.last_updated()?;
        let reading = evaluate(timestamp, now, interval);
        tracing::debug!(
            path = %self.path.display(),
            source = %self.source,
            timestamp = %reading.timestamp,
            elapsed = %duration::format_delta(reading.elapsed),
            verdict = ?reading.verdict,
            "marker checked"
        );
        Ok(reading)
    }

    fn content_timestamp(&self) -> Result<DateTime<Utc>, ReadError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| ReadError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        let candidate = last_line(&contents);
        timestamp::decode(candidate).map_err(|e| ReadError::Parse {
            path: self.path.clone(),
            text: candidate.to_string(),
            source: e,
        })
    }

    fn modified_time(&self) -> Result<DateTime<Utc>, ReadError> {
        let metadata = std::fs::metadata(&self.path).map_err(|e| ReadError::Stat {
            path: self.path.clone(),
            source: e,
        })?;
        let modified = metadata.modified().map_err(|e| ReadError::Modified {
            path: self.path.clone(),
            source: e,
        })?;
        utc_from_system_time(modified).ok_or_else(|| ReadError::OutOfRange {
            path: self.path.clone(),
        })
    }
}

/// `None` when `time` falls outside chrono's range. Filesystems such as tmpfs
/// store any i64 seconds value, so a successful stat can still return one.
fn utc_from_system_time(time: SystemTime) -> Option<DateTime<Utc>> {
    let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (i64::try_from(after.as_secs()).ok()?, after.subsec_nanos()),
        Err(e) => {
            let before = e.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => (-secs, 0),
                n => (-secs - 1, 1_000_000_000 - n),
            }
        }
    };
    DateTime::from_timestamp(secs, nanos)
}

/// Candidate timestamp text: the content with surrounding whitespace trimmed,
/// cut after the last newline. Earlier lines are never looked at.
pub fn last_line(contents: &str) -> &str {
    let trimmed = contents.trim();
    match trimmed.rfind('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Fresh when `now - timestamp <= interval`. A timestamp ahead of `now`
/// counts as fresh.
pub fn evaluate(timestamp: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> Reading {
    let elapsed = now.signed_duration_since(timestamp);
    let fresh = match elapsed.to_std() {
        Ok(age) => age <= interval,
        Err(_) => true,
    };
    Reading {
        timestamp,
        elapsed,
        verdict: if fresh { Verdict::Fresh } else { Verdict::Stale },
    }
}
