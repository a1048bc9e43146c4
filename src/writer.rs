/// Writer role: record "now" in the marker file on every tick.
use crate::timestamp;
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// How each tick's line lands in the marker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole file with the latest line.
    Truncate,
    /// Add the latest line after the existing ones. The file grows forever.
    Append,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Truncate => write!(f, "truncate"),
            WriteMode::Append => write!(f, "append"),
        }
    }
}

/// Errors that can occur while committing a marker line.
#[derive(Debug)]
pub enum WriteError {
    /// Failed to open or create the marker file.
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write the line.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The line was written but could not be flushed to stable storage.
    Sync {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Open { path, source } => {
                write!(f, "failed to open marker {}: {}", path.display(), source)
            }
            WriteError::Write { path, source } => {
                write!(f, "failed to write marker {}: {}", path.display(), source)
            }
            WriteError::Sync { path, source } => {
                write!(f, "failed to sync marker {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteError::Open { source, .. } => Some(source),
            WriteError::Write { source, .. } => Some(source),
            WriteError::Sync { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerWriter {
    path: PathBuf,
    mode: WriteMode,
}

impl MarkerWriter {
    pub fn new(path: impl Into<PathBuf>, mode: WriteMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Commit `now` as a single `"<timestamp>\n"` line and return the
    /// timestamp text.
    ///
    /// The line goes out in one write and is fsynced before returning, so a
    /// returned `Ok` means the line is durable. The file is created with mode
    /// 0644 when missing.
    pub fn write(&self, now: DateTime<Utc>) -> Result<String, WriteError> {
        let stamp = timestamp::encode(now);
        let line = format!("{stamp}\n");

        let mut options = OpenOptions::new();
        options.create(true).write(true);
        match self.mode {
            WriteMode::Truncate => {
                options.truncate(true);
            }
            WriteMode::Append => {
                options.append(true);
            }
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }

        let mut file = options.open(&self.path).map_err(|e| WriteError::Open {
            path: self.path.clone(),
            source: e,
        })?;
        file.write_all(line.as_bytes()).map_err(|e| WriteError::Write {
            path: self.path.clone(),
            source: e,
        })?;
        file.sync_all().map_err(|e| WriteError::Sync {
            path: self.path.clone(),
            source: e,
        })?;

        tracing::debug!(
            path = %self.path.display(),
            mode = %self.mode,
            timestamp = %stamp,
            "marker written"
        );
        Ok(stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_truncate_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        let writer = MarkerWriter::new(&path, WriteMode::Truncate);

        let stamp = writer.write(Utc::now()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("{stamp}\n"));
    }

    #[test]
    fn test_truncate_twice_leaves_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        let writer = MarkerWriter::new(&path, WriteMode::Truncate);
        let now = Utc::now();

        writer.write(now).unwrap();
        let second = writer.write(now + TimeDelta::seconds(1)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert_eq!(contents, format!("{second}\n"));
    }

    #[test]
    fn test_truncate_replaces_foreign_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        std::fs::write(&path, "old line one\nold line two\nold line three\n").unwrap();

        let stamp = MarkerWriter::new(&path, WriteMode::Truncate)
            .write(Utc::now())
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), format!("{stamp}\n"));
    }

    #[test]
    fn test_append_twice_leaves_two_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        let writer = MarkerWriter::new(&path, WriteMode::Append);
        let now = Utc::now();

        let first = writer.write(now).unwrap();
        let second = writer.write(now + TimeDelta::seconds(1)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec![first.as_str(), second.as_str()]);
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn test_append_preserves_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        std::fs::write(&path, "earlier\n").unwrap();

        let stamp = MarkerWriter::new(&path, WriteMode::Append)
            .write(Utc::now())
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("earlier\n{stamp}\n")
        );
    }

    #[test]
    fn test_written_timestamp_is_utc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");

        let stamp = MarkerWriter::new(&path, WriteMode::Truncate)
            .write(Utc::now())
            .unwrap();
        assert!(stamp.ends_with('Z'));
    }

    #[cfg(unix)]
    #[test]
    fn test_created_file_is_not_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        MarkerWriter::new(&path, WriteMode::Truncate)
            .write(Utc::now())
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
    }

    #[test]
    fn test_missing_directory_is_open_error() {
        let writer = MarkerWriter::new(
            "/nonexistent-dir/impossible/marker",
            WriteMode::Truncate,
        );

        let err = writer.write(Utc::now()).unwrap_err();
        assert!(matches!(err, WriteError::Open { .. }));
        assert!(err.to_string().contains("failed to open marker"));
    }
}
