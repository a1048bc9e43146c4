use crate::duration::{self, DurationError};
use crate::reader::{MarkerReader, TimeSource};
use crate::writer::{MarkerWriter, WriteMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INTERVAL: &str = "5s";

/// Top-level configuration loaded from an optional TOML file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ProbeConfig {
    pub probe: ProbeSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub write: Option<PathBuf>,
    pub read: Option<PathBuf>,
    pub interval: String,
    pub append: bool,
    pub mtime: bool,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            write: None,
            read: None,
            interval: DEFAULT_INTERVAL.to_string(),
            append: false,
            mtime: false,
        }
    }
}

/// Values given on the command line. `None`/`false` leaves the file value alone.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub write: Option<PathBuf>,
    pub read: Option<PathBuf>,
    pub interval: Option<String>,
    pub append: bool,
    pub mtime: bool,
    pub quiet: bool,
}

/// Fully resolved probe settings, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub writer: Option<MarkerWriter>,
    pub reader: Option<MarkerReader>,
    /// Both the tick period and the staleness threshold.
    pub interval: Duration,
    /// Hide per-tick OK and write confirmations.
    pub quiet: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file is not valid TOML for this shape.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Interval { source: DurationError },
    /// Interval parsed but is zero.
    ZeroInterval,
    /// Neither a write nor a read target was configured.
    NoTarget,
}

impl ConfigError {
    /// Whether the help text is worth showing. The interval may come from the
    /// config file, so only a missing target counts.
    pub fn is_usage(&self) -> bool {
        matches!(self, ConfigError::NoTarget)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Interval { source } => write!(f, "invalid interval: {source}"),
            ConfigError::ZeroInterval => write!(f, "invalid interval: must be greater than zero"),
            ConfigError::NoTarget => write!(f, "You must specify --write and/or --read"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Interval { source } => Some(source),
            ConfigError::ZeroInterval | ConfigError::NoTarget => None,
        }
    }
}

impl ProbeConfig {
    /// Load and parse a config file. A missing file is an error: it was asked for.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Merge command-line overrides and validate into [`Settings`].
    pub fn resolve(self, overrides: Overrides) -> Result<Settings, ConfigError> {
        let section = self.probe;

        let interval_text = overrides.interval.unwrap_or(section.interval);
        let interval =
            duration::parse(&interval_text).map_err(|e| ConfigError::Interval { source: e })?;
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }

        let write = overrides.write.or(section.write);
        let read = overrides.read.or(section.read);
        let append = overrides.append || section.append;
        let mtime = overrides.mtime || section.mtime;

        if write.is_none() && read.is_none() {
            return Err(ConfigError::NoTarget);
        }
        if append && write.is_none() {
            tracing::warn!("append has no effect without a write target");
        }
        if mtime && read.is_none() {
            tracing::warn!("mtime has no effect without a read target");
        }

        let writer = write.map(|path| {
            let mode = if append {
                tracing::warn!(
                    path = %path.display(),
                    "append mode: marker file grows by one line per tick and is never rotated"
                );
                WriteMode::Append
            } else {
                WriteMode::Truncate
            };
            MarkerWriter::new(path, mode)
        });
        let reader = read.map(|path| {
            let source = if mtime {
                TimeSource::Mtime
            } else {
                TimeSource::Content
            };
            MarkerReader::new(path, source)
        });

        Ok(Settings {
            writer,
            reader,
            interval,
            quiet: overrides.quiet,
        })
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.writer {
            Some(w) => writeln!(f, "write:    {} ({})", w.path().display(), w.mode())?,
            None => writeln!(f, "write:    (none)")?,
        }
        match &self.reader {
            Some(r) => writeln!(f, "read:     {} ({})", r.path().display(), r.source())?,
            None => writeln!(f, "read:     (none)")?,
        }
        writeln!(f, "interval: {}", duration::format(self.interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides() -> Overrides {
        Overrides::default()
    }

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.probe.interval, "5s");
        assert!(config.probe.write.is_none());
        assert!(config.probe.read.is_none());
        assert!(!config.probe.append);
        assert!(!config.probe.mtime);
    }

    #[test]
    fn test_resolve_requires_a_target() {
        let err = ProbeConfig::default().resolve(overrides()).unwrap_err();
        assert!(matches!(err, ConfigError::NoTarget));
        assert!(err.is_usage());
        assert_eq!(err.to_string(), "You must specify --write and/or --read");
    }

    #[test]
    fn test_resolve_write_only() {
        let settings = ProbeConfig::default()
            .resolve(Overrides {
                write: Some(PathBuf::from("/tmp/marker")),
                ..overrides()
            })
            .unwrap();
        assert_eq!(
            settings.writer,
            Some(MarkerWriter::new("/tmp/marker", WriteMode::Truncate))
        );
        assert!(settings.reader.is_none());
        assert_eq!(settings.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_resolve_read_only_with_mtime() {
        let settings = ProbeConfig::default()
            .resolve(Overrides {
                read: Some(PathBuf::from("/tmp/marker")),
                mtime: true,
                ..overrides()
            })
            .unwrap();
        assert_eq!(
            settings.reader,
            Some(MarkerReader::new("/tmp/marker", TimeSource::Mtime))
        );
        assert!(settings.writer.is_none());
    }

    #[test]
    fn test_resolve_append_selects_append_mode() {
        let settings = ProbeConfig::default()
            .resolve(Overrides {
                write: Some(PathBuf::from("m")),
                append: true,
                ..overrides()
            })
            .unwrap();
        assert_eq!(settings.writer.unwrap().mode(), WriteMode::Append);
    }

    #[test]
    fn test_resolve_flags_without_matching_role_are_accepted() {
        let settings = ProbeConfig::default()
            .resolve(Overrides {
                read: Some(PathBuf::from("m")),
                append: true,
                ..overrides()
            })
            .unwrap();
        assert!(settings.writer.is_none());
        assert_eq!(settings.reader.unwrap().source(), TimeSource::Content);
    }

    #[test]
    fn test_resolve_rejects_bad_interval() {
        let err = ProbeConfig::default()
            .resolve(Overrides {
                write: Some(PathBuf::from("m")),
                interval: Some("often".to_string()),
                ..overrides()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Interval { .. }));
        assert!(!err.is_usage());
        assert!(err.to_string().starts_with("invalid interval: "));
    }

    #[test]
    fn test_resolve_rejects_zero_interval() {
        let err = ProbeConfig::default()
            .resolve(Overrides {
                write: Some(PathBuf::from("m")),
                interval: Some("0s".to_string()),
                ..overrides()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval));
        assert!(!err.is_usage());
    }

    #[test]
    fn test_bad_interval_from_file_is_not_worded_as_a_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "[probe]\nwrite = \"m\"\ninterval = \"often\"\n").unwrap();

        let err = ProbeConfig::load(&path)
            .unwrap()
            .resolve(overrides())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Interval { .. }));
        assert!(!err.is_usage());
        assert!(!err.to_string().contains("--interval"));
    }

    #[test]
    fn test_load_file_and_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(
            &path,
            r#"
[probe]
write = "/var/run/from-file"
read = "/mnt/shared/from-file"
interval = "1m30s"
"#,
        )
        .unwrap();

        let config = ProbeConfig::load(&path).unwrap();
        let settings = config
            .resolve(Overrides {
                write: Some(PathBuf::from("/var/run/from-cli")),
                mtime: true,
                quiet: true,
                ..overrides()
            })
            .unwrap();

        assert_eq!(
            settings.writer.unwrap().path(),
            Path::new("/var/run/from-cli")
        );
        let reader = settings.reader.unwrap();
        assert_eq!(reader.path(), Path::new("/mnt/shared/from-file"));
        assert_eq!(reader.source(), TimeSource::Mtime);
        assert_eq!(settings.interval, Duration::from_secs(90));
        assert!(settings.quiet);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "[probe]\nappend = true\n").unwrap();

        let config = ProbeConfig::load(&path).unwrap();
        assert_eq!(config.probe.interval, DEFAULT_INTERVAL);
        assert!(config.probe.append);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProbeConfig::load(Path::new("/nonexistent/probe.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(!err.is_usage());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "[probe]\ninterval = 5\n").unwrap();

        let err = ProbeConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_settings_display() {
        let settings = Settings {
            writer: Some(MarkerWriter::new("/tmp/w", WriteMode::Append)),
            reader: None,
            interval: Duration::from_millis(1500),
            quiet: false,
        };
        assert_eq!(
            settings.to_string(),
            "write:    /tmp/w (append)\nread:     (none)\ninterval: 1.5s\n"
        );
    }
}
