//! Execution configuration.
//!
//! [`FfmpegConfig`] carries everything the execution driver needs to know
//! about its environment: where the binaries live, where the subprocess runs,
//! where pipe sockets are created, and how much diagnostic output to keep.
//! A default is assembled once at startup and passed explicitly to every run.
//! Every field defaults sensibly so a completely empty `{}` document is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

/// Log levels accepted by ffmpeg's `-loglevel` flag.
pub const LOG_LEVELS: &[&str] = &[
    "quiet", "panic", "fatal", "error", "warning", "info", "verbose", "debug", "trace",
];

/// Environment and tuning for ffmpeg runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// Folder containing the `ffmpeg` / `ffprobe` binaries. When unset the
    /// binaries are looked up on `PATH`.
    pub binary_folder: Option<PathBuf>,
    /// Working directory of the subprocess. Inherited when unset.
    pub working_directory: Option<PathBuf>,
    /// Folder for pipe sockets on POSIX systems. System temp dir when unset.
    pub temporary_files_folder: Option<PathBuf>,
    /// Value for ffmpeg's `-loglevel` flag. Left to ffmpeg when unset.
    pub log_level: Option<String>,
    /// Maximum number of diagnostic lines retained per run.
    #[serde(default = "default_diagnostic_capacity")]
    pub diagnostic_capacity: usize,
    /// Seconds to wait for a graceful quit before killing a cancelled run.
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,
}

fn default_diagnostic_capacity() -> usize {
    1024
}

fn default_cancel_grace_secs() -> u64 {
    5
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary_folder: None,
            working_directory: None,
            temporary_files_folder: None,
            log_level: None,
            diagnostic_capacity: default_diagnostic_capacity(),
            cancel_grace_secs: default_cancel_grace_secs(),
        }
    }
}

impl FfmpegConfig {
    /// Deserialize a config from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a JSON file, falling back to defaults if the
    /// path is `None`, the file does not exist, or it cannot be parsed.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(ref dir) = self.binary_folder {
            if !dir.is_dir() {
                warnings.push(format!(
                    "binary_folder {} does not exist; falling back to PATH",
                    dir.display()
                ));
            }
        }

        if let Some(ref dir) = self.working_directory {
            if !dir.is_dir() {
                warnings.push(format!("working_directory {} does not exist", dir.display()));
            }
        }

        if let Some(ref dir) = self.temporary_files_folder {
            if !dir.is_dir() {
                warnings.push(format!(
                    "temporary_files_folder {} does not exist",
                    dir.display()
                ));
            }
        }

        if let Some(ref level) = self.log_level {
            if !LOG_LEVELS.contains(&level.as_str()) {
                warnings.push(format!(
                    "log_level '{}' is not a recognized level (valid: {})",
                    level,
                    LOG_LEVELS.join(", ")
                ));
            }
        }

        if self.diagnostic_capacity == 0 {
            warnings.push("diagnostic_capacity is 0; failures will carry no diagnostics".into());
        }

        warnings
    }

    /// Grace period between a quit request and a kill.
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }

    /// Directory in which POSIX pipe sockets are created.
    pub fn pipe_dir(&self) -> PathBuf {
        self.temporary_files_folder
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Candidate path of a binary inside [`binary_folder`](Self::binary_folder).
    pub fn binary_in_folder(&self, name: &str) -> Option<PathBuf> {
        let dir = self.binary_folder.as_ref()?;
        let file = if cfg!(windows) {
            format!("{name}.exe")
        } else {
            name.to_string()
        };
        Some(dir.join(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = FfmpegConfig::default();
        assert!(cfg.binary_folder.is_none());
        assert_eq!(cfg.diagnostic_capacity, 1024);
        assert_eq!(cfg.cancel_grace(), Duration::from_secs(5));
        assert_eq!(cfg.pipe_dir(), std::env::temp_dir());
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = FfmpegConfig::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"log_level": "error", "diagnostic_capacity": 16}"#;
        let cfg = FfmpegConfig::from_json(json).unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("error"));
        assert_eq!(cfg.diagnostic_capacity, 16);
        assert_eq!(cfg.cancel_grace_secs, 5);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = FfmpegConfig::from_json("{}").unwrap();
        assert_eq!(cfg.diagnostic_capacity, 1024);
    }

    #[test]
    fn parse_invalid_json_is_validation_error() {
        let err = FfmpegConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = FfmpegConfig::load_or_default(Some(Path::new("/nonexistent/ffpipe.json")));
        assert_eq!(cfg.diagnostic_capacity, 1024);
    }

    #[test]
    fn load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffpipe.json");
        std::fs::write(&path, r#"{"cancel_grace_secs": 1}"#).unwrap();
        let cfg = FfmpegConfig::load_or_default(Some(&path));
        assert_eq!(cfg.cancel_grace(), Duration::from_secs(1));
    }

    #[test]
    fn unknown_log_level_warns() {
        let cfg = FfmpegConfig {
            log_level: Some("loud".into()),
            ..Default::default()
        };
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("log_level")));
    }

    #[test]
    fn missing_binary_folder_warns() {
        let cfg = FfmpegConfig {
            binary_folder: Some(PathBuf::from("/nonexistent/ffmpeg/bin")),
            ..Default::default()
        };
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("binary_folder")));
    }

    #[test]
    fn binary_in_folder_joins_name() {
        let cfg = FfmpegConfig {
            binary_folder: Some(PathBuf::from("/opt/ffmpeg/bin")),
            ..Default::default()
        };
        let path = cfg.binary_in_folder("ffmpeg").unwrap();
        assert!(path.starts_with("/opt/ffmpeg/bin"));
        assert!(FfmpegConfig::default().binary_in_folder("ffmpeg").is_none());
    }
}
