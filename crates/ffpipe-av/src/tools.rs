//! Discovery of the ffmpeg executables.
//!
//! [`ToolRegistry`] resolves `ffmpeg` and `ffprobe` once, preferring the
//! configured binary folder and falling back to `PATH`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ffpipe_core::{Error, FfmpegConfig, Result};

/// Executables the registry manages.
pub const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Availability of one tool, as reported by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
}

impl ToolRegistry {
    /// Resolve every known tool. Tools that cannot be found are left out.
    pub fn discover(config: &FfmpegConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let resolved = match config.binary_in_folder(name) {
                Some(candidate) if candidate.is_file() => Some(candidate),
                Some(candidate) => {
                    tracing::debug!(
                        "{name} not found at {}; searching PATH",
                        candidate.display()
                    );
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tracing::debug!("Resolved {name} to {}", path.display());
                tools.insert(name.to_string(), path);
            }
        }

        Self { tools }
    }

    /// Path of `name`, or [`Error::Tool`] if it was not found.
    pub fn require(&self, name: &str) -> Result<&Path> {
        self.tools.get(name).map(PathBuf::as_path).ok_or_else(|| {
            Error::tool(
                name,
                format!("{name} not found; is it installed and in PATH?"),
            )
        })
    }

    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_with_default_config() {
        let registry = ToolRegistry::discover(&FfmpegConfig::default());
        // Nothing is guaranteed to be installed; the call must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::default();
        let err = registry.require("ffmpeg").unwrap_err();
        assert!(matches!(err, Error::Tool { ref tool, .. } if tool == "ffmpeg"));
    }

    #[test]
    fn check_all_lists_known_tools() {
        let registry = ToolRegistry::default();
        let infos = registry.check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ffmpeg", "ffprobe"]);
        assert!(infos.iter().all(|i| !i.available));
    }

    #[cfg(unix)]
    #[test]
    fn binary_folder_takes_precedence() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("ffmpeg");
        std::fs::write(&fake, "#!/bin/sh\necho 'ffmpeg version test'\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = FfmpegConfig {
            binary_folder: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let registry = ToolRegistry::discover(&config);
        assert_eq!(registry.require("ffmpeg").unwrap(), fake.as_path());

        let info = &registry.check_all()[0];
        assert!(info.available);
        assert_eq!(info.version.as_deref(), Some("ffmpeg version test"));
    }

    #[test]
    fn tool_info_serialization() {
        let info = ToolInfo {
            name: "ffprobe".into(),
            available: false,
            version: None,
            path: None,
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: ToolInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "ffprobe");
    }
}
