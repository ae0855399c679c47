use anyhow::{Context, Result};
use ffpipe_core::FfmpegConfig;
use std::path::{Path, PathBuf};

/// Locations searched, in order, when no config path is given.
pub const DEFAULT_PATHS: &[&str] = &[
    "./ffpipe.toml",
    "~/.config/ffpipe/config.toml",
    "/etc/ffpipe/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<FfmpegConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Parse a TOML document into a config. Missing keys take their defaults.
pub fn parse_config(content: &str) -> Result<FfmpegConfig> {
    let config: FfmpegConfig = toml::from_str(content)?;
    if let Some(level) = &config.log_level {
        if level.trim().is_empty() {
            anyhow::bail!("log_level cannot be empty");
        }
    }
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<FfmpegConfig> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {}", path.display());
            return load_config(path);
        }
    }

    Ok(FfmpegConfig::default())
}

/// Expand `~` in every configured directory.
fn expand_paths(config: &mut FfmpegConfig) {
    for dir in [
        &mut config.binary_folder,
        &mut config.working_directory,
        &mut config.temporary_files_folder,
    ] {
        if let Some(path) = dir.as_mut() {
            *path = expand(path);
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}
