//! Pipe address resolution.
//!
//! Every pipe argument gets a freshly generated name. The name is turned into
//! an OS-specific path: a `\\.\pipe\` namespace path on Windows, a Unix-domain
//! socket inside a shared temp directory everywhere else. ffmpeg reaches the
//! socket through its `unix:` protocol, so the subprocess-facing URI differs
//! from the path this process binds.

use std::fmt;
use std::path::{Path, PathBuf};

use ffpipe_core::{Error, Result};

/// Prefix shared by every generated pipe name.
pub const PIPE_PREFIX: &str = "ffpipe_";

/// A generated pipe identifier plus its resolved OS path.
///
/// # Example
///
/// ```
/// use ffpipe_av::pipe::PipeAddress;
///
/// let address = PipeAddress::generate();
/// assert!(address.name().starts_with("ffpipe_"));
/// # #[cfg(unix)]
/// assert!(address.uri().starts_with("unix:"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipeAddress {
    name: String,
    path: PathBuf,
}

impl PipeAddress {
    /// Resolve `name` against `dir`. `dir` is ignored on Windows.
    ///
    /// The name must be non-empty and contain no path separators; use
    /// [`try_new`](Self::try_new) for names that are not known to be valid.
    pub fn new(name: &str, dir: &Path) -> Self {
        debug_assert!(is_valid_name(name), "invalid pipe name: {name:?}");
        Self {
            name: name.to_string(),
            path: resolve(name, dir),
        }
    }

    /// Checked variant of [`new`](Self::new).
    pub fn try_new(name: &str, dir: &Path) -> Result<Self> {
        if !is_valid_name(name) {
            return Err(Error::Validation(format!("invalid pipe name: {name:?}")));
        }
        Ok(Self::new(name, dir))
    }

    /// A fresh address in the system temp directory.
    pub fn generate() -> Self {
        Self::generate_in(&std::env::temp_dir())
    }

    /// A fresh address in `dir`.
    pub fn generate_in(dir: &Path) -> Self {
        Self::new(&unique_name(), dir)
    }

    /// The generated name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The path this process creates and listens on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The address as the subprocess must spell it on its command line.
    pub fn uri(&self) -> String {
        if cfg!(windows) {
            self.path.display().to_string()
        } else {
            format!("unix:{}", self.path.display())
        }
    }
}

impl fmt::Display for PipeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// A collision-resistant pipe name.
pub fn unique_name() -> String {
    format!("{PIPE_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '\0'])
}

/// Path in the Windows pipe namespace.
pub fn windows_pipe_path(name: &str) -> PathBuf {
    PathBuf::from(format!(r"\\.\pipe\{name}"))
}

/// Path of a Unix-domain socket inside `dir`.
pub fn unix_socket_path(name: &str, dir: &Path) -> PathBuf {
    dir.join(format!("{name}.sock"))
}

#[cfg(windows)]
fn resolve(name: &str, _dir: &Path) -> PathBuf {
    windows_pipe_path(name)
}

#[cfg(not(windows))]
fn resolve(name: &str, dir: &Path) -> PathBuf {
    unix_socket_path(name, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_are_unique() {
        let a = PipeAddress::generate();
        let b = PipeAddress::generate();
        assert_ne!(a, b);
        assert_ne!(a.name(), b.name());
        assert!(a.name().starts_with(PIPE_PREFIX));
    }

    #[test]
    fn resolution_is_stable() {
        let dir = Path::new("/tmp");
        let a = PipeAddress::new("ffpipe_test", dir);
        let b = PipeAddress::new("ffpipe_test", dir);
        assert_eq!(a, b);
        assert_eq!(a.uri(), b.uri());
    }

    #[test]
    fn windows_scheme() {
        assert_eq!(
            windows_pipe_path("ffpipe_abc"),
            PathBuf::from(r"\\.\pipe\ffpipe_abc")
        );
    }

    #[test]
    fn unix_scheme() {
        assert_eq!(
            unix_socket_path("ffpipe_abc", Path::new("/tmp")),
            PathBuf::from("/tmp/ffpipe_abc.sock")
        );
    }

    #[cfg(unix)]
    #[test]
    fn unix_uri_uses_unix_protocol() {
        let address = PipeAddress::new("ffpipe_abc", Path::new("/tmp"));
        assert_eq!(address.path(), Path::new("/tmp/ffpipe_abc.sock"));
        assert_eq!(address.uri(), "unix:/tmp/ffpipe_abc.sock");
        assert_eq!(address.to_string(), address.uri());
    }

    #[test]
    fn generate_in_uses_directory() {
        let dir = tempfile::tempdir().unwrap();
        let address = PipeAddress::generate_in(dir.path());
        if cfg!(unix) {
            assert!(address.path().starts_with(dir.path()));
        }
    }

    #[test]
    fn invalid_names_are_rejected() {
        let dir = Path::new("/tmp");
        assert!(PipeAddress::try_new("", dir).is_err());
        assert!(PipeAddress::try_new("a/b", dir).is_err());
        assert!(PipeAddress::try_new(r"a\b", dir).is_err());
        assert!(PipeAddress::try_new("ffpipe_ok", dir).is_ok());
    }
}
