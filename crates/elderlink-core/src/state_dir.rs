use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const STATE_DIR_ENV: &str = "ELDERLINK_STATE_DIR";
const HOME_RELATIVE: &str = ".local/state/elderlink";

/// The directory that holds the elder identity and every store.
///
/// Holding one means the directory exists and only its owner can read it.
#[derive(Debug, Clone)]
pub struct StateDir {
    path: PathBuf,
}

impl StateDir {
    /// Where state lives when nothing else is configured: `explicit` if given,
    /// then `$ELDERLINK_STATE_DIR`, then `~/.local/state/elderlink`.
    pub fn locate(explicit: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path);
        }
        if let Some(path) = std::env::var_os(STATE_DIR_ENV) {
            return Ok(PathBuf::from(path));
        }
        let home = std::env::var_os("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home).join(HOME_RELATIVE))
    }

    /// Create `path` if missing and restrict it to `0700`.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create state dir {}", path.display()))?;
        #[cfg(unix)]
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("failed to restrict state dir {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = StateDir::locate(Some(PathBuf::from("/var/lib/elder"))).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/elder"));
    }

    #[test]
    fn open_creates_nested_dir_and_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("device/elder");
        let state = StateDir::open(&nested).unwrap();
        assert!(state.path().is_dir());
        assert_eq!(state.file("elder.json"), nested.join("elder.json"));
        StateDir::open(&nested).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn opened_dir_is_private() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::open(&dir.path().join("perms")).unwrap();
        let meta = std::fs::metadata(state.path()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);
    }
}
