/// Storage-root configuration for the repository.
///
/// The repository keeps one record per scan in a dedicated history folder.
/// By default that folder is `history/` under the working directory; the
/// `DRIVESCAN_HISTORY` environment variable or an explicit path overrides it.
use std::path::PathBuf;

/// Name of the history folder created under the working directory.
pub const HISTORY_FOLDER_NAME: &str = "history";

/// Environment variable that overrides the history folder location.
pub const HISTORY_ENV_VAR: &str = "DRIVESCAN_HISTORY";

/// Extension of persisted scan records (without the dot).
pub const RECORD_EXTENSION: &str = "scan";

/// Settings consumed by [`crate::repository::Repository::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding one record file per scan.
    pub history_dir: PathBuf,
}

impl Settings {
    pub fn new(history_dir: impl Into<PathBuf>) -> Self {
        Self {
            history_dir: history_dir.into(),
        }
    }

    /// Resolve the history folder: `explicit` wins, then the environment
    /// variable, then `history/` under the working directory.
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        if let Some(dir) = explicit {
            return Self::new(dir);
        }
        match std::env::var_os(HISTORY_ENV_VAR) {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(base.join(HISTORY_FOLDER_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_directory_wins() {
        let settings = Settings::resolve(Some(PathBuf::from("/tmp/elsewhere")));
        assert_eq!(settings.history_dir, PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn default_uses_history_folder_name() {
        let settings = Settings::default();
        assert!(settings.history_dir.ends_with(HISTORY_FOLDER_NAME));
    }
}
