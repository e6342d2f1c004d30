use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration. `storage_path` is created on open if missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one `{collection}.json` snapshot per collection.
    pub storage_path: PathBuf,
    /// Debounce window between the last mutation and the snapshot write.
    pub save_delay: Duration,
    /// Enables structured per-operation logging.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./storage"),
            save_delay: Duration::from_millis(50),
            debug: false,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_storage_path(path: impl Into<PathBuf>) -> Self {
        Self { storage_path: path.into(), ..Self::default() }
    }
}
