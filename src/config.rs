//! Bootstrap parameters for opening a store. Built by the host's own config
//! loader; this crate never reads configuration files.
use serde::Deserialize;
use std::path::PathBuf;

/// Path understood by SQLite as a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Where and how to open the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Database file, or [`IN_MEMORY`].
    pub path: PathBuf,
    /// How long a write waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Create the database file when it does not exist yet.
    pub create_if_missing: bool,
    /// Use write-ahead logging (ignored for in-memory databases).
    pub wal: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            path: PathBuf::from("interactions.sqlite"),
            busy_timeout_ms: 5_000,
            create_if_missing: true,
            wal: true,
        }
    }
}

impl ConnectionParams {
    /// Parameters for a database file at `path`, other settings defaulted.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Parameters for a private in-memory database (useful for tests).
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(IN_MEMORY),
            wal: false,
            ..Self::default()
        }
    }

    /// Override the lock wait.
    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Refuse to create a missing database file.
    pub fn create_if_missing(mut self, yes: bool) -> Self {
        self.create_if_missing = yes;
        self
    }

    /// Toggle write-ahead logging.
    pub fn wal(mut self, yes: bool) -> Self {
        self.wal = yes;
        self
    }

    pub(crate) fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }
}
