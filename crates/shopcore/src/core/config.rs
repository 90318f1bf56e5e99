use once_cell::sync::Lazy;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: shop.db
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "shop.db".to_string()));

/// Directory holding timestamped copies of the database file
/// Read from BACKUP_DIR environment variable
/// Default: db_backups
pub static BACKUP_DIR: Lazy<String> = Lazy::new(|| env::var("BACKUP_DIR").unwrap_or_else(|_| "db_backups".to_string()));

/// JSON snapshot of the whole catalog, rewritten on every backup cycle
/// Read from SNAPSHOT_PATH environment variable
/// Default: products_backup.json
pub static SNAPSHOT_PATH: Lazy<String> =
    Lazy::new(|| env::var("SNAPSHOT_PATH").unwrap_or_else(|_| "products_backup.json".to_string()));

/// Number of database archives to keep
/// Read from BACKUP_RETENTION environment variable
/// Default: 10, minimum 1
pub static BACKUP_RETENTION: Lazy<usize> = Lazy::new(|| {
    env::var("BACKUP_RETENTION")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map_or(backup::DEFAULT_RETENTION, |n| n.max(1))
});

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: shop.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "shop.log".to_string()));

/// Database pool configuration
pub mod db {
    use super::Duration;

    /// Maximum number of pooled SQLite connections
    pub const POOL_MAX_SIZE: u32 = 10;

    /// How long a writer waits for another writer's lock (in seconds)
    pub const BUSY_TIMEOUT_SECS: u64 = 30;

    pub fn busy_timeout() -> Duration {
        Duration::from_secs(BUSY_TIMEOUT_SECS)
    }
}

/// Backup configuration
pub mod backup {
    /// Archives kept when BACKUP_RETENTION is not set
    pub const DEFAULT_RETENTION: usize = 10;

    /// Timestamp embedded in archive file names. Sorts lexicographically in time order.
    pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

    /// Second-resolution format used by archives from older deployments
    pub const LEGACY_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
}

/// Where the catalog keeps its primary store and derived artifacts
///
/// Passed explicitly into `Catalog::open` so that tests and multiple front-ends
/// never share hidden global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub retention: usize,
}

impl CatalogConfig {
    /// Builds the configuration from environment variables (see the statics above)
    pub fn from_env() -> Self {
        Self {
            db_path: PathBuf::from(DATABASE_PATH.as_str()),
            backup_dir: PathBuf::from(BACKUP_DIR.as_str()),
            snapshot_path: PathBuf::from(SNAPSHOT_PATH.as_str()),
            retention: *BACKUP_RETENTION,
        }
    }

    /// Places the database, snapshot and archive directory under `dir`
    /// using the default file names.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            db_path: dir.join("shop.db"),
            backup_dir: dir.join("db_backups"),
            snapshot_path: dir.join("products_backup.json"),
            retention: backup::DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }
}
