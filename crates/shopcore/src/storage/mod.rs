//! Database, snapshot, backup and recovery functionality

pub mod backup;
pub mod db;
pub mod migrations;
pub mod products;
pub mod recovery;
pub mod snapshot;

// Re-exports for convenience
pub use backup::{ArchiveEntry, BackupManager, BackupReport};
pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use products::ProductStore;
pub use recovery::{recover, RecoveryOutcome};
