use std::fmt;
use thiserror::Error;

use crate::core::types::ProductId;

/// Centralized error type for the catalog library
///
/// Storage-class variants (`Database`, `DatabasePool`, `Migration`, `Io`) are fatal
/// to the operation that raised them. `Backup` failures are only ever returned by
/// explicit backup requests; mutations swallow and log them.
///
/// # Example
///
/// ```no_run
/// use shopcore::core::error::CatalogError;
///
/// fn handle_error(err: CatalogError) {
///     if err.is_storage() {
///         log::error!("Storage failure: {}", err);
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot JSON could not be parsed or coerced into products
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// In-memory products could not be encoded into a snapshot
    #[error("Snapshot encoding error: {0}")]
    Codec(String),

    /// One step of a backup cycle failed
    #[error(transparent)]
    Backup(#[from] BackupFailure),

    #[error("Product {0} not found")]
    NotFound(ProductId),

    #[error("Product {0} is already deleted")]
    AlreadyDeleted(ProductId),

    #[error("Product {0} is already active")]
    AlreadyActive(ProductId),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl CatalogError {
    /// True for I/O and database failures of the primary store
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            CatalogError::Database(_) | CatalogError::DatabasePool(_) | CatalogError::Migration(_) | CatalogError::Io(_)
        )
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::CorruptSnapshot(err.to_string())
    }
}

/// Type alias for Result with CatalogError
pub type CatalogResult<T> = Result<T, CatalogError>;

/// The step of `backup_now` that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStep {
    Archive,
    Snapshot,
    Prune,
}

impl fmt::Display for BackupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackupStep::Archive => "archive",
            BackupStep::Snapshot => "snapshot",
            BackupStep::Prune => "prune",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Backup {step} step failed: {reason}")]
pub struct BackupFailure {
    pub step: BackupStep,
    pub reason: String,
}

impl BackupFailure {
    pub fn new(step: BackupStep, err: impl fmt::Display) -> Self {
        Self {
            step,
            reason: err.to_string(),
        }
    }
}
