//! Shopcore - durable product catalog for a small shop
//!
//! Products live in SQLite. Every mutation is followed by a best-effort backup
//! cycle that archives the database file, refreshes a JSON snapshot and prunes
//! old archives. On startup an empty or unreadable store is rebuilt from the
//! snapshot or, failing that, from the newest archive.
//!
//! # Module Structure
//!
//! - `core`: Product types, configuration, errors and logging
//! - `storage`: Database, snapshot, backup and recovery functionality
//! - `catalog`: The `Catalog` facade that ties them together

pub mod catalog;
pub mod core;
pub mod storage;

// Re-export commonly used types for convenience
pub use catalog::Catalog;
pub use crate::core::{
    config, BackupFailure, BackupStep, CatalogConfig, CatalogError, CatalogResult, NewProduct, Product, ProductId,
    ProductPatch, Size, StoreHealth,
};
pub use storage::{BackupReport, RecoveryOutcome};
