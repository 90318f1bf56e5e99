//! Shared fixtures for catalog integration tests

#![allow(dead_code)]

use shopcore::storage::backup::{list_archives, ArchiveEntry};
use shopcore::{Catalog, CatalogConfig};
use tempfile::TempDir;

/// A catalog rooted in its own temporary directory
pub struct TestShop {
    pub dir: TempDir,
    pub config: CatalogConfig,
}

impl TestShop {
    pub fn new() -> Self {
        Self::with_retention(10)
    }

    pub fn with_retention(retention: usize) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = CatalogConfig::in_dir(dir.path()).with_retention(retention);
        Self { dir, config }
    }

    /// Opens the catalog the way a process start would, running recovery
    pub fn open(&self) -> Catalog {
        Catalog::open(self.config.clone()).expect("Failed to open catalog")
    }

    pub fn archives(&self) -> Vec<ArchiveEntry> {
        list_archives(&self.config.backup_dir, &self.config.db_path).expect("Failed to list archives")
    }

    /// Simulates losing the primary database file
    pub fn delete_database(&self) {
        std::fs::remove_file(&self.config.db_path).expect("Failed to delete database");
    }

    pub fn delete_snapshot(&self) {
        std::fs::remove_file(&self.config.snapshot_path).expect("Failed to delete snapshot");
    }

    pub fn write_snapshot(&self, json: &str) {
        std::fs::write(&self.config.snapshot_path, json).expect("Failed to write snapshot");
    }
}
