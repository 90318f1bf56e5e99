//! The product catalog as seen by callers: recovery on open, backups after every write.

use std::path::Path;

use crate::core::config::CatalogConfig;
use crate::core::error::{CatalogError, CatalogResult};
use crate::core::types::{NewProduct, Product, ProductId, ProductPatch, StoreHealth};
use crate::storage::backup::{ArchiveEntry, BackupManager, BackupReport};
use crate::storage::products::ProductStore;
use crate::storage::recovery::{self, RecoveryOutcome};
use crate::storage::snapshot;

/// Durable product catalog
///
/// Opening runs startup recovery and one initial backup cycle. Each successful
/// mutation is followed by another cycle; backup failures are logged and never
/// turn a committed mutation into an error.
///
/// # Example
///
/// ```no_run
/// use shopcore::{Catalog, CatalogConfig, NewProduct};
///
/// let catalog = Catalog::open(CatalogConfig::from_env())?;
/// let id = catalog.create(NewProduct::new("Jeans", 3200.0))?;
/// catalog.soft_delete(id)?;
/// # Ok::<(), shopcore::CatalogError>(())
/// ```
pub struct Catalog {
    config: CatalogConfig,
    store: ProductStore,
    backups: BackupManager,
    recovery: RecoveryOutcome,
}

impl Catalog {
    pub fn open(config: CatalogConfig) -> CatalogResult<Self> {
        let (store, recovery) = recovery::recover(&config)?;
        let backups = BackupManager::new(&config);
        let catalog = Self {
            config,
            store,
            backups,
            recovery,
        };
        catalog.backup_after("startup");
        Ok(catalog)
    }

    /// Replaces the store with the newest valid archive, then opens the catalog.
    ///
    /// Opening runs the usual startup backup, so the snapshot describes the
    /// restored data right away. No other handle to the store may be open.
    pub fn force_restore_from_archive(config: CatalogConfig) -> CatalogResult<(Self, ArchiveEntry)> {
        let (archive, health) = recovery::force_restore_from_archive(&config)?;
        log::info!("Database restored from {} ({})", archive.path.display(), health);
        let catalog = Self::open(config)?;
        Ok((catalog, archive))
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn db_path(&self) -> &Path {
        self.store.db_path()
    }

    /// What startup recovery did when this catalog was opened
    pub fn recovery_outcome(&self) -> &RecoveryOutcome {
        &self.recovery
    }

    pub fn health(&self) -> CatalogResult<StoreHealth> {
        self.store.health()
    }

    /// Products ordered newest first; `active_only` hides soft-deleted ones
    pub fn list(&self, active_only: bool) -> CatalogResult<Vec<Product>> {
        self.store.list(active_only)
    }

    /// Fetches a product whether active or not
    pub fn get(&self, id: ProductId) -> CatalogResult<Product> {
        self.store.get(id)?.ok_or(CatalogError::NotFound(id))
    }

    pub fn create(&self, product: NewProduct) -> CatalogResult<ProductId> {
        let id = self.store.create(product)?;
        log::info!("Created product {}", id);
        self.backup_after("create");
        Ok(id)
    }

    pub fn update(&self, id: ProductId, patch: ProductPatch) -> CatalogResult<()> {
        self.store.update(id, patch)?;
        log::info!("Updated product {}", id);
        self.backup_after("update");
        Ok(())
    }

    pub fn soft_delete(&self, id: ProductId) -> CatalogResult<()> {
        self.store.soft_delete(id)?;
        log::info!("Soft-deleted product {}", id);
        self.backup_after("delete");
        Ok(())
    }

    pub fn reactivate(&self, id: ProductId) -> CatalogResult<()> {
        self.store.reactivate(id)?;
        log::info!("Reactivated product {}", id);
        self.backup_after("reactivate");
        Ok(())
    }

    /// Runs a backup cycle on request. Unlike the cycles that follow mutations,
    /// a failed step is returned as `CatalogError::Backup`.
    pub fn backup_now(&self) -> CatalogResult<BackupReport> {
        self.backups.backup_now(&self.store).into_result()
    }

    /// Writes every product, including soft-deleted ones, to `path` as a snapshot
    pub fn export_snapshot(&self, path: &Path) -> CatalogResult<usize> {
        let mut products = self.store.list(false)?;
        products.reverse();
        snapshot::write_snapshot(path, &products)
    }

    /// Upserts the configured snapshot into the store, then backs up
    pub fn restore_from_snapshot(&self) -> CatalogResult<usize> {
        let count = recovery::force_restore_from_snapshot(&self.store, &self.config.snapshot_path)?;
        log::info!("Restored {} products from {}", count, self.config.snapshot_path.display());
        self.backup_after("snapshot restore");
        Ok(count)
    }

    fn backup_after(&self, operation: &str) {
        let report = self.backups.backup_now(&self.store);
        for failure in &report.failures {
            log::warn!("Backup after {} incomplete: {}", operation, failure);
        }
    }
}
