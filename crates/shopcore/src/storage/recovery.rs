//! Startup recovery of the primary store
//!
//! Runs once before the store is handed out:
//!
//! 1. Inspect total and active row counts.
//! 2. Active rows exist: nothing to do.
//!    Rows exist but all are soft-deleted: warn and keep them. A catalog that was
//!    cleared on purpose is never revived automatically.
//! 3. Empty store: restore from the JSON snapshot, else from the newest valid
//!    archive, else start empty (a fresh deployment is not an error).
//!
//! Failures of one source fall through to the next. A database file that cannot be
//! opened at all counts as empty after it has been moved aside.

use chrono::Utc;
use fs_err as fs;
use std::fmt;
use std::path::{Path, PathBuf};

use super::backup::{self, ArchiveEntry};
use super::products::ProductStore;
use super::snapshot;
use crate::core::config::CatalogConfig;
use crate::core::error::{CatalogError, CatalogResult};
use crate::core::types::StoreHealth;

/// Which branch recovery took
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The store had active products and was left untouched
    Healthy(StoreHealth),
    /// The store only holds soft-deleted products; left untouched on purpose
    AllSoftDeleted(StoreHealth),
    RestoredFromSnapshot { products: usize },
    RestoredFromArchive { archive: PathBuf, health: StoreHealth },
    /// Nothing to recover from; the store starts empty
    Empty,
}

impl RecoveryOutcome {
    pub fn restored(&self) -> bool {
        matches!(
            self,
            RecoveryOutcome::RestoredFromSnapshot { .. } | RecoveryOutcome::RestoredFromArchive { .. }
        )
    }
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryOutcome::Healthy(health) => write!(f, "store healthy ({})", health),
            RecoveryOutcome::AllSoftDeleted(health) => {
                write!(f, "all products soft-deleted, not restoring ({})", health)
            }
            RecoveryOutcome::RestoredFromSnapshot { products } => {
                write!(f, "restored {} products from JSON snapshot", products)
            }
            RecoveryOutcome::RestoredFromArchive { archive, health } => {
                write!(f, "restored from archive {} ({})", archive.display(), health)
            }
            RecoveryOutcome::Empty => f.write_str("no data to recover, starting empty"),
        }
    }
}

/// Opens the primary store, restoring it first if it is empty or unreadable.
///
/// Only storage failures that leave no usable store at all (e.g. the database
/// directory is not writable) are returned as errors.
pub fn recover(config: &CatalogConfig) -> CatalogResult<(ProductStore, RecoveryOutcome)> {
    let store = match open_and_inspect(&config.db_path) {
        Ok((store, health)) if health.active > 0 => {
            log::info!("Primary store healthy: {}", health);
            return Ok((store, RecoveryOutcome::Healthy(health)));
        }
        Ok((store, health)) if health.all_soft_deleted() => {
            log::warn!(
                "Primary store has {} products but none active; not restoring from backups",
                health.total
            );
            return Ok((store, RecoveryOutcome::AllSoftDeleted(health)));
        }
        Ok((store, _)) => store,
        Err(e) if e.is_storage() && config.db_path.exists() => {
            log::error!("Primary store {} is unreadable: {}", config.db_path.display(), e);
            quarantine_database(&config.db_path)?;
            ProductStore::open(&config.db_path)?
        }
        Err(e) => return Err(e),
    };

    log::warn!("Primary store is empty, looking for recovery sources");

    if let Some(products) = restore_from_snapshot(&store, &config.snapshot_path) {
        let outcome = RecoveryOutcome::RestoredFromSnapshot { products };
        log::info!("Recovery: {}", outcome);
        return Ok((store, outcome));
    }

    // The pool must be closed before the database file is swapped out
    drop(store);

    let outcome = match restore_from_newest_archive(config) {
        Some((archive, health)) => RecoveryOutcome::RestoredFromArchive {
            archive: archive.path,
            health,
        },
        None => RecoveryOutcome::Empty,
    };
    log::info!("Recovery: {}", outcome);

    let store = ProductStore::open(&config.db_path)?;
    Ok((store, outcome))
}

fn open_and_inspect(db_path: &Path) -> CatalogResult<(ProductStore, StoreHealth)> {
    let store = ProductStore::open(db_path)?;
    let health = store.health()?;
    Ok((store, health))
}

/// Upserts the snapshot into `store`. `None` means "try the next source".
fn restore_from_snapshot(store: &ProductStore, snapshot_path: &Path) -> Option<usize> {
    match snapshot::read_snapshot(snapshot_path) {
        Ok(None) => {
            log::info!("No snapshot at {}", snapshot_path.display());
            None
        }
        Ok(Some(products)) if products.is_empty() => {
            log::warn!("Snapshot {} contains no products", snapshot_path.display());
            None
        }
        Ok(Some(products)) => match store.upsert_from_snapshot(&products) {
            Ok(count) => Some(count),
            Err(e) => {
                log::error!("Failed to restore from snapshot {}: {}", snapshot_path.display(), e);
                None
            }
        },
        Err(e @ CatalogError::CorruptSnapshot(_)) => {
            log::error!("Snapshot {} is corrupt: {}", snapshot_path.display(), e);
            // Keep the damaged file for inspection; the next backup cycle writes a new one
            if let Err(e) = quarantine(snapshot_path) {
                log::warn!("Failed to move corrupt snapshot aside: {}", e);
            }
            None
        }
        Err(e) => {
            log::error!("Failed to read snapshot {}: {}", snapshot_path.display(), e);
            None
        }
    }
}

/// Tries archives newest first and restores the first one that passes verification
fn restore_from_newest_archive(config: &CatalogConfig) -> Option<(ArchiveEntry, StoreHealth)> {
    let archives = match backup::list_archives(&config.backup_dir, &config.db_path) {
        Ok(archives) => archives,
        Err(e) => {
            log::error!("Failed to list archives in {}: {}", config.backup_dir.display(), e);
            return None;
        }
    };
    if archives.is_empty() {
        log::info!("No archives in {}", config.backup_dir.display());
        return None;
    }

    for archive in archives {
        match restore_verified_archive(&archive, &config.db_path) {
            Ok(health) => return Some((archive, health)),
            Err(e) => log::warn!("Skipping archive {}: {}", archive.path.display(), e),
        }
    }
    None
}

fn restore_verified_archive(archive: &ArchiveEntry, db_path: &Path) -> CatalogResult<StoreHealth> {
    let health = backup::verify_archive(&archive.path)?;
    if health.is_empty() {
        return Err(CatalogError::Validation("archive holds no products".to_string()));
    }
    backup::restore_archive(&archive.path, db_path)?;
    Ok(health)
}

/// Renames `path` to `<path>.corrupt-<UTC timestamp>` and returns the new path
fn quarantine(path: &Path) -> CatalogResult<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(format!(".corrupt-{}", Utc::now().format("%Y%m%d_%H%M%S_%6f")));
    let target = PathBuf::from(target);
    fs::rename(path, &target)?;
    log::warn!("Moved {} to {}", path.display(), target.display());
    Ok(target)
}

fn quarantine_database(db_path: &Path) -> CatalogResult<PathBuf> {
    let moved = quarantine(db_path)?;
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut sidecar = db_path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }
    }
    Ok(moved)
}

/// Replaces the store with the newest valid archive regardless of its current state.
///
/// For operators recovering by hand. No store for `config.db_path` may be open.
pub fn force_restore_from_archive(config: &CatalogConfig) -> CatalogResult<(ArchiveEntry, StoreHealth)> {
    restore_from_newest_archive(config).ok_or_else(|| {
        CatalogError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no valid archive in {}", config.backup_dir.display()),
        ))
    })
}

/// Upserts the snapshot into the store regardless of its current state.
///
/// Unlike startup recovery, a corrupt snapshot is reported as an error and left in place.
pub fn force_restore_from_snapshot(store: &ProductStore, snapshot_path: &Path) -> CatalogResult<usize> {
    let products = snapshot::read_snapshot(snapshot_path)?.ok_or_else(|| {
        CatalogError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("snapshot {} not found", snapshot_path.display()),
        ))
    })?;
    store.upsert_from_snapshot(&products)
}
