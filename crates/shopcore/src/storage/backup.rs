use chrono::{NaiveDateTime, Timelike, Utc};
use fs_err as fs;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::products::{query_health, vacuum_into, ProductStore};
use super::snapshot;
use crate::core::config::{self, CatalogConfig};
use crate::core::error::{BackupFailure, BackupStep, CatalogError, CatalogResult};
use crate::core::types::StoreHealth;

/// A timestamped copy of the database file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    /// UTC time parsed from the file name
    pub taken_at: NaiveDateTime,
}

/// Outcome of one `backup_now` cycle. Steps that failed are listed in `failures`;
/// the remaining steps still ran.
#[derive(Debug, Default)]
pub struct BackupReport {
    /// Archive written by this cycle, `None` if skipped or failed
    pub archive: Option<PathBuf>,
    /// Number of products in the refreshed snapshot, `None` if the step failed
    pub snapshot_products: Option<usize>,
    /// Archives removed by retention
    pub pruned: Vec<PathBuf>,
    pub failures: Vec<BackupFailure>,
}

impl BackupReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turns the first recorded failure into an error, for callers that asked
    /// for a backup explicitly and want it to fail loudly.
    pub fn into_result(self) -> CatalogResult<Self> {
        match self.failures.first() {
            Some(failure) => Err(CatalogError::Backup(failure.clone())),
            None => Ok(self),
        }
    }
}

/// Archives the database, refreshes the JSON snapshot and prunes old archives
///
/// Cycles are serialized through an internal lock, which also keeps archive
/// timestamps strictly increasing so rapid successive backups never share a name.
pub struct BackupManager {
    backup_dir: PathBuf,
    snapshot_path: PathBuf,
    retention: usize,
    last_stamp: Mutex<Option<NaiveDateTime>>,
}

impl BackupManager {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            backup_dir: config.backup_dir.clone(),
            snapshot_path: config.snapshot_path.clone(),
            retention: config.retention.max(1),
            last_stamp: Mutex::new(None),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Runs one best-effort backup cycle: archive, snapshot, prune.
    ///
    /// Never returns an error. A failing step is logged and recorded in the
    /// report, and does not stop the steps after it.
    pub fn backup_now(&self, store: &ProductStore) -> BackupReport {
        let mut last_stamp = match self.last_stamp.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Backup lock was poisoned, recovering...");
                poisoned.into_inner()
            }
        };
        let mut report = BackupReport::default();

        match self.archive(store, &mut last_stamp) {
            Ok(archive) => report.archive = archive,
            Err(e) => {
                log::error!("Failed to archive database {}: {}", store.db_path().display(), e);
                report.failures.push(BackupFailure::new(BackupStep::Archive, e));
            }
        }

        match self.refresh_snapshot(store) {
            Ok(count) => report.snapshot_products = Some(count),
            Err(e) => {
                log::error!("Failed to refresh snapshot {}: {}", self.snapshot_path.display(), e);
                report.failures.push(BackupFailure::new(BackupStep::Snapshot, e));
            }
        }

        match prune_archives(&self.backup_dir, store.db_path(), self.retention) {
            Ok(pruned) => report.pruned = pruned,
            Err(e) => {
                log::error!("Failed to prune archives in {}: {}", self.backup_dir.display(), e);
                report.failures.push(BackupFailure::new(BackupStep::Prune, e));
            }
        }

        report
    }

    /// Copies the database into a new archive, skipping a missing or empty store
    fn archive(&self, store: &ProductStore, last_stamp: &mut Option<NaiveDateTime>) -> CatalogResult<Option<PathBuf>> {
        let db_path = store.db_path();
        if !db_path.exists() {
            log::debug!("Database {} does not exist, skipping archive", db_path.display());
            return Ok(None);
        }
        if store.health()?.is_empty() {
            log::debug!("Database {} has no products, skipping archive", db_path.display());
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir)?;

        let mut stamp = next_stamp(*last_stamp);
        let mut archive_path = self.backup_dir.join(archive_file_name(db_path, stamp));
        while archive_path.exists() {
            stamp += chrono::Duration::microseconds(1);
            archive_path = self.backup_dir.join(archive_file_name(db_path, stamp));
        }
        *last_stamp = Some(stamp);

        let mut tmp_name = archive_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        vacuum_into(store, &tmp_path)?;
        fs::rename(&tmp_path, &archive_path)?;

        log::info!("Created backup: {}", archive_path.display());
        Ok(Some(archive_path))
    }

    /// Rewrites the snapshot from every row, soft-deleted ones included
    fn refresh_snapshot(&self, store: &ProductStore) -> CatalogResult<usize> {
        let mut products = store.list(false)?;
        products.reverse();
        snapshot::write_snapshot(&self.snapshot_path, &products)
    }
}

/// Current UTC time at archive-name precision, strictly after `last`
fn next_stamp(last: Option<NaiveDateTime>) -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    let now = now.with_nanosecond(now.nanosecond() / 1_000 * 1_000).unwrap_or(now);
    match last {
        Some(last) if now <= last => last + chrono::Duration::microseconds(1),
        _ => now,
    }
}

fn name_parts(db_path: &Path) -> (String, String) {
    let stem = db_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("shop")
        .to_string();
    let ext = db_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("db")
        .to_string();
    (stem, ext)
}

/// `shop.db` + 2026-10-18 12:00:00.123456 → `shop_20261018_120000_123456.db`
pub fn archive_file_name(db_path: &Path, taken_at: NaiveDateTime) -> String {
    let (stem, ext) = name_parts(db_path);
    format!(
        "{}_{}.{}",
        stem,
        taken_at.format(config::backup::ARCHIVE_TIMESTAMP_FORMAT),
        ext
    )
}

/// Extracts the timestamp from an archive name. Also accepts the
/// `shop_backup_YYYYmmdd_HHMMSS.db` names written by older deployments.
fn parse_archive_name(file_name: &str, stem: &str, ext: &str) -> Option<NaiveDateTime> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix('_')?;
    let rest = rest.strip_suffix(ext)?.strip_suffix('.')?;
    let rest = rest.strip_prefix("backup_").unwrap_or(rest);

    NaiveDateTime::parse_from_str(rest, config::backup::ARCHIVE_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(rest, config::backup::LEGACY_TIMESTAMP_FORMAT))
        .ok()
}

/// Lists archives of `db_path` in `backup_dir`, newest first.
/// A missing directory yields an empty list.
pub fn list_archives(backup_dir: &Path, db_path: &Path) -> CatalogResult<Vec<ArchiveEntry>> {
    let mut archives = Vec::new();
    if !backup_dir.is_dir() {
        return Ok(archives);
    }

    let (stem, ext) = name_parts(db_path);
    for entry in fs::read_dir(backup_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(taken_at) = parse_archive_name(file_name, &stem, &ext) {
            archives.push(ArchiveEntry { path, taken_at });
        }
    }

    archives.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then_with(|| b.path.cmp(&a.path)));
    Ok(archives)
}

/// Deletes all but the `keep` newest archives, oldest first.
/// Returns the removed paths. A file that cannot be removed is logged and skipped.
pub fn prune_archives(backup_dir: &Path, db_path: &Path, keep: usize) -> CatalogResult<Vec<PathBuf>> {
    let archives = list_archives(backup_dir, db_path)?;
    let mut removed = Vec::new();

    for archive in archives.iter().skip(keep).rev() {
        if let Err(e) = fs::remove_file(&archive.path) {
            log::warn!("Failed to remove old backup {}: {}", archive.path.display(), e);
        } else {
            log::info!("Removed old backup: {}", archive.path.display());
            removed.push(archive.path.clone());
        }
    }

    Ok(removed)
}

/// Opens an archive read-only, runs `PRAGMA quick_check` and counts its products
pub fn verify_archive(path: &Path) -> CatalogResult<StoreHealth> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
    let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if check != "ok" {
        return Err(CatalogError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("archive {} failed integrity check: {}", path.display(), check),
        )));
    }
    Ok(query_health(&conn)?)
}

/// Replaces the database file at `db_path` with a copy of `archive`
///
/// The copy goes to a temp file next to the database and is renamed into place,
/// so a crash never leaves a half-copied database. Stale `-wal`/`-shm`/`-journal`
/// files of the replaced database are removed.
///
/// No connection to `db_path` may be open while this runs.
pub fn restore_archive(archive: &Path, db_path: &Path) -> CatalogResult<()> {
    if !archive.exists() {
        return Err(CatalogError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Backup file does not exist: {}", archive.display()),
        )));
    }

    let mut tmp_name = db_path.as_os_str().to_owned();
    tmp_name.push(".restore.tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::copy(archive, &tmp_path)?;
    fs::File::open(&tmp_path)?.sync_all()?;
    fs::rename(&tmp_path, db_path)?;

    for suffix in ["-wal", "-shm", "-journal"] {
        let mut sidecar = db_path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }
    }

    log::info!("Restored database from backup: {}", archive.display());
    Ok(())
}
