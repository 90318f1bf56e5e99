//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Storage configuration checks logged at startup

use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;

use crate::core::config::CatalogConfig;
use crate::core::error::CatalogResult;
use crate::storage::backup;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(CatalogError::Io)` - The log file could not be created or a logger is already set
pub fn init_logger(log_file_path: &str) -> CatalogResult<()> {
    let log_file = File::create(log_file_path)?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| std::io::Error::other(format!("Failed to initialize logger: {}", e)))?;

    Ok(())
}

/// Logs where the catalog keeps its data and what recovery sources exist
///
/// Checks:
/// - primary database file presence
/// - JSON snapshot presence and size
/// - number of archives in the backup directory
pub fn log_storage_configuration(config: &CatalogConfig) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Storage configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if config.db_path.exists() {
        log::info!("DATABASE_PATH: {}", config.db_path.display());
    } else {
        log::warn!("DATABASE_PATH: {} (not created yet)", config.db_path.display());
    }

    match std::fs::metadata(&config.snapshot_path) {
        Ok(meta) => log::info!(
            "SNAPSHOT_PATH: {} ({} bytes)",
            config.snapshot_path.display(),
            meta.len()
        ),
        Err(_) => log::warn!("SNAPSHOT_PATH: {} (missing)", config.snapshot_path.display()),
    }

    match backup::list_archives(&config.backup_dir, &config.db_path) {
        Ok(archives) => {
            log::info!(
                "BACKUP_DIR: {} ({} archives, keeping {})",
                config.backup_dir.display(),
                archives.len(),
                config.retention
            );
            if let Some(latest) = archives.first() {
                log::info!("   Latest: {}", latest.path.display());
            }
        }
        Err(e) => log::warn!("BACKUP_DIR: {} (unreadable: {})", config.backup_dir.display(), e),
    }

    if !config.db_path.exists() && !config.snapshot_path.exists() {
        log::warn!("No database and no snapshot found - starting with an empty catalog unless an archive exists");
    }
}
