use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::core::config;
use crate::core::error::CatalogResult;
use crate::storage::migrations::run_migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to `POOL_MAX_SIZE` connections, sets the
/// SQLite busy timeout on every connection and runs schema migrations.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file
///
/// # Example
///
/// ```no_run
/// use shopcore::storage::db;
///
/// let pool = db::create_pool(std::path::Path::new("shop.db"))?;
/// # Ok::<(), shopcore::CatalogError>(())
/// ```
pub fn create_pool(database_path: &Path) -> CatalogResult<DbPool> {
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.busy_timeout(config::db::busy_timeout()));
    let pool = Pool::builder().max_size(config::db::POOL_MAX_SIZE).build(manager)?;

    // Ensure schema is up to date on first connection
    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> CatalogResult<DbConnection> {
    Ok(pool.get()?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_pool_creates_parent_dirs_and_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("shop.db");

        let pool = create_pool(&path).unwrap();
        assert!(path.exists());

        let conn = get_connection(&pool).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_create_pool_fails_on_garbage_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.db");
        std::fs::write(&path, b"this is definitely not an sqlite database, just some bytes").unwrap();

        let err = create_pool(&path).unwrap_err();
        assert!(err.is_storage(), "unexpected error: {err}");
    }
}
