//! Primary store: the `products` table
//!
//! Every mutating call runs in a single `BEGIN IMMEDIATE` transaction, so a
//! logical operation is either fully applied or not at all, and a second process
//! writing the same file waits on the busy timeout instead of interleaving.
//!
//! This type never triggers backups itself; `Catalog` wraps it and runs the
//! backup cycle after each mutation.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};

use super::db::{self, DbConnection, DbPool};
use crate::core::error::{CatalogError, CatalogResult};
use crate::core::types::{
    format_timestamp, normalize_sizes, parse_timestamp, NewProduct, Product, ProductId, ProductPatch, Size,
    StoreHealth,
};

const PRODUCT_COLUMNS: &str = "id, title, description, price, sizes, photo, is_active, created_at";

/// Handle to the primary store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct ProductStore {
    pool: DbPool,
    db_path: PathBuf,
}

impl ProductStore {
    /// Opens (creating if needed) the database at `db_path` and brings the schema up to date
    pub fn open(db_path: &Path) -> CatalogResult<Self> {
        let pool = db::create_pool(db_path)?;
        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> CatalogResult<DbConnection> {
        db::get_connection(&self.pool)
    }

    /// Re-runs schema creation. Idempotent.
    pub fn initialize(&self) -> CatalogResult<()> {
        let mut conn = self.conn()?;
        super::migrations::run_migrations(&mut conn)
    }

    /// Total and active row counts
    pub fn health(&self) -> CatalogResult<StoreHealth> {
        let conn = self.conn()?;
        Ok(query_health(&conn)?)
    }

    /// Products ordered newest first. With `active_only`, soft-deleted rows are excluded.
    pub fn list(&self, active_only: bool) -> CatalogResult<Vec<Product>> {
        let conn = self.conn()?;
        let sql = if active_only {
            format!("SELECT {} FROM products WHERE COALESCE(is_active, 1) = 1 ORDER BY id DESC", PRODUCT_COLUMNS)
        } else {
            format!("SELECT {} FROM products ORDER BY id DESC", PRODUCT_COLUMNS)
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], product_from_row)?;

        let mut products = Vec::new();
        for row in rows {
            products.push(row?);
        }
        log::debug!("Loaded {} products (active_only={})", products.len(), active_only);
        Ok(products)
    }

    /// Returns `Ok(None)` when no row has this id
    pub fn get(&self, id: ProductId) -> CatalogResult<Option<Product>> {
        let conn = self.conn()?;
        let product = conn
            .query_row(
                &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS),
                params![id.get()],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    /// Inserts an active product and returns its freshly assigned id
    pub fn create(&self, product: NewProduct) -> CatalogResult<ProductId> {
        product.validate()?;
        let sizes = encode_sizes(&normalize_sizes(product.sizes))?;
        let created_at = format_timestamp(&Utc::now());

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO products (title, description, price, sizes, photo, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![
                product.title.trim(),
                product.description,
                product.price,
                sizes,
                product.photo,
                created_at
            ],
        )?;
        let id = ProductId(tx.last_insert_rowid());
        tx.commit()?;

        log::info!("Product created: id={}, {}", id, product.title.trim());
        Ok(id)
    }

    /// Applies the `Some` fields of `patch`. An empty patch only checks existence.
    pub fn update(&self, id: ProductId, patch: ProductPatch) -> CatalogResult<()> {
        patch.validate()?;

        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(title) = patch.title {
            assignments.push("title = ?");
            values.push(title.trim().to_string().into());
        }
        if let Some(description) = patch.description {
            assignments.push("description = ?");
            values.push(description.into());
        }
        if let Some(price) = patch.price {
            assignments.push("price = ?");
            values.push(price.into());
        }
        if let Some(sizes) = patch.sizes {
            assignments.push("sizes = ?");
            values.push(encode_sizes(&normalize_sizes(sizes))?.into());
        }
        if let Some(photo) = patch.photo {
            assignments.push("photo = ?");
            values.push(photo.into());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !row_exists(&tx, id)? {
            return Err(CatalogError::NotFound(id));
        }
        if assignments.is_empty() {
            return Ok(());
        }

        values.push(id.get().into());
        let sql = format!("UPDATE products SET {} WHERE id = ?", assignments.join(", "));
        tx.execute(&sql, rusqlite::params_from_iter(values))?;
        tx.commit()?;

        log::info!("Product updated: id={}", id);
        Ok(())
    }

    /// Marks a product inactive. Fails with `AlreadyDeleted` if it already is.
    pub fn soft_delete(&self, id: ProductId) -> CatalogResult<()> {
        self.set_active(id, false)
    }

    /// Undoes a soft delete. Fails with `AlreadyActive` if the product is visible.
    pub fn reactivate(&self, id: ProductId) -> CatalogResult<()> {
        self.set_active(id, true)
    }

    fn set_active(&self, id: ProductId, active: bool) -> CatalogResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<bool> = tx
            .query_row(
                "SELECT COALESCE(is_active, 1) FROM products WHERE id = ?1",
                params![id.get()],
                |row| Ok(row.get::<_, i64>(0)? == 1),
            )
            .optional()?;
        match current {
            None => return Err(CatalogError::NotFound(id)),
            Some(is_active) if is_active == active => {
                return Err(if active {
                    CatalogError::AlreadyActive(id)
                } else {
                    CatalogError::AlreadyDeleted(id)
                });
            }
            Some(_) => {}
        }

        tx.execute(
            "UPDATE products SET is_active = ?1 WHERE id = ?2",
            params![i64::from(active), id.get()],
        )?;
        tx.commit()?;

        if active {
            log::info!("Product reactivated: id={}", id);
        } else {
            log::info!("Product soft-deleted: id={}", id);
        }
        Ok(())
    }

    /// Writes trusted products back by id, keeping their ids and `created_at`.
    ///
    /// Existing rows with the same id are overwritten; rows not mentioned are left
    /// alone. The whole list goes in one transaction.
    pub fn upsert_from_snapshot(&self, products: &[Product]) -> CatalogResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO products (id, title, description, price, sizes, photo, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    price = excluded.price,
                    sizes = excluded.sizes,
                    photo = excluded.photo,
                    is_active = excluded.is_active,
                    created_at = excluded.created_at",
            )?;
            for product in products {
                stmt.execute(params![
                    product.id.get(),
                    product.title,
                    product.description,
                    product.price,
                    encode_sizes(&product.sizes)?,
                    product.photo,
                    i64::from(product.is_active),
                    format_timestamp(&product.created_at),
                ])?;
            }
        }
        tx.commit()?;

        log::info!("Upserted {} products from snapshot", products.len());
        Ok(products.len())
    }
}

/// Counts rows on any connection holding a `products` table (live store or archive)
pub(crate) fn query_health(conn: &rusqlite::Connection) -> rusqlite::Result<StoreHealth> {
    let (total, active): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN COALESCE(is_active, 1) = 1 THEN 1 ELSE 0 END), 0) FROM products",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(StoreHealth {
        total: u64::try_from(total).unwrap_or_default(),
        active: u64::try_from(active).unwrap_or_default(),
    })
}

fn row_exists(conn: &rusqlite::Connection, id: ProductId) -> CatalogResult<bool> {
    let exists = conn
        .query_row("SELECT 1 FROM products WHERE id = ?1", params![id.get()], |_| Ok(()))
        .optional()?
        .is_some();
    Ok(exists)
}

fn encode_sizes(sizes: &[Size]) -> CatalogResult<String> {
    serde_json::to_string(sizes).map_err(|e| CatalogError::Codec(e.to_string()))
}

fn conversion_error(column: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, msg.into())
}

/// Maps a row selected with `PRODUCT_COLUMNS`. NULL text columns read as empty,
/// a NULL `is_active` as active, matching the table defaults. A missing or
/// unparsable `created_at` reads as now.
fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let sizes_raw: Option<String> = row.get(4)?;
    let sizes = match sizes_raw.as_deref().map(str::trim) {
        None | Some("") => Vec::new(),
        Some(raw) => serde_json::from_str(raw).map_err(|e| conversion_error(4, format!("sizes: {}", e)))?,
    };

    let id = ProductId(row.get(0)?);
    let created_raw: Option<String> = row.get(7)?;
    let created_at = match created_raw.as_deref().and_then(parse_timestamp) {
        Some(created_at) => created_at,
        None => {
            log::warn!("Product {} has no valid created_at ({:?}), using current time", id, created_raw);
            Utc::now()
        }
    };

    Ok(Product {
        id,
        title: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        price: row.get(3)?,
        sizes,
        photo: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        is_active: row.get::<_, Option<i64>>(6)?.unwrap_or(1) == 1,
        created_at,
    })
}

/// Physically copies the live database into `dest` using `VACUUM INTO`.
///
/// The copy is transactionally consistent even while other pooled connections
/// are open. `dest` must not exist.
pub(crate) fn vacuum_into(store: &ProductStore, dest: &Path) -> CatalogResult<()> {
    let conn = store.conn()?;
    let dest = dest.to_string_lossy();
    conn.execute("VACUUM INTO ?1", params![dest.as_ref()])?;
    Ok(())
}
