//! End-to-end tests for backup and startup recovery across catalog restarts

mod common;

use common::TestShop;
use pretty_assertions::assert_eq;
use shopcore::storage::backup::verify_archive;
use shopcore::storage::snapshot;
use shopcore::{CatalogError, NewProduct, ProductId, ProductPatch, RecoveryOutcome, Size, StoreHealth};

#[test]
fn test_soft_deleted_catalog_is_not_revived_on_restart() {
    let shop = TestShop::new();
    {
        let catalog = shop.open();
        let id = catalog
            .create(NewProduct::new("Shirt", 1500.0).sizes(vec![Size::Label("M".into())]))
            .expect("Failed to create");
        catalog.soft_delete(id).expect("Failed to delete");
    }

    let catalog = shop.open();
    assert_eq!(
        catalog.recovery_outcome(),
        &RecoveryOutcome::AllSoftDeleted(StoreHealth { total: 1, active: 0 })
    );
    assert!(catalog.list(true).expect("Failed to list").is_empty());
    assert_eq!(catalog.list(false).expect("Failed to list").len(), 1);
}

#[test]
fn test_lost_database_is_restored_from_snapshot() {
    let shop = TestShop::new();
    shop.write_snapshot(
        r#"[{"id": 5, "title": "Jeans", "description": "Slim fit", "price": 3200,
             "sizes": [32, 30, 34], "photo": "", "is_active": true,
             "created_at": "2024-05-01T10:00:00Z"}]"#,
    );

    let catalog = shop.open();
    assert_eq!(catalog.recovery_outcome(), &RecoveryOutcome::RestoredFromSnapshot { products: 1 });

    let jeans = catalog.get(ProductId(5)).expect("Jeans should be restored");
    assert_eq!(jeans.title, "Jeans");
    assert_eq!(jeans.price, 3200.0);
    assert_eq!(jeans.sizes, vec![Size::Number(32), Size::Number(30), Size::Number(34)]);
    assert!(jeans.is_active);

    // The startup backup archives the restored data
    assert_eq!(shop.archives().len(), 1);
}

#[test]
fn test_snapshot_is_preferred_over_archive() {
    let shop = TestShop::new();
    {
        let catalog = shop.open();
        catalog.create(NewProduct::new("Shirt", 1500.0)).expect("Failed to create");
    }
    shop.delete_database();
    shop.write_snapshot(r#"[{"id": 9, "title": "Boots", "price": 5000}]"#);

    let catalog = shop.open();
    assert_eq!(catalog.recovery_outcome(), &RecoveryOutcome::RestoredFromSnapshot { products: 1 });
    let titles: Vec<_> = catalog
        .list(false)
        .expect("Failed to list")
        .into_iter()
        .map(|p| p.title)
        .collect();
    assert_eq!(titles, vec!["Boots".to_string()]);
}

#[test]
fn test_lost_database_and_snapshot_restored_from_archive() {
    let shop = TestShop::new();
    let before = {
        let catalog = shop.open();
        let shirt = catalog.create(NewProduct::new("Shirt", 1500.0)).expect("Failed to create");
        catalog.create(NewProduct::new("Jeans", 3200.0)).expect("Failed to create");
        catalog.soft_delete(shirt).expect("Failed to delete");
        catalog.list(false).expect("Failed to list")
    };
    shop.delete_database();
    shop.delete_snapshot();

    let catalog = shop.open();
    match catalog.recovery_outcome() {
        RecoveryOutcome::RestoredFromArchive { health, .. } => {
            assert_eq!(health, &StoreHealth { total: 2, active: 1 });
        }
        other => panic!("unexpected recovery outcome: {other:?}"),
    }
    assert_eq!(catalog.list(false).expect("Failed to list"), before);
}

#[test]
fn test_restored_catalog_is_healthy_on_next_start() {
    let shop = TestShop::new();
    shop.write_snapshot(r#"[{"id": 1, "title": "Scarf", "price": 800}]"#);
    drop(shop.open());

    let catalog = shop.open();
    assert!(matches!(catalog.recovery_outcome(), RecoveryOutcome::Healthy(_)));
    assert_eq!(catalog.health().expect("Failed to read health").total, 1);
}

#[test]
fn test_retention_keeps_most_recent_archives() {
    let shop = TestShop::with_retention(3);
    let catalog = shop.open();
    for i in 1..=8 {
        catalog
            .create(NewProduct::new(format!("Product {i}"), 100.0 * i as f64))
            .expect("Failed to create");
    }

    let archives = shop.archives();
    assert_eq!(archives.len(), 3);
    // Newest first: each archive was taken right after one more product was added
    let totals: Vec<u64> = archives
        .iter()
        .map(|a| verify_archive(&a.path).expect("Archive should verify").total)
        .collect();
    assert_eq!(totals, vec![8, 7, 6]);
}

#[test]
fn test_soft_delete_twice_reports_already_deleted() {
    let shop = TestShop::new();
    let catalog = shop.open();
    let id = catalog.create(NewProduct::new("Shirt", 1500.0)).expect("Failed to create");

    catalog.soft_delete(id).expect("First delete should succeed");
    let err = catalog.soft_delete(id).expect_err("Second delete should fail");
    assert!(matches!(err, CatalogError::AlreadyDeleted(_)), "unexpected error: {err}");

    catalog.reactivate(id).expect("Reactivate should succeed");
    let err = catalog.reactivate(id).expect_err("Second reactivate should fail");
    assert!(matches!(err, CatalogError::AlreadyActive(_)), "unexpected error: {err}");
}

#[test]
fn test_snapshot_tracks_catalog_contents() {
    let shop = TestShop::new();
    let catalog = shop.open();
    let id = catalog
        .create(
            NewProduct::new("Рубашка «Лён»", 1999.99)
                .description("Linen, \"relaxed\" fit")
                .sizes(vec![Size::Label("S".into()), Size::Label("M".into())]),
        )
        .expect("Failed to create");
    catalog
        .update(
            id,
            ProductPatch {
                photo: Some("AgACAgIAAxkBAAIB".into()),
                ..Default::default()
            },
        )
        .expect("Failed to update");

    let written = snapshot::read_snapshot(&shop.config.snapshot_path)
        .expect("Snapshot should decode")
        .expect("Snapshot should exist");
    let stored = catalog.get(id).expect("Product should exist");
    assert_eq!(written, vec![stored]);
}

#[test]
fn test_legacy_rows_without_created_at_stay_readable() {
    let shop = TestShop::new();
    {
        let conn = rusqlite::Connection::open(&shop.config.db_path).expect("Failed to open legacy db");
        conn.execute_batch(
            "CREATE TABLE products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                price REAL NOT NULL,
                sizes TEXT,
                photo TEXT,
                is_active INTEGER DEFAULT 1,
                created_at TEXT
            );
            INSERT INTO products (title, price, created_at) VALUES ('Shirt', 1500, '2024-05-01T10:00:00Z');
            INSERT INTO products (title, price) VALUES ('Legacy', 100);",
        )
        .expect("Failed to seed legacy table");
    }

    let catalog = shop.open();
    assert!(matches!(catalog.recovery_outcome(), RecoveryOutcome::Healthy(_)));

    // A legacy writer may keep inserting rows without a creation time
    {
        let conn = rusqlite::Connection::open(&shop.config.db_path).expect("Failed to open db");
        conn.execute("INSERT INTO products (title, price) VALUES ('Late', 200)", [])
            .expect("Failed to insert");
    }

    assert_eq!(catalog.list(true).expect("Failed to list").len(), 3);
    let report = catalog.backup_now().expect("Backup should succeed");
    assert_eq!(report.snapshot_products, Some(3));
}

#[test]
fn test_undecodable_snapshot_survives_startup_backup() {
    let shop = TestShop::new();
    // "Рубашка" encoded as cp1251
    let mut bytes = br#"[{"id": 1, "title": ""#.to_vec();
    bytes.extend_from_slice(&[0xD0, 0xF3, 0xE1, 0xE0, 0xF8, 0xEA, 0xE0]);
    bytes.extend_from_slice(br#"", "price": 1500}]"#);
    std::fs::write(&shop.config.snapshot_path, &bytes).expect("Failed to write snapshot");

    let catalog = shop.open();
    assert_eq!(catalog.recovery_outcome(), &RecoveryOutcome::Empty);

    let quarantined: Vec<_> = std::fs::read_dir(shop.dir.path())
        .expect("Failed to read dir")
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("products_backup.json.corrupt-"))
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(std::fs::read(quarantined[0].path()).expect("Failed to read"), bytes);
}
