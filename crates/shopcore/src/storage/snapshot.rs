//! JSON snapshot of the full catalog
//!
//! The snapshot is a single UTF-8 JSON array of product objects with the keys
//! `id, title, description, price, sizes, photo, is_active, created_at`. It is
//! rewritten on every backup cycle and is the first source tried by recovery.
//!
//! Decoding is lenient about optional fields because snapshots written by older
//! deployments lack some of them, but strict about anything that would put a
//! wrong row into the store: the whole document is rejected, never half-applied.

use chrono::Utc;
use fs_err as fs;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use crate::core::error::{CatalogError, CatalogResult};
use crate::core::types::{parse_timestamp, validate_price, validate_title, Product, ProductId, Size};

/// Encodes products as a pretty-printed JSON array.
///
/// Fails with `Codec` if a product could not be restored from the output
/// (blank title, non-positive or non-finite price).
pub fn encode(products: &[Product]) -> CatalogResult<String> {
    for product in products {
        validate_title(&product.title)
            .and_then(|_| validate_price(product.price))
            .map_err(|e| CatalogError::Codec(format!("product {}: {}", product.id, e)))?;
    }
    serde_json::to_string_pretty(products).map_err(|e| CatalogError::Codec(e.to_string()))
}

/// Decodes a snapshot document.
///
/// Missing or `null` optional fields get defaults: `description = ""`,
/// `sizes = []`, `photo = ""`, `is_active = true`, `created_at = now`.
/// The legacy flags `active` and `deleted` are honoured when `is_active` is absent.
pub fn decode(text: &str) -> CatalogResult<Vec<Product>> {
    let document: Value = serde_json::from_str(text)?;
    let items = document
        .as_array()
        .ok_or_else(|| CatalogError::CorruptSnapshot("top-level value is not an array".to_string()))?;

    let now = Utc::now();
    let mut seen = HashSet::with_capacity(items.len());
    let mut products = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let product = decode_product(item, now)
            .map_err(|reason| CatalogError::CorruptSnapshot(format!("entry #{}: {}", index, reason)))?;
        if !seen.insert(product.id) {
            return Err(CatalogError::CorruptSnapshot(format!(
                "entry #{}: duplicate id {}",
                index, product.id
            )));
        }
        products.push(product);
    }
    Ok(products)
}

fn decode_product(item: &Value, now: chrono::DateTime<Utc>) -> Result<Product, String> {
    let obj = item.as_object().ok_or("not an object")?;

    let id = match field(obj, "id") {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| format!("id {} is not an integer", n))?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
            log::warn!("Snapshot carries non-numeric product id {:?}; only integer ids can be restored", s);
            format!("non-numeric id {:?}, product ids must be integers", s)
        })?,
        Some(other) => return Err(format!("id has unexpected type: {}", other)),
        None => return Err("missing id".to_string()),
    };

    let title = match field(obj, "title") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) => return Err("blank title".to_string()),
        Some(other) => return Err(format!("title has unexpected type: {}", other)),
        None => return Err("missing title".to_string()),
    };

    let price = match field(obj, "price") {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| format!("price {} is not a number", n))?,
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| format!("price {:?} is not a number", s))?,
        Some(other) => return Err(format!("price has unexpected type: {}", other)),
        None => return Err("missing price".to_string()),
    };
    validate_price(price).map_err(|e| e.to_string())?;

    let sizes = match field(obj, "sizes") {
        None => Vec::new(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| serde_json::from_value::<Size>(v.clone()).map_err(|_| format!("invalid size {}", v)))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(format!("sizes has unexpected type: {}", other)),
    };

    let is_active = match (field(obj, "is_active"), field(obj, "active"), field(obj, "deleted")) {
        (Some(flag), _, _) | (None, Some(flag), _) => as_flag(flag).ok_or("is_active is not a boolean")?,
        (None, None, Some(flag)) => !as_flag(flag).ok_or("deleted is not a boolean")?,
        (None, None, None) => true,
    };

    let created_at = match field(obj, "created_at") {
        None => now,
        Some(Value::String(s)) => parse_timestamp(s).ok_or_else(|| format!("unparsable created_at {:?}", s))?,
        Some(other) => return Err(format!("created_at has unexpected type: {}", other)),
    };

    Ok(Product {
        id: ProductId(id),
        title,
        description: optional_text(obj, "description")?,
        price,
        sizes,
        photo: optional_text(obj, "photo")?,
        is_active,
        created_at,
    })
}

/// Looks up a key, treating JSON `null` as absent
fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn optional_text(obj: &Map<String, Value>, key: &str) -> Result<String, String> {
    match field(obj, key) {
        None => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(format!("{} has unexpected type: {}", key, other)),
    }
}

/// Accepts `true`/`false` and the 0/1 integers SQLite exports use
fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Reads and decodes the snapshot at `path`. `Ok(None)` if the file does not exist.
pub fn read_snapshot(path: &Path) -> CatalogResult<Option<Vec<Product>>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| CatalogError::CorruptSnapshot(format!("not valid UTF-8: {}", e.utf8_error())))?;
    decode(&text).map(Some)
}

/// Encodes `products` and atomically replaces the snapshot at `path`.
/// Returns the number of products written.
pub fn write_snapshot(path: &Path, products: &[Product]) -> CatalogResult<usize> {
    let json = encode(products)?;
    write_atomic(path, json.as_bytes())?;
    log::info!("Snapshot written: {} ({} products)", path.display(), products.len());
    Ok(products.len())
}

/// Writes to `<path>.tmp`, syncs it to disk, then renames over `path`.
/// A crash mid-write leaves the previous file intact.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp_path);
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> Vec<Product> {
        let created_at = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        vec![
            Product {
                id: ProductId(1),
                title: "Рубашка".into(),
                description: "Shirt with \"quotes\"".into(),
                price: 1500.0,
                sizes: vec![Size::Label("M".into()), Size::Number(42)],
                photo: "/webapp/static/uploads/1.jpg".into(),
                is_active: true,
                created_at,
            },
            Product {
                id: ProductId(2),
                title: "Jeans".into(),
                description: String::new(),
                price: 2999.99,
                sizes: vec![],
                photo: String::new(),
                is_active: false,
                created_at: created_at + chrono::Duration::microseconds(123_456),
            },
        ]
    }

    #[test]
    fn test_decode_of_encode_preserves_every_field() {
        let products = sample();
        let text = encode(&products).unwrap();
        assert_eq!(decode(&text).unwrap(), products);
    }

    #[test]
    fn test_encode_keeps_unicode_and_expected_keys() {
        let text = encode(&sample()).unwrap();
        assert!(text.contains("Рубашка"));
        let value: Value = serde_json::from_str(&text).unwrap();
        let keys: Vec<&String> = value[0].as_object().unwrap().keys().collect();
        for key in ["id", "title", "description", "price", "sizes", "photo", "is_active", "created_at"] {
            assert!(keys.iter().any(|k| k.as_str() == key), "missing key {key}");
        }
    }

    #[test]
    fn test_encode_rejects_invalid_state() {
        let mut products = sample();
        products[1].price = f64::NAN;
        assert!(matches!(encode(&products), Err(CatalogError::Codec(_))));
    }

    #[test]
    fn test_decode_fills_defaults() {
        let before = Utc::now();
        let products = decode(r#"[{"id": 5, "title": "Jeans", "price": 3000}]"#).unwrap();
        let product = &products[0];
        assert_eq!(product.id, ProductId(5));
        assert_eq!(product.description, "");
        assert!(product.sizes.is_empty());
        assert_eq!(product.photo, "");
        assert!(product.is_active);
        assert!(product.created_at >= before);
    }

    #[test]
    fn test_decode_treats_null_as_missing() {
        let products =
            decode(r#"[{"id": 1, "title": "Cap", "price": 10, "description": null, "photo": null, "sizes": null}]"#)
                .unwrap();
        assert_eq!(products[0].description, "");
        assert!(products[0].sizes.is_empty());
    }

    #[test]
    fn test_decode_legacy_flags_and_string_numbers() {
        let products = decode(
            r#"[
                {"id": "7", "title": "Old", "price": "450.5", "deleted": true},
                {"id": 8, "title": "Older", "price": 10, "active": 0},
                {"id": 9, "title": "Oldest", "price": 10, "is_active": 1, "created_at": "2023-12-31T23:59:59.5"}
            ]"#,
        )
        .unwrap();
        assert_eq!(products[0].id, ProductId(7));
        assert_eq!(products[0].price, 450.5);
        assert!(!products[0].is_active);
        assert!(!products[1].is_active);
        assert!(products[2].is_active);
        assert_eq!(
            products[2].created_at,
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap() + chrono::Duration::milliseconds(500)
        );
    }

    #[test]
    fn test_decode_rejects_malformed_documents() {
        let cases = [
            "not json",
            r#"{"id": 1}"#,
            r#"[{"title": "No id", "price": 1}]"#,
            r#"[{"id": 1, "price": 1}]"#,
            r#"[{"id": 1, "title": "  ", "price": 1}]"#,
            r#"[{"id": 1, "title": "Free", "price": 0}]"#,
            r#"[{"id": 1, "title": "X", "price": 1, "sizes": "M"}]"#,
            r#"[{"id": 1, "title": "X", "price": 1, "created_at": "last week"}]"#,
            r#"[{"id": 1, "title": "A", "price": 1}, {"id": 1, "title": "B", "price": 2}]"#,
            r#"[1, 2, 3]"#,
        ];
        for case in cases {
            assert!(
                matches!(decode(case), Err(CatalogError::CorruptSnapshot(_))),
                "expected CorruptSnapshot for {case}"
            );
        }
    }

    #[test]
    fn test_decode_names_non_numeric_id() {
        let err = decode(r#"[{"id": "p1", "title": "Shirt", "price": 1500}]"#).unwrap_err();
        match err {
            CatalogError::CorruptSnapshot(reason) => {
                assert!(reason.contains("non-numeric id \"p1\""), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_read_snapshot_rejects_non_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products_backup.json");
        // "Рубашка" in cp1251
        let mut bytes = br#"[{"id": 1, "title": ""#.to_vec();
        bytes.extend_from_slice(&[0xD0, 0xF3, 0xE1, 0xE0, 0xF8, 0xEA, 0xE0]);
        bytes.extend_from_slice(br#"", "price": 1500}]"#);
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(read_snapshot(&path), Err(CatalogError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_decode_empty_array() {
        assert!(decode("[]").unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap").join("products_backup.json");

        assert!(read_snapshot(&path).unwrap().is_none());
        assert_eq!(write_snapshot(&path, &sample()).unwrap(), 2);
        assert_eq!(read_snapshot(&path).unwrap().unwrap(), sample());

        // Overwritten, not versioned
        write_snapshot(&path, &sample()[..1]).unwrap();
        assert_eq!(read_snapshot(&path).unwrap().unwrap().len(), 1);
        assert!(!dir.path().join("snap").join("products_backup.json.tmp").exists());
    }

    #[test]
    fn test_failed_encode_leaves_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products_backup.json");
        write_snapshot(&path, &sample()).unwrap();

        let mut broken = sample();
        broken[0].title = String::new();
        assert!(write_snapshot(&path, &broken).is_err());
        assert_eq!(read_snapshot(&path).unwrap().unwrap(), sample());
    }
}
