use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::{CatalogError, CatalogResult};

/// Store-assigned product identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl ProductId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ProductId {
    fn from(id: i64) -> Self {
        ProductId(id)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(ProductId)
            .map_err(|_| format!("Invalid product id: {}", s))
    }
}

/// A size label: either a number (shoe/clothing sizes like 42) or free text ("M", "XL")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Size {
    Number(u32),
    Label(String),
}

impl Size {
    pub fn is_number(&self) -> bool {
        matches!(self, Size::Number(_))
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Number(n) => write!(f, "{}", n),
            Size::Label(label) => f.write_str(label),
        }
    }
}

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Size label cannot be empty".to_string());
        }
        Ok(s.parse::<u32>().map(Size::Number).unwrap_or_else(|_| Size::Label(s.to_string())))
    }
}

/// Normalizes a size list before it is stored.
///
/// Numeric-only lists are deduplicated and sorted ascending. Lists with at least
/// one free-form label keep insertion order and drop repeated entries. Blank
/// labels are removed in both cases.
pub fn normalize_sizes(sizes: Vec<Size>) -> Vec<Size> {
    let sizes: Vec<Size> = sizes
        .into_iter()
        .filter_map(|size| match size {
            Size::Label(label) => {
                let trimmed = label.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Size::Label(trimmed.to_string()))
                }
            }
            number => Some(number),
        })
        .collect();

    if sizes.iter().all(Size::is_number) {
        let mut numbers: Vec<u32> = sizes
            .iter()
            .filter_map(|s| match s {
                Size::Number(n) => Some(*n),
                Size::Label(_) => None,
            })
            .collect();
        numbers.sort_unstable();
        numbers.dedup();
        return numbers.into_iter().map(Size::Number).collect();
    }

    let mut unique: Vec<Size> = Vec::with_capacity(sizes.len());
    for size in sizes {
        if !unique.contains(&size) {
            unique.push(size);
        }
    }
    unique
}

/// A catalog product as stored in the primary store and in JSON snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub sizes: Vec<Size>,
    pub photo: String,
    /// Soft-delete flag; `false` means the product is hidden but retained
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating a product. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub sizes: Vec<Size>,
    pub photo: String,
}

impl NewProduct {
    pub fn new(title: impl Into<String>, price: f64) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            price,
            sizes: Vec::new(),
            photo: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn sizes(mut self, sizes: Vec<Size>) -> Self {
        self.sizes = sizes;
        self
    }

    pub fn photo(mut self, photo: impl Into<String>) -> Self {
        self.photo = photo.into();
        self
    }

    pub fn validate(&self) -> CatalogResult<()> {
        validate_title(&self.title)?;
        validate_price(self.price)
    }
}

/// Partial update: only the `Some` fields are written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub sizes: Option<Vec<Size>>,
    pub photo: Option<String>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.sizes.is_none()
            && self.photo.is_none()
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }
}

/// Row counts used to judge whether the primary store needs recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreHealth {
    pub total: u64,
    pub active: u64,
}

impl StoreHealth {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn all_soft_deleted(&self) -> bool {
        self.total > 0 && self.active == 0
    }
}

impl fmt::Display for StoreHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} products total, {} active", self.total, self.active)
    }
}

pub(crate) fn validate_title(title: &str) -> CatalogResult<()> {
    if title.trim().is_empty() {
        return Err(CatalogError::Validation("title must not be empty".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_price(price: f64) -> CatalogResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(CatalogError::Validation(format!("price must be positive, got {}", price)));
    }
    Ok(())
}

/// Formats a timestamp the way it is written to the database and snapshots.
/// Sub-second digits are kept so values survive a round-trip unchanged.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses RFC 3339 as well as the naive ISO forms found in older data
/// (`2024-03-01T10:00:00.123456` and SQLite's `2024-03-01 10:00:00`).
/// Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
