//! Core types, configuration, errors and logging

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-exports for convenience
pub use config::CatalogConfig;
pub use error::{BackupFailure, BackupStep, CatalogError, CatalogResult};
pub use logging::{init_logger, log_storage_configuration};
pub use types::{NewProduct, Product, ProductId, ProductPatch, Size, StoreHealth};
