use anyhow::{Context, Result};
use dotenvy::dotenv;

use shopcore::core::{config, init_logger, log_storage_configuration};
use shopcore::storage::backup::{list_archives, verify_archive, BackupManager};
use shopcore::storage::recovery::force_restore_from_snapshot;
use shopcore::storage::ProductStore;
use shopcore::{Catalog, CatalogConfig, NewProduct, Product, ProductPatch};

mod cli;

use cli::{Cli, Commands, ProductCommands};

/// Entry point for the catalog maintenance tool
///
/// # Errors
/// Returns an error if logging cannot be initialized, the store cannot be opened,
/// or the requested operation fails.
fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    init_logger(&config::LOG_FILE_PATH)?;

    let catalog_config = CatalogConfig::from_env();
    log_storage_configuration(&catalog_config);

    match cli.command {
        Commands::Status => run_status(&catalog_config),
        Commands::Recover => {
            let catalog = Catalog::open(catalog_config)?;
            println!("{}", catalog.recovery_outcome());
            Ok(())
        }
        Commands::Backup => {
            let catalog = Catalog::open(catalog_config)?;
            let report = catalog.backup_now()?;
            match &report.archive {
                Some(archive) => println!("Archive: {}", archive.display()),
                None => println!("Archive: skipped (store is empty)"),
            }
            if let Some(count) = report.snapshot_products {
                println!("Snapshot: {} products", count);
            }
            println!("Pruned: {} archives", report.pruned.len());
            Ok(())
        }
        Commands::Export { output } => {
            let catalog = Catalog::open(catalog_config)?;
            let path = output
                .map(Into::into)
                .unwrap_or_else(|| catalog.config().snapshot_path.clone());
            let count = catalog.export_snapshot(&path)?;
            println!("Exported {} products to {}", count, path.display());
            Ok(())
        }
        Commands::Restore { yes } => run_restore_archive(&catalog_config, yes),
        Commands::RestoreJson => run_restore_snapshot(&catalog_config),
        Commands::Archives => {
            for archive in list_archives(&catalog_config.backup_dir, &catalog_config.db_path)? {
                println!("{}  {}", archive.taken_at.format("%Y-%m-%d %H:%M:%S"), archive.path.display());
            }
            Ok(())
        }
        Commands::Products(command) => {
            let catalog = Catalog::open(catalog_config)?;
            run_products(&catalog, command)
        }
    }
}

/// Reports the state of every storage artifact without modifying anything
fn run_status(config: &CatalogConfig) -> Result<()> {
    if config.db_path.exists() {
        match verify_archive(&config.db_path) {
            Ok(health) => println!("Database: {} ({})", config.db_path.display(), health),
            Err(e) => println!("Database: {} (unreadable: {})", config.db_path.display(), e),
        }
    } else {
        println!("Database: {} (missing)", config.db_path.display());
    }

    match shopcore::storage::snapshot::read_snapshot(&config.snapshot_path) {
        Ok(Some(products)) => println!(
            "Snapshot: {} ({} products)",
            config.snapshot_path.display(),
            products.len()
        ),
        Ok(None) => println!("Snapshot: {} (missing)", config.snapshot_path.display()),
        Err(e) => println!("Snapshot: {} (unreadable: {})", config.snapshot_path.display(), e),
    }

    let archives = list_archives(&config.backup_dir, &config.db_path)?;
    match archives.first() {
        Some(newest) => println!(
            "Archives: {} in {} (newest {}), retention {}",
            archives.len(),
            config.backup_dir.display(),
            newest.taken_at.format("%Y-%m-%d %H:%M:%S"),
            config.retention
        ),
        None => println!("Archives: none in {}", config.backup_dir.display()),
    }
    Ok(())
}

fn run_restore_archive(config: &CatalogConfig, confirmed: bool) -> Result<()> {
    if !confirmed {
        anyhow::bail!(
            "Restoring overwrites {}; pass --yes to confirm",
            config.db_path.display()
        );
    }
    let (catalog, archive) =
        Catalog::force_restore_from_archive(config.clone()).context("Archive restore failed")?;
    println!(
        "Restored {} from {} ({})",
        config.db_path.display(),
        archive.path.display(),
        catalog.health()?
    );
    Ok(())
}

fn run_restore_snapshot(config: &CatalogConfig) -> Result<()> {
    let store = ProductStore::open(&config.db_path)?;
    let count = force_restore_from_snapshot(&store, &config.snapshot_path).context("Snapshot restore failed")?;
    println!("Restored {} products from {}", count, config.snapshot_path.display());

    let report = BackupManager::new(config).backup_now(&store);
    for failure in &report.failures {
        log::warn!("Backup after snapshot restore incomplete: {}", failure);
    }
    Ok(())
}

fn run_products(catalog: &Catalog, command: ProductCommands) -> Result<()> {
    match command {
        ProductCommands::List { all, json } => {
            let products = catalog.list(!all)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&products)?);
            } else {
                for product in &products {
                    println!("{}", summary_line(product));
                }
                println!("{} products", products.len());
            }
        }
        ProductCommands::Show { id } => {
            let product = catalog.get(id)?;
            println!("{}", serde_json::to_string_pretty(&product)?);
        }
        ProductCommands::Add {
            title,
            price,
            description,
            sizes,
            photo,
        } => {
            let id = catalog.create(
                NewProduct::new(title, price)
                    .description(description)
                    .sizes(sizes)
                    .photo(photo),
            )?;
            println!("Created product {}", id);
        }
        ProductCommands::Update {
            id,
            title,
            price,
            description,
            sizes,
            photo,
        } => {
            let patch = ProductPatch {
                title,
                description,
                price,
                sizes,
                photo,
            };
            if patch.is_empty() {
                anyhow::bail!("Nothing to update: pass at least one field");
            }
            catalog.update(id, patch)?;
            println!("Updated product {}", id);
        }
        ProductCommands::Delete { id } => {
            catalog.soft_delete(id)?;
            println!("Deleted product {}", id);
        }
        ProductCommands::Reactivate { id } => {
            catalog.reactivate(id)?;
            println!("Reactivated product {}", id);
        }
    }
    Ok(())
}

fn summary_line(product: &Product) -> String {
    let sizes = product
        .sizes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{:>5}  {:<30}  {:>10.2}  [{}]{}",
        product.id.get(),
        product.title,
        product.price,
        sizes,
        if product.is_active { "" } else { "  (deleted)" }
    )
}
