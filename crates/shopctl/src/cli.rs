use clap::{Parser, Subcommand};
use shopcore::{ProductId, Size};

#[derive(Parser)]
#[command(name = "shopctl")]
#[command(author, version, about = "Manage the shop product catalog and its backups", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show store health, archives and snapshot without running recovery
    Status,

    /// Run startup recovery and report what it did
    Recover,

    /// Archive the database, refresh the snapshot and prune old archives
    Backup,

    /// Write every product to a JSON file
    Export {
        /// Destination path (defaults to the configured snapshot path)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Replace the database with the newest valid archive
    Restore {
        /// Required: the current database is overwritten
        #[arg(long)]
        yes: bool,
    },

    /// Upsert products from the configured JSON snapshot into the database
    RestoreJson,

    /// List archives, newest first
    Archives,

    /// Product management
    #[command(subcommand)]
    Products(ProductCommands),
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// List products, newest first
    List {
        /// Include soft-deleted products
        #[arg(long)]
        all: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one product as JSON
    Show { id: ProductId },

    /// Add a product
    Add {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        price: f64,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Comma-separated sizes, e.g. `S,M,L` or `42,44`
        #[arg(short, long, value_delimiter = ',')]
        sizes: Vec<Size>,

        /// Photo reference (file id or URL)
        #[arg(long, default_value = "")]
        photo: String,
    },

    /// Change fields of a product; omitted fields are kept
    Update {
        id: ProductId,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        price: Option<f64>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long, value_delimiter = ',')]
        sizes: Option<Vec<Size>>,

        #[arg(long)]
        photo: Option<String>,
    },

    /// Soft-delete a product
    Delete { id: ProductId },

    /// Make a soft-deleted product active again
    Reactivate { id: ProductId },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
