//! CLI Command Definitions
//!
//! Argument and subcommand declarations for the atelier CLI.

use clap::{Parser, Subcommand};

/// Atelier trait checkout CLI
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(version)]
#[command(about = "Trait checkout engine command line interface")]
#[command(long_about = "A command-line tool for operating the atelier trait checkout engine.\n\n\
    Use `serve` to run the HTTP API over a sled or in-memory store, and the \
    remaining commands to inspect and administer a running instance.")]
pub struct Cli {
    /// API endpoint URL
    #[arg(
        short,
        long,
        env = "ATELIER_API_URL",
        default_value = "http://127.0.0.1:3000"
    )]
    pub api_url: String,

    /// Output format (json, table, plain)
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Table format (human-readable)
    Table,
    /// Plain text
    Plain,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Table
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the checkout API server
    Serve {
        /// Host to bind to (env: ATELIER_API_HOST)
        #[arg(short = 'H', long, env = "ATELIER_API_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on (env: ATELIER_API_PORT)
        #[arg(short, long, env = "ATELIER_API_PORT", default_value = "3000")]
        port: u16,
        /// Sled data directory; omit to run on the in-memory store
        #[arg(long, env = "ATELIER_DATA_DIR")]
        data_dir: Option<String>,
        /// Use development defaults (local signer, fast confirmation polling)
        #[arg(long)]
        dev: bool,
    },

    /// Expire lapsed holds now
    Sweep,

    /// Re-check pending purchases against the ledger
    Reconcile,

    /// Show a purchase
    Status {
        /// Purchase id
        purchase_id: String,
    },

    /// Manage the trait catalog
    #[command(subcommand)]
    Trait(TraitCommands),

    /// Manage gift balances
    #[command(subcommand)]
    Gift(GiftCommands),

    /// Check health of the checkout API
    Health,

    /// Show service statistics
    Stats,
}

/// Trait catalog subcommands
#[derive(Subcommand, Debug)]
pub enum TraitCommands {
    /// Create or replace a trait listing
    Upsert {
        /// Trait id
        trait_id: String,
        /// Price in the smallest currency unit, base-10
        #[arg(long)]
        price: String,
        /// Total sellable units; omit for unlimited supply
        #[arg(long)]
        supply: Option<u64>,
        /// Settlement token mint; omit for native currency
        #[arg(long)]
        token_id: Option<String>,
        /// Register the listing closed for checkout
        #[arg(long)]
        inactive: bool,
    },

    /// Show a trait listing
    Show {
        /// Trait id
        trait_id: String,
    },

    /// List all trait listings
    List,
}

/// Gift balance subcommands
#[derive(Subcommand, Debug)]
pub enum GiftCommands {
    /// Credit gift redemptions to a wallet
    Credit {
        /// Wallet address
        wallet: String,
        /// Trait id
        trait_id: String,
        /// Redemptions to add
        #[arg(long, default_value = "1")]
        qty: u64,
    },

    /// Show a wallet's gift balance for a trait
    Show {
        /// Wallet address
        wallet: String,
        /// Trait id
        trait_id: String,
    },
}
