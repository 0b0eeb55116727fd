//! Atelier CLI - Command Line Interface
//!
//! This crate provides a command-line interface for operating the
//! atelier trait checkout engine.
//!
//! # Features
//!
//! - Run the HTTP API server over a sled or in-memory store
//! - Trigger maintenance passes (hold sweep, pending reconciliation)
//! - Inspect purchases and service statistics
//! - Manage the trait catalog and gift balances
//!
//! # Usage
//!
//! ```text
//! atelier [OPTIONS] <COMMAND>
//!
//! Commands:
//!   serve      Start the checkout API server
//!   sweep      Expire lapsed holds now
//!   reconcile  Re-check pending purchases against the ledger
//!   status     Show a purchase
//!   trait      Manage the trait catalog
//!   gift       Manage gift balances
//!   health     Check health of the checkout API
//!   stats      Show service statistics
//!
//! Options:
//!   -a, --api-url <URL>    API endpoint URL [default: http://127.0.0.1:3000]
//!   -f, --format <FORMAT>  Output format (json, table, plain) [default: table]
//!   -v, --verbose          Enable verbose output
//!   -h, --help             Print help
//!   -V, --version          Print version
//! ```
//!
//! # Examples
//!
//! ## Run the server on a local sled store
//! ```text
//! atelier serve --data-dir ./atelier_data --port 3000
//! ```
//!
//! ## List a trait for sale
//! ```text
//! atelier trait upsert halo_gold --price 1000000 --supply 50
//! ```
//!
//! ## Credit a gift redemption
//! ```text
//! atelier gift credit wallet_a halo_gold --qty 2
//! ```
//!
//! ## Check a purchase
//! ```text
//! atelier status purchase_7f3a
//! ```

pub mod client;
pub mod commands;
pub mod error;
pub mod handler;
pub mod output;

pub use client::AtelierClient;
pub use commands::{Cli, Commands, OutputFormat};
pub use error::{CliError, CliResult};

/// Atelier CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
