//! Atelier CLI entry point

use atelier_cli::{handler, Cli};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging if verbose
    if cli.verbose {
        init_logging();
    }

    if let Err(e) = handler::run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Initialize tracing subscriber for verbose output
fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "atelier_cli=debug,atelier_api=debug,atelier_core=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
