//! Command Handlers
//!
//! Handler functions for CLI commands. `serve` builds and runs the engine
//! in-process; every other command talks to a running API instance.

use crate::client::{AtelierClient, CreditGiftBalanceRequest, UpsertTraitRequest};
use crate::commands::{Cli, Commands, GiftCommands, OutputFormat, TraitCommands};
use crate::error::{CliError, CliResult};
use crate::output;
use atelier_api::ApiConfig;
use atelier_core::{CheckoutService, CheckoutServiceConfig, MemoryStorage, SledStorage};
use std::sync::Arc;

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
            dev,
        } => handle_serve(host.clone(), *port, data_dir.clone(), *dev).await,
        _ => {
            let client = AtelierClient::new(&cli.api_url)?;
            match cli.command {
                Commands::Health => handle_health(&client, cli.format).await,
                Commands::Stats => handle_stats(&client, cli.format).await,
                Commands::Sweep => handle_sweep(&client, cli.format).await,
                Commands::Reconcile => handle_reconcile(&client, cli.format).await,
                Commands::Status { purchase_id } => {
                    handle_status(&client, &purchase_id, cli.format).await
                }
                Commands::Trait(cmd) => handle_trait(&client, cmd, cli.format).await,
                Commands::Gift(cmd) => handle_gift(&client, cmd, cli.format).await,
                Commands::Serve { .. } => unreachable!(),
            }
        }
    }
}

/// Handle running the API server
async fn handle_serve(
    host: String,
    port: u16,
    data_dir: Option<String>,
    dev: bool,
) -> CliResult<()> {
    let config = if dev {
        CheckoutServiceConfig::development()
    } else {
        CheckoutServiceConfig::production()
    };

    println!("Starting atelier API server...");
    println!("  Host: {}:{}", host, port);
    println!("  Ledger: {}", config.core.ledger.url);
    println!("  Treasury: {}", config.core.treasury_wallet);

    let builder = CheckoutService::builder().config(config);
    let builder = match &data_dir {
        Some(dir) => {
            println!("  Store: sled at {}", dir);
            builder.storage(Arc::new(SledStorage::open(dir)?))
        }
        None => {
            println!("  Store: in-memory (state is lost on exit)");
            builder.storage(Arc::new(MemoryStorage::new()))
        }
    };

    let service = Arc::new(builder.build()?);
    service.start().await?;

    println!("Listening on {}:{}...", host, port);

    // Host and port already came through clap (flags or env); from_env
    // still decides CORS.
    let api_config = ApiConfig {
        host,
        port,
        ..ApiConfig::from_env()
    };

    atelier_api::run_server(&api_config, service)
        .await
        .map_err(|e| CliError::server(e.to_string()))?;

    Ok(())
}

/// Handle health check command
async fn handle_health(client: &AtelierClient, format: OutputFormat) -> CliResult<()> {
    let health = client.health().await?;
    output::print_health(&health, format);
    Ok(())
}

/// Handle stats command
async fn handle_stats(client: &AtelierClient, format: OutputFormat) -> CliResult<()> {
    let stats = client.stats().await?;
    output::print_stats(&stats, format);
    Ok(())
}

/// Handle sweep command
async fn handle_sweep(client: &AtelierClient, format: OutputFormat) -> CliResult<()> {
    let report = client.sweep().await?;
    output::print_sweep(&report, format);
    Ok(())
}

/// Handle reconcile command
async fn handle_reconcile(client: &AtelierClient, format: OutputFormat) -> CliResult<()> {
    let report = client.reconcile().await?;
    output::print_reconcile(&report, format);
    Ok(())
}

/// Handle purchase status command
async fn handle_status(
    client: &AtelierClient,
    purchase_id: &str,
    format: OutputFormat,
) -> CliResult<()> {
    let purchase = client.get_purchase(purchase_id).await?;
    output::print_purchase(&purchase, format);
    Ok(())
}

/// Handle trait catalog commands
async fn handle_trait(
    client: &AtelierClient,
    cmd: TraitCommands,
    format: OutputFormat,
) -> CliResult<()> {
    match cmd {
        TraitCommands::Upsert {
            trait_id,
            price,
            supply,
            token_id,
            inactive,
        } => {
            // The API validates too; failing here gives a friendlier error
            // than a 400 round trip.
            if price.parse::<u128>().is_err() {
                return Err(CliError::invalid_arg("price must be a base-10 integer"));
            }

            let request = UpsertTraitRequest {
                trait_id,
                total_supply: supply,
                price_amount: price,
                token_id,
                active: !inactive,
            };
            let listing = client.upsert_trait(request).await?;
            output::print_listing(&listing, format);
        }
        TraitCommands::Show { trait_id } => {
            let listing = client.get_trait(&trait_id).await?;
            output::print_listing(&listing, format);
        }
        TraitCommands::List => {
            let page = client.list_traits().await?;
            output::print_listing_page(&page, format);
        }
    }
    Ok(())
}

/// Handle gift balance commands
async fn handle_gift(
    client: &AtelierClient,
    cmd: GiftCommands,
    format: OutputFormat,
) -> CliResult<()> {
    match cmd {
        GiftCommands::Credit {
            wallet,
            trait_id,
            qty,
        } => {
            if qty == 0 {
                return Err(CliError::invalid_arg("qty must be at least 1"));
            }

            let request = CreditGiftBalanceRequest {
                wallet_address: wallet,
                trait_id,
                qty,
            };
            let balance = client.credit_gift(request).await?;
            output::print_balance(&balance, format);
        }
        GiftCommands::Show { wallet, trait_id } => {
            let balance = client.gift_balance(&wallet, &trait_id).await?;
            output::print_balance(&balance, format);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_request_construction() {
        let request = UpsertTraitRequest {
            trait_id: "halo_gold".to_string(),
            total_supply: Some(50),
            price_amount: "1000000".to_string(),
            token_id: None,
            active: true,
        };

        assert_eq!(request.trait_id, "halo_gold");
        assert_eq!(request.total_supply, Some(50));
        assert!(request.active);
    }

    #[tokio::test]
    async fn test_zero_qty_credit_rejected_locally() {
        let client = AtelierClient::new("http://127.0.0.1:1").unwrap();
        let cmd = GiftCommands::Credit {
            wallet: "wallet_a".to_string(),
            trait_id: "halo_gold".to_string(),
            qty: 0,
        };

        // Fails argument validation before any request goes out.
        let err = handle_gift(&client, cmd, OutputFormat::Json)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
