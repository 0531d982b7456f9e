//! Operator commands against the live database and outbound services.
//!
//! Usage: `ec-ops resolve-district <constituent_id>`

#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]
#![allow(clippy::print_stdout)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use emailcongress_api::{
    app::Services, config::Config, constituents::ConstituentError, db::setup_database,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ec-ops", about = "Email Congress operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve and record the district for a constituent's current address
    ResolveDistrict { constituent_id: Uuid },
    /// Fill in a missing ZIP+4 through reverse geocoding
    CompleteAddress { constituent_id: Uuid },
    /// Queue a finalized message again so its unsent deliveries are retried
    Requeue { message_id: Uuid },
    /// Print the per-legislator delivery rows of a message
    Deliveries { message_id: Uuid },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let config = Config::load().map_err(|e| anyhow::anyhow!("{e}"))?;
    std::env::set_var("RUST_LOG", &config.logging.level);
    tracing_subscriber::fmt::init();

    let pool = setup_database(&config.database).await?;
    let (services, _rx) = Services::from_config(&config, &pool)?;

    match cli.command {
        Command::ResolveDistrict { constituent_id } => {
            match services.constituents.resolve_district(constituent_id).await {
                Ok(resolved) => {
                    println!("{}", serde_json::to_string_pretty(&resolved)?);
                }
                Err(ConstituentError::Unresolved(failure)) => {
                    println!("unresolved: {failure}");
                }
                Err(e) => return Err(e).context("district resolution failed"),
            }
        }
        Command::CompleteAddress { constituent_id } => {
            let address = services
                .constituents
                .complete_address(constituent_id)
                .await
                .context("address completion failed")?;
            println!("{}", serde_json::to_string_pretty(&address)?);
        }
        Command::Requeue { message_id } => {
            if services.messages.requeue(message_id).await? {
                println!("requeued {message_id}; the running server picks it up on its next sweep");
            } else {
                println!("{message_id} is not a finalized message with undelivered recipients");
            }
        }
        Command::Deliveries { message_id } => {
            let deliveries = services.messages.list_deliveries(message_id).await?;
            println!("{}", serde_json::to_string_pretty(&deliveries)?);
        }
    }

    Ok(())
}
