use anyhow::{Context, Result};
use dotenv::dotenv;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use solana_link::monitoring::{EventPayload, SubscriptionRequest};
use solana_link::solana::create_client_from_env;
use solana_link::{Operation, SolanaClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment variables
    dotenv().ok();

    // Initialize logging
    init_logger();

    info!("Starting Solana link...");

    let client = create_client_from_env().context("Failed to configure Solana client")?;
    info!(
        "Configured for {} at {}",
        client.network(),
        client.connection().config().rpc_endpoint
    );

    // A single operation given as JSON, e.g. {"operation":"getSlot"}
    if let Ok(raw) = std::env::var("SOLANA_OPERATION") {
        let operation: Operation =
            serde_json::from_str(&raw).with_context(|| format!("Invalid SOLANA_OPERATION: {}", raw))?;
        let output = client
            .execute(operation, &CancellationToken::new())
            .await
            .context("Operation failed")?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        client.shutdown().await;
        return Ok(());
    }

    report_status(&client).await?;
    watch_slots(&client).await?;

    client.shutdown().await;
    info!("Shutting down...");
    Ok(())
}

async fn report_status(client: &SolanaClient) -> Result<()> {
    let queries = client.queries();

    let health = queries.health().await;
    if !health.healthy {
        warn!("RPC node reports unhealthy: {}", health.status);
    }

    let version = queries
        .version()
        .await
        .context("Could not establish Solana RPC connection")?;
    info!("Solana core {}", version.solana_core);

    let epoch = queries.epoch_progress().await?;
    info!(
        "Epoch {}: {:.1}% complete, ~{:.1}h remaining",
        epoch.epoch, epoch.progress_percent, epoch.estimated_hours_remaining
    );

    if let Ok(address) = client.public_address() {
        let balance = queries.balance(&address.to_string()).await?;
        info!("Wallet {} balance: {} SOL", address, balance.sol);
    }
    Ok(())
}

async fn watch_slots(client: &SolanaClient) -> Result<()> {
    let mut slots = client
        .subscriptions()
        .subscribe(SubscriptionRequest::SlotChange, None)
        .await
        .context("Failed to subscribe to slot updates")?;
    info!("Watching slots, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                slots.cancel();
                break;
            }
            event = slots.next_event() => match event {
                Some(event) => {
                    if let EventPayload::SlotChange { slot, root, .. } = event.payload {
                        info!("Slot {} (root {})", slot, root);
                    }
                }
                None => {
                    error!("Slot subscription closed");
                    break;
                }
            },
        }
    }
    Ok(())
}

fn init_logger() {
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"));
}
