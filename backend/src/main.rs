use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod change_detector;
mod config;
mod error;
mod fetcher;
mod history;
mod notifier;
mod tracker;
mod types;

use config::Config;
use fetcher::BookingPageFetcher;
use history::HistoryStore;
use notifier::HomeAssistantNotifier;
use tracker::PriceTracker;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (may carry RUST_LOG)
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load().context("could not load tracker configuration")?;

    let history = HistoryStore::load(&config.history_file)
        .context("could not load price history")?;

    let notifier = HomeAssistantNotifier::from_config(&config)?;
    match &notifier {
        Some(notifier) => {
            info!("Home Assistant: {} ({})", notifier.base_url(), notifier.entity_id());
            if !notifier.health_check().await {
                warn!("Home Assistant is not reachable yet; pushes will be retried each cycle");
            }
        }
        None => info!("Home Assistant not configured, price pushes disabled"),
    }

    let fetcher = BookingPageFetcher::new(&config)?;
    let mut tracker = PriceTracker::new(
        fetcher,
        notifier,
        history,
        config.route_label(),
        config.check_interval(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt: {}", e);
            // Keep the sender alive so the tracker isn't cancelled
            std::future::pending::<()>().await;
        }
        info!("Interrupt received, shutting down (press Ctrl-C again to force)");
        shutdown_tx.send(true).ok();

        // The handler above replaced the default one, so a second interrupt
        // has to end the process itself
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, exiting immediately");
            std::process::exit(130);
        }
    });

    if let Err(e) = tracker.run(shutdown_rx).await {
        error!("Price tracking failed: {}", e);
        return Err(e.into());
    }

    info!("Price tracking stopped");
    Ok(())
}
