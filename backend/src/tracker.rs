//! Price Tracker
//!
//! Runs the tracking cycle on a fixed interval until asked to stop.
//!
//! # Cycle
//! ```text
//! fetch ──failed──→ warn, done (history untouched)
//!   │
//!   ↓ observation
//! append price → push observation → detect change
//!                                      │
//!                   changed ←──────────┴──────────→ stable
//!                      │                               │
//!   append change, push change                    log stable
//!                      └──────────────┬────────────────┘
//!                                     ↓
//!                              save history
//! ```
//!
//! Fetch and push failures are absorbed by the cycle. A failure to save the
//! history is not: it ends the loop and the process.

use crate::{
    change_detector::detect_change,
    error::Result,
    fetcher::PriceFetcher,
    history::HistoryStore,
    notifier::Notifier,
    types::{now_local, ChangeEvent, PriceObservation, PriceUpdate},
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of a single tracking cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No observation this cycle; nothing was recorded
    FetchFailed,
    /// Price recorded, same as before (or the first one)
    Stable(PriceObservation),
    /// Price recorded and differs from the previous one
    Changed(ChangeEvent),
}

pub struct PriceTracker<F, N> {
    fetcher: F,
    notifier: Option<N>,
    history: HistoryStore,
    route: String,
    interval: Duration,
}

impl<F, N> PriceTracker<F, N>
where
    F: PriceFetcher,
    N: Notifier,
{
    /// # Arguments
    /// * `fetcher` - Source of observations
    /// * `notifier` - Hub pushes; `None` disables them
    /// * `history` - Loaded history store
    /// * `route` - Label used in log output
    /// * `interval` - Sleep between cycles
    pub fn new(
        fetcher: F,
        notifier: Option<N>,
        history: HistoryStore,
        route: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            history,
            route: route.into(),
            interval,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Run one fetch-store-notify-detect-persist iteration
    ///
    /// # Errors
    /// Only persistence failures; fetch and push failures are logged and
    /// absorbed.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let observation = match self.fetcher.fetch().await {
            Ok(observation) => observation,
            Err(e) => {
                warn!("Price fetch failed: {}", e);
                return Ok(CycleOutcome::FetchFailed);
            }
        };

        self.history.append_price(observation.clone());
        self.notify(PriceUpdate::Observation(&observation)).await;

        let outcome = match detect_change(self.history.prices(), now_local()) {
            Some(event) => {
                warn!(
                    "PRICE CHANGED: {} → {} {} ({:+.1}%)",
                    event.old_price, event.new_price, event.currency, event.change_percent
                );
                self.history.append_change(event.clone());
                self.notify(PriceUpdate::Change(&event)).await;
                CycleOutcome::Changed(event)
            }
            None => {
                if self.history.prices().len() == 1 {
                    info!("First price observation recorded");
                }
                info!("Price stable: {} {}", observation.price, observation.currency);
                CycleOutcome::Stable(observation)
            }
        };

        self.history.save()?;
        Ok(outcome)
    }

    /// Run cycles until `shutdown` flips to `true` or its sender goes away
    ///
    /// The token is watched during the cycle as well as during the sleep. A
    /// cycle interrupted before its save is abandoned; the file on disk still
    /// holds the last completed cycle.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("{}", "=".repeat(60));
        info!("Price tracking started: {}", self.route);
        info!("Check interval: {}s", self.interval.as_secs());
        if let Some(stats) = self.history.stats() {
            info!(
                "History: {} prices, lowest {} / highest {} / average {} {}",
                stats.count, stats.min, stats.max, stats.average, stats.currency
            );
        }
        info!("{}", "=".repeat(60));

        let mut cycle: u64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            cycle += 1;
            info!("[Cycle {}]", cycle);
            let outcome = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    warn!("Cycle {} abandoned on shutdown", cycle);
                    break;
                }
                outcome = self.run_cycle() => outcome?,
            };
            debug!("Cycle {} finished: {:?}", cycle, outcome);

            info!("Next check in {}s", self.interval.as_secs());
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Price tracking stopped after {} cycles", cycle);
        Ok(())
    }

    async fn notify(&self, update: PriceUpdate<'_>) {
        if let Some(notifier) = &self.notifier {
            notifier.push(update).await;
        }
    }
}

/// Resolves once shutdown is requested or the sender is dropped
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means nobody can ask us to keep going
    shutdown.wait_for(|stop| *stop).await.ok();
}
