//! History Store
//!
//! Keeps every observed price plus the change events derived from them.
//! The whole document lives in memory and is rewritten to a single JSON
//! file after each cycle, so the file on disk is always a complete snapshot.
//!
//! # File format
//! ```text
//! {
//!   "prices": [
//!     { "price": 158.0, "currency": "EUR", "timestamp": "2025-05-01T09:00:00.123456" }
//!   ],
//!   "notifications": [
//!     { "timestamp": "...", "old_price": 158.0, "new_price": 149.0,
//!       "change": -9.0, "change_percent": -5.7, "currency": "EUR" }
//!   ]
//! }
//! ```

use crate::{
    error::{Result, TrackerError},
    types::{ChangeEvent, HistoryDocument, PriceObservation},
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// File-backed price history
pub struct HistoryStore {
    path: PathBuf,
    document: HistoryDocument,
}

impl HistoryStore {
    /// Load the history document, or start empty if the file doesn't exist
    ///
    /// # Errors
    /// * `Config` - the file exists but isn't valid UTF-8 or a valid history document
    /// * `Io` - the file couldn't be read
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            info!("No price history at {}, starting fresh", path.display());
            return Ok(Self {
                path,
                document: HistoryDocument::default(),
            });
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => TrackerError::Config(format!(
                "price history in {} is not valid UTF-8",
                path.display()
            )),
            _ => TrackerError::Io(e),
        })?;
        let document: HistoryDocument = serde_json::from_str(&raw).map_err(|e| {
            TrackerError::Config(format!(
                "malformed price history in {}: {}",
                path.display(),
                e
            ))
        })?;

        info!(
            "Loaded {} prices and {} change events from {}",
            document.prices.len(),
            document.notifications.len(),
            path.display()
        );

        Ok(Self { path, document })
    }

    /// Wrap an existing document; nothing is written until `save()`
    pub fn with_document(path: impl Into<PathBuf>, document: HistoryDocument) -> Self {
        Self {
            path: path.into(),
            document,
        }
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    pub fn append_price(&mut self, observation: PriceObservation) {
        self.document.prices.push(observation);
    }

    pub fn append_change(&mut self, event: ChangeEvent) {
        self.document.notifications.push(event);
    }

    /// Overwrite the file with the full document
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.document)?;
        std::fs::write(&self.path, json)?;

        debug!(
            "Saved {} prices to {}",
            self.document.prices.len(),
            self.path.display()
        );
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn prices(&self) -> &[PriceObservation] {
        &self.document.prices
    }

    pub fn notifications(&self) -> &[ChangeEvent] {
        &self.document.notifications
    }

    pub fn document(&self) -> &HistoryDocument {
        &self.document
    }

    /// Summary of everything observed so far
    ///
    /// Returns `None` for an empty history.
    pub fn stats(&self) -> Option<PriceStats> {
        let prices = &self.document.prices;
        let latest = prices.last()?;

        let min = prices.iter().map(|p| p.price).min()?;
        let max = prices.iter().map(|p| p.price).max()?;
        let total: Decimal = prices.iter().map(|p| p.price).sum();
        let average = (total / Decimal::from(prices.len())).round_dp(2);

        Some(PriceStats {
            count: prices.len(),
            min,
            max,
            average,
            latest: latest.price,
            currency: latest.currency.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    pub count: usize,
    pub min: Decimal,
    pub max: Decimal,
    pub average: Decimal,
    pub latest: Decimal,
    pub currency: String,
}
