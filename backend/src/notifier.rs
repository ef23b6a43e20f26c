//! Home Assistant Notifier
//!
//! Pushes the tracked price to Home Assistant as a sensor state through the
//! REST API (`POST /api/states/<entity_id>`). Pushes are best-effort: a
//! failed push is logged and reported as `false`, never as an error the
//! tracking cycle has to handle.
//!
//! # Payload
//! ```text
//! {
//!   "state": "149.00",
//!   "attributes": {
//!     "currency": "EUR",
//!     "unit_of_measurement": "€",
//!     "icon": "mdi:airplane",
//!     "friendly_name": "HEL → RIX",
//!     "last_updated": "2025-05-01T09:00:00.123456",
//!     "change": -9.0,            // change events only
//!     "change_percent": -5.7     // change events only
//!   }
//! }
//! ```

use crate::{
    config::Config,
    error::{Result, TrackerError},
    types::{now_local, PriceUpdate},
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SENSOR_ICON: &str = "mdi:airplane";

/// Sink for price updates
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Push an update; `true` when the hub accepted it
    async fn push(&self, update: PriceUpdate<'_>) -> bool;
}

/// Body of a Home Assistant state update
#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    pub state: String,
    pub attributes: StateAttributes,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateAttributes {
    pub currency: String,
    pub unit_of_measurement: String,
    pub icon: String,
    pub friendly_name: String,
    pub last_updated: NaiveDateTime,

    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub change: Option<Decimal>,

    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub change_percent: Option<Decimal>,
}

pub struct HomeAssistantNotifier {
    client: reqwest::Client,
    base_url: String,
    token: String,
    entity_id: String,
    friendly_name: String,
}

impl HomeAssistantNotifier {
    /// Create a notifier for one route
    ///
    /// # Arguments
    /// * `base_url` - Hub URL without trailing slash
    /// * `token` - Long-lived access token
    /// * `origin`, `destination` - Route codes; they name the sensor
    /// * `timeout` - Per-request timeout
    pub fn new(
        base_url: &str,
        token: &str,
        origin: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            entity_id: entity_id(origin, destination),
            friendly_name: format!("{} → {}", origin, destination),
        })
    }

    /// Build a notifier from configuration
    ///
    /// Returns `Ok(None)` when the hub URL or token isn't configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some((url, token)) = config.hub_credentials() else {
            return Ok(None);
        };

        Self::new(
            url,
            token,
            &config.origin,
            &config.destination,
            config.notify_timeout(),
        )
        .map(Some)
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Shape the state update for an observation or a change event
    pub fn build_payload(&self, update: PriceUpdate<'_>, now: NaiveDateTime) -> StatePayload {
        let (change, change_percent) = match update {
            PriceUpdate::Observation(_) => (None, None),
            PriceUpdate::Change(evt) => (Some(evt.change), Some(evt.change_percent)),
        };

        StatePayload {
            state: format!("{:.2}", update.price()),
            attributes: StateAttributes {
                currency: update.currency().to_string(),
                unit_of_measurement: display_unit(update.currency()),
                icon: SENSOR_ICON.to_string(),
                friendly_name: self.friendly_name.clone(),
                last_updated: now,
                change,
                change_percent,
            },
        }
    }

    /// POST the update to the hub
    ///
    /// # Errors
    /// * `Http` - network failure or timeout
    /// * `Notify` - the hub answered with anything but 200/201
    pub async fn send(&self, update: PriceUpdate<'_>) -> Result<StatePayload> {
        let payload = self.build_payload(update, now_local());
        let url = format!("{}/api/states/{}", self.base_url, self.entity_id);

        debug!("Pushing state {} to {}", payload.state, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(payload),
            status => Err(TrackerError::Notify(format!(
                "Home Assistant answered {} for {}",
                status, self.entity_id
            ))),
        }
    }

    /// Check that the hub API is reachable and the token is accepted
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/", self.base_url);

        match self.client.get(&url).bearer_auth(&self.token).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Home Assistant health check passed");
                true
            }
            Ok(response) => {
                warn!("Home Assistant health check failed: HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Home Assistant health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for HomeAssistantNotifier {
    async fn push(&self, update: PriceUpdate<'_>) -> bool {
        match self.send(update).await {
            Ok(payload) => {
                info!(
                    "Price pushed to Home Assistant: {} {}",
                    payload.state, payload.attributes.unit_of_measurement
                );
                true
            }
            Err(e) => {
                error!("Failed to push price to Home Assistant: {}", e);
                false
            }
        }
    }
}

/// Sensor entity for a route, e.g. `sensor.airbaltic_hel_rix_price`
pub fn entity_id(origin: &str, destination: &str) -> String {
    format!(
        "sensor.airbaltic_{}_{}_price",
        origin.trim().to_lowercase(),
        destination.trim().to_lowercase()
    )
}

fn display_unit(currency: &str) -> String {
    match currency.to_ascii_uppercase().as_str() {
        "EUR" => "€".to_string(),
        "USD" => "$".to_string(),
        "GBP" => "£".to_string(),
        _ => currency.to_string(),
    }
}
