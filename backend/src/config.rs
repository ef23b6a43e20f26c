use crate::error::{Result, TrackerError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_HISTORY_FILE: &str = "price_history.json";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Route origin airport code (e.g., "HEL")
    pub origin: String,

    /// Route destination airport code (e.g., "RIX")
    pub destination: String,

    /// Number of adult passengers in the query
    pub passengers: u32,

    /// Target travel month as understood by the booking site
    pub month: String,

    /// Seconds between tracking cycles
    pub check_interval: u64,

    /// Home Assistant settings; pushes are disabled without them
    #[serde(default)]
    pub home_assistant: HomeAssistantConfig,

    /// Where the price history document lives
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeAssistantConfig {
    /// Base URL of the hub (e.g., "http://homeassistant.local:8123")
    pub url: Option<String>,

    /// Long-lived access token
    pub token: Option<String>,
}

fn default_history_file() -> PathBuf {
    PathBuf::from(DEFAULT_HISTORY_FILE)
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_notify_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from the file named by `TRACKER_CONFIG`
    /// (default `config.json`), then apply `HOME_ASSISTANT_URL` and
    /// `HOME_ASSISTANT_TOKEN` overrides from the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var("TRACKER_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let config = Self::from_path(&path)?.with_overrides(
            std::env::var("HOME_ASSISTANT_URL").ok(),
            std::env::var("HOME_ASSISTANT_TOKEN").ok(),
        );
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without consulting the environment
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TrackerError::Config(format!(
                "configuration file {} is missing; copy config.example.json to get started",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => TrackerError::Config(format!(
                "configuration file {} is not valid UTF-8",
                path.display()
            )),
            _ => TrackerError::Io(e),
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            TrackerError::Config(format!("invalid configuration in {}: {}", path.display(), e))
        })?;

        Ok(config.normalized())
    }

    pub fn with_overrides(mut self, url: Option<String>, token: Option<String>) -> Self {
        if url.is_some() {
            self.home_assistant.url = url;
        }
        if token.is_some() {
            self.home_assistant.token = token;
        }
        self.normalized()
    }

    pub fn validate(&self) -> Result<()> {
        if self.origin.trim().is_empty() {
            return Err(TrackerError::Config("origin must not be empty".to_string()));
        }
        if self.destination.trim().is_empty() {
            return Err(TrackerError::Config("destination must not be empty".to_string()));
        }
        if self.passengers == 0 {
            return Err(TrackerError::Config("passengers must be at least 1".to_string()));
        }
        if self.check_interval == 0 {
            return Err(TrackerError::Config("check_interval must be at least 1 second".to_string()));
        }
        Ok(())
    }

    /// Both URL and token must be present for pushes to happen
    pub fn hub_credentials(&self) -> Option<(&str, &str)> {
        match (&self.home_assistant.url, &self.home_assistant.token) {
            (Some(url), Some(token)) => Some((url.as_str(), token.as_str())),
            _ => None,
        }
    }

    /// Human-readable route label, e.g. "HEL → RIX"
    pub fn route_label(&self) -> String {
        format!("{} → {}", self.origin, self.destination)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_seconds)
    }

    // Blank strings count as unset; the hub URL never keeps a trailing slash.
    fn normalized(mut self) -> Self {
        self.home_assistant.url = self
            .home_assistant
            .url
            .take()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        self.home_assistant.token = self
            .home_assistant
            .token
            .take()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"origin":"HEL","destination":"RIX","passengers":2,"month":"2025-06","check_interval":3600}"#,
        );

        let config = Config::from_path(&path).unwrap();
        config.validate().unwrap();

        assert_eq!(config.origin, "HEL");
        assert_eq!(config.passengers, 2);
        assert_eq!(config.history_file, PathBuf::from("price_history.json"));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(60));
        assert_eq!(config.notify_timeout(), Duration::from_secs(10));
        assert!(config.hub_credentials().is_none());
        assert_eq!(config.route_label(), "HEL → RIX");
    }

    #[test]
    fn test_hub_credentials_require_url_and_token() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"origin":"HEL","destination":"RIX","passengers":1,"month":"2025-06","check_interval":60,
                "home_assistant":{"url":"http://ha.local:8123/","token":""}}"#,
        );

        let config = Config::from_path(&path).unwrap();
        // Empty token means disabled
        assert!(config.hub_credentials().is_none());

        let config = config.with_overrides(None, Some("secret".to_string()));
        assert_eq!(config.hub_credentials(), Some(("http://ha.local:8123", "secret")));
    }

    #[test]
    fn test_env_overrides_replace_file_values() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"origin":"HEL","destination":"RIX","passengers":1,"month":"2025-06","check_interval":60,
                "home_assistant":{"url":"http://old","token":"old"}}"#,
        );

        let config = Config::from_path(&path)
            .unwrap()
            .with_overrides(Some("http://new:8123".to_string()), None);

        assert_eq!(config.hub_credentials(), Some(("http://new:8123", "old")));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempdir().unwrap();
        let err = Config::from_path(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"origin":"HEL""#);

        let err = Config::from_path(&path).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn test_non_utf8_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, [b'{', 0xc3, 0x28, b'}']).unwrap();

        let err = Config::from_path(&path).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"origin":"HEL","destination":"RIX","passengers":1,"month":"2025-06","check_interval":0}"#,
        );

        let config = Config::from_path(&path).unwrap();
        assert!(matches!(config.validate(), Err(TrackerError::Config(_))));
    }
}
