//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use hwkeyring_core::{Error, Result};

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// URL the host opens for the signing surface
    pub surface_url: String,

    /// Name the remote side announces when attaching to the channel
    pub channel_name: String,

    /// How long to wait for the remote side to attach (seconds, none = forever)
    pub attach_timeout_secs: Option<u64>,

    /// How long a request may stay unanswered (seconds, none = forever)
    pub request_timeout_secs: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            surface_url: "http://127.0.0.1:8080/".to_string(),
            channel_name: "hwkeyring-surface".to_string(),
            attach_timeout_secs: None,
            request_timeout_secs: None,
        }
    }
}

impl BridgeConfig {
    pub fn attach_timeout(&self) -> Option<Duration> {
        self.attach_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Reject configurations the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.surface_url.trim().is_empty() {
            return Err(Error::Config("surface_url must not be empty".to_string()));
        }
        if self.channel_name.trim().is_empty() {
            return Err(Error::Config("channel_name must not be empty".to_string()));
        }
        if self.attach_timeout_secs == Some(0) || self.request_timeout_secs == Some(0) {
            return Err(Error::Config(
                "timeouts must be at least one second, or unset".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
