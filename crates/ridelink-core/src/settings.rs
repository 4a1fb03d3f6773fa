//! Settings types shared by the socket and app layers.
//!
//! Defines:
//! - `Settings` - root of `ridelink.toml`
//! - `EndpointSettings`, `SessionSettings`, `ReconnectSettings`,
//!   `CoordinatorSettings` - per-component sections
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application settings (`ridelink.toml`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub endpoint: EndpointSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub reconnect: ReconnectSettings,

    #[serde(default)]
    pub coordinator: CoordinatorSettings,
}

/// Where the ride backend lives
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EndpointSettings {
    /// WebSocket endpoint; query parameters are appended per connection
    #[serde(default = "default_socket_url")]
    pub socket_url: String,

    /// Base URL of the REST API used for status snapshots
    #[serde(default)]
    pub rest_url: Option<String>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            socket_url: default_socket_url(),
            rest_url: None,
        }
    }
}

fn default_socket_url() -> String {
    "wss://localhost/match/connect".to_string()
}

/// Socket session timeouts
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Upper bound on the WebSocket handshake
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connected session with no inbound frame for this long is considered dead
    #[serde(default = "default_resource_timeout_secs")]
    pub resource_timeout_secs: u64,

    /// Transport-level ping period while connected
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl SessionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn resource_timeout(&self) -> Duration {
        Duration::from_secs(self.resource_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            resource_timeout_secs: default_resource_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_resource_timeout_secs() -> u64 {
    300
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

/// Exponential backoff for reconnection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Scheduled retries allowed before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl ReconnectSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    10
}

/// Ride status coordinator timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CoordinatorSettings {
    /// Window in which repeated status pushes collapse into one UI update
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Delay between a status-changing send and its backstop resync
    #[serde(default = "default_resync_delay_ms")]
    pub resync_delay_ms: u64,

    /// Minimum spacing between two resync requests
    #[serde(default = "default_resync_min_gap_ms")]
    pub resync_min_gap_ms: u64,
}

impl CoordinatorSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn resync_delay(&self) -> Duration {
        Duration::from_millis(self.resync_delay_ms)
    }

    pub fn resync_min_gap(&self) -> Duration {
        Duration::from_millis(self.resync_min_gap_ms)
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            resync_delay_ms: default_resync_delay_ms(),
            resync_min_gap_ms: default_resync_min_gap_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_resync_delay_ms() -> u64 {
    800
}

fn default_resync_min_gap_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_timings() {
        let settings = Settings::default();
        assert_eq!(settings.session.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.session.resource_timeout(), Duration::from_secs(300));
        assert_eq!(settings.session.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(settings.reconnect.initial_delay(), Duration::from_secs(1));
        assert_eq!(settings.reconnect.max_delay(), Duration::from_secs(30));
        assert_eq!(settings.reconnect.max_attempts, 10);
        assert_eq!(settings.coordinator.debounce(), Duration::from_millis(300));
        assert_eq!(settings.coordinator.resync_delay(), Duration::from_millis(800));
        assert_eq!(settings.coordinator.resync_min_gap(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"reconnect":{"max_attempts":3}}"#).unwrap();
        assert_eq!(settings.reconnect.max_attempts, 3);
        assert_eq!(settings.reconnect.initial_delay_ms, 1_000);
        assert_eq!(settings.session, SessionSettings::default());
        assert_eq!(settings.endpoint.rest_url, None);
    }
}
