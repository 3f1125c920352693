//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::http::websocket::ConnTimeouts;

/// Root configuration for the socket bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration for the upgrade server.
    pub listener: ListenerConfig,

    /// Final-destination resolution.
    pub destination: DestinationConfig,

    /// Backend TCP dialing.
    pub backend: BackendConfig,

    /// Ping / liveness timing.
    pub keepalive: KeepaliveConfig,

    /// Preamble-first stream handler.
    pub preamble: PreambleConfig,

    /// Client-side forwarder.
    pub forwarder: ForwarderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Where the final destination comes from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Fixed `host:port`. When set, the routing header is ignored.
    pub static_destination: Option<String>,

    /// Request header carrying the destination when no static one is set.
    pub routing_header: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            static_destination: None,
            routing_header: "Cf-Access-Jump-Destination".to_string(),
        }
    }
}

/// Backend connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Keepalive timing. Pings go out every 9/10 of `pong_wait_secs`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Time allowed between pongs before the connection is considered dead.
    pub pong_wait_secs: u64,

    /// Time allowed to write a single frame.
    pub write_wait_secs: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            pong_wait_secs: 60,
            write_wait_secs: 10,
        }
    }
}

impl KeepaliveConfig {
    pub fn timeouts(&self) -> ConnTimeouts {
        ConnTimeouts {
            liveness: Duration::from_secs(self.pong_wait_secs),
            write_wait: Duration::from_secs(self.write_wait_secs),
        }
    }
}

/// Preamble handler settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreambleConfig {
    /// Write a preamble to the backend before bridging.
    pub enabled: bool,

    /// Request header carrying the auth token placed in the preamble.
    pub token_header: String,
}

impl Default for PreambleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_header: "Cf-Access-Token".to_string(),
        }
    }
}

/// Client-side forwarder settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Local address accepting raw TCP clients.
    pub bind_address: String,

    /// Upgrade endpoint to dial (http, https, ws or wss).
    pub url: Option<String>,

    /// Destination announced through the routing header, if any.
    pub destination: Option<String>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:2222".to_string(),
            url: None,
            destination: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "socket_bridge=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = BridgeConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.destination.routing_header, "Cf-Access-Jump-Destination");
        assert!(config.destination.static_destination.is_none());

        let timeouts = config.keepalive.timeouts();
        assert_eq!(timeouts.liveness, Duration::from_secs(60));
        assert_eq!(timeouts.ping_period(), Duration::from_secs(54));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [destination]
            static_destination = "127.0.0.1:22"

            [keepalive]
            pong_wait_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.destination.static_destination.as_deref(), Some("127.0.0.1:22"));
        assert_eq!(config.keepalive.pong_wait_secs, 30);
        assert_eq!(config.keepalive.write_wait_secs, 10);
        assert_eq!(config.preamble.token_header, "Cf-Access-Token");
    }
}
