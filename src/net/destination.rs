//! Final-destination resolution and backend dialing.
//!
//! # Design Decisions
//! - A server instance uses exactly one source: the static destination
//!   when configured, the routing header otherwise
//! - A missing destination fails the request, never the server

use std::io;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName};
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::DestinationConfig;

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("no final destination: header {0} is missing and no static destination is configured")]
    Missing(HeaderName),

    #[error("invalid routing header name {0:?}")]
    InvalidHeader(String),
}

/// Where a server instance reads the final destination from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationSource {
    Static(String),
    Header(HeaderName),
}

impl DestinationSource {
    pub fn from_config(config: &DestinationConfig) -> Result<Self, DestinationError> {
        match config.static_destination.as_deref().map(str::trim) {
            Some(destination) if !destination.is_empty() => Ok(Self::Static(destination.to_owned())),
            _ => HeaderName::from_bytes(config.routing_header.as_bytes())
                .map(Self::Header)
                .map_err(|_| DestinationError::InvalidHeader(config.routing_header.clone())),
        }
    }

    /// Resolve the `host:port` to dial for a request.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<String, DestinationError> {
        match self {
            Self::Static(destination) => Ok(destination.clone()),
            Self::Header(name) => headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
                .ok_or_else(|| DestinationError::Missing(name.clone())),
        }
    }
}

/// Open a TCP connection to `destination`, bounded by `connect_timeout`.
pub async fn dial_backend(destination: &str, connect_timeout: Duration) -> io::Result<TcpStream> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(destination))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("connect to {destination} timed out")))??;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY on backend connection");
    }
    Ok(stream)
}
