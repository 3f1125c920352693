//! Pluggable stream handlers invoked once per upgraded session.
//!
//! # Responsibilities
//! - Define the `StreamHandler` seam used by the upgrade server
//! - Provide the plain bridging handler
//! - Provide the preamble-first handler for backends that expect routing
//!   metadata before payload

use std::future::Future;

use axum::http::{HeaderMap, HeaderName};
use tokio::net::TcpStream;

use crate::http::websocket::UpgradeConn;
use crate::stream::bridge::bridge;
use crate::stream::preamble::write_preamble;

/// Moves bytes between an upgraded connection and its backend.
///
/// Called with both endpoints borrowed; the server closes them after the
/// returned future completes.
pub trait StreamHandler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        conn: &'a mut UpgradeConn,
        backend: &'a mut TcpStream,
        headers: &'a HeaderMap,
    ) -> impl Future<Output = ()> + Send + 'a;
}

/// Bridges bytes with no extra framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeHandler;

impl StreamHandler for BridgeHandler {
    fn handle<'a>(
        &'a self,
        conn: &'a mut UpgradeConn,
        backend: &'a mut TcpStream,
        _headers: &'a HeaderMap,
    ) -> impl Future<Output = ()> + Send + 'a {
        async move {
            bridge(conn, backend).await;
        }
    }
}

/// Writes a preamble (destination + token from request headers) to the
/// backend, then bridges.
#[derive(Debug, Clone)]
pub struct PreambleHandler {
    destination_header: HeaderName,
    token_header: HeaderName,
}

impl PreambleHandler {
    pub fn new(destination_header: HeaderName, token_header: HeaderName) -> Self {
        Self {
            destination_header,
            token_header,
        }
    }

    fn header_value(headers: &HeaderMap, name: &HeaderName) -> String {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    }
}

impl StreamHandler for PreambleHandler {
    fn handle<'a>(
        &'a self,
        conn: &'a mut UpgradeConn,
        backend: &'a mut TcpStream,
        headers: &'a HeaderMap,
    ) -> impl Future<Output = ()> + Send + 'a {
        async move {
            let destination = Self::header_value(headers, &self.destination_header);
            let token = Self::header_value(headers, &self.token_header);

            if let Err(e) = write_preamble(backend, &destination, &token).await {
                tracing::error!(error = %e, destination = %destination, "Failed to send preamble");
                return;
            }

            bridge(conn, backend).await;
        }
    }
}
