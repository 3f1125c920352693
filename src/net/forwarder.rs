//! Client-side forwarder: local TCP in, WebSocket upgrade out.
//!
//! # Responsibilities
//! - Accept raw TCP clients on a local listener
//! - Open one upgraded connection per client through a `Dialler`
//! - Announce the final destination through the routing header
//! - Bridge bytes until either side finishes
//!
//! # Data Flow
//! ```text
//! local client ──TCP──▶ Forwarder ──WebSocket──▶ BridgeServer ──TCP──▶ destination
//! ```

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::Instrument;
use url::Url;

use crate::http::websocket::{ConnTimeouts, UpgradeConn};
use crate::net::connection::SessionTracker;
use crate::net::dial::{connect, Dialler, UpgradeRequest};
use crate::observability::metrics;
use crate::stream::bridge;

/// Forwards local TCP connections over WebSocket upgrades.
pub struct Forwarder<D> {
    url: Url,
    route: Option<(HeaderName, HeaderValue)>,
    dialler: Arc<D>,
    timeouts: ConnTimeouts,
    sessions: SessionTracker,
}

impl<D: Dialler + 'static> Forwarder<D> {
    pub fn new(url: Url, dialler: D, timeouts: ConnTimeouts) -> Self {
        Self {
            url,
            route: None,
            dialler: Arc::new(dialler),
            timeouts,
            sessions: SessionTracker::new(),
        }
    }

    /// Send `destination` in `header` on every upgrade.
    pub fn with_destination(mut self, header: HeaderName, destination: HeaderValue) -> Self {
        self.route = Some((header, destination));
        self
    }

    pub fn sessions(&self) -> SessionTracker {
        self.sessions.clone()
    }

    /// Accept local clients until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, url = %self.url, "Forwarder listening");
        let forwarder = Arc::new(self);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let guard = forwarder.sessions.track();
                        let span = tracing::info_span!("forward", session_id = %guard.id(), peer_addr = %peer_addr);
                        let forwarder = Arc::clone(&forwarder);
                        tokio::spawn(
                            async move {
                                forwarder.forward(stream).await;
                                drop(guard);
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to accept local connection"),
                },
            }
        }

        Ok(())
    }

    async fn forward(&self, mut local: TcpStream) {
        let mut request = UpgradeRequest::new(self.url.clone());
        if let Some((header, value)) = &self.route {
            request = request.with_header(header.clone(), value.clone());
        }

        let (ws, response) = match connect(request, self.dialler.as_ref()).await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Failed to open upgraded connection");
                metrics::record_dial_failure("upstream");
                return;
            }
        };
        tracing::debug!(status = %response.status(), "Upgraded connection established");

        let mut conn = UpgradeConn::new(ws, self.timeouts);
        let keepalive = conn.keepalive().spawn();

        bridge(&mut conn, &mut local).await;

        keepalive.stop().await;
        conn.close().await;
    }
}
