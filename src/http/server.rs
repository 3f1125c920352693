//! Inbound upgrade server.
//!
//! # Responsibilities
//! - Create the Axum router that accepts upgrade requests on every path
//! - Resolve the final destination per request
//! - Answer plain HTTP with the informational page
//! - Dial the backend, complete the handshake and run the stream handler
//! - Tear every session down exactly once
//!
//! # Request Flow
//! ```text
//! resolve destination ─none─▶ 400 (empty)
//!     │
//! upgrade headers? ─no─▶ 200 informational page
//!     │
//! validate handshake ─bad─▶ 4xx (empty)
//!     │
//! dial backend ─fail─▶ 502 (empty)
//!     │
//! 101 Switching Protocols ─▶ spawn session:
//!     UpgradeConn + keepalive → StreamHandler → stop keepalive → close
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::BridgeConfig;
use crate::http::handshake::{is_upgrade_request, switching_protocols, validate_upgrade, HandshakeError};
use crate::http::page::non_upgrade_response;
use crate::http::websocket::{ConnTimeouts, UpgradeConn};
use crate::net::connection::{SessionGuard, SessionTracker};
use crate::net::destination::{dial_backend, DestinationError, DestinationSource};
use crate::observability::metrics;
use crate::stream::StreamHandler;

/// Application state injected into handlers.
struct AppState<H> {
    handler: Arc<H>,
    destinations: Arc<DestinationSource>,
    timeouts: ConnTimeouts,
    connect_timeout: Duration,
    sessions: SessionTracker,
}

impl<H> Clone for AppState<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            destinations: Arc::clone(&self.destinations),
            timeouts: self.timeouts,
            connect_timeout: self.connect_timeout,
            sessions: self.sessions.clone(),
        }
    }
}

/// HTTP server that upgrades requests and bridges them to backends.
pub struct BridgeServer<H> {
    state: AppState<H>,
}

impl<H: StreamHandler> BridgeServer<H> {
    /// Create a server; fails only if the routing header name is unusable.
    pub fn new(config: &BridgeConfig, handler: H) -> Result<Self, DestinationError> {
        let destinations = DestinationSource::from_config(&config.destination)?;
        match &destinations {
            DestinationSource::Static(destination) => {
                tracing::info!(destination = %destination, "Using static destination")
            }
            DestinationSource::Header(header) => {
                tracing::info!(header = %header, "Resolving destination from request header")
            }
        }

        Ok(Self {
            state: AppState {
                handler: Arc::new(handler),
                destinations: Arc::new(destinations),
                timeouts: config.keepalive.timeouts(),
                connect_timeout: config.backend.connect_timeout(),
                sessions: SessionTracker::new(),
            },
        })
    }

    /// Tracker of sessions that are still bridging.
    pub fn sessions(&self) -> SessionTracker {
        self.state.sessions.clone()
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(upgrade_handler::<H>))
            .route("/{*path}", any(upgrade_handler::<H>))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires.
    ///
    /// Sessions already upgraded keep running after this returns; they end
    /// when one side of their bridge closes.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Upgrade server starting");

        let app = self.router().into_make_service();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!(active_sessions = self.state.sessions.active_count(), "Upgrade server stopped");
        Ok(())
    }
}

async fn upgrade_handler<H: StreamHandler>(State(state): State<AppState<H>>, mut request: Request) -> Response {
    let destination = match state.destinations.resolve(request.headers()) {
        Ok(destination) => destination,
        Err(e) => {
            tracing::error!(error = %e, "Did not receive final destination from client");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if !is_upgrade_request(request.headers()) {
        return non_upgrade_response();
    }

    let nonce = match validate_upgrade(request.method(), request.headers()) {
        Ok(nonce) => nonce,
        Err(e) => return reject_handshake(e),
    };
    let Some(on_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
        return reject_handshake(HandshakeError::NotUpgradable);
    };

    let backend = match dial_backend(&destination, state.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(destination = %destination, error = %e, "Cannot connect to remote");
            metrics::record_dial_failure("backend");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let guard = state.sessions.track();
    let span = tracing::info_span!("session", session_id = %guard.id(), destination = %destination);
    let headers = request.headers().clone();
    tokio::spawn(run_session(state, on_upgrade, backend, headers, guard).instrument(span));

    switching_protocols(&nonce)
}

fn reject_handshake(error: HandshakeError) -> Response {
    tracing::warn!(error = %error, "Failed to upgrade");
    metrics::record_handshake_failure(error.kind());
    error.into_response()
}

/// Drive one upgraded session. `backend` and `_guard` drop on every exit path.
async fn run_session<H: StreamHandler>(
    state: AppState<H>,
    on_upgrade: OnUpgrade,
    mut backend: TcpStream,
    headers: HeaderMap,
    _guard: SessionGuard,
) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to upgrade");
            metrics::record_handshake_failure("upgrade");
            return;
        }
    };

    let ws = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
    let mut conn = UpgradeConn::new(ws, state.timeouts);
    let keepalive = conn.keepalive().spawn();
    tracing::debug!("Session started");

    state.handler.handle(&mut conn, &mut backend, &headers).await;

    keepalive.stop().await;
    conn.close().await;
    tracing::debug!("Session closed");
}
