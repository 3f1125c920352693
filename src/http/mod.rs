//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, destination, backend dial)
//!     → handshake.rs (upgrade detection, validation, accept key)
//!     → page.rs (plain HTTP fallback)
//!     → websocket.rs (upgraded connection as a byte stream)
//!     → stream handler
//!
//! Outbound:
//!     headers.rs (strip negotiation headers) → net::dial
//! ```

pub mod handshake;
pub mod headers;
pub mod page;
pub mod server;
pub mod websocket;

pub use handshake::accept_key;
pub use server::BridgeServer;
pub use websocket::{ConnTimeouts, UpgradeConn};
