//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Server side:
//!     destination.rs (static or header-routed) → dial_backend (TCP)
//!     connection.rs (session IDs, drain on shutdown)
//!     keepalive.rs (pings, liveness window)
//!
//! Client side:
//!     forwarder.rs (local TCP accept loop)
//!     → dial.rs (scheme rewrite, header sanitizing, Dialler)
//! ```

pub mod connection;
pub mod destination;
pub mod dial;
pub mod forwarder;
pub mod keepalive;

pub use connection::{SessionId, SessionTracker};
pub use destination::{DestinationError, DestinationSource};
pub use dial::{connect, upgrade_scheme, DialError, Dialler, TungsteniteDialler, UpgradeRequest};
pub use forwarder::Forwarder;
pub use keepalive::{Keepalive, KeepaliveHandle, LivenessWindow};
