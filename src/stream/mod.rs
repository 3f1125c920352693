//! Stream handling subsystem.
//!
//! # Data Flow
//! ```text
//! Upgraded session (UpgradeConn + backend TcpStream)
//!     → handler.rs (StreamHandler chosen at startup)
//!     → preamble.rs (optional routing frame to the backend)
//!     → bridge.rs (duplex copy until either side finishes)
//! ```

pub mod bridge;
pub mod handler;
pub mod preamble;

pub use bridge::{bridge, BridgeOutcome, Direction};
pub use handler::{BridgeHandler, PreambleHandler, StreamHandler};
pub use preamble::{read_preamble, write_preamble, Preamble, PreambleError};
