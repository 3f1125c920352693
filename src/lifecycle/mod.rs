//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loops stop → running sessions drain on their own
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
