//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Server, forwarder and sessions produce:
//!     → logging.rs (structured log events, one span per session)
//!     → metrics.rs (session counters, dial and handshake failures)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
