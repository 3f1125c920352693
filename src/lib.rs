//! WebSocket-to-TCP socket bridge library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod stream;

pub use config::BridgeConfig;
pub use http::BridgeServer;
pub use lifecycle::Shutdown;
pub use net::Forwarder;
