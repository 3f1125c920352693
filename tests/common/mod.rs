//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use socket_bridge::config::BridgeConfig;
use socket_bridge::lifecycle::Shutdown;
use socket_bridge::stream::StreamHandler;
use socket_bridge::BridgeServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub const ROUTING_HEADER: &str = "cf-access-jump-destination";

/// Start a TCP backend that echoes every byte back. Returns its address
/// and a counter of accepted connections.
pub async fn start_echo_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, accepted)
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config for a server on an ephemeral port. `destination` of `None`
/// routes by header.
pub fn server_config(destination: Option<SocketAddr>) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.destination.static_destination = destination.map(|addr| addr.to_string());
    config.backend.connect_timeout_secs = 2;
    config
}

/// Start an upgrade server; dropping the returned `Shutdown` does not stop it,
/// `trigger` does.
pub async fn start_server<H: StreamHandler>(config: &BridgeConfig, handler: H) -> (SocketAddr, Arc<Shutdown>) {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = BridgeServer::new(config, handler).unwrap();
    let shutdown = Arc::new(Shutdown::new());
    let rx = shutdown.subscribe();

    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    (addr, shutdown)
}

/// Read data frames until `expected` bytes arrived, skipping control frames.
pub async fn read_bytes<S>(ws: &mut S, expected: usize) -> Vec<u8>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut received = Vec::new();
    while received.len() < expected {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match message {
            Message::Binary(data) => received.extend_from_slice(&data),
            Message::Text(text) => received.extend_from_slice(text.as_bytes()),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            Message::Close(_) => break,
        }
    }
    received
}

/// Send `payload` as one binary frame.
pub async fn send_bytes<S>(ws: &mut S, payload: &[u8])
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Debug,
{
    ws.send(Message::binary(payload.to_vec())).await.unwrap();
}
