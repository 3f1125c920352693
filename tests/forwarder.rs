//! End-to-end tests: local TCP client → Forwarder → upgrade server → backend.

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use socket_bridge::http::ConnTimeouts;
use socket_bridge::lifecycle::Shutdown;
use socket_bridge::net::TungsteniteDialler;
use socket_bridge::stream::BridgeHandler;
use socket_bridge::Forwarder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

mod common;

async fn start_forwarder(forwarder: Forwarder<TungsteniteDialler>) -> (std::net::SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        forwarder.run(listener, rx).await.unwrap();
    });
    (addr, shutdown)
}

async fn round_trip(local: &mut TcpStream, payload: &[u8]) -> Vec<u8> {
    local.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    tokio::time::timeout(Duration::from_secs(5), local.read_exact(&mut buf))
        .await
        .expect("timed out waiting for echo")
        .unwrap();
    buf
}

#[tokio::test]
async fn forwards_local_client_to_static_destination() {
    let (backend_addr, accepted) = common::start_echo_backend().await;
    let config = common::server_config(Some(backend_addr));
    let (server_addr, server_shutdown) = common::start_server(&config, BridgeHandler).await;

    let url = url::Url::parse(&format!("http://{server_addr}/")).unwrap();
    let forwarder = Forwarder::new(url, TungsteniteDialler::default(), ConnTimeouts::default());
    let sessions = forwarder.sessions();
    let (local_addr, forwarder_shutdown) = start_forwarder(forwarder).await;

    let mut local = TcpStream::connect(local_addr).await.unwrap();
    assert_eq!(round_trip(&mut local, b"first").await, b"first");
    assert_eq!(round_trip(&mut local, b"second message").await, b"second message");
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(sessions.active_count(), 1);

    // Closing the local client ends the forwarded session.
    drop(local);
    assert!(sessions.wait_for_drain(Duration::from_secs(5)).await);

    forwarder_shutdown.trigger();
    server_shutdown.trigger();
}

#[tokio::test]
async fn forwards_destination_through_routing_header() {
    let (backend_addr, _) = common::start_echo_backend().await;
    let config = common::server_config(None);
    let (server_addr, server_shutdown) = common::start_server(&config, BridgeHandler).await;

    let url = url::Url::parse(&format!("ws://{server_addr}/")).unwrap();
    let forwarder = Forwarder::new(url, TungsteniteDialler::default(), ConnTimeouts::default()).with_destination(
        HeaderName::from_static(common::ROUTING_HEADER),
        HeaderValue::from_str(&backend_addr.to_string()).unwrap(),
    );
    let (local_addr, forwarder_shutdown) = start_forwarder(forwarder).await;

    let mut first = TcpStream::connect(local_addr).await.unwrap();
    let mut second = TcpStream::connect(local_addr).await.unwrap();
    assert_eq!(round_trip(&mut first, b"one").await, b"one");
    assert_eq!(round_trip(&mut second, b"two").await, b"two");

    forwarder_shutdown.trigger();
    server_shutdown.trigger();
}

#[tokio::test]
async fn unreachable_upstream_drops_local_client() {
    let dead_addr = common::closed_port().await;
    let url = url::Url::parse(&format!("http://{dead_addr}/")).unwrap();
    let forwarder = Forwarder::new(url, TungsteniteDialler::default(), ConnTimeouts::default());
    let sessions = forwarder.sessions();
    let (local_addr, shutdown) = start_forwarder(forwarder).await;

    let mut local = TcpStream::connect(local_addr).await.unwrap();
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), local.read(&mut buf))
        .await
        .expect("local client was not released");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(sessions.wait_for_drain(Duration::from_secs(5)).await);

    shutdown.trigger();
}
