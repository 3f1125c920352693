//! Outbound WebSocket connector.
//!
//! # Responsibilities
//! - Rewrite request schemes for the WebSocket transport
//! - Sanitize forwarded headers so the dialer negotiates on its own
//! - Dial through an injectable `Dialler`
//! - Stamp `Sec-WebSocket-Accept` for the original client's nonce

use std::future::Future;
use std::sync::Once;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Response;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::http::handshake::accept_key;
use crate::http::headers::{sanitize, StripList};

/// Handshake response returned by a dial.
pub type DialResponse = Response;

#[derive(Debug, Error)]
pub enum DialError {
    #[error("websocket dial failed: {0}")]
    WebSocket(#[from] WsError),

    #[error("cannot rewrite scheme of {url} to {scheme}")]
    Scheme { url: String, scheme: String },
}

/// Scheme the WebSocket dialer expects for `scheme`.
pub fn upgrade_scheme(scheme: &str) -> &str {
    match scheme {
        "https" => "wss",
        "http" | "" => "ws",
        other => other,
    }
}

/// A request to be re-issued as a WebSocket upgrade.
///
/// Consumed by [`connect`].
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub method: Method,
    pub url: Url,
    /// Host of the original request; forced onto the forwarded headers.
    pub host: String,
    pub headers: HeaderMap,
}

impl UpgradeRequest {
    /// A bare GET toward `url`.
    pub fn new(url: Url) -> Self {
        let host = host_of(&url);
        Self {
            method: Method::GET,
            url,
            host,
            headers: HeaderMap::new(),
        }
    }

    /// Re-target an incoming request at `url`, keeping its method, host and headers.
    pub fn from_request<B>(request: &Request<B>, url: Url) -> Self {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .or_else(|| request.uri().authority().map(|a| a.to_string()))
            .unwrap_or_else(|| host_of(&url));

        Self {
            method: request.method().clone(),
            url,
            host,
            headers: request.headers().clone(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

fn host_of(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_owned(),
        (None, _) => String::new(),
    }
}

/// Opens WebSocket connections. Swappable for tests and protocol variants.
pub trait Dialler: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(
        &self,
        url: &Url,
        headers: HeaderMap,
    ) -> impl Future<Output = Result<(WebSocketStream<Self::Stream>, DialResponse), DialError>> + Send;
}

/// Dials over plain TCP with tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteDialler {
    config: Option<WebSocketConfig>,
}

impl TungsteniteDialler {
    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config: Some(config) }
    }
}

/// Install the process-wide rustls crypto provider used for `wss` dials.
fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Err means a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

impl Dialler for TungsteniteDialler {
    type Stream = MaybeTlsStream<TcpStream>;

    fn dial(
        &self,
        url: &Url,
        headers: HeaderMap,
    ) -> impl Future<Output = Result<(WebSocketStream<Self::Stream>, DialResponse), DialError>> + Send {
        if url.scheme() == "wss" {
            ensure_crypto_provider();
        }
        let request = url.as_str().into_client_request();
        let config = self.config.clone();

        async move {
            let mut request = request?;
            // Replaces generated values (Host included) with the sanitized ones.
            request.headers_mut().extend(headers);
            let (stream, response) = tokio_tungstenite::connect_async_with_config(request, config, true).await?;
            Ok((stream, response))
        }
    }
}

/// Upgrade `request` through `dialler` with the default strip list.
pub async fn connect<D>(
    request: UpgradeRequest,
    dialler: &D,
) -> Result<(WebSocketStream<D::Stream>, DialResponse), DialError>
where
    D: Dialler,
{
    connect_with(request, dialler, &StripList::default()).await
}

/// Upgrade `request` through `dialler`, stripping `strip` from its headers.
///
/// Dial errors are returned as produced by the dialler.
pub async fn connect_with<D>(
    mut request: UpgradeRequest,
    dialler: &D,
    strip: &StripList,
) -> Result<(WebSocketStream<D::Stream>, DialResponse), DialError>
where
    D: Dialler,
{
    let scheme = upgrade_scheme(request.url.scheme()).to_owned();
    if scheme != request.url.scheme() && request.url.set_scheme(&scheme).is_err() {
        return Err(DialError::Scheme {
            url: request.url.to_string(),
            scheme,
        });
    }

    let nonce = request
        .headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let headers = sanitize(&request.headers, &request.host, strip);

    tracing::debug!(url = %request.url, method = %request.method, "Dialing websocket");
    let (stream, mut response) = dialler.dial(&request.url, headers).await?;

    if let Ok(accept) = HeaderValue::from_str(&accept_key(&nonce)) {
        response.headers_mut().insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    }
    Ok((stream, response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::sync::Mutex;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};
    use tokio_tungstenite::tungstenite::error::UrlError;
    use tokio_tungstenite::tungstenite::protocol::Role;

    /// Records the dial and hands back an in-memory WebSocket.
    #[derive(Default)]
    struct RecordingDialler {
        seen: Mutex<Option<(Url, HeaderMap)>>,
        fail: bool,
    }

    impl Dialler for RecordingDialler {
        type Stream = DuplexStream;

        fn dial(
            &self,
            url: &Url,
            headers: HeaderMap,
        ) -> impl Future<Output = Result<(WebSocketStream<DuplexStream>, DialResponse), DialError>> + Send {
            *self.seen.lock().unwrap() = Some((url.clone(), headers));
            let fail = self.fail;

            async move {
                if fail {
                    return Err(DialError::WebSocket(WsError::ConnectionClosed));
                }
                let (io, _peer) = duplex(1024);
                let stream = WebSocketStream::from_raw_socket(io, Role::Client, None).await;
                let response = axum::http::Response::builder()
                    .status(StatusCode::SWITCHING_PROTOCOLS)
                    .body(None)
                    .unwrap();
                Ok((stream, response))
            }
        }
    }

    #[test]
    fn scheme_rewriting() {
        assert_eq!(upgrade_scheme("https"), "wss");
        assert_eq!(upgrade_scheme("http"), "ws");
        assert_eq!(upgrade_scheme(""), "ws");
        assert_eq!(upgrade_scheme("ws"), "ws");
        assert_eq!(upgrade_scheme("wss"), "wss");
        assert_eq!(upgrade_scheme("ftp"), "ftp");
    }

    #[tokio::test]
    async fn connect_rewrites_and_sanitizes() {
        let dialler = RecordingDialler::default();
        let request = UpgradeRequest::new(Url::parse("https://origin.example:8443/ssh").unwrap())
            .with_header(header::SEC_WEBSOCKET_KEY, HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="))
            .with_header(header::UPGRADE, HeaderValue::from_static("websocket"))
            .with_header(HeaderName::from_static("x-extra"), HeaderValue::from_static("kept"));

        let (_stream, response) = connect(request, &dialler).await.unwrap();

        let (url, headers) = dialler.seen.lock().unwrap().take().unwrap();
        assert_eq!(url.as_str(), "wss://origin.example:8443/ssh");
        assert!(!headers.contains_key(header::SEC_WEBSOCKET_KEY));
        assert!(!headers.contains_key(header::UPGRADE));
        assert_eq!(headers[header::HOST], "origin.example:8443");
        assert_eq!(headers["x-extra"], "kept");
        assert_eq!(
            response.headers()[header::SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[tokio::test]
    async fn from_request_keeps_original_host() {
        let incoming = Request::builder()
            .uri("/tunnel")
            .header(header::HOST, "public.example")
            .body(())
            .unwrap();
        let request = UpgradeRequest::from_request(&incoming, Url::parse("http://10.0.0.5:8080/").unwrap());
        assert_eq!(request.host, "public.example");

        let dialler = RecordingDialler::default();
        connect(request, &dialler).await.unwrap();
        let (url, headers) = dialler.seen.lock().unwrap().take().unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(headers[header::HOST], "public.example");
    }

    #[tokio::test]
    async fn https_urls_dial_over_tls() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut first = [0u8; 1];
            socket.read_exact(&mut first).await.unwrap();
            first[0]
        });

        let request = UpgradeRequest::new(Url::parse(&format!("https://{addr}/")).unwrap());
        let err = connect(request, &TungsteniteDialler::default()).await.unwrap_err();
        assert!(!matches!(
            err,
            DialError::WebSocket(WsError::Url(UrlError::TlsFeatureNotEnabled))
        ));
        // 0x16 opens a TLS handshake record.
        assert_eq!(server.await.unwrap(), 0x16);
    }

    #[tokio::test]
    async fn dial_errors_pass_through() {
        let dialler = RecordingDialler {
            fail: true,
            ..Default::default()
        };
        let request = UpgradeRequest::new(Url::parse("http://origin.example/").unwrap());

        let err = connect(request, &dialler).await.unwrap_err();
        assert!(matches!(err, DialError::WebSocket(WsError::ConnectionClosed)));
    }
}
