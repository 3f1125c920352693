//! WebSocket handshake primitives.
//!
//! # Responsibilities
//! - Compute `Sec-WebSocket-Accept` from a client nonce (RFC 6455 §1.3)
//! - Detect whether a request asks for a WebSocket upgrade
//! - Validate the upgrade request before the server commits to a 101
//!
//! Frame encoding after the handshake belongs to tokio-tungstenite.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use thiserror::Error;

/// GUID appended to the client nonce before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version accepted on the server path.
pub const WEBSOCKET_VERSION: &str = "13";

/// Compute the `Sec-WebSocket-Accept` value for `nonce`.
pub fn accept_key(nonce: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// True when `Connection` carries the `upgrade` token and `Upgrade` names `websocket`.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    has_token(headers, header::CONNECTION, "upgrade") && has_token(headers, header::UPGRADE, "websocket")
}

fn has_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}

/// Reasons an upgrade request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("websocket upgrade requires GET, got {0}")]
    MethodNotAllowed(Method),

    #[error("unsupported Sec-WebSocket-Version")]
    UnsupportedVersion,

    #[error("missing or empty Sec-WebSocket-Key")]
    MissingKey,

    #[error("connection cannot be upgraded")]
    NotUpgradable,
}

impl HandshakeError {
    /// Status code written back to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            HandshakeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            HandshakeError::UnsupportedVersion | HandshakeError::MissingKey => StatusCode::BAD_REQUEST,
            HandshakeError::NotUpgradable => StatusCode::UPGRADE_REQUIRED,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HandshakeError::MethodNotAllowed(_) => "method",
            HandshakeError::UnsupportedVersion => "version",
            HandshakeError::MissingKey => "key",
            HandshakeError::NotUpgradable => "not_upgradable",
        }
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self == HandshakeError::UnsupportedVersion {
            let version = HeaderValue::from_static(WEBSOCKET_VERSION);
            return (status, [(header::SEC_WEBSOCKET_VERSION, version)]).into_response();
        }
        status.into_response()
    }
}

/// Check an upgrade request and return the client nonce.
pub fn validate_upgrade(method: &Method, headers: &HeaderMap) -> Result<String, HandshakeError> {
    if *method != Method::GET {
        return Err(HandshakeError::MethodNotAllowed(method.clone()));
    }

    let version_ok = headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == WEBSOCKET_VERSION);
    if !version_ok {
        return Err(HandshakeError::UnsupportedVersion);
    }

    headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .ok_or(HandshakeError::MissingKey)
}

/// Build the `101 Switching Protocols` response for a validated nonce.
pub fn switching_protocols(nonce: &str) -> Response {
    let accept = match HeaderValue::from_str(&accept_key(nonce)) {
        Ok(value) => value,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    (
        StatusCode::SWITCHING_PROTOCOLS,
        [
            (header::CONNECTION, HeaderValue::from_static("upgrade")),
            (header::UPGRADE, HeaderValue::from_static("websocket")),
            (header::SEC_WEBSOCKET_ACCEPT, accept),
        ],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
        headers.insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        headers.insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="));
        headers
    }

    #[test]
    fn accept_key_matches_rfc_vector() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn accept_key_is_deterministic() {
        assert_eq!(accept_key("abc"), accept_key("abc"));
        assert_ne!(accept_key("abc"), accept_key("abd"));
    }

    #[test]
    fn detects_upgrade_tokens_case_insensitively() {
        assert!(is_upgrade_request(&upgrade_headers()));

        let mut plain = upgrade_headers();
        plain.remove(header::UPGRADE);
        assert!(!is_upgrade_request(&plain));

        let mut no_connection = upgrade_headers();
        no_connection.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        assert!(!is_upgrade_request(&no_connection));
    }

    #[test]
    fn validate_returns_nonce() {
        let nonce = validate_upgrade(&Method::GET, &upgrade_headers()).unwrap();
        assert_eq!(nonce, "dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn validate_rejects_bad_requests() {
        assert_eq!(
            validate_upgrade(&Method::POST, &upgrade_headers()),
            Err(HandshakeError::MethodNotAllowed(Method::POST))
        );

        let mut old_version = upgrade_headers();
        old_version.insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("8"));
        assert_eq!(validate_upgrade(&Method::GET, &old_version), Err(HandshakeError::UnsupportedVersion));

        let mut empty_key = upgrade_headers();
        empty_key.insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_static(""));
        assert_eq!(validate_upgrade(&Method::GET, &empty_key), Err(HandshakeError::MissingKey));
    }

    #[test]
    fn unsupported_version_advertises_13() {
        let response = HandshakeError::UnsupportedVersion.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::SEC_WEBSOCKET_VERSION], "13");
    }

    #[test]
    fn switching_protocols_carries_accept() {
        let response = switching_protocols("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.headers()[header::SEC_WEBSOCKET_ACCEPT], "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }
}
