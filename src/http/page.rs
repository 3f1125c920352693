//! Fallback page for plain HTTP requests hitting the upgrade endpoint.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Served verbatim when a request carries no upgrade headers.
pub const NON_UPGRADE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>WebSocket bridge</title>
</head>
<body>
  <h1>This endpoint only accepts WebSocket connections</h1>
  <p>
    You reached a socket bridge. It forwards raw TCP traffic carried over a
    WebSocket upgrade and cannot serve ordinary web pages.
  </p>
  <p>Connect with a client that performs the WebSocket handshake.</p>
</body>
</html>
"#;

pub fn non_upgrade_response() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
        NON_UPGRADE_PAGE,
    )
        .into_response()
}
