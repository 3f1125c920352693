//! Header sanitizing for outbound upgrades.
//!
//! # Responsibilities
//! - Remove upgrade-negotiation headers before a request is forwarded
//! - Force `Host` to the host of the original request
//!
//! # Design Decisions
//! - The dialer generates its own negotiation headers; forwarding the
//!   client's would corrupt the new handshake
//! - The stripped set is an explicit `StripList` value, not global state

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Headers the dialer negotiates itself.
pub const DEFAULT_STRIPPED_HEADERS: [HeaderName; 5] = [
    header::UPGRADE,
    header::CONNECTION,
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
];

/// Set of header names removed by [`sanitize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripList(Vec<HeaderName>);

impl StripList {
    pub fn new(names: impl IntoIterator<Item = HeaderName>) -> Self {
        Self(names.into_iter().collect())
    }

    pub fn names(&self) -> &[HeaderName] {
        &self.0
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.0.contains(name)
    }
}

impl Default for StripList {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPPED_HEADERS)
    }
}

/// Copy `headers` without the stripped names and with `Host` set to `host`.
///
/// An unrepresentable `host` drops the header entirely rather than
/// forwarding the client's value.
pub fn sanitize(headers: &HeaderMap, host: &str, strip: &StripList) -> HeaderMap {
    let mut sanitized = headers.clone();
    for name in strip.names() {
        sanitized.remove(name);
    }

    match HeaderValue::from_str(host) {
        Ok(value) if !host.is_empty() => {
            sanitized.insert(header::HOST, value);
        }
        _ => {
            tracing::warn!(host = %host, "Dropping unusable Host header");
            sanitized.remove(header::HOST);
        }
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("stale.example"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="));
        headers.insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        headers.insert(
            header::SEC_WEBSOCKET_EXTENSIONS,
            HeaderValue::from_static("permessage-deflate"),
        );
        headers.append("x-trace", HeaderValue::from_static("a"));
        headers.append("x-trace", HeaderValue::from_static("b"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer token"));
        headers
    }

    #[test]
    fn strips_negotiation_headers_and_forces_host() {
        let sanitized = sanitize(&client_headers(), "origin.example:8443", &StripList::default());

        for name in DEFAULT_STRIPPED_HEADERS.iter() {
            assert!(!sanitized.contains_key(name), "{name} survived sanitizing");
        }
        assert_eq!(sanitized[header::HOST], "origin.example:8443");
        assert_eq!(sanitized[header::AUTHORIZATION], "Bearer token");
        let traces: Vec<_> = sanitized.get_all("x-trace").iter().collect();
        assert_eq!(traces, ["a", "b"]);
    }

    #[test]
    fn leaves_input_untouched() {
        let original = client_headers();
        let _ = sanitize(&original, "origin.example", &StripList::default());
        assert_eq!(original, client_headers());
    }

    #[test]
    fn host_is_set_even_when_absent() {
        let sanitized = sanitize(&HeaderMap::new(), "origin.example", &StripList::default());
        assert_eq!(sanitized[header::HOST], "origin.example");
    }

    #[test]
    fn custom_strip_list_is_honored() {
        let strip = StripList::new([header::AUTHORIZATION]);
        let sanitized = sanitize(&client_headers(), "origin.example", &strip);

        assert!(!sanitized.contains_key(header::AUTHORIZATION));
        assert!(sanitized.contains_key(header::UPGRADE));
        assert!(strip.contains(&header::AUTHORIZATION));
    }
}
