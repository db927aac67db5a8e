//! WebSocket opening handshake.
//!
//! The request arrives as the token sequence produced by
//! [`Tokenizer`](crate::protocol::Tokenizer): the request line's three
//! tokens, then headers written as a `Name:` token followed by its value
//! tokens. Parsing is stateless and reports which requirement failed.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::crypto::{base64_encode, sha1_digest};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Response sent when an upgrade request is rejected.
pub const REJECT_RESPONSE: &[u8] =
    b"HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\nContent-Length: 0\r\n\r\n";

/// Why an upgrade request was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandshakeError {
    /// Fewer than three tokens before the blank line.
    #[error("request line incomplete")]
    EmptyRequest,

    /// Method was not `GET`.
    #[error("expected GET method, got {0}")]
    BadMethod(String),

    /// Path was not `/`.
    #[error("expected path /, got {0}")]
    BadPath(String),

    /// HTTP version was not `HTTP/1.1`.
    #[error("expected HTTP/1.1, got {0}")]
    BadHttpVersion(String),

    /// No `Sec-WebSocket-Key` header.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    /// `Sec-WebSocket-Version` missing or not `13`.
    #[error("unsupported Sec-WebSocket-Version: {0:?}")]
    BadVersion(Option<String>),

    /// `Upgrade` missing or not `websocket`.
    #[error("invalid Upgrade header: {0:?}")]
    BadUpgrade(Option<String>),

    /// `Connection` missing or not `Upgrade`.
    #[error("invalid Connection header: {0:?}")]
    BadConnection(Option<String>),
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use netframe::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut input = String::with_capacity(key.len() + WS_GUID.len());
    input.push_str(key);
    input.push_str(WS_GUID);
    base64_encode(&sha1_digest(input.as_bytes()))
}

/// Group header tokens into name → values.
///
/// A token ending in `:` starts a header; tokens before the first header
/// name are dropped.
fn group_headers<S: AsRef<str>>(tokens: &[S]) -> BTreeMap<String, Vec<String>> {
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for token in tokens {
        let token = token.as_ref();
        if let Some(name) = token.strip_suffix(':') {
            headers.entry(name.to_string()).or_default();
            current = Some(name.to_string());
        } else if let Some(name) = &current {
            headers.entry(name.clone()).or_default().push(token.to_string());
        }
    }

    headers
}

/// A validated WebSocket upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    headers: BTreeMap<String, Vec<String>>,
    key: String,
}

impl HandshakeRequest {
    /// Parse and validate a request from its tokens.
    ///
    /// Header names and values are compared exactly, case included.
    ///
    /// # Errors
    ///
    /// Returns the first [`HandshakeError`] found, checking the request
    /// line, then `Sec-WebSocket-Key`, then `Sec-WebSocket-Version`,
    /// `Upgrade` and `Connection`.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, HandshakeError> {
        let [method, path, version, rest @ ..] = tokens else {
            return Err(HandshakeError::EmptyRequest);
        };
        let (method, path, version) = (method.as_ref(), path.as_ref(), version.as_ref());

        if method != "GET" {
            return Err(HandshakeError::BadMethod(method.to_string()));
        }
        if path != "/" {
            return Err(HandshakeError::BadPath(path.to_string()));
        }
        if version != "HTTP/1.1" {
            return Err(HandshakeError::BadHttpVersion(version.to_string()));
        }

        let headers = group_headers(rest);
        let first = |name: &str| {
            headers
                .get(name)
                .and_then(|values| values.first())
                .cloned()
        };

        let key = first("Sec-WebSocket-Key").ok_or(HandshakeError::MissingKey)?;

        let ws_version = first("Sec-WebSocket-Version");
        if ws_version.as_deref() != Some("13") {
            return Err(HandshakeError::BadVersion(ws_version));
        }

        let upgrade = first("Upgrade");
        if upgrade.as_deref() != Some("websocket") {
            return Err(HandshakeError::BadUpgrade(upgrade));
        }

        let connection = first("Connection");
        if connection.as_deref() != Some("Upgrade") {
            return Err(HandshakeError::BadConnection(connection));
        }

        Ok(Self { headers, key })
    }

    /// The client's Sec-WebSocket-Key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// All values recorded for a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers.get(name).map(Vec::as_slice)
    }

    /// Build the 101 response for this request.
    #[must_use]
    pub fn response(&self) -> HandshakeResponse {
        HandshakeResponse {
            accept: compute_accept_key(&self.key),
        }
    }
}

/// The server's `101 Switching Protocols` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
}

impl HandshakeResponse {
    /// Write the HTTP response to a buffer.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    /// Serialize to a new buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        self.write(&mut buf);
        buf
    }
}
