//! Error types for the server framework and the WebSocket engine.
//!
//! Transport failures, protocol violations and resource limits all surface
//! through [`Error`]. Handshake rejections carry their own
//! [`HandshakeError`](crate::protocol::HandshakeError) so callers can tell
//! which requirement was not met.

use thiserror::Error;

use crate::protocol::handshake::HandshakeError;

/// Result type alias for netframe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving connections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// I/O error on a socket.
    #[error("I/O error: {0}")]
    Io(String),

    /// The connection is no longer live.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A WebSocket message was sent before the handshake completed.
    #[error("WebSocket handshake not complete")]
    HandshakeIncomplete,

    /// The client's upgrade request was rejected.
    #[error("Handshake rejected: {0}")]
    Handshake(#[from] HandshakeError),

    /// Frame announced a 64-bit extended payload length (length code 127).
    #[error("64-bit extended payload length is not supported")]
    UnsupportedPayloadLength,

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Frame payload does not fit the 16-bit extended length.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Reassembled message exceeds the configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A delimited token exceeds the configured maximum.
    #[error("Token too large: {size} bytes (max: {max})")]
    TokenTooLarge {
        /// Actual token size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Handshake request exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Buffered request size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The listen address could not be resolved.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Input was not valid base64.
    #[error("Invalid base64: {0}")]
    Base64(String),
}

impl Error {
    /// Whether this error means the peer went away rather than misbehaved.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::ConnectionClosed)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            _ => Error::Io(err.to_string()),
        }
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Base64(err.to_string())
    }
}
