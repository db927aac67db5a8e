//! Configuration and limits for servers and their connections.

use std::time::Duration;

/// Largest payload a single outgoing frame can carry (16-bit extended length).
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Resource limits applied to every connection.
///
/// These bound how much a peer can make a connection buffer before it
/// is failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a reassembled WebSocket message in bytes.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of request bytes buffered while handshaking.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,

    /// Maximum length of one delimited TCP or UDP token.
    ///
    /// Default: 64 KB (64 * 1024)
    pub max_token_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_handshake_size: 8192,
            max_token_size: 64 * 1024,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(max_message_size: usize, max_handshake_size: usize, max_token_size: usize) -> Self {
        Self {
            max_message_size,
            max_handshake_size,
            max_token_size,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// What an established WebSocket connection does with an incoming ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PingPolicy {
    /// Log the ping and send nothing back.
    #[default]
    Ignore,
    /// Answer with a pong carrying the ping's payload.
    Reply,
}

/// Server and connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the server binds to.
    ///
    /// Default: `0.0.0.0:0`
    pub listen_addr: String,

    /// Resource limits.
    pub limits: Limits,

    /// Fragment size for outgoing WebSocket messages (in bytes).
    ///
    /// Messages larger than this are split into continuation frames.
    /// Values above [`MAX_FRAME_PAYLOAD`] are clamped.
    ///
    /// Default: 65535
    pub fragment_size: usize,

    /// Response to WebSocket pings.
    ///
    /// Default: [`PingPolicy::Ignore`]
    pub ping_policy: PingPolicy,

    /// Per-connection read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Receive buffer for one UDP datagram (in bytes).
    ///
    /// Default: 65536
    pub datagram_buffer_size: usize,

    /// Disable Nagle's algorithm on accepted TCP streams.
    ///
    /// Default: true
    pub nodelay: bool,

    /// Read timeout for accepted TCP streams. A timeout fails the connection.
    ///
    /// Default: None
    pub read_timeout: Option<Duration>,

    /// Write timeout for accepted TCP streams.
    ///
    /// Default: None
    pub write_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:0".to_string(),
            limits: Limits::default(),
            fragment_size: MAX_FRAME_PAYLOAD,
            ping_policy: PingPolicy::default(),
            read_buffer_size: 8192,
            datagram_buffer_size: 65536,
            nodelay: true,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind on all interfaces at `port`.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.listen_addr = format!("0.0.0.0:{port}");
        self
    }

    /// Set the listen address (`host:port`).
    #[must_use]
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set fragment size for outgoing messages.
    #[must_use]
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    /// Set the ping policy.
    #[must_use]
    pub fn with_ping_policy(mut self, policy: PingPolicy) -> Self {
        self.ping_policy = policy;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the datagram receive buffer size.
    #[must_use]
    pub fn with_datagram_buffer_size(mut self, size: usize) -> Self {
        self.datagram_buffer_size = size;
        self
    }

    /// Enable or disable `TCP_NODELAY` on accepted streams.
    #[must_use]
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Set read and write timeouts for accepted streams.
    #[must_use]
    pub fn with_timeouts(mut self, read: Option<Duration>, write: Option<Duration>) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    /// Fragment size actually used on the wire.
    #[must_use]
    pub fn effective_fragment_size(&self) -> usize {
        self.fragment_size.clamp(1, MAX_FRAME_PAYLOAD)
    }
}
