//! # netframe - Thread-per-connection TCP, UDP and WebSocket servers
//!
//! `netframe` runs blocking network servers where every peer gets its own
//! [`Connection`] and its own service thread. Applications plug in through
//! the [`Handler`] hooks.
//!
//! ## Features
//!
//! - **TCP** servers that deliver whitespace/CRLF-delimited tokens
//! - **UDP** servers that demultiplex datagrams into per-sender connections
//! - **WebSocket** servers with the RFC 6455 upgrade handshake, masking,
//!   fragmentation and control frames
//! - **Safe teardown**: connections outlive their map entry until their
//!   service thread returns, and `stop()` never deadlocks from a hook
//!
//! ## Quick Start
//!
//! ```no_run
//! use netframe::{AddressKey, Config, Connection, Handler, Message, Server};
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     fn on_message(&mut self, conn: &Connection, message: Message) {
//!         let _ = conn.send(message);
//!     }
//! }
//!
//! let server = Server::tcp(Config::new().with_port(7000), |_: &AddressKey| Echo)?;
//! server.start()?;
//! # Ok::<(), netframe::Error>(())
//! ```

pub mod addr;
pub mod codec;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod message;
pub mod protocol;
pub mod server;

pub use addr::AddressKey;
pub use config::{Config, Limits, PingPolicy};
pub use connection::{Connection, SessionState};
pub use error::{Error, Result};
pub use message::Message;
pub use protocol::{HandshakeError, OpCode, WS_GUID, compute_accept_key};
pub use server::{Handler, HandlerFactory, Protocol, Server};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
