//! Per-peer connections and their service loops.
//!
//! ## Connection Lifecycle
//!
//! 1. **Created** - by the server on accept or on a first datagram
//! 2. **Live** - the service thread dispatches tokens or messages
//! 3. **Closed** - `close`, `kill` or `fail` released the socket; the
//!    service thread removes the map entry and calls `on_close`
//!
//! WebSocket connections additionally pass through [`SessionState`]:
//! `Handshaking` until an upgrade request is accepted, then `Established`.

#[allow(clippy::module_inception)]
mod connection;
mod fragmenter;
mod state;
mod websocket;

pub use connection::Connection;
pub(crate) use connection::Inbound;
pub use fragmenter::MessageFragmenter;
pub use state::SessionState;
