//! Application hooks.

use crate::addr::AddressKey;
use crate::connection::Connection;
use crate::message::Message;
use crate::protocol::HandshakeError;

/// Per-connection event hooks.
///
/// One handler is created for each connection and is driven only by that
/// connection's service thread, so hooks for a single peer never run
/// concurrently. Every method has a default; `on_message` logs.
pub trait Handler: Send + 'static {
    /// The connection is ready. WebSocket connections call this after a
    /// successful handshake; TCP and UDP connections as soon as they start.
    fn on_open(&mut self, conn: &Connection) {
        let _ = conn;
    }

    /// A token (TCP, UDP) or a reassembled message (WebSocket) arrived.
    fn on_message(&mut self, conn: &Connection, message: Message) {
        tracing::info!("Message from {}: {:?}", conn.address(), message);
    }

    /// The service loop has ended. Called exactly once per connection.
    fn on_close(&mut self, conn: &Connection) {
        let _ = conn;
    }

    /// An upgrade request was rejected with a 404. The connection stays up
    /// and waits for another request unless the handler closes it.
    fn on_handshake_rejected(&mut self, conn: &Connection, error: &HandshakeError) {
        let _ = (conn, error);
    }
}

/// Builds the handler for each new connection.
///
/// Implemented for any `Fn(&AddressKey) -> impl Handler`.
pub trait HandlerFactory: Send + Sync + 'static {
    fn make_handler(&self, address: &AddressKey) -> Box<dyn Handler>;
}

impl<F, H> HandlerFactory for F
where
    F: Fn(&AddressKey) -> H + Send + Sync + 'static,
    H: Handler,
{
    fn make_handler(&self, address: &AddressKey) -> Box<dyn Handler> {
        Box::new(self(address))
    }
}
