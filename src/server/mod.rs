//! Listening servers and their connection maps.
//!
//! A [`Server`] owns one bound socket and one service thread. The TCP and
//! WebSocket variants accept streams; the UDP variant demultiplexes
//! datagrams by sender. Either way each peer becomes a [`Connection`]
//! keyed by its [`AddressKey`], serviced on its own thread and driven by a
//! [`Handler`] built by the server's [`HandlerFactory`].
//!
//! ## Example
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
//! let server = Server::websocket(Config::new().with_port(8080), |_: &AddressKey| Echo)?;
//! server.start()?;
//! # Ok::<(), netframe::Error>(())
//! ```

mod handler;

pub use handler::{Handler, HandlerFactory};

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::addr::AddressKey;
use crate::config::Config;
use crate::connection::{Connection, Inbound};
use crate::error::{Error, Result};
use crate::protocol::Tokenizer;

/// Which service loop a server and its connections run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Whitespace-delimited tokens over TCP.
    Tcp,
    /// Whitespace-delimited tokens over UDP, one connection per sender.
    Udp,
    /// RFC 6455 framing after an HTTP upgrade.
    WebSocket,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::WebSocket => write!(f, "websocket"),
        }
    }
}

enum Listener {
    Stream(TcpListener),
    Datagram(Arc<UdpSocket>),
}

/// State shared by a server, its service thread and (weakly) its connections.
pub(crate) struct ServerCore {
    protocol: Protocol,
    config: Arc<Config>,
    factory: Box<dyn HandlerFactory>,
    listener: Listener,
    local_addr: SocketAddr,
    live: AtomicBool,
    connections: Mutex<HashMap<AddressKey, Arc<Connection>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ServerCore {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Remove the entry for `address` if it is still `conn`.
    pub(crate) fn remove_if_same(&self, address: &AddressKey, conn: &Connection) {
        let removed = {
            let mut connections = self.connections.lock();
            match connections.get(address) {
                Some(current) if std::ptr::eq(Arc::as_ptr(current), conn) => {
                    connections.remove(address)
                }
                _ => None,
            }
        };
        drop(removed);
    }

    fn run(self: Arc<Self>) {
        tracing::debug!("{} server listening on {}", self.protocol, self.local_addr);
        match &self.listener {
            Listener::Stream(listener) => self.accept_loop(listener),
            Listener::Datagram(socket) => self.receive_loop(socket),
        }
        tracing::debug!("{} server on {} stopped", self.protocol, self.local_addr);
    }

    fn accept_loop(self: &Arc<Self>, listener: &TcpListener) {
        while self.is_live() {
            let (stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    if self.is_live() {
                        tracing::error!("Accept failed on {}: {}", self.local_addr, e);
                        self.shutdown();
                    }
                    break;
                }
            };
            if !self.is_live() {
                break;
            }
            if let Err(e) = self.admit_stream(stream, peer) {
                tracing::warn!("Could not admit {}: {}", peer, e);
            }
        }
    }

    fn admit_stream(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        stream.set_nodelay(self.config.nodelay)?;
        stream.set_read_timeout(self.config.read_timeout)?;
        stream.set_write_timeout(self.config.write_timeout)?;

        let address = AddressKey::new(peer);
        let handler = self.factory.make_handler(&address);
        let (conn, inbound) = Connection::stream(
            address,
            self.protocol,
            stream,
            Arc::downgrade(self),
            Arc::clone(&self.config),
        )?;

        let replaced = self.connections.lock().insert(address, Arc::clone(&conn));
        if let Some(old) = replaced {
            tracing::debug!("Replacing stale connection for {}", address);
            old.close();
        }

        if let Err(e) = conn.start(inbound, handler) {
            self.remove_if_same(&address, &conn);
            conn.close();
            return Err(e);
        }
        Ok(())
    }

    fn receive_loop(self: &Arc<Self>, socket: &Arc<UdpSocket>) {
        let mut buf = vec![0u8; self.config.datagram_buffer_size.max(1)];
        let max_token_size = self.config.limits.max_token_size;

        while self.is_live() {
            let (n, peer) = match socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) => {
                    if self.is_live() {
                        tracing::error!("Receive failed on {}: {}", self.local_addr, e);
                        self.shutdown();
                    }
                    break;
                }
            };
            if !self.is_live() {
                break;
            }

            // The end of a datagram also ends its last token.
            let tokens = match Tokenizer::split(&buf[..n], max_token_size) {
                Ok(tokens) => tokens,
                Err(e) => {
                    tracing::warn!("Dropping datagram from {}: {}", peer, e);
                    continue;
                }
            };
            if tokens.is_empty() {
                continue;
            }

            let address = AddressKey::new(peer);
            match self.datagram_connection(address, peer, socket) {
                Ok(conn) => {
                    for token in tokens {
                        if !conn.push_datagram(token) {
                            break;
                        }
                    }
                }
                Err(e) => tracing::warn!("Could not admit {}: {}", peer, e),
            }
        }
    }

    /// Look up the live connection for `address`, creating it on first contact.
    fn datagram_connection(
        self: &Arc<Self>,
        address: AddressKey,
        peer: SocketAddr,
        socket: &Arc<UdpSocket>,
    ) -> Result<Arc<Connection>> {
        if let Some(conn) = self.connections.lock().get(&address) {
            if conn.is_live() {
                return Ok(Arc::clone(conn));
            }
        }

        let handler = self.factory.make_handler(&address);
        let (conn, inbound) = Connection::datagram(
            address,
            peer,
            Arc::clone(socket),
            Arc::downgrade(self),
            Arc::clone(&self.config),
        );

        let replaced = self.connections.lock().insert(address, Arc::clone(&conn));
        if let Some(old) = replaced {
            old.close();
        }

        if let Err(e) = conn.start(inbound, handler) {
            self.remove_if_same(&address, &conn);
            conn.close();
            return Err(e);
        }
        Ok(conn)
    }

    /// Address the service loop can reach itself on.
    fn wake_addr(&self) -> SocketAddr {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            let loopback = match addr.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            addr.set_ip(loopback);
        }
        addr
    }

    /// Unblock a service loop parked in `accept` or `recv_from`.
    fn wake(&self) {
        let target = self.wake_addr();
        let result = match &self.listener {
            Listener::Stream(_) => TcpStream::connect(target).map(drop),
            Listener::Datagram(socket) => socket.send_to(&[], target).map(drop),
        };
        if let Err(e) = result {
            tracing::debug!("Wake-up of {} failed: {}", self.local_addr, e);
        }
    }

    /// Stop the service loop and close every connection. Idempotent.
    fn shutdown(&self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }

        let handle = self.thread.lock().take();
        let on_loop_thread = handle
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id());
        if !on_loop_thread {
            self.wake();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    tracing::error!("Service thread for {} panicked", self.local_addr);
                }
            }
        }

        let drained: Vec<Arc<Connection>> = self
            .connections
            .lock()
            .drain()
            .map(|(_, conn)| conn)
            .collect();
        for conn in drained {
            conn.close();
        }
    }
}

/// A multithreaded TCP, UDP or WebSocket server.
///
/// Binding happens on construction; [`Server::start`] spawns the service
/// thread. Dropping the server stops it.
pub struct Server {
    core: Arc<ServerCore>,
}

impl Server {
    /// Bind `config.listen_addr` for `protocol`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAddress` if the address does not resolve, or
    /// the bind error.
    pub fn bind(protocol: Protocol, config: Config, factory: impl HandlerFactory) -> Result<Self> {
        let addr = config
            .listen_addr
            .to_socket_addrs()
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", config.listen_addr, e)))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(config.listen_addr.clone()))?;

        let listener = match protocol {
            Protocol::Tcp | Protocol::WebSocket => Listener::Stream(TcpListener::bind(addr)?),
            Protocol::Udp => Listener::Datagram(Arc::new(UdpSocket::bind(addr)?)),
        };
        let local_addr = match &listener {
            Listener::Stream(listener) => listener.local_addr()?,
            Listener::Datagram(socket) => socket.local_addr()?,
        };

        Ok(Self {
            core: Arc::new(ServerCore {
                protocol,
                config: Arc::new(config),
                factory: Box::new(factory),
                listener,
                local_addr,
                live: AtomicBool::new(false),
                connections: Mutex::new(HashMap::new()),
                thread: Mutex::new(None),
            }),
        })
    }

    /// A server whose connections read whitespace-delimited tokens.
    ///
    /// # Errors
    ///
    /// See [`Server::bind`].
    pub fn tcp(config: Config, factory: impl HandlerFactory) -> Result<Self> {
        Self::bind(Protocol::Tcp, config, factory)
    }

    /// A UDP server with one connection per sending address.
    ///
    /// # Errors
    ///
    /// See [`Server::bind`].
    pub fn udp(config: Config, factory: impl HandlerFactory) -> Result<Self> {
        Self::bind(Protocol::Udp, config, factory)
    }

    /// A WebSocket server.
    ///
    /// # Errors
    ///
    /// See [`Server::bind`].
    pub fn websocket(config: Config, factory: impl HandlerFactory) -> Result<Self> {
        Self::bind(Protocol::WebSocket, config, factory)
    }

    /// Spawn the service thread. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        // Held until the handle is stored, so a concurrent `stop` that has
        // already cleared `live` waits here and then joins this thread.
        let mut slot = self.core.thread.lock();
        if self
            .core
            .live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name(format!("netframe-server-{}", self.core.local_addr))
            .spawn(move || core.run());
        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.core.live.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Stop the service thread and close every connection. Idempotent.
    ///
    /// Connection threads are not joined; each one ends once its socket is
    /// released, and calls its handler's `on_close` on the way out.
    pub fn stop(&self) {
        self.core.shutdown();
    }

    /// Remove and close the connection for `address`.
    ///
    /// Returns whether an entry was present.
    pub fn kill(&self, address: &AddressKey) -> bool {
        let removed = self.core.connections.lock().remove(address);
        match removed {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Whether the service loop is not running.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        !self.core.is_live()
    }

    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.core.protocol
    }

    /// The bound address, with the OS-assigned port when binding port 0.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.core.local_addr
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Number of connections in the map.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.core.connections.lock().len()
    }

    /// The connection for `address`, if mapped.
    #[must_use]
    pub fn connection(&self, address: &AddressKey) -> Option<Arc<Connection>> {
        self.core.connections.lock().get(address).cloned()
    }

    /// Addresses currently mapped, in sorted order.
    #[must_use]
    pub fn addresses(&self) -> Vec<AddressKey> {
        let mut addresses: Vec<_> = self.core.connections.lock().keys().copied().collect();
        addresses.sort();
        addresses
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("protocol", &self.core.protocol)
            .field("local_addr", &self.core.local_addr)
            .field("live", &self.core.is_live())
            .finish_non_exhaustive()
    }
}
