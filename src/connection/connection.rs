use std::io::{BufReader, Read};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::addr::AddressKey;
use crate::codec::FrameWriter;
use crate::config::Config;
use crate::connection::websocket::WebSocketSession;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode, Tokenizer};
use crate::server::{Handler, Protocol, ServerCore};

enum Transport {
    /// A dedicated accepted stream. `control` is a second handle used to
    /// shut the socket down from any thread.
    Stream {
        writer: Mutex<FrameWriter<TcpStream>>,
        control: TcpStream,
    },
    /// The server's shared socket. Inbound tokens arrive through `queue`;
    /// taking the sender closes it.
    Datagram {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        queue: Mutex<Option<Sender<Vec<u8>>>>,
    },
}

/// Read side handed to a connection's service thread.
pub(crate) enum Inbound {
    Stream(TcpStream),
    Datagrams(Receiver<Vec<u8>>),
}

/// One peer's session.
///
/// A connection is created by its [`Server`](crate::Server) on accept (TCP,
/// WebSocket) or on the first datagram from a new sender (UDP), and is
/// serviced by a dedicated thread that owns the read side and the
/// connection's [`Handler`]. The server's map and the service thread each
/// hold an `Arc`, so removing the map entry never frees a connection whose
/// thread is still running.
///
/// Once a connection stops being live no further messages are dispatched
/// and its socket is released exactly once.
pub struct Connection {
    address: AddressKey,
    protocol: Protocol,
    transport: Transport,
    server: Weak<ServerCore>,
    config: Arc<Config>,
    live: AtomicBool,
    released: AtomicBool,
    handshaken: AtomicBool,
}

impl Connection {
    pub(crate) fn stream(
        address: AddressKey,
        protocol: Protocol,
        stream: TcpStream,
        server: Weak<ServerCore>,
        config: Arc<Config>,
    ) -> Result<(Arc<Self>, Inbound)> {
        let writer = FrameWriter::new(stream.try_clone()?, config.effective_fragment_size());
        let control = stream.try_clone()?;
        let conn = Arc::new(Self {
            address,
            protocol,
            transport: Transport::Stream {
                writer: Mutex::new(writer),
                control,
            },
            server,
            config,
            live: AtomicBool::new(true),
            released: AtomicBool::new(false),
            handshaken: AtomicBool::new(false),
        });
        Ok((conn, Inbound::Stream(stream)))
    }

    pub(crate) fn datagram(
        address: AddressKey,
        peer: SocketAddr,
        socket: Arc<UdpSocket>,
        server: Weak<ServerCore>,
        config: Arc<Config>,
    ) -> (Arc<Self>, Inbound) {
        let (tx, rx) = channel::unbounded();
        let conn = Arc::new(Self {
            address,
            protocol: Protocol::Udp,
            transport: Transport::Datagram {
                socket,
                peer,
                queue: Mutex::new(Some(tx)),
            },
            server,
            config,
            live: AtomicBool::new(true),
            released: AtomicBool::new(false),
            handshaken: AtomicBool::new(false),
        });
        (conn, Inbound::Datagrams(rx))
    }

    /// Spawn the service thread, which keeps its own handle to `self`.
    pub(crate) fn start(self: &Arc<Self>, inbound: Inbound, handler: Box<dyn Handler>) -> Result<()> {
        let conn = Arc::clone(self);
        thread::Builder::new()
            .name(format!("netframe-conn-{}", self.address))
            .spawn(move || conn.run(inbound, handler))?;
        Ok(())
    }

    fn run(self: Arc<Self>, inbound: Inbound, mut handler: Box<dyn Handler>) {
        tracing::debug!("{} connection opened from {}", self.protocol, self.address);

        let result = match inbound {
            Inbound::Stream(stream) if self.protocol == Protocol::WebSocket => {
                WebSocketSession::new(&self).run(stream, handler.as_mut())
            }
            Inbound::Stream(stream) => {
                handler.on_open(&self);
                self.serve_tokens(stream, handler.as_mut())
            }
            Inbound::Datagrams(queue) => {
                handler.on_open(&self);
                self.serve_datagrams(&queue, handler.as_mut());
                Ok(())
            }
        };

        match result {
            Err(err) if self.is_live() => self.fail(&err),
            _ => self.kill(),
        }

        handler.on_close(&self);
        tracing::debug!("{} connection closed for {}", self.protocol, self.address);
    }

    fn serve_tokens(&self, stream: TcpStream, handler: &mut dyn Handler) -> Result<()> {
        let reader = BufReader::with_capacity(self.config.read_buffer_size, stream);
        let mut tokenizer = Tokenizer::new(self.config.limits.max_token_size);

        for byte in reader.bytes() {
            let Some(token) = tokenizer.push(byte?)? else {
                continue;
            };
            if !self.is_live() {
                break;
            }
            tracing::trace!("Token from {}: {} bytes", self.address, token.len());
            handler.on_message(self, Message::from_token(token));
        }
        Ok(())
    }

    fn serve_datagrams(&self, queue: &Receiver<Vec<u8>>, handler: &mut dyn Handler) {
        for token in queue.iter() {
            if !self.is_live() {
                break;
            }
            tracing::trace!("Token from {}: {} bytes", self.address, token.len());
            handler.on_message(self, Message::from_token(token));
        }
    }

    /// Queue a token for the service thread. Returns false once closed.
    pub(crate) fn push_datagram(&self, token: Vec<u8>) -> bool {
        match &self.transport {
            Transport::Datagram { queue, .. } => queue
                .lock()
                .as_ref()
                .is_some_and(|tx| tx.send(token).is_ok()),
            Transport::Stream { .. } => false,
        }
    }

    /// The peer's address key.
    #[must_use]
    pub fn address(&self) -> AddressKey {
        self.address
    }

    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.address.socket_addr()
    }

    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Whether the connection still dispatches and sends.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Whether the WebSocket handshake has completed. Always false for TCP
    /// and UDP connections.
    #[must_use]
    pub fn is_handshaken(&self) -> bool {
        self.handshaken.load(Ordering::Acquire)
    }

    pub(crate) fn mark_handshaken(&self) {
        self.handshaken.store(true, Ordering::Release);
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Send a message to the peer.
    ///
    /// TCP connections write the payload bytes as given. UDP connections
    /// send them as one datagram. WebSocket connections frame the message
    /// as text or binary, fragmenting payloads over 65535 bytes; the whole
    /// message is written before any other sender can interleave.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` if the connection is no longer live
    /// - `Error::HandshakeIncomplete` for a WebSocket that has not upgraded
    /// - the transport error, after which the connection is failed
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        if !self.is_live() {
            return Err(Error::ConnectionClosed);
        }
        let message = message.into();

        let result = match &self.transport {
            Transport::Stream { writer, .. } if self.protocol == Protocol::WebSocket => {
                if !self.is_handshaken() {
                    return Err(Error::HandshakeIncomplete);
                }
                let opcode = if message.is_text() {
                    OpCode::Text
                } else {
                    OpCode::Binary
                };
                writer.lock().write_message(opcode, message.payload())
            }
            Transport::Stream { writer, .. } => writer.lock().write_raw(message.payload()),
            Transport::Datagram { socket, peer, .. } => socket
                .send_to(message.payload(), *peer)
                .map(drop)
                .map_err(Error::from),
        };

        if let Err(err) = &result {
            self.fail(err);
        }
        result
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send(Message::text(text))
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn send_binary(&self, data: &[u8]) -> Result<()> {
        self.send(Message::binary(data))
    }

    /// Write bytes straight to the stream, ignoring the handshake state.
    pub(crate) fn write_raw(&self, data: &[u8]) -> Result<()> {
        match &self.transport {
            Transport::Stream { writer, .. } => writer.lock().write_raw(data),
            Transport::Datagram { .. } => Err(Error::Io("raw writes need a stream".into())),
        }
    }

    /// Write one frame straight to the stream.
    pub(crate) fn write_frame(&self, frame: &Frame) -> Result<()> {
        match &self.transport {
            Transport::Stream { writer, .. } => {
                let mut writer = writer.lock();
                writer.write_frame(frame)?;
                writer.flush()
            }
            Transport::Datagram { .. } => Err(Error::Io("frames need a stream".into())),
        }
    }

    /// Stop dispatching and release the socket.
    ///
    /// The service thread notices, removes the map entry if it is still
    /// this connection and calls `on_close`. A UDP connection drops its
    /// queue; the shared server socket stays open.
    pub fn close(&self) {
        self.live.store(false, Ordering::Release);
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.transport {
            Transport::Stream { control, .. } => {
                let _ = control.shutdown(Shutdown::Both);
            }
            Transport::Datagram { queue, .. } => {
                queue.lock().take();
            }
        }
    }

    /// Remove this connection from its server's map, then close it.
    ///
    /// An entry that has since been replaced by a newer connection for the
    /// same address is left alone.
    pub fn kill(&self) {
        if let Some(server) = self.server.upgrade() {
            server.remove_if_same(&self.address, self);
        }
        self.close();
    }

    /// Tear the connection down after a transport or protocol error.
    ///
    /// A peer that simply went away is logged at debug level; anything else
    /// is a warning.
    pub fn fail(&self, error: &Error) {
        if self.is_live() {
            if error.is_disconnect() {
                tracing::debug!("Connection {} dropped: {}", self.address, error);
            } else {
                tracing::warn!("Connection {} failed: {}", self.address, error);
            }
        }
        self.kill();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("protocol", &self.protocol)
            .field("live", &self.is_live())
            .field("handshaken", &self.is_handshaken())
            .finish_non_exhaustive()
    }
}
