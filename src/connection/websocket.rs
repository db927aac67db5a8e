//! The WebSocket service loop.
//!
//! A session tokenizes the stream until a blank line closes an upgrade
//! request, answers it with 101 or 404, and once upgraded reads frames
//! until the peer closes or something fails.

use std::io::{BufRead, BufReader, Read};
use std::net::TcpStream;

use crate::config::PingPolicy;
use crate::connection::{Connection, SessionState};
use crate::error::{Error, Result};
use crate::protocol::{Frame, HandshakeRequest, MessageAssembler, OpCode, REJECT_RESPONSE, Tokenizer};
use crate::server::Handler;

pub(crate) struct WebSocketSession<'a> {
    conn: &'a Connection,
    state: SessionState,
    request: Vec<String>,
    request_size: usize,
    assembler: MessageAssembler,
}

impl<'a> WebSocketSession<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            state: SessionState::Handshaking,
            request: Vec::new(),
            request_size: 0,
            assembler: MessageAssembler::new(conn.config().limits.clone()),
        }
    }

    /// Serve the connection until the peer leaves or the session fails.
    ///
    /// `Ok` means the peer closed the stream or sent a Close frame.
    pub(crate) fn run(mut self, stream: TcpStream, handler: &mut dyn Handler) -> Result<()> {
        let mut reader = BufReader::with_capacity(self.conn.config().read_buffer_size, stream);
        if !self.handshake(&mut reader, handler)? {
            return Ok(());
        }
        self.read_frames(&mut reader, handler)
    }

    /// Returns true once upgraded, false if the stream ended first.
    fn handshake<R: BufRead>(&mut self, reader: &mut R, handler: &mut dyn Handler) -> Result<bool> {
        let conn = self.conn;
        let limits = &conn.config().limits;
        let mut tokenizer = Tokenizer::new(limits.max_token_size);

        for byte in reader.bytes() {
            let Some(token) = tokenizer.push(byte?)? else {
                continue;
            };
            if !self.conn.is_live() {
                return Ok(false);
            }

            if token.is_empty() {
                // Blank lines before a request are noise.
                if self.request.is_empty() {
                    continue;
                }
                self.finish_request(handler)?;
                if self.state.can_send() {
                    return Ok(true);
                }
                continue;
            }

            self.request_size += token.len();
            limits.check_handshake_size(self.request_size)?;
            self.request.push(String::from_utf8_lossy(&token).into_owned());
        }
        Ok(false)
    }

    fn finish_request(&mut self, handler: &mut dyn Handler) -> Result<()> {
        let tokens = std::mem::take(&mut self.request);
        self.request_size = 0;

        match HandshakeRequest::from_tokens(tokens.as_slice()) {
            Ok(request) => {
                self.conn.write_raw(&request.response().to_bytes())?;
                self.conn.mark_handshaken();
                self.state = SessionState::Established;
                tracing::debug!("WebSocket handshake completed for {}", self.conn.address());
                handler.on_open(self.conn);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Rejected handshake from {}: {}", self.conn.address(), e);
                self.conn.write_raw(REJECT_RESPONSE)?;
                handler.on_handshake_rejected(self.conn, &e);
                Ok(())
            }
        }
    }

    fn read_frames<R: Read>(&mut self, reader: &mut R, handler: &mut dyn Handler) -> Result<()> {
        debug_assert_eq!(self.state, SessionState::Established);

        while self.conn.is_live() {
            let frame = match Frame::read_from(reader) {
                Ok(frame) => frame,
                Err(Error::ReservedOpcode(op)) => {
                    tracing::warn!("Reserved opcode {:#x} from {}", op, self.conn.address());
                    self.assembler.reset();
                    continue;
                }
                Err(Error::UnsupportedPayloadLength) => {
                    tracing::warn!(
                        "64-bit payload length from {} is not supported",
                        self.conn.address()
                    );
                    return Err(Error::UnsupportedPayloadLength);
                }
                Err(e) => return Err(e),
            };

            match frame.opcode {
                OpCode::Close => {
                    tracing::debug!("Close frame from {}", self.conn.address());
                    return Ok(());
                }
                OpCode::Ping => {
                    tracing::debug!("Ping from {}", self.conn.address());
                    if self.conn.config().ping_policy == PingPolicy::Reply {
                        self.conn.write_frame(&Frame::pong(frame.into_payload()))?;
                    }
                }
                OpCode::Pong => {
                    tracing::debug!("Pong from {}", self.conn.address());
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(message) = self.assembler.push(frame)? {
                        if !self.conn.is_live() {
                            break;
                        }
                        handler.on_message(self.conn, message);
                    }
                }
            }
        }
        Ok(())
    }
}
