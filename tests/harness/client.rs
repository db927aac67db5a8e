//! Blocking WebSocket test client.
//!
//! Frames sent by the client are masked with random keys, as RFC 6455
//! requires of clients.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};

use netframe::protocol::{Frame, MessageAssembler, OpCode};
use netframe::{AddressKey, Limits, Message};

use super::TIMEOUT;

/// The RFC 6455 sample key; its accept value is `s3pPLMBiTxaQ9kYGzzhZRbK+xOo=`.
pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// A valid upgrade request carrying `key`.
pub fn upgrade_request(key: &str) -> String {
    format!(
        "GET / HTTP/1.1\r\n\
         Host: localhost\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}

fn random_mask() -> [u8; 4] {
    let mut mask = [0u8; 4];
    getrandom::getrandom(&mut mask).expect("getrandom failed");
    mask
}

pub struct WsClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl WsClient {
    /// Open a TCP connection without handshaking.
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect failed");
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        stream.set_nodelay(true).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self { stream, reader }
    }

    /// Connect and complete a valid handshake, returning the response head.
    pub fn handshake(addr: SocketAddr) -> (Self, String) {
        let mut client = Self::connect(addr);
        client.write_raw(upgrade_request(SAMPLE_KEY).as_bytes());
        let response = client.read_response();
        assert!(
            response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"),
            "unexpected response: {response}"
        );
        (client, response)
    }

    /// The server-side key for this client.
    pub fn address(&self) -> AddressKey {
        AddressKey::new(self.stream.local_addr().unwrap())
    }

    pub fn write_raw(&mut self, data: &[u8]) {
        self.stream.write_all(data).expect("write failed");
    }

    /// Read an HTTP response head, up to and including the blank line.
    pub fn read_response(&mut self) -> String {
        let mut response = String::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).expect("read failed");
            assert!(n > 0, "stream closed mid-response: {response:?}");
            response.push_str(&line);
            if line == "\r\n" {
                return response;
            }
        }
    }

    pub fn send_frame(&mut self, frame: &Frame) {
        let bytes = frame.to_bytes(Some(random_mask())).expect("encode failed");
        self.write_raw(&bytes);
    }

    pub fn send_text(&mut self, text: &str) {
        self.send_frame(&Frame::text(text));
    }

    pub fn send_binary(&mut self, data: &[u8]) {
        self.send_frame(&Frame::binary(data));
    }

    /// Send a message split into masked frames of `fragment_size` bytes.
    pub fn send_fragmented(&mut self, opcode: OpCode, payload: &[u8], fragment_size: usize) {
        for frame in netframe::connection::MessageFragmenter::new(payload, opcode, fragment_size) {
            self.send_frame(&frame);
        }
    }

    pub fn recv_frame(&mut self) -> Frame {
        Frame::read_from(&mut self.reader).expect("frame read failed")
    }

    /// Read frames until a data message completes.
    pub fn recv_message(&mut self) -> Message {
        let mut assembler = MessageAssembler::new(Limits::default());
        loop {
            let frame = self.recv_frame();
            if let Some(message) = assembler.push(frame).expect("reassembly failed") {
                return message;
            }
        }
    }

    /// Whether the server has closed the stream.
    pub fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(self.reader.read(&mut buf), Ok(0) | Err(_))
    }
}
