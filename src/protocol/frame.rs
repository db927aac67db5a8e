//! WebSocket frame reading and encoding.
//!
//! Frames are read straight off a blocking byte stream, one header field at
//! a time. Only the 7-bit and 16-bit payload length forms are supported;
//! length code 127 (64-bit) is rejected with
//! [`Error::UnsupportedPayloadLength`].

use std::io::Read;

use bytes::{BufMut, BytesMut};

use crate::config::MAX_FRAME_PAYLOAD;
use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask, apply_mask_fast};

/// Length code announcing a 16-bit extended payload length.
const EXTENDED_LEN_16: u8 = 126;

/// Length code announcing a 64-bit extended payload length.
const EXTENDED_LEN_64: u8 = 127;

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    fin: bool,
    opcode: u8,
    mask: Option<[u8; 4]>,
    payload_len: usize,
}

/// Read the fixed header, extended length and mask key.
///
/// RSV bits are ignored.
fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<FrameHeader> {
    let mut head = [0u8; 2];
    reader.read_exact(&mut head)?;

    let fin = (head[0] & 0x80) != 0;
    let opcode = head[0] & 0x0F;
    let masked = (head[1] & 0x80) != 0;
    let len_code = head[1] & 0x7F;

    let payload_len = match len_code {
        EXTENDED_LEN_16 => {
            let mut ext = [0u8; 2];
            reader.read_exact(&mut ext)?;
            u16::from_be_bytes(ext) as usize
        }
        EXTENDED_LEN_64 => return Err(Error::UnsupportedPayloadLength),
        short => short as usize,
    };

    let mask = if masked {
        let mut key = [0u8; 4];
        reader.read_exact(&mut key)?;
        Some(key)
    } else {
        None
    };

    Ok(FrameHeader {
        fin,
        opcode,
        mask,
        payload_len,
    })
}

/// A WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |        (16, if len==126)      |
/// |N|V|V|V|       |S|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                 Masking key (if MASK is set)                  |
/// +---------------------------------------------------------------+
/// |                         Payload data                          |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            opcode,
            payload,
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Create a close frame with no status.
    #[must_use]
    pub fn close() -> Self {
        Self::new(true, OpCode::Close, Vec::new())
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Read one frame from a blocking stream, unmasking its payload.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` if the stream ends mid-frame
    /// - `Error::UnsupportedPayloadLength` for length code 127
    /// - `Error::ReservedOpcode` for reserved opcodes; the frame's bytes
    ///   have been consumed, so the stream stays aligned on the next frame
    /// - `Error::Io` for other read failures
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let header = read_header(reader)?;

        let mut payload = vec![0u8; header.payload_len];
        reader.read_exact(&mut payload)?;

        if let Some(mask) = header.mask {
            apply_mask_fast(&mut payload, mask);
        }

        let opcode = OpCode::from_u8(header.opcode)?;
        tracing::trace!(
            "frame fin={} opcode={} len={} masked={}",
            header.fin,
            opcode,
            header.payload_len,
            header.mask.is_some()
        );

        Ok(Frame {
            fin: header.fin,
            opcode,
            payload,
        })
    }

    /// Bytes this frame occupies on the wire.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let extended_len_size = if self.payload.len() <= 125 { 0 } else { 2 };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + self.payload.len()
    }

    /// Append the encoded frame to `dst`.
    ///
    /// Frames sent by the server are unmasked (`mask` = `None`); a mask is
    /// only supplied when acting as a client.
    ///
    /// Lengths use the minimal RFC 6455 encoding: up to and including 125
    /// bytes fit the 7-bit field, so a 125-byte payload has a two-byte
    /// header rather than a 16-bit extended length.
    ///
    /// # Errors
    ///
    /// Returns `Error::FrameTooLarge` if the payload exceeds 65535 bytes.
    pub fn encode(&self, dst: &mut BytesMut, mask: Option<[u8; 4]>) -> Result<()> {
        let payload_len = self.payload.len();
        if payload_len > MAX_FRAME_PAYLOAD {
            return Err(Error::FrameTooLarge {
                size: payload_len,
                max: MAX_FRAME_PAYLOAD,
            });
        }

        dst.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        dst.put_u8(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        if payload_len <= 125 {
            dst.put_u8(mask_bit | payload_len as u8);
        } else {
            dst.put_u8(mask_bit | EXTENDED_LEN_16);
            dst.put_u16(payload_len as u16);
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }

        Ok(())
    }

    /// Encode into a fresh buffer.
    ///
    /// # Errors
    ///
    /// See [`Frame::encode`].
    pub fn to_bytes(&self, mask: Option<[u8; 4]>) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(self.wire_size(mask.is_some()));
        self.encode(&mut buf, mask)?;
        Ok(buf.to_vec())
    }
}
