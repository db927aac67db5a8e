use std::io::Write;

use bytes::BytesMut;

use crate::config::MAX_FRAME_PAYLOAD;
use crate::connection::MessageFragmenter;
use crate::error::Result;
use crate::protocol::{Frame, OpCode};

/// Blocking frame writer over a byte sink.
///
/// Frames are written unmasked, as a server sends them. Each message is
/// encoded one frame at a time through a reused buffer.
#[derive(Debug)]
pub struct FrameWriter<W> {
    io: W,
    write_buf: BytesMut,
    fragment_size: usize,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap `io`, splitting messages into frames of at most `fragment_size`
    /// bytes (clamped to 1..=65535).
    #[must_use]
    pub fn new(io: W, fragment_size: usize) -> Self {
        let fragment_size = fragment_size.clamp(1, MAX_FRAME_PAYLOAD);
        Self {
            io,
            write_buf: BytesMut::with_capacity(fragment_size.min(4096) + 4),
            fragment_size,
        }
    }

    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.io
    }

    pub fn into_inner(self) -> W {
        self.io
    }

    #[must_use]
    pub fn fragment_size(&self) -> usize {
        self.fragment_size
    }

    /// Encode and write a single frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::FrameTooLarge` for payloads over 65535 bytes, or the
    /// I/O error from the sink.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_buf.clear();
        frame.encode(&mut self.write_buf, None)?;
        self.io.write_all(&self.write_buf)?;
        Ok(())
    }

    /// Write a whole message, fragmenting it as needed, then flush.
    ///
    /// Stops at the first frame that fails to write.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub fn write_message(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        for frame in MessageFragmenter::new(payload, opcode, self.fragment_size) {
            self.write_frame(&frame)?;
        }
        self.io.flush()?;
        Ok(())
    }

    /// Flush the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.io.flush()?;
        Ok(())
    }

    /// Write bytes verbatim, bypassing framing.
    ///
    /// Used for the handshake responses.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the sink.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.io.write_all(data)?;
        self.io.flush()?;
        Ok(())
    }
}
