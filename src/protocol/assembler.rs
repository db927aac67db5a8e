//! Reassembly of fragmented WebSocket messages.

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::Result;
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Reassembles data frames into complete messages.
///
/// A Text or Binary frame without FIN records whether the message is
/// binary; the Continuation frames that follow append to the buffer
/// without re-declaring it. Control frames are not data and leave the
/// buffer alone.
///
/// A text message that is not valid UTF-8 is delivered as
/// [`Message::Binary`], the same way a raw TCP or UDP token is.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    binary: bool,
    fragment_count: usize,
    limits: Limits,
}

impl MessageAssembler {
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            binary: false,
            fragment_count: 0,
            limits,
        }
    }

    /// Add a frame to the message being assembled.
    /// Returns Some(message) when the frame carries FIN, None otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) when the buffered message would
    /// exceed the configured maximum. The buffer is cleared.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        if !frame.opcode.is_data() {
            return Ok(None);
        }

        let new_size = self.buffer.len() + frame.payload().len();
        if let Err(err) = self.limits.check_message_size(new_size) {
            self.reset();
            return Err(err);
        }

        if !frame.fin && frame.opcode != OpCode::Continuation {
            self.binary = frame.opcode == OpCode::Binary;
        }
        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let binary = match frame.opcode {
            OpCode::Text => false,
            OpCode::Binary => true,
            _ => self.binary,
        };
        let payload = self.buffer.split().to_vec();
        self.binary = false;
        self.fragment_count = 0;

        if binary {
            Ok(Some(Message::Binary(payload)))
        } else {
            Ok(Some(Message::from_token(payload)))
        }
    }

    /// Whether a fragmented message is in progress.
    pub fn is_assembling(&self) -> bool {
        self.fragment_count > 0
    }

    /// Bytes buffered for the message in progress.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.binary = false;
        self.fragment_count = 0;
    }
}
