//! Whitespace/CRLF token splitting for line-oriented streams.
//!
//! Space, tab and LF end a token. CR is swallowed, so `\r\n` and `\n`
//! produce the same token sequence. Consecutive delimiters yield empty
//! tokens, which the WebSocket handshake uses to detect the blank line
//! closing the request.

use crate::error::{Error, Result};

/// Returns true for bytes that end a token.
#[inline]
#[must_use]
pub const fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n')
}

/// Incremental byte-at-a-time tokenizer.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    current: Vec<u8>,
    max_token_size: usize,
}

impl Tokenizer {
    /// Create a tokenizer that rejects tokens longer than `max_token_size`.
    #[must_use]
    pub fn new(max_token_size: usize) -> Self {
        Self {
            current: Vec::new(),
            max_token_size,
        }
    }

    /// Feed one byte. Returns a finished token when `byte` is a delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenTooLarge`] when the pending token would exceed
    /// the configured maximum.
    pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
        if byte == b'\r' {
            return Ok(None);
        }
        if is_delimiter(byte) {
            return Ok(Some(std::mem::take(&mut self.current)));
        }
        if self.current.len() >= self.max_token_size {
            return Err(Error::TokenTooLarge {
                size: self.current.len() + 1,
                max: self.max_token_size,
            });
        }
        self.current.push(byte);
        Ok(None)
    }

    /// Flush the pending partial token, if any.
    ///
    /// Used at datagram boundaries, where the end of the datagram also ends
    /// the last token.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }

    /// Split a complete buffer, including a trailing unterminated token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenTooLarge`] as [`Tokenizer::push`] does.
    pub fn split(data: &[u8], max_token_size: usize) -> Result<Vec<Vec<u8>>> {
        let mut tokenizer = Self::new(max_token_size);
        let mut tokens = Vec::new();
        for &byte in data {
            if let Some(token) = tokenizer.push(byte)? {
                tokens.push(token);
            }
        }
        tokens.extend(tokenizer.finish());
        Ok(tokens)
    }
}
