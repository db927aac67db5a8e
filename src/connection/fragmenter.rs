//! Splitting outgoing messages into frames.

use std::slice::Chunks;

use crate::protocol::{Frame, OpCode};

/// Iterator that produces the frames of one outgoing message.
///
/// The first frame carries the message opcode, the rest carry
/// `OpCode::Continuation`, and only the last has FIN set. An empty payload
/// yields a single empty FIN frame.
pub struct MessageFragmenter<'a> {
    chunks: Chunks<'a, u8>,
    opcode: OpCode,
    started: bool,
}

impl<'a> MessageFragmenter<'a> {
    #[inline]
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            chunks: payload.chunks(fragment_size.max(1)),
            opcode,
            started: false,
        }
    }

    /// Frames still to be produced.
    #[inline]
    #[must_use]
    pub fn frames_left(&self) -> usize {
        if !self.started && self.chunks.len() == 0 {
            1
        } else {
            self.chunks.len()
        }
    }
}

impl Iterator for MessageFragmenter<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let opcode = if self.started {
            OpCode::Continuation
        } else {
            self.opcode
        };

        let chunk = match self.chunks.next() {
            Some(chunk) => chunk,
            None if !self.started => &[] as &[u8],
            None => return None,
        };
        self.started = true;

        Some(Frame::new(self.chunks.len() == 0, opcode, chunk.to_vec()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.frames_left();
        (n, Some(n))
    }
}

impl ExactSizeIterator for MessageFragmenter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fragmentation_needed() {
        let frames: Vec<_> = MessageFragmenter::new(b"Hello", OpCode::Text, 1024).collect();
        assert_eq!(frames, vec![Frame::text("Hello")]);
    }

    #[test]
    fn test_uneven_fragmentation() {
        let payload = vec![0xCD; 25];
        let frag = MessageFragmenter::new(&payload, OpCode::Binary, 10);
        assert_eq!(frag.len(), 3);

        let frames: Vec<_> = frag.collect();
        let shape: Vec<_> = frames
            .iter()
            .map(|f| (f.fin, f.opcode, f.payload().len()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (false, OpCode::Binary, 10),
                (false, OpCode::Continuation, 10),
                (true, OpCode::Continuation, 5),
            ]
        );
    }

    #[test]
    fn test_payload_equals_fragment_size() {
        let payload = vec![0xEF; 100];
        let frames: Vec<_> = MessageFragmenter::new(&payload, OpCode::Binary, 100).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Binary);
    }

    #[test]
    fn test_empty_payload() {
        let mut frag = MessageFragmenter::new(b"", OpCode::Text, 1024);
        assert_eq!(frag.len(), 1);
        assert_eq!(frag.next(), Some(Frame::text(Vec::new())));
        assert_eq!(frag.next(), None);
        assert_eq!(frag.len(), 0);
    }

    #[test]
    fn test_zero_fragment_size_treated_as_one() {
        let frames: Vec<_> = MessageFragmenter::new(b"abc", OpCode::Text, 0).collect();
        assert_eq!(frames.len(), 3);
        assert!(frames[2].fin);
    }

    #[test]
    fn test_frames_left_counts_down() {
        let payload = vec![0xAB; 30];
        let mut frag = MessageFragmenter::new(&payload, OpCode::Binary, 10);
        assert_eq!(frag.frames_left(), 3);
        frag.next();
        assert_eq!(frag.frames_left(), 2);
        frag.next();
        frag.next();
        assert_eq!(frag.frames_left(), 0);
        assert!(frag.next().is_none());
    }
}
