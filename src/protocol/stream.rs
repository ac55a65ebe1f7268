//! Frame boundary detection over a raw byte stream.
//!
//! The transport delivers arbitrary chunks: a frame may be split across
//! chunks, several frames may arrive at once, and line noise may sit between
//! them. [`FrameReader`] buffers at most one frame's worth of bytes, hunts for
//! the header byte, and hands back each candidate frame as soon as its
//! declared length has arrived.

use crate::protocol::codec::{decode_frame, DecodeError, MAX_FRAME_LEN};
use crate::protocol::types::{Frame, FRAME_HEADER};

/// Incremental deframer for the cushion link.
#[derive(Debug, Default)]
pub struct FrameReader {
    /// Bytes received but not yet consumed
    buffer: Vec<u8>,
    /// Bytes thrown away while searching for a header
    discarded: u64,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
            discarded: 0,
        }
    }

    /// Feed a chunk and collect every frame it completes.
    ///
    /// A candidate that fails validation is reported as an error and the
    /// reader resynchronises one byte past its header.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Frame, DecodeError>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            match self.buffer.iter().position(|&b| b == FRAME_HEADER) {
                Some(0) => {}
                Some(start) => {
                    self.discard(start);
                }
                None => {
                    let len = self.buffer.len();
                    self.discard(len);
                    break;
                }
            }

            // Need the length byte before the frame size is known.
            if self.buffer.len() < 3 {
                break;
            }
            let frame_len = self.buffer[2] as usize + 5;
            if self.buffer.len() < frame_len {
                break;
            }

            match decode_frame(&self.buffer[..frame_len]) {
                Ok((frame, consumed)) => {
                    self.buffer.drain(..consumed);
                    out.push(Ok(frame));
                }
                Err(e) => {
                    self.buffer.drain(..1);
                    out.push(Err(e));
                }
            }
        }

        debug_assert!(self.buffer.len() < MAX_FRAME_LEN);
        out
    }

    /// Bytes currently waiting for the rest of a frame.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped while hunting for a header.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Forget any partial frame, e.g. after the transport reconnects.
    pub fn reset(&mut self) {
        let len = self.buffer.len();
        self.discard(len);
    }

    fn discard(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.discarded += count as u64;
    }
}
