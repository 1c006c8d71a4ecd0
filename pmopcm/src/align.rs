//! Frame alignment for interleaved stereo PCM.

use crate::{format::CANONICAL, transform::ChunkTransform};

/// Re-chunks a byte stream so that every emitted chunk holds whole frames.
///
/// Up to `frame_len - 1` bytes are carried between chunks. Whatever is left
/// over when the stream ends is not a full frame and is dropped.
#[derive(Debug)]
pub struct FrameAligner {
    frame_len: usize,
    carry: Vec<u8>,
}

impl Default for FrameAligner {
    fn default() -> Self {
        Self::new(CANONICAL.frame_len())
    }
}

impl FrameAligner {
    pub fn new(frame_len: usize) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            carry: Vec::with_capacity(frame_len),
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Bytes currently waiting for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

impl ChunkTransform for FrameAligner {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let mut data = input;

        if !self.carry.is_empty() {
            let missing = self.frame_len - self.carry.len();
            let take = missing.min(data.len());
            self.carry.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.carry.len() < self.frame_len {
                return;
            }
            out.extend_from_slice(&self.carry);
            self.carry.clear();
        }

        let whole = data.len() - data.len() % self.frame_len;
        out.extend_from_slice(&data[..whole]);
        self.carry.extend_from_slice(&data[whole..]);
    }

    fn finish(&mut self, _out: &mut Vec<u8>) {
        if !self.carry.is_empty() {
            tracing::debug!(
                dropped = self.carry.len(),
                "stereo stream ended on a partial frame"
            );
            self.carry.clear();
        }
    }
}
