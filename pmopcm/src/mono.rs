//! Mono → stereo duplication for 16-bit little-endian PCM.

use crate::transform::ChunkTransform;

/// Duplicates every 16-bit mono sample into a left/right pair.
///
/// Chunk boundaries may split a sample; the dangling low byte is kept and
/// completed by the first byte of the next chunk.
#[derive(Debug, Default)]
pub struct MonoToStereo {
    carry: Option<u8>,
}

impl MonoToStereo {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while half a sample is waiting for its second byte.
    pub fn has_carry(&self) -> bool {
        self.carry.is_some()
    }
}

fn emit_sample(sample: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(sample);
    out.extend_from_slice(sample);
}

impl ChunkTransform for MonoToStereo {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let mut data = input;
        if data.is_empty() {
            return;
        }

        out.reserve((data.len() + 1) * 2);

        if let Some(low) = self.carry.take() {
            emit_sample(&[low, data[0]], out);
            data = &data[1..];
        }

        let mut samples = data.chunks_exact(2);
        for sample in &mut samples {
            emit_sample(sample, out);
        }

        if let [last] = samples.remainder() {
            self.carry = Some(*last);
        }
    }

    fn finish(&mut self, _out: &mut Vec<u8>) {
        if self.carry.take().is_some() {
            tracing::debug!("mono stream ended on half a sample, dropping 1 byte");
        }
    }
}
