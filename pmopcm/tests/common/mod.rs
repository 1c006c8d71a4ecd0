#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::io::{AsyncRead, ReadBuf};

/// Tracks whether a test reader was polled and dropped.
#[derive(Clone, Default)]
pub struct Probe {
    dropped: Arc<AtomicBool>,
    polls: Arc<AtomicUsize>,
}

impl Probe {
    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

/// Reader handing out a fixed sequence of chunks, optionally ending in an
/// error instead of EOF.
pub struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
    error: Option<io::Error>,
    probe: Probe,
}

impl ChunkedReader {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            error: None,
            probe: Probe::default(),
        }
    }

    /// Splits `data` into chunks of random sizes between 1 and `max`.
    pub fn random(data: &[u8], max: usize, seed: u64) -> Self {
        Self::new(random_chunks(data, max, seed))
    }

    pub fn failing_after(chunks: Vec<Vec<u8>>, message: &str) -> Self {
        let mut reader = Self::new(chunks);
        reader.error = Some(io::Error::other(message.to_owned()));
        reader
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.probe.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(mut chunk) = self.chunks.pop_front() {
            let to_copy = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..to_copy]);
            if to_copy < chunk.len() {
                chunk.drain(..to_copy);
                self.chunks.push_front(chunk);
            }
            return Poll::Ready(Ok(()));
        }
        match self.error.take() {
            Some(err) => Poll::Ready(Err(err)),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl Drop for ChunkedReader {
    fn drop(&mut self) {
        self.probe.dropped.store(true, Ordering::SeqCst);
    }
}

pub fn random_chunks(data: &[u8], max: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chunks = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let size = rng.random_range(1..=max.max(1)).min(rest.len());
        let (head, tail) = rest.split_at(size);
        chunks.push(head.to_vec());
        rest = tail;
    }
    chunks
}

/// Deterministic 16-bit PCM ramp of `samples` samples.
pub fn ramp(samples: usize) -> Vec<u8> {
    (0..samples)
        .flat_map(|i| ((i as i16).wrapping_mul(97)).to_le_bytes())
        .collect()
}
