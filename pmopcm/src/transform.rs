//! Stateful byte-chunk transforms and the `AsyncRead` adapter that runs them.
//!
//! A [`ChunkTransform`] sees the input exactly as the producer delivered it:
//! chunk sizes are arbitrary and never aligned on samples or frames. Each
//! transform keeps whatever carry state it needs between calls, so feeding a
//! stream in one chunk or in many produces the same output.

use std::{
    cmp, io,
    pin::Pin,
    task::{Context, Poll, ready},
};

use tokio::io::{AsyncRead, ReadBuf};

/// Size of the buffer used to pull bytes from the wrapped reader.
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// A stateful transform applied chunk by chunk to a byte stream.
pub trait ChunkTransform: Send {
    /// Processes `input`, appending produced bytes to `out`.
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>);

    /// Flushes carry state once the input is exhausted.
    fn finish(&mut self, out: &mut Vec<u8>);

    /// Runs `next` on the output of `self`.
    fn then<B>(self, next: B) -> Chain<Self, B>
    where
        Self: Sized,
        B: ChunkTransform,
    {
        Chain {
            first: self,
            second: next,
            scratch: Vec::new(),
        }
    }
}

/// Two transforms applied in sequence.
#[derive(Debug)]
pub struct Chain<A, B> {
    first: A,
    second: B,
    scratch: Vec<u8>,
}

impl<A: ChunkTransform, B: ChunkTransform> ChunkTransform for Chain<A, B> {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.scratch.clear();
        self.first.push(input, &mut self.scratch);
        if !self.scratch.is_empty() {
            self.second.push(&self.scratch, out);
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        self.scratch.clear();
        self.first.finish(&mut self.scratch);
        if !self.scratch.is_empty() {
            self.second.push(&self.scratch, out);
        }
        self.second.finish(out);
    }
}

/// Async reader applying a [`ChunkTransform`] to an underlying reader.
///
/// Reads never return an empty buffer while the inner reader still has
/// data: if a chunk produces no output (e.g. a lone byte kept as carry), the
/// adapter keeps pulling until it has something to hand out or the inner
/// reader reaches EOF.
pub struct Transformed<R, T> {
    inner: R,
    transform: T,
    input: Box<[u8]>,
    output: Vec<u8>,
    position: usize,
    finished: bool,
}

impl<R, T> Transformed<R, T> {
    pub fn new(inner: R, transform: T) -> Self {
        Self::with_chunk_size(inner, transform, READ_CHUNK_SIZE)
    }

    pub fn with_chunk_size(inner: R, transform: T, chunk_size: usize) -> Self {
        Self {
            inner,
            transform,
            input: vec![0u8; chunk_size.max(1)].into_boxed_slice(),
            output: Vec::new(),
            position: 0,
            finished: false,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }
}

impl<R, T> AsyncRead for Transformed<R, T>
where
    R: AsyncRead + Unpin,
    T: ChunkTransform + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if this.position < this.output.len() {
                let to_copy = cmp::min(buf.remaining(), this.output.len() - this.position);
                buf.put_slice(&this.output[this.position..this.position + to_copy]);
                this.position += to_copy;
                return Poll::Ready(Ok(()));
            }

            if this.finished {
                return Poll::Ready(Ok(()));
            }

            this.output.clear();
            this.position = 0;

            let mut read_buf = ReadBuf::new(&mut this.input);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut read_buf))?;
            let filled = read_buf.filled().len();

            if filled == 0 {
                this.transform.finish(&mut this.output);
                this.finished = true;
            } else {
                this.transform.push(&this.input[..filled], &mut this.output);
            }
        }
    }
}
