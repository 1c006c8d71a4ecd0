//! Ordered concatenation of normalised sources into one continuous stream.

use std::{
    collections::VecDeque,
    fmt, io,
    pin::Pin,
    task::{Context, Poll, ready},
};

use tokio::io::{AsyncRead, ReadBuf};

use crate::{
    error::PcmError,
    source::{AudioSource, BoxedReader},
};

struct Pending {
    label: String,
    reader: BoxedReader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinState {
    Running,
    Finished,
    Failed,
    Cancelled,
}

/// A single canonical PCM stream made of several sources read one after the
/// other.
///
/// Only the current source is ever polled. When it reaches EOF the next one
/// becomes current; an empty source is skipped without producing a read. A
/// source error is returned to the caller once, and every source not yet
/// consumed is released at that point; later reads report EOF.
pub struct JoinedStream {
    current: Option<Pending>,
    remaining: VecDeque<Pending>,
    source_count: usize,
    current_index: usize,
    bytes_forwarded: u64,
    state: JoinState,
    failure: Option<PcmError>,
}

impl fmt::Debug for JoinedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinedStream")
            .field("source_count", &self.source_count)
            .field("current_index", &self.current_index())
            .field("remaining", &self.remaining.len())
            .field("bytes_forwarded", &self.bytes_forwarded)
            .field("state", &self.state)
            .finish()
    }
}

impl JoinedStream {
    pub(crate) fn new(sources: Vec<AudioSource>, scan_limit: usize) -> Self {
        let source_count = sources.len();
        let mut remaining: VecDeque<Pending> = sources
            .into_iter()
            .map(|source| Pending {
                label: source.label().to_owned(),
                reader: source.normalize_with(scan_limit),
            })
            .collect();
        let current = remaining.pop_front();
        let state = if current.is_some() {
            JoinState::Running
        } else {
            JoinState::Finished
        };
        Self {
            current,
            remaining,
            source_count,
            current_index: 0,
            bytes_forwarded: 0,
            state,
            failure: None,
        }
    }

    /// Number of sources the stream was built from.
    pub fn source_count(&self) -> usize {
        self.source_count
    }

    /// Position of the source being read, `None` once the stream is over.
    pub fn current_index(&self) -> Option<usize> {
        self.current.as_ref().map(|_| self.current_index)
    }

    pub fn current_label(&self) -> Option<&str> {
        self.current.as_ref().map(|pending| pending.label.as_str())
    }

    /// Total bytes handed to readers so far.
    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded
    }

    /// True once every source is exhausted, one failed, or the stream was
    /// cancelled.
    pub fn is_terminated(&self) -> bool {
        self.state != JoinState::Running
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == JoinState::Cancelled
    }

    /// The error that ended the stream, if a source failed.
    pub fn failure(&self) -> Option<&PcmError> {
        self.failure.as_ref()
    }

    /// Drops the current and every remaining source. Subsequent reads return
    /// EOF. Calling it on a terminated stream does nothing.
    pub fn cancel(&mut self) {
        if self.is_terminated() {
            return;
        }
        let released = self.release();
        tracing::debug!(released, index = self.current_index, "joined stream cancelled");
        self.state = JoinState::Cancelled;
    }

    fn release(&mut self) -> usize {
        let released = self.remaining.len() + usize::from(self.current.is_some());
        self.current = None;
        self.remaining.clear();
        released
    }

    fn advance(&mut self) {
        self.current = self.remaining.pop_front();
        if self.current.is_some() {
            self.current_index += 1;
        } else {
            self.state = JoinState::Finished;
        }
    }

    fn fail(&mut self, err: &io::Error) {
        let label = self
            .current
            .as_ref()
            .map(|pending| pending.label.clone())
            .unwrap_or_default();
        let released = self.release();
        tracing::warn!(
            source = %label,
            index = self.current_index,
            released,
            error = %err,
            "audio source failed, abandoning joined stream"
        );
        self.failure = Some(PcmError::Io {
            kind: err.kind(),
            message: err.to_string(),
        });
        self.state = JoinState::Failed;
    }
}

impl AsyncRead for JoinedStream {
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
            let Some(current) = this.current.as_mut() else {
                return Poll::Ready(Ok(()));
            };

            let before = buf.filled().len();
            match ready!(Pin::new(&mut current.reader).poll_read(cx, buf)) {
                Ok(()) => {
                    let read = buf.filled().len() - before;
                    if read > 0 {
                        this.bytes_forwarded += read as u64;
                        return Poll::Ready(Ok(()));
                    }
                    tracing::trace!(
                        source = %current.label,
                        index = this.current_index,
                        "audio source exhausted"
                    );
                    this.advance();
                }
                Err(err) => {
                    this.fail(&err);
                    return Poll::Ready(Err(err));
                }
            }
        }
    }
}
