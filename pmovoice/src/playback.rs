//! Flux de lecture remis à une sortie vocale.
//!
//! A [`PlaybackStream`] wraps a [`JoinedStream`] with an end signal shared
//! with the queue. Ending a playback happens in two steps: the signal is
//! raised first, so the sink's next read sees EOF and its `play` call
//! returns; the joined stream and its sources are released afterwards, on
//! the next scheduler turn.

use std::{
    fmt,
    future::Future,
    io,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use pmopcm::JoinedStream;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, trace};

/// Identifiant d'une lecture, unique dans le processus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(u64);

impl PlaybackId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Slot = Arc<Mutex<Option<JoinedStream>>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<JoinedStream>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The byte stream a [`VoiceSink`](crate::VoiceSink) reads from.
pub struct PlaybackStream {
    id: PlaybackId,
    slot: Slot,
    ended: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl fmt::Debug for PlaybackStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackStream")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl PlaybackStream {
    /// Splits `joined` into the stream handed to the sink and the control
    /// kept by the queue.
    pub(crate) fn new(id: PlaybackId, joined: JoinedStream) -> (Self, PlaybackControl) {
        let slot: Slot = Arc::new(Mutex::new(Some(joined)));
        let token = CancellationToken::new();
        let stream = Self {
            id,
            slot: slot.clone(),
            ended: Box::pin(token.clone().cancelled_owned()),
        };
        (stream, PlaybackControl { id, slot, token })
    }

    pub fn id(&self) -> PlaybackId {
        self.id
    }

    /// Bytes the joined stream has delivered so far, `None` once released.
    pub fn bytes_forwarded(&self) -> Option<u64> {
        lock_slot(&self.slot).as_ref().map(JoinedStream::bytes_forwarded)
    }
}

impl AsyncRead for PlaybackStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        // a raised end signal reads as EOF, whatever the sources still hold
        if self.ended.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Ok(()));
        }

        let mut slot = lock_slot(&self.slot);
        match slot.as_mut() {
            Some(joined) => Pin::new(joined).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// Queue-side handle on a playback handed to a sink.
#[derive(Debug)]
pub(crate) struct PlaybackControl {
    id: PlaybackId,
    slot: Slot,
    token: CancellationToken,
}

impl PlaybackControl {
    pub(crate) fn id(&self) -> PlaybackId {
        self.id
    }

    /// Signals the end to the sink, then releases the joined stream on the
    /// next scheduler turn.
    pub(crate) fn end(&self, reason: &str) {
        if self.token.is_cancelled() {
            return;
        }
        debug!(playback = %self.id, reason, "ending playback");
        self.token.cancel();

        let slot = self.slot.clone();
        let id = self.id;
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let joined = lock_slot(&slot).take();
            if let Some(mut joined) = joined {
                joined.cancel();
                trace!(playback = %id, "playback sources released");
            }
        });
    }
}
