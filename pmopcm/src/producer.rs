use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};

use tokio::{
    io::{AsyncRead, DuplexStream, ReadBuf},
    task::JoinHandle,
};

use crate::{error::PcmError, format::SourceFormat, source::AudioSource};

/// Capacity of the in-memory pipe between a producer task and its reader.
pub const DEFAULT_PIPE_SIZE: usize = 64 * 1024;

/// Async reader backed by a spawned task writing into it.
///
/// Once the pipe is drained the producer's result is checked: an `Err`
/// surfaces as an I/O error after the bytes that were written before it.
/// Dropping the reader aborts the producer.
pub struct ProducerReader {
    inner: Option<DuplexStream>,
    join: Option<JoinHandle<Result<(), PcmError>>>,
    label: String,
}

impl ProducerReader {
    pub fn new(
        label: impl Into<String>,
        inner: DuplexStream,
        join: JoinHandle<Result<(), PcmError>>,
    ) -> Self {
        Self {
            inner: Some(inner),
            join: Some(join),
            label: label.into(),
        }
    }

    /// Waits for the producer task to finish.
    pub async fn wait(mut self) -> Result<(), PcmError> {
        match self.join.take() {
            Some(handle) => match handle.await {
                Ok(res) => res,
                Err(err) => Err(PcmError::Producer(format!("{}: {err}", self.label))),
            },
            None => Ok(()),
        }
    }

    fn poll_producer(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let Some(handle) = self.join.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let outcome = ready!(Pin::new(handle).poll(cx));
        self.join = None;
        match outcome {
            Ok(Ok(())) => Poll::Ready(Ok(())),
            Ok(Err(err)) => {
                tracing::debug!(source = %self.label, error = %err, "producer failed");
                Poll::Ready(Err(err.into()))
            }
            Err(err) => Poll::Ready(Err(io::Error::other(PcmError::Producer(format!(
                "{}: {err}",
                self.label
            ))))),
        }
    }
}

impl AsyncRead for ProducerReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if let Some(inner) = this.inner.as_mut() {
            let before = buf.filled().len();
            ready!(Pin::new(inner).poll_read(cx, buf))?;
            if buf.filled().len() > before {
                return Poll::Ready(Ok(()));
            }
            this.inner = None;
        }

        this.poll_producer(cx)
    }
}

impl Drop for ProducerReader {
    fn drop(&mut self) {
        if let Some(handle) = self.join.take() {
            handle.abort();
        }
        self.inner.take();
    }
}

/// Runs `producer` on the current runtime and exposes what it writes as an
/// [`AudioSource`].
///
/// The producer receives the write half of a bounded pipe of `pipe_size`
/// bytes, so it is throttled by the consumer. Must be called from within a
/// Tokio runtime.
pub fn spawn_source<F, Fut>(
    format: SourceFormat,
    label: impl Into<String>,
    pipe_size: usize,
    producer: F,
) -> AudioSource
where
    F: FnOnce(DuplexStream) -> Fut,
    Fut: Future<Output = Result<(), PcmError>> + Send + 'static,
{
    let label = label.into();
    let (writer, reader) = tokio::io::duplex(pipe_size.max(1));
    let join = tokio::spawn(producer(writer));
    AudioSource::new(format, label.clone(), ProducerReader::new(label, reader, join))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn producer_bytes_are_readable() {
        let source = spawn_source(SourceFormat::Canonical, "tone", 8, |mut w| async move {
            for i in 0..16u8 {
                w.write_all(&[i; 4]).await?;
            }
            Ok::<_, PcmError>(())
        });
        let mut reader = source.into_reader();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 64);
        assert_eq!(&out[60..], &[15, 15, 15, 15]);
    }

    #[tokio::test]
    async fn producer_error_follows_written_bytes() {
        let source = spawn_source(SourceFormat::Canonical, "broken", 64, |mut w| async move {
            w.write_all(&[1, 2, 3, 4]).await?;
            Err::<(), _>(PcmError::Producer("synthesis backend went away".into()))
        });
        let mut reader = source.into_reader();

        let mut head = [0u8; 4];
        reader.read_exact(&mut head).await.unwrap();
        assert_eq!(head, [1, 2, 3, 4]);

        let mut rest = Vec::new();
        let err = reader.read_to_end(&mut rest).await.unwrap_err();
        assert!(err.to_string().contains("synthesis backend went away"));
    }

    #[tokio::test]
    async fn wait_reports_producer_result() {
        let (writer, reader) = tokio::io::duplex(16);
        let join = tokio::spawn(async move {
            drop(writer);
            Ok(())
        });
        let reader = ProducerReader::new("empty", reader, join);
        assert!(reader.wait().await.is_ok());
    }
}
