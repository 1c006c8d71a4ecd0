//! Audio sources and ordered request lists.

use std::{fmt, io::Cursor, time::Duration};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    align::FrameAligner,
    container::{DEFAULT_SCAN_LIMIT, HeaderSkipper},
    error::PcmError,
    format::{CANONICAL, SourceFormat},
    join::JoinedStream,
    mono::MonoToStereo,
    transform::{ChunkTransform, Transformed},
};

/// Type-erased reader every source is reduced to.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// One audio producer with its declared native format.
pub struct AudioSource {
    format: SourceFormat,
    label: String,
    reader: BoxedReader,
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("format", &self.format)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl AudioSource {
    pub fn new<R>(format: SourceFormat, label: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            format,
            label: label.into(),
            reader: Box::new(reader),
        }
    }

    /// Source over an in-memory buffer (pre-rendered clips, sound effects).
    pub fn from_bytes(format: SourceFormat, label: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(format, label, Cursor::new(data.into()))
    }

    /// Canonical silence lasting `duration`, rounded down to a whole frame.
    pub fn silence(duration: Duration) -> Self {
        let len = CANONICAL.bytes_for(duration) as u64;
        Self::new(
            SourceFormat::Canonical,
            format!("silence {}ms", duration.as_millis()),
            tokio::io::repeat(0).take(len),
        )
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The raw reader, without normalisation.
    pub fn into_reader(self) -> BoxedReader {
        self.reader
    }

    /// Wraps the reader in the normaliser matching its declared format.
    pub fn normalize(self) -> BoxedReader {
        self.normalize_with(DEFAULT_SCAN_LIMIT)
    }

    pub fn normalize_with(self, scan_limit: usize) -> BoxedReader {
        match self.format {
            SourceFormat::Canonical => self.reader,
            SourceFormat::Mono => Box::new(Transformed::new(self.reader, MonoToStereo::new())),
            SourceFormat::Stereo => Box::new(Transformed::new(self.reader, FrameAligner::default())),
            SourceFormat::Container => {
                let transform = HeaderSkipper::wav()
                    .with_scan_limit(scan_limit)
                    .then(FrameAligner::default());
                Box::new(Transformed::new(self.reader, transform))
            }
        }
    }
}

/// A non-empty, ordered list of sources that will be played back to back.
#[derive(Debug)]
pub struct AudioRequestList {
    sources: Vec<AudioSource>,
    scan_limit: usize,
}

impl AudioRequestList {
    pub fn new(sources: Vec<AudioSource>) -> Result<Self, PcmError> {
        if sources.is_empty() {
            return Err(PcmError::EmptyRequestList);
        }
        Ok(Self {
            sources,
            scan_limit: DEFAULT_SCAN_LIMIT,
        })
    }

    pub fn single(source: AudioSource) -> Self {
        Self {
            sources: vec![source],
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }

    /// Scan limit used by container sources when the list is joined.
    pub fn with_scan_limit(mut self, scan_limit: usize) -> Self {
        self.scan_limit = scan_limit;
        self
    }

    pub fn push(&mut self, source: AudioSource) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(AudioSource::label)
    }

    pub fn into_joined(self) -> JoinedStream {
        JoinedStream::new(self.sources, self.scan_limit)
    }
}

impl IntoIterator for AudioRequestList {
    type Item = AudioSource;
    type IntoIter = std::vec::IntoIter<AudioSource>;

    fn into_iter(self) -> Self::IntoIter {
        self.sources.into_iter()
    }
}
