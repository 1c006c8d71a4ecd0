//! # pmopcm
//!
//! Asynchronous PCM plumbing for voice playback.
//!
//! Audio producers (speech synthesis, pre-rendered sound effects, silence)
//! deliver bytes in their native layout and in arbitrary chunk sizes. This
//! crate turns them into one continuous stream of canonical PCM
//! (16-bit little-endian, 48 kHz, interleaved stereo):
//!
//! - **Normalisers** ([`MonoToStereo`], [`FrameAligner`], [`HeaderSkipper`])
//!   are stateful [`ChunkTransform`]s that carry partial samples, partial
//!   frames and split container headers across chunk boundaries.
//! - **[`JoinedStream`]** reads an [`AudioRequestList`] source by source and
//!   exposes the result as a single [`tokio::io::AsyncRead`].
//! - **[`spawn_source`]** runs a producer task behind a bounded pipe; its
//!   failure reaches the joiner as a source error.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use pmopcm::{AudioRequestList, AudioSource, SourceFormat};
//! use tokio::io::AsyncReadExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chime = AudioSource::from_bytes(SourceFormat::Mono, "chime", vec![0u8; 960]);
//!     let list = AudioRequestList::new(vec![
//!         chime,
//!         AudioSource::silence(Duration::from_millis(200)),
//!     ])?;
//!
//!     let mut stream = list.into_joined();
//!     let mut pcm = Vec::new();
//!     stream.read_to_end(&mut pcm).await?;
//!     assert_eq!(pcm.len() % 4, 0);
//!     Ok(())
//! }
//! ```

pub mod align;
pub mod container;
pub mod error;
pub mod format;
pub mod join;
pub mod mono;
pub mod producer;
pub mod source;
pub mod transform;

pub use align::FrameAligner;
pub use container::{DEFAULT_SCAN_LIMIT, HeaderSkipper};
pub use error::PcmError;
pub use format::{CANONICAL, PcmFormat, SourceFormat};
pub use join::JoinedStream;
pub use mono::MonoToStereo;
pub use producer::{DEFAULT_PIPE_SIZE, ProducerReader, spawn_source};
pub use source::{AudioRequestList, AudioSource, BoxedReader};
pub use transform::{Chain, ChunkTransform, Transformed};
