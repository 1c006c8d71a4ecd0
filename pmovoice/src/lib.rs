//! # pmovoice
//!
//! Delivery of synthesized speech and sound effects into real-time voice
//! destinations.
//!
//! - [`VoiceService`] keeps one connection per destination (output sink,
//!   playback queue, channels read aloud) and handles join, leave and
//!   reconnection.
//! - [`PlaybackQueue`] plays the [`pmopcm::JoinedStream`]s pushed to a
//!   destination one at a time, in push order, with cancellation of the
//!   current playback.
//! - [`RecoverySupervisor`] saves live connections at shutdown and resumes
//!   them at the next start, using a [`SnapshotStore`] such as
//!   [`SqliteSnapshotStore`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use pmoconfig::Config;
//! use pmopcm::{AudioRequestList, AudioSource, SourceFormat};
//! use pmovoice::{RecoverySupervisor, SqliteSnapshotStore, VoiceConfigExt, VoiceService};
//!
//! let config = Config::load_config("")?;
//! let _logs = pmovoice::logging::init_logging(&config)?;
//!
//! let service = Arc::new(VoiceService::new(provider));
//! let store = Arc::new(SqliteSnapshotStore::new(&config.snapshot_db_path()?)?);
//! let recovery = Arc::new(RecoverySupervisor::new(
//!     service.clone(),
//!     store,
//!     announcer,
//!     config.resume_message(),
//! ));
//! recovery.on_startup().await;
//! let hook = recovery.clone().spawn_shutdown_hook(shutdown_token);
//!
//! service.join(guild, voice_channel, text_channel).await?;
//! let speech = AudioRequestList::new(vec![
//!     tts.get_stream("bonjour").await?,
//!     AudioSource::from_bytes(SourceFormat::Container, "ding.wav", ding),
//! ])?;
//! service.push(guild, speech.into_joined()).await?;
//! ```

pub mod config_ext;
pub mod error;
pub mod ids;
pub mod logging;
pub mod persistence;
pub mod playback;
pub mod queue;
pub mod recovery;
pub mod service;
pub mod sink;

pub use config_ext::VoiceConfigExt;
pub use error::{Result, VoiceError};
pub use ids::{ChannelId, DestinationId};
pub use logging::{LogHandle, init_logging};
pub use persistence::{RecoverySnapshot, SnapshotStore, SqliteSnapshotStore};
pub use playback::{PlaybackId, PlaybackStream};
pub use queue::{PlaybackQueue, QueueState};
pub use recovery::{RecoveryReport, RecoverySupervisor};
pub use service::{Connection, ConnectionState, VoiceService, VoiceStatus};
pub use sink::{Announcer, SinkProvider, VoiceSink};
