//! Types d'erreurs pour pmovoice

use pmopcm::PcmError;

use crate::ids::{ChannelId, DestinationId};

/// Erreurs du pipeline de lecture vocale
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("Destination {0} is not connected")]
    NotConnected(DestinationId),

    #[error("No live output sink for destination {0}")]
    SinkUnavailable(DestinationId),

    #[error("Failed to connect destination {destination} to channel {channel}: {message}")]
    Connect {
        destination: DestinationId,
        channel: ChannelId,
        message: String,
    },

    #[error("Failed to disconnect destination {destination}: {message}")]
    Disconnect {
        destination: DestinationId,
        message: String,
    },

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Playback queue of destination {0} is closed")]
    QueueClosed(DestinationId),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Announcement failed on channel {channel}: {message}")]
    Announce { channel: ChannelId, message: String },

    #[error(transparent)]
    Pcm(#[from] PcmError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type Result spécialisé pour pmovoice
pub type Result<T> = std::result::Result<T, VoiceError>;
