//! Collaborateurs externes : fournisseur de sorties audio, sortie vocale et
//! annonces textuelles.

use std::{fmt::Debug, sync::Arc};

use crate::{
    error::Result,
    ids::{ChannelId, DestinationId},
    playback::PlaybackStream,
};

/// Opens and closes real-time voice outputs.
///
/// # Examples
///
/// ```ignore
/// #[async_trait::async_trait]
/// impl SinkProvider for GatewayProvider {
///     async fn connect(&self, destination: DestinationId, channel: ChannelId) -> Result<Arc<dyn VoiceSink>> {
///         let connection = self.gateway.join(destination, channel).await?;
///         Ok(Arc::new(GatewaySink::new(connection)))
///     }
///
///     async fn disconnect(&self, sink: Arc<dyn VoiceSink>) -> Result<()> {
///         self.gateway.leave(sink.channel()).await
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait SinkProvider: Send + Sync {
    /// Establishes the voice connection of `destination` in `channel`.
    async fn connect(
        &self,
        destination: DestinationId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceSink>>;

    /// Releases a sink previously returned by [`SinkProvider::connect`].
    async fn disconnect(&self, sink: Arc<dyn VoiceSink>) -> Result<()>;
}

/// A live voice output accepting one PCM stream at a time.
#[async_trait::async_trait]
pub trait VoiceSink: Debug + Send + Sync {
    /// Voice channel the sink is attached to.
    fn channel(&self) -> ChannelId;

    /// False once the underlying connection is gone.
    fn is_alive(&self) -> bool;

    /// Plays `stream` until it is exhausted or forcibly ended.
    ///
    /// Returning is the "finished" notification: `Ok` when the stream reached
    /// its end (naturally or because it was cancelled), `Err` when reading it
    /// failed.
    async fn play(&self, stream: PlaybackStream) -> Result<()>;
}

/// Posts text messages, used to announce that reading resumed after a
/// restart.
#[async_trait::async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, channel: ChannelId, message: &str) -> Result<()>;
}
