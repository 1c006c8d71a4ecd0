//! Cycle de vie des connexions vocales.
//!
//! [`VoiceService`] is the registry of every destination this process
//! serves. Each destination has its own lock, so operations on one
//! destination run one after the other while different destinations never
//! wait on each other.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use pmopcm::JoinedStream;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, VoiceError},
    ids::{ChannelId, DestinationId},
    persistence::RecoverySnapshot,
    playback::PlaybackId,
    queue::{PlaybackQueue, QueueState},
    sink::{SinkProvider, VoiceSink},
};

/// État observable d'une destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceStatus {
    Disconnected,
    /// Connected, nothing playing.
    Ready,
    /// Connected with an active playback.
    Speaking,
}

/// A live connection: output sink, its queue and the channels read aloud.
#[derive(Debug)]
pub struct Connection {
    channel: ChannelId,
    sink: Arc<dyn VoiceSink>,
    queue: PlaybackQueue,
    reading: Vec<ChannelId>,
}

impl Connection {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    /// Reading channels in the order they were added.
    pub fn reading_channels(&self) -> &[ChannelId] {
        &self.reading
    }

    fn add_reading(&mut self, channel: ChannelId) -> bool {
        if self.reading.contains(&channel) {
            return false;
        }
        self.reading.push(channel);
        true
    }
}

#[derive(Debug, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected(Connection),
}

impl ConnectionState {
    pub fn connection(&self) -> Option<&Connection> {
        match self {
            ConnectionState::Connected(connection) => Some(connection),
            ConnectionState::Disconnected => None,
        }
    }

    fn connection_mut(&mut self) -> Option<&mut Connection> {
        match self {
            ConnectionState::Connected(connection) => Some(connection),
            ConnectionState::Disconnected => None,
        }
    }

    pub fn status(&self) -> VoiceStatus {
        match self {
            ConnectionState::Disconnected => VoiceStatus::Disconnected,
            ConnectionState::Connected(connection) if connection.queue.is_speaking() => {
                VoiceStatus::Speaking
            }
            ConnectionState::Connected(_) => VoiceStatus::Ready,
        }
    }
}

type SharedState = Arc<Mutex<ConnectionState>>;

/// Registry of voice destinations.
pub struct VoiceService {
    provider: Arc<dyn SinkProvider>,
    destinations: StdMutex<HashMap<DestinationId, SharedState>>,
}

impl VoiceService {
    pub fn new(provider: Arc<dyn SinkProvider>) -> Self {
        Self {
            provider,
            destinations: StdMutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<DestinationId, SharedState>> {
        self.destinations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// State of `destination`, created on first use.
    fn entry(&self, destination: DestinationId) -> SharedState {
        self.registry().entry(destination).or_default().clone()
    }

    fn existing(&self, destination: DestinationId) -> Option<SharedState> {
        self.registry().get(&destination).cloned()
    }

    /// Locks the registered state of `destination`, retrying when the entry
    /// was dropped from the registry while waiting for the lock.
    async fn lock_registered(
        &self,
        destination: DestinationId,
    ) -> (SharedState, OwnedMutexGuard<ConnectionState>) {
        loop {
            let entry = self.entry(destination);
            let state = entry.clone().lock_owned().await;
            let registered = self
                .registry()
                .get(&destination)
                .is_some_and(|current| Arc::ptr_eq(current, &entry));
            if registered {
                return (entry, state);
            }
        }
    }

    /// Drops the registry entry of a disconnected destination. The caller
    /// must hold the entry's lock.
    fn forget(&self, destination: DestinationId, entry: &SharedState) {
        let mut registry = self.registry();
        if registry
            .get(&destination)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            registry.remove(&destination);
        }
    }

    /// Number of destinations held in the registry.
    pub fn destination_count(&self) -> usize {
        self.registry().len()
    }

    /// Connects `destination` to `channel` and starts reading
    /// `reading_channel` there.
    ///
    /// An existing connection of the same destination is torn down first:
    /// its queue is cleared, its playback ended and its sink released.
    /// Only the outcome of the new connection is returned; a failure to
    /// release the previous sink is logged at warn level.
    pub async fn join(
        &self,
        destination: DestinationId,
        channel: ChannelId,
        reading_channel: ChannelId,
    ) -> Result<()> {
        let (entry, mut state) = self.lock_registered(destination).await;

        if let ConnectionState::Connected(previous) = std::mem::take(&mut *state) {
            debug!(
                %destination,
                previous = %previous.channel,
                %channel,
                "superseding existing connection"
            );
            if let Err(err) = self.teardown(destination, previous).await {
                warn!(%destination, "failed to release previous connection: {err}");
            }
        }

        let sink = match self.provider.connect(destination, channel).await {
            Ok(sink) => sink,
            Err(err) => {
                self.forget(destination, &entry);
                return Err(VoiceError::Connect {
                    destination,
                    channel,
                    message: err.to_string(),
                });
            }
        };

        let queue = PlaybackQueue::spawn(destination, sink.clone());
        *state = ConnectionState::Connected(Connection {
            channel,
            sink,
            queue,
            reading: vec![reading_channel],
        });

        info!(%destination, %channel, reading = %reading_channel, "voice connection established");
        Ok(())
    }

    /// Tears the connection down. Returns `false` when it was already
    /// disconnected.
    ///
    /// Local state is cleared before the sink is released, so a failing
    /// disconnect still leaves the destination `Disconnected`. The
    /// destination is dropped from the registry either way.
    pub async fn leave(&self, destination: DestinationId) -> Result<bool> {
        let Some(entry) = self.existing(destination) else {
            return Ok(false);
        };
        let mut state = entry.lock().await;

        let outcome = match std::mem::take(&mut *state) {
            ConnectionState::Disconnected => Ok(false),
            ConnectionState::Connected(connection) => self
                .teardown(destination, connection)
                .await
                .map(|()| {
                    info!(%destination, "voice connection closed");
                    true
                }),
        };
        self.forget(destination, &entry);
        outcome
    }

    async fn teardown(&self, destination: DestinationId, connection: Connection) -> Result<()> {
        let Connection { sink, queue, .. } = connection;
        queue.shutdown().await;

        self.provider
            .disconnect(sink)
            .await
            .map_err(|err| VoiceError::Disconnect {
                destination,
                message: err.to_string(),
            })
    }

    /// Enqueues `stream` on the destination's queue.
    ///
    /// Without a live connection the stream is released right away and
    /// [`VoiceError::SinkUnavailable`] is returned.
    pub async fn push(&self, destination: DestinationId, mut stream: JoinedStream) -> Result<PlaybackId> {
        match self.queue(destination).await {
            Some(queue) => queue.push(stream).await,
            None => {
                stream.cancel();
                debug!(%destination, "push without a connection, stream released");
                Err(VoiceError::SinkUnavailable(destination))
            }
        }
    }

    /// Ends the active playback of `destination`. Returns `false` when
    /// nothing was playing.
    pub async fn cancel_active(&self, destination: DestinationId, reason: &str) -> Result<bool> {
        match self.queue(destination).await {
            Some(queue) => queue.cancel_active(reason).await,
            None => Ok(false),
        }
    }

    /// Drops every pending stream of `destination`.
    pub async fn clear_queue(&self, destination: DestinationId) -> Result<usize> {
        match self.queue(destination).await {
            Some(queue) => queue.clear().await,
            None => Ok(0),
        }
    }

    pub async fn add_reading_channel(
        &self,
        destination: DestinationId,
        channel: ChannelId,
    ) -> Result<bool> {
        let entry = self
            .existing(destination)
            .ok_or(VoiceError::NotConnected(destination))?;
        let mut state = entry.lock().await;
        let connection = state
            .connection_mut()
            .ok_or(VoiceError::NotConnected(destination))?;
        Ok(connection.add_reading(channel))
    }

    pub async fn remove_reading_channel(&self, destination: DestinationId, channel: ChannelId) -> bool {
        let Some(entry) = self.existing(destination) else {
            return false;
        };
        let mut state = entry.lock().await;
        let Some(connection) = state.connection_mut() else {
            return false;
        };
        let before = connection.reading.len();
        connection.reading.retain(|c| *c != channel);
        connection.reading.len() != before
    }

    pub async fn is_reading_channel(&self, destination: DestinationId, channel: ChannelId) -> bool {
        self.reading_channels(destination).await.contains(&channel)
    }

    pub async fn reading_channels(&self, destination: DestinationId) -> Vec<ChannelId> {
        let Some(entry) = self.existing(destination) else {
            return Vec::new();
        };
        let state = entry.lock().await;
        state
            .connection()
            .map(|c| c.reading.clone())
            .unwrap_or_default()
    }

    pub async fn voice_channel(&self, destination: DestinationId) -> Option<ChannelId> {
        let entry = self.existing(destination)?;
        let state = entry.lock().await;
        state.connection().map(Connection::channel)
    }

    pub async fn status(&self, destination: DestinationId) -> VoiceStatus {
        let Some(entry) = self.existing(destination) else {
            return VoiceStatus::Disconnected;
        };
        let state = entry.lock().await;
        state.status()
    }

    /// Handle on the queue of a connected destination.
    pub async fn queue(&self, destination: DestinationId) -> Option<PlaybackQueue> {
        let entry = self.existing(destination)?;
        let state = entry.lock().await;
        state.connection().map(|c| c.queue.clone())
    }

    pub async fn queue_state(&self, destination: DestinationId) -> Option<QueueState> {
        self.queue(destination).await.map(|queue| queue.state())
    }

    /// Every destination currently connected, in id order.
    pub async fn connected_destinations(&self) -> Vec<DestinationId> {
        let entries: Vec<(DestinationId, SharedState)> = self
            .registry()
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect();

        let mut connected = Vec::new();
        for (id, state) in entries {
            if state.lock().await.connection().is_some() {
                connected.push(id);
            }
        }
        connected.sort();
        connected
    }

    /// What it takes to reconnect `destination` after a restart.
    pub async fn snapshot(&self, destination: DestinationId) -> Option<RecoverySnapshot> {
        let entry = self.existing(destination)?;
        let state = entry.lock().await;
        state.connection().map(|connection| {
            RecoverySnapshot::new(destination, connection.channel, connection.reading.clone())
        })
    }
}
