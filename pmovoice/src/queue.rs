//! File de lecture d'une destination.
//!
//! Each connected destination runs one queue worker. The worker owns the
//! pending streams and the active playback; the [`PlaybackQueue`] handle only
//! sends commands and observes the published [`QueueState`]. Playbacks run
//! one at a time, in push order.

use std::{collections::VecDeque, sync::Arc};

use pmopcm::JoinedStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::{
    error::{Result, VoiceError},
    ids::DestinationId,
    playback::{PlaybackControl, PlaybackId, PlaybackStream},
    sink::VoiceSink,
};

const COMMAND_CAPACITY: usize = 32;

/// Snapshot of a queue published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueState {
    /// Playback currently handed to the sink.
    pub active: Option<PlaybackId>,
    /// Streams waiting for their turn.
    pub pending: usize,
    /// Playbacks that reached their end, normally or not.
    pub settled: u64,
    /// Playbacks whose stream or sink reported an error.
    pub failed: u64,
    /// False once the worker has stopped.
    pub running: bool,
}

impl QueueState {
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.pending == 0
    }
}

#[derive(Debug)]
enum QueueCommand {
    Push {
        stream: JoinedStream,
        reply: oneshot::Sender<Result<PlaybackId>>,
    },
    CancelActive {
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    Clear {
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Notification sent by a playback task when the sink returned.
struct Finished {
    id: PlaybackId,
    result: Result<()>,
}

/// Handle on the playback queue of one destination.
#[derive(Debug, Clone)]
pub struct PlaybackQueue {
    destination: DestinationId,
    commands: mpsc::Sender<QueueCommand>,
    state: watch::Receiver<QueueState>,
}

impl PlaybackQueue {
    /// Starts the worker draining into `sink`. Must be called from within a
    /// Tokio runtime.
    pub fn spawn(destination: DestinationId, sink: Arc<dyn VoiceSink>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(QueueState {
            running: true,
            ..QueueState::default()
        });

        let worker = QueueWorker::new(destination, sink, state_tx);
        tokio::spawn(worker.run(rx));

        Self {
            destination,
            commands: tx,
            state: state_rx,
        }
    }

    pub fn destination(&self) -> DestinationId {
        self.destination
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> QueueCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| VoiceError::QueueClosed(self.destination))?;
        response
            .await
            .map_err(|_| VoiceError::QueueClosed(self.destination))
    }

    /// Appends `stream`; it starts right away when nothing is playing.
    ///
    /// When the sink is no longer alive the stream is released and
    /// [`VoiceError::SinkUnavailable`] is returned.
    pub async fn push(&self, stream: JoinedStream) -> Result<PlaybackId> {
        let (reply, response) = oneshot::channel();
        if let Err(mpsc::error::SendError(command)) = self
            .commands
            .send(QueueCommand::Push { stream, reply })
            .await
        {
            if let QueueCommand::Push { mut stream, .. } = command {
                stream.cancel();
            }
            return Err(VoiceError::QueueClosed(self.destination));
        }
        response
            .await
            .map_err(|_| VoiceError::QueueClosed(self.destination))?
    }

    /// Ends the active playback, if any. Pending streams are left untouched.
    pub async fn cancel_active(&self, reason: &str) -> Result<bool> {
        let reason = reason.to_owned();
        self.request(|reply| QueueCommand::CancelActive { reason, reply })
            .await
    }

    /// Drops every pending stream and returns how many there were. The
    /// active playback keeps going.
    pub async fn clear(&self) -> Result<usize> {
        self.request(|reply| QueueCommand::Clear { reply }).await
    }

    /// Clears the queue, ends the active playback and stops the worker.
    /// Calling it on a stopped queue does nothing.
    pub async fn shutdown(&self) {
        if self
            .request(|reply| QueueCommand::Shutdown { reply })
            .await
            .is_err()
        {
            trace!(destination = %self.destination, "queue already stopped");
        }
    }

    pub fn state(&self) -> QueueState {
        self.state.borrow().clone()
    }

    pub fn is_speaking(&self) -> bool {
        self.state.borrow().active.is_some()
    }

    /// Resolves once nothing is playing and nothing is pending, or the
    /// worker stopped.
    pub async fn wait_idle(&self) -> QueueState {
        self.wait_for(|state| state.is_idle() || !state.running).await
    }

    /// Resolves once the published state satisfies `predicate`.
    pub async fn wait_for(&self, predicate: impl FnMut(&QueueState) -> bool) -> QueueState {
        let mut state = self.state.clone();
        if let Ok(current) = state.wait_for(predicate).await {
            return current.clone();
        }
        state.borrow().clone()
    }
}

struct ActivePlayback {
    control: PlaybackControl,
}

struct QueueWorker {
    destination: DestinationId,
    sink: Arc<dyn VoiceSink>,
    pending: VecDeque<(PlaybackId, JoinedStream)>,
    active: Option<ActivePlayback>,
    settled: u64,
    failed: u64,
    state: watch::Sender<QueueState>,
    finished_tx: mpsc::UnboundedSender<Finished>,
    finished_rx: mpsc::UnboundedReceiver<Finished>,
    shutdown: bool,
}

impl QueueWorker {
    fn new(
        destination: DestinationId,
        sink: Arc<dyn VoiceSink>,
        state: watch::Sender<QueueState>,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            destination,
            sink,
            pending: VecDeque::new(),
            active: None,
            settled: 0,
            failed: 0,
            state,
            finished_tx,
            finished_rx,
            shutdown: false,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<QueueCommand>) {
        debug!(destination = %self.destination, "playback queue started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => self.stop(),
                },
                Some(finished) = self.finished_rx.recv() => self.on_finished(finished),
            }

            if self.shutdown {
                break;
            }
        }

        debug!(destination = %self.destination, "playback queue stopped");
    }

    fn handle_command(&mut self, command: QueueCommand) {
        match command {
            QueueCommand::Push { stream, reply } => {
                let _ = reply.send(self.push(stream));
            }
            QueueCommand::CancelActive { reason, reply } => {
                let _ = reply.send(self.cancel_active(&reason));
            }
            QueueCommand::Clear { reply } => {
                let _ = reply.send(self.clear());
            }
            QueueCommand::Shutdown { reply } => {
                self.stop();
                let _ = reply.send(());
            }
        }
    }

    fn push(&mut self, mut stream: JoinedStream) -> Result<PlaybackId> {
        if !self.sink.is_alive() {
            stream.cancel();
            warn!(destination = %self.destination, "sink is gone, rejecting stream");
            return Err(VoiceError::SinkUnavailable(self.destination));
        }

        let id = PlaybackId::next();
        trace!(
            destination = %self.destination,
            playback = %id,
            sources = stream.source_count(),
            "stream queued"
        );
        self.pending.push_back((id, stream));
        self.promote();
        self.publish();
        Ok(id)
    }

    fn cancel_active(&mut self, reason: &str) -> bool {
        match &self.active {
            Some(active) => {
                active.control.end(reason);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) -> usize {
        let cleared = self.pending.len();
        for (_, mut stream) in self.pending.drain(..) {
            stream.cancel();
        }
        if cleared > 0 {
            debug!(destination = %self.destination, cleared, "pending streams dropped");
            self.publish();
        }
        cleared
    }

    fn stop(&mut self) {
        self.clear();
        if let Some(active) = self.active.take() {
            active.control.end("queue shutdown");
        }
        self.shutdown = true;
        self.publish();
    }

    /// Hands the head of the queue to the sink when nothing is playing.
    fn promote(&mut self) {
        if self.active.is_some() {
            return;
        }
        let Some((id, joined)) = self.pending.pop_front() else {
            return;
        };

        let (stream, control) = PlaybackStream::new(id, joined);
        let sink = self.sink.clone();
        let finished = self.finished_tx.clone();
        tokio::spawn(async move {
            // a panicking sink must still settle the playback
            let result = match tokio::spawn(async move { sink.play(stream).await }).await {
                Ok(result) => result,
                Err(err) => Err(VoiceError::Playback(format!("sink task failed: {err}"))),
            };
            let _ = finished.send(Finished { id, result });
        });

        debug!(destination = %self.destination, playback = %id, "playback started");
        self.active = Some(ActivePlayback { control });
    }

    fn on_finished(&mut self, finished: Finished) {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|active| active.control.id() == finished.id);
        if !is_active {
            trace!(playback = %finished.id, "stale playback notification");
            return;
        }

        self.active = None;
        self.settled += 1;
        match finished.result {
            Ok(()) => {
                info!(destination = %self.destination, playback = %finished.id, "playback finished")
            }
            Err(err) => {
                self.failed += 1;
                warn!(
                    destination = %self.destination,
                    playback = %finished.id,
                    "playback ended abnormally: {err}"
                );
            }
        }

        self.promote();
        self.publish();
    }

    fn publish(&self) {
        self.state.send_replace(QueueState {
            active: self.active.as_ref().map(|active| active.control.id()),
            pending: self.pending.len(),
            settled: self.settled,
            failed: self.failed,
            running: !self.shutdown,
        });
    }
}
