//! Reprise des connexions après un redémarrage.
//!
//! On shutdown every connected destination is left and a
//! [`RecoverySnapshot`] is stored. On the next startup each snapshot is
//! replayed once and deleted, whether the replay worked or not. Both
//! procedures are best effort: one destination failing never stops the
//! others.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, VoiceError},
    ids::DestinationId,
    persistence::{RecoverySnapshot, SnapshotStore},
    service::VoiceService,
    sink::Announcer,
};

/// Outcome of a shutdown or startup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub succeeded: Vec<DestinationId>,
    pub failed: Vec<(DestinationId, String)>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    fn fail(&mut self, destination: DestinationId, err: impl ToString) {
        self.failed.push((destination, err.to_string()));
    }
}

pub struct RecoverySupervisor {
    service: Arc<VoiceService>,
    store: Arc<dyn SnapshotStore>,
    announcer: Arc<dyn Announcer>,
    resume_message: String,
}

impl RecoverySupervisor {
    pub fn new(
        service: Arc<VoiceService>,
        store: Arc<dyn SnapshotStore>,
        announcer: Arc<dyn Announcer>,
        resume_message: impl Into<String>,
    ) -> Self {
        Self {
            service,
            store,
            announcer,
            resume_message: resume_message.into(),
        }
    }

    /// Leaves every connected destination and stores its snapshot.
    ///
    /// A failing `leave` is logged and the snapshot is still stored: the
    /// local state is gone either way and the destination should come back
    /// on the next start.
    pub async fn on_shutdown(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        let destinations = self.service.connected_destinations().await;
        info!(count = destinations.len(), "saving voice connections before shutdown");

        for destination in destinations {
            let Some(snapshot) = self.service.snapshot(destination).await else {
                debug!(%destination, "destination disconnected meanwhile, nothing to save");
                continue;
            };

            if let Err(err) = self.service.leave(destination).await {
                warn!(%destination, "leave failed during shutdown: {err}");
            }

            match self.store.insert(&snapshot).await {
                Ok(()) => {
                    debug!(%destination, channel = %snapshot.voice_channel, "recovery snapshot saved");
                    report.succeeded.push(destination);
                }
                Err(err) => {
                    error!(%destination, "failed to save recovery snapshot: {err}");
                    report.fail(destination, err);
                }
            }
        }

        report
    }

    /// Replays every stored snapshot, then deletes it.
    pub async fn on_startup(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        let snapshots = match self.store.find_all().await {
            Ok(snapshots) => snapshots,
            Err(err) => {
                error!("failed to load recovery snapshots: {err}");
                return report;
            }
        };
        info!(count = snapshots.len(), "resuming voice connections");

        for snapshot in snapshots {
            let destination = snapshot.destination;
            match self.replay(&snapshot).await {
                Ok(()) => report.succeeded.push(destination),
                Err(err) => {
                    warn!(%destination, "could not resume voice connection: {err}");
                    report.fail(destination, err);
                }
            }

            if let Err(err) = self.store.remove(destination).await {
                error!(%destination, "failed to delete recovery snapshot: {err}");
            }
        }

        report
    }

    async fn replay(&self, snapshot: &RecoverySnapshot) -> Result<()> {
        let destination = snapshot.destination;
        let Some((first, others)) = snapshot.reading_channels.split_first() else {
            return Err(VoiceError::Persistence(format!(
                "snapshot of destination {destination} has no reading channel, discarded"
            )));
        };

        self.service
            .join(destination, snapshot.voice_channel, *first)
            .await?;
        // the connection is back, a lost reading channel or announcement is
        // not a failure
        for channel in others {
            if let Err(err) = self.service.add_reading_channel(destination, *channel).await {
                warn!(%destination, %channel, "could not restore reading channel: {err}");
            }
        }

        if let Err(err) = self.announcer.announce(*first, &self.resume_message).await {
            warn!(%destination, channel = %first, "resume announcement failed: {err}");
        }

        info!(
            %destination,
            channel = %snapshot.voice_channel,
            reading = snapshot.reading_channels.len(),
            "voice connection resumed"
        );
        Ok(())
    }

    /// Runs [`RecoverySupervisor::on_shutdown`] on Ctrl+C or when `token` is
    /// cancelled, whichever comes first.
    pub fn spawn_shutdown_hook(self: Arc<Self>, token: CancellationToken) -> JoinHandle<RecoveryReport> {
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => info!("interrupt received"),
                    Err(err) => {
                        warn!("cannot listen for Ctrl+C: {err}");
                        token.cancelled().await;
                    }
                },
                _ = token.cancelled() => info!("shutdown requested"),
            }
            self.on_shutdown().await
        })
    }
}
