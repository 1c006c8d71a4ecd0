mod common;

use std::sync::{Arc, OnceLock, Weak};

use common::{FakeAnnouncer, FakeProvider, WAIT};
use pmovoice::{
    ChannelId, DestinationId, RecoverySnapshot, RecoverySupervisor, Result, SinkProvider,
    SnapshotStore, SqliteSnapshotStore, VoiceService, VoiceSink, VoiceStatus,
};
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const RESUME: &str = "Reading resumes here.";

struct Process {
    service: Arc<VoiceService>,
    provider: Arc<FakeProvider>,
    announcer: Arc<FakeAnnouncer>,
    supervisor: Arc<RecoverySupervisor>,
}

/// A fresh process sharing the snapshot database of previous ones.
fn start(store: Arc<SqliteSnapshotStore>) -> Process {
    let provider = Arc::new(FakeProvider::default());
    let announcer = Arc::new(FakeAnnouncer::default());
    let service = Arc::new(VoiceService::new(provider.clone()));
    let supervisor = Arc::new(RecoverySupervisor::new(
        service.clone(),
        store,
        announcer.clone(),
        RESUME,
    ));
    Process {
        service,
        provider,
        announcer,
        supervisor,
    }
}

fn store(dir: &TempDir) -> Arc<SqliteSnapshotStore> {
    Arc::new(SqliteSnapshotStore::new(&dir.path().join("recovery").join("recovery.db")).unwrap())
}

#[tokio::test]
async fn connections_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let guild = DestinationId(1);

    let before = start(store(&dir));
    before.service.join(guild, ChannelId(10), ChannelId(100)).await.unwrap();
    before
        .service
        .add_reading_channel(guild, ChannelId(101))
        .await
        .unwrap();

    let report = before.supervisor.on_shutdown().await;
    assert_eq!(report.succeeded, vec![guild]);
    assert!(report.failed.is_empty());
    assert_eq!(before.service.status(guild).await, VoiceStatus::Disconnected);
    assert_eq!(before.provider.disconnects(), 1);

    // the database is reopened as a new process would
    let after = start(store(&dir));
    assert_eq!(store(&dir).find_all().await.unwrap().len(), 1);
    let report = after.supervisor.on_startup().await;
    assert_eq!(report.succeeded, vec![guild]);

    assert_eq!(after.service.status(guild).await, VoiceStatus::Ready);
    assert_eq!(after.service.voice_channel(guild).await, Some(ChannelId(10)));
    assert_eq!(
        after.service.reading_channels(guild).await,
        vec![ChannelId(100), ChannelId(101)]
    );
    assert_eq!(
        after.announcer.messages(),
        vec![(ChannelId(100), RESUME.to_owned())]
    );
    assert!(store(&dir).find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn one_failing_destination_does_not_stop_the_others() {
    let dir = TempDir::new().unwrap();
    let before = start(store(&dir));
    for id in 1..=3u64 {
        before
            .service
            .join(DestinationId(id), ChannelId(id * 10), ChannelId(id * 100))
            .await
            .unwrap();
    }
    before.provider.fail_disconnect();

    let report = before.supervisor.on_shutdown().await;
    assert_eq!(report.succeeded.len(), 3);
    assert!(before.service.connected_destinations().await.is_empty());

    let after = start(store(&dir));
    after.provider.refuse(ChannelId(20));
    let report = after.supervisor.on_startup().await;

    assert_eq!(report.succeeded, vec![DestinationId(1), DestinationId(3)]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, DestinationId(2));
    assert_eq!(
        after.service.status(DestinationId(2)).await,
        VoiceStatus::Disconnected
    );
    // replayed snapshots are consumed whatever the outcome
    assert!(store(&dir).find_all().await.unwrap().is_empty());
}

/// Provider whose connections are closed again by another task right after
/// they open.
#[derive(Default)]
struct DroppingProvider {
    inner: FakeProvider,
    service: OnceLock<Weak<VoiceService>>,
}

#[async_trait::async_trait]
impl SinkProvider for DroppingProvider {
    async fn connect(
        &self,
        destination: DestinationId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceSink>> {
        let sink = self.inner.connect(destination, channel).await?;
        if let Some(service) = self.service.get().and_then(Weak::upgrade) {
            tokio::spawn(async move {
                let _ = service.leave(destination).await;
            });
            // lets the leave queue up on the destination lock
            tokio::task::yield_now().await;
        }
        Ok(sink)
    }

    async fn disconnect(&self, sink: Arc<dyn VoiceSink>) -> Result<()> {
        self.inner.disconnect(sink).await
    }
}

#[tokio::test]
async fn lost_reading_channel_does_not_fail_the_replay() {
    let dir = TempDir::new().unwrap();
    let guild = DestinationId(4);
    let snapshots = store(&dir);
    snapshots
        .insert(&RecoverySnapshot::new(
            guild,
            ChannelId(40),
            vec![ChannelId(400), ChannelId(401)],
        ))
        .await
        .unwrap();

    let provider = Arc::new(DroppingProvider::default());
    let service = Arc::new(VoiceService::new(provider.clone()));
    let _ = provider.service.set(Arc::downgrade(&service));
    let announcer = Arc::new(FakeAnnouncer::default());
    let supervisor = RecoverySupervisor::new(
        service.clone(),
        snapshots.clone(),
        announcer.clone(),
        RESUME,
    );

    let report = supervisor.on_startup().await;

    assert_eq!(report.succeeded, vec![guild]);
    assert!(report.failed.is_empty());
    assert_eq!(
        announcer.messages(),
        vec![(ChannelId(400), RESUME.to_owned())]
    );
    assert_eq!(provider.inner.disconnects(), 1);
    assert_eq!(service.status(guild).await, VoiceStatus::Disconnected);
    assert!(snapshots.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn snapshot_without_reading_channel_is_discarded() {
    let dir = TempDir::new().unwrap();
    let snapshots = store(&dir);
    snapshots
        .insert(&RecoverySnapshot::new(DestinationId(5), ChannelId(50), Vec::new()))
        .await
        .unwrap();

    let process = start(snapshots.clone());
    let report = process.supervisor.on_startup().await;

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed[0].0, DestinationId(5));
    assert!(process.provider.connects().is_empty());
    assert!(snapshots.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_hooks_are_harmless() {
    let dir = TempDir::new().unwrap();
    let process = start(store(&dir));
    process
        .service
        .join(DestinationId(1), ChannelId(10), ChannelId(100))
        .await
        .unwrap();

    assert_eq!(process.supervisor.on_shutdown().await.succeeded.len(), 1);
    assert!(process.supervisor.on_shutdown().await.is_empty());

    let restarted = start(store(&dir));
    assert_eq!(restarted.supervisor.on_startup().await.succeeded.len(), 1);
    assert!(restarted.supervisor.on_startup().await.is_empty());
    assert_eq!(restarted.provider.connects().len(), 1);
}

#[tokio::test]
async fn shutdown_hook_runs_on_cancellation() {
    let dir = TempDir::new().unwrap();
    let process = start(store(&dir));
    process
        .service
        .join(DestinationId(1), ChannelId(10), ChannelId(100))
        .await
        .unwrap();

    let token = CancellationToken::new();
    let hook = process.supervisor.clone().spawn_shutdown_hook(token.clone());
    token.cancel();

    let report = timeout(WAIT, hook).await.unwrap().unwrap();
    assert_eq!(report.succeeded, vec![DestinationId(1)]);
    assert_eq!(store(&dir).find_all().await.unwrap().len(), 1);
}
