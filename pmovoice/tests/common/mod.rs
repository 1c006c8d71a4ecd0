#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::anyhow;
use pmopcm::{AudioRequestList, AudioSource, JoinedStream, PcmError, SourceFormat, spawn_source};
use pmovoice::{
    Announcer, ChannelId, DestinationId, PlaybackId, PlaybackStream, Result, SinkProvider,
    VoiceError, VoiceSink,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Played {
    pub id: PlaybackId,
    pub bytes: Vec<u8>,
    pub failed: bool,
}

#[derive(Debug)]
pub struct FakeSink {
    channel: ChannelId,
    alive: AtomicBool,
    played: Mutex<Vec<Played>>,
    playing: AtomicUsize,
    max_playing: AtomicUsize,
    crash_next: AtomicBool,
}

impl FakeSink {
    fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            alive: AtomicBool::new(true),
            played: Mutex::new(Vec::new()),
            playing: AtomicUsize::new(0),
            max_playing: AtomicUsize::new(0),
            crash_next: AtomicBool::new(false),
        }
    }

    /// The next `play` call panics before reading anything.
    pub fn crash_next_play(&self) {
        self.crash_next.store(true, Ordering::SeqCst);
    }

    pub fn is_alive_now(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn played(&self) -> Vec<Played> {
        self.played.lock().unwrap().clone()
    }

    pub fn max_playing(&self) -> usize {
        self.max_playing.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VoiceSink for FakeSink {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn play(&self, mut stream: PlaybackStream) -> Result<()> {
        if self.crash_next.swap(false, Ordering::SeqCst) {
            panic!("voice gateway crashed while playing {}", stream.id());
        }

        let now = self.playing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_playing.fetch_max(now, Ordering::SeqCst);

        let mut bytes = Vec::new();
        let mut buf = [0u8; 64];
        let outcome = loop {
            match stream.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => bytes.extend_from_slice(&buf[..n]),
                Err(err) => break Err(VoiceError::Playback(err.to_string())),
            }
        };

        self.played.lock().unwrap().push(Played {
            id: stream.id(),
            bytes,
            failed: outcome.is_err(),
        });
        self.playing.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[derive(Default)]
pub struct FakeProvider {
    connects: Mutex<Vec<(DestinationId, ChannelId)>>,
    disconnects: AtomicUsize,
    refused: Mutex<HashSet<ChannelId>>,
    fail_disconnect: AtomicBool,
    sinks: Mutex<Vec<Arc<FakeSink>>>,
}

impl FakeProvider {
    pub fn refuse(&self, channel: ChannelId) {
        self.refused.lock().unwrap().insert(channel);
    }

    pub fn fail_disconnect(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }

    pub fn connects(&self) -> Vec<(DestinationId, ChannelId)> {
        self.connects.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Most recent sink opened on `channel`.
    pub fn sink(&self, channel: ChannelId) -> Arc<FakeSink> {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|sink| sink.channel == channel)
            .cloned()
            .expect("no sink opened on this channel")
    }
}

#[async_trait::async_trait]
impl SinkProvider for FakeProvider {
    async fn connect(
        &self,
        destination: DestinationId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceSink>> {
        if self.refused.lock().unwrap().contains(&channel) {
            return Err(anyhow!("channel {channel} is unreachable").into());
        }
        self.connects.lock().unwrap().push((destination, channel));
        let sink = Arc::new(FakeSink::new(channel));
        self.sinks.lock().unwrap().push(sink.clone());
        Ok(sink as Arc<dyn VoiceSink>)
    }

    async fn disconnect(&self, sink: Arc<dyn VoiceSink>) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if let Some(fake) = self
            .sinks
            .lock()
            .unwrap()
            .iter()
            .find(|fake| std::ptr::addr_eq(Arc::as_ptr(fake), Arc::as_ptr(&sink)))
        {
            fake.kill();
        }
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(anyhow!("gateway timeout").into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAnnouncer {
    messages: Mutex<Vec<(ChannelId, String)>>,
}

impl FakeAnnouncer {
    pub fn messages(&self) -> Vec<(ChannelId, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Announcer for FakeAnnouncer {
    async fn announce(&self, channel: ChannelId, message: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((channel, message.to_owned()));
        Ok(())
    }
}

/// Canonical clip of `len` bytes all equal to `byte`.
pub fn clip(byte: u8, len: usize) -> JoinedStream {
    AudioRequestList::single(AudioSource::from_bytes(
        SourceFormat::Canonical,
        format!("clip {byte}"),
        vec![byte; len],
    ))
    .into_joined()
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Stream whose producer writes `head` and then never finishes. The flag is
/// raised once the producer task is dropped.
pub fn stalled(head: Vec<u8>) -> (JoinedStream, Arc<AtomicBool>) {
    let released = Arc::new(AtomicBool::new(false));
    let flag = DropFlag(released.clone());
    let source = spawn_source(SourceFormat::Canonical, "stalled", 64, move |mut w| async move {
        let _flag = flag;
        w.write_all(&head).await?;
        std::future::pending::<()>().await;
        Ok::<(), PcmError>(())
    });
    (AudioRequestList::single(source).into_joined(), released)
}

/// Stream whose producer writes `head` and then fails.
pub fn failing(head: Vec<u8>) -> JoinedStream {
    let source = spawn_source(SourceFormat::Canonical, "failing", 64, move |mut w| async move {
        w.write_all(&head).await?;
        Err::<(), _>(PcmError::Producer("synthesis timed out".into()))
    });
    AudioRequestList::single(source).into_joined()
}

/// Polls `check` until it holds or the deadline passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
