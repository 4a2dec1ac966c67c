//! Instrumented fakes of the engine's external collaborators.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use discocache::{ByteStream, CacheError, CacheStore, FsStore};
use discoplay::{
    AcquisitionError, Acquirer, EncodeEngine, EncodeError, EncodeInput, EncodeOptions,
    FrameSource, MusicPlayer, PlayerContext, PlayerEvent, RemoteFetcher, Registry, Track,
    TrackOutcome, Transcoder, TransportError, UrlResolver, VoiceConnection, VoiceGateway,
    VoiceTransport, WritebackError,
};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;

pub const TIMEOUT: Duration = Duration::from_secs(10);

// ───────────────────────────── encode engine ─────────────────────────────

#[derive(Debug, Default)]
pub struct EngineStats {
    pub starts: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub inputs: Mutex<Vec<String>>,
    pub options: Mutex<Vec<EncodeOptions>>,
}

/// Engine producing one frame per `chunk` bytes of stream input, or
/// `locator_frames` frames for a locator, every `interval`.
#[derive(Debug, Clone)]
pub struct MockEngine {
    pub stats: Arc<EngineStats>,
    pub interval: Duration,
    pub chunk: usize,
    pub locator_frames: usize,
}

impl MockEngine {
    pub fn new(interval: Duration, locator_frames: usize) -> Self {
        Self {
            stats: Arc::new(EngineStats::default()),
            interval,
            chunk: 1024,
            locator_frames,
        }
    }

    pub fn starts(&self) -> usize {
        self.stats.starts.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.stats.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.stats.max_live.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.stats.inputs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EncodeEngine for MockEngine {
    async fn start(
        &self,
        input: EncodeInput,
        options: &EncodeOptions,
    ) -> Result<Box<dyn FrameSource>, EncodeError> {
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_live.fetch_max(live, Ordering::SeqCst);
        self.stats.options.lock().unwrap().push(options.clone());

        let (stream, remaining) = match input {
            EncodeInput::Stream(stream) => {
                self.stats.inputs.lock().unwrap().push("stream".to_string());
                (Some(stream), 0)
            }
            EncodeInput::Locator(locator) => {
                self.stats.inputs.lock().unwrap().push(locator);
                (None, self.locator_frames)
            }
        };

        Ok(Box::new(MockFrames {
            stats: self.stats.clone(),
            stream,
            remaining,
            interval: self.interval,
            chunk: self.chunk,
            released: false,
        }))
    }
}

struct MockFrames {
    stats: Arc<EngineStats>,
    stream: Option<ByteStream>,
    remaining: usize,
    interval: Duration,
    chunk: usize,
    released: bool,
}

impl MockFrames {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl FrameSource for MockFrames {
    async fn next_frame(&mut self) -> Result<Option<Bytes>, EncodeError> {
        tokio::time::sleep(self.interval).await;
        match self.stream.as_mut() {
            Some(stream) => {
                let mut buf = vec![0u8; self.chunk];
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            None if self.remaining > 0 => {
                self.remaining -= 1;
                Ok(Some(Bytes::from_static(b"opus-frame")))
            }
            None => Ok(None),
        }
    }

    async fn shutdown(&mut self) {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.stream = None;
        self.release();
    }
}

impl Drop for MockFrames {
    fn drop(&mut self) {
        self.release();
    }
}

// ───────────────────────────── voice transport ─────────────────────────────

#[derive(Debug, Default)]
pub struct MockTransport {
    pub frames: AtomicUsize,
    pub speaking: Mutex<Vec<bool>>,
    pub disconnected: AtomicBool,
    /// Fail every send once this many frames went through.
    pub fail_after: Mutex<Option<usize>>,
}

impl MockTransport {
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn speaking_log(&self) -> Vec<bool> {
        self.speaking.lock().unwrap().clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VoiceTransport for MockTransport {
    async fn send_frame(&self, _frame: Bytes) -> Result<(), TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::Disconnected);
        }
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if self.frames() >= limit {
                return Err(TransportError::Other("udp send failed".into()));
            }
        }
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        self.speaking.lock().unwrap().push(speaking);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockGateway {
    pub connects: AtomicUsize,
    pub transports: Mutex<HashMap<String, Arc<MockTransport>>>,
    pub refuse: Mutex<Vec<String>>,
    /// Per-destination connect latency.
    pub delays: Mutex<HashMap<String, Duration>>,
}

impl MockGateway {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn with_delay(&self, destination: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(destination.to_string(), delay);
    }

    pub fn transport(&self, destination: &str) -> Arc<MockTransport> {
        self.transports
            .lock()
            .unwrap()
            .get(destination)
            .cloned()
            .expect("destination was never joined")
    }
}

#[async_trait::async_trait]
impl VoiceGateway for MockGateway {
    async fn connect(&self, destination: &str) -> Result<VoiceConnection, TransportError> {
        let delay = self.delays.lock().unwrap().get(destination).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse.lock().unwrap().iter().any(|d| d == destination) {
            return Err(TransportError::Other("missing permissions".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let transport = Arc::new(MockTransport::default());
        self.transports
            .lock()
            .unwrap()
            .insert(destination.to_string(), transport.clone());
        Ok(VoiceConnection {
            transport,
            bitrate_kbps: 96,
        })
    }
}

// ───────────────────────────── fetch & transcode ─────────────────────────────

#[derive(Debug, Default)]
pub struct MockFetcher {
    pub fetches: AtomicUsize,
    pub bodies: Mutex<HashMap<String, Vec<u8>>>,
    /// Locators whose stream fails on first read.
    pub broken: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn with_body(self, locator: &str, body: Vec<u8>) -> Self {
        self.bodies.lock().unwrap().insert(locator.to_string(), body);
        self
    }

    pub fn with_broken(self, locator: &str) -> Self {
        self.broken.lock().unwrap().push(locator.to_string());
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for MockFetcher {
    async fn fetch(&self, locator: &str) -> Result<ByteStream, AcquisitionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.broken.lock().unwrap().iter().any(|l| l == locator) {
            let failing = futures_util::stream::iter(vec![Err::<Bytes, _>(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))]);
            return Ok(Box::new(tokio_util::io::StreamReader::new(failing)));
        }
        match self.bodies.lock().unwrap().get(locator) {
            Some(body) => Ok(Box::new(std::io::Cursor::new(body.clone()))),
            None => Err(AcquisitionError::Fetch {
                locator: locator.to_string(),
                details: "HTTP status 404".to_string(),
            }),
        }
    }
}

/// "Transcodes" by copying the raw file next to itself.
#[derive(Debug, Default)]
pub struct CopyTranscoder {
    pub calls: AtomicUsize,
}

impl CopyTranscoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode(&self, input: &Path) -> Result<PathBuf, WritebackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let output = input.with_extension("mp3");
        tokio::fs::copy(input, &output).await?;
        Ok(output)
    }
}

// ───────────────────────────── cache store ─────────────────────────────

/// `FsStore` counting the lookups and uploads made by the engine.
#[derive(Debug)]
pub struct CountingStore {
    pub inner: Arc<FsStore>,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<FsStore>) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CacheStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn get(&self, key: &str) -> Result<ByteStream, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: ByteStream, size: Option<u64>) -> Result<(), CacheError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, data, size).await
    }
}

// ───────────────────────────── harness ─────────────────────────────

pub struct Harness {
    pub _dir: TempDir,
    pub cache_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub engine: MockEngine,
    pub gateway: Arc<MockGateway>,
    pub fetcher: Arc<MockFetcher>,
    pub transcoder: Arc<CopyTranscoder>,
    /// Direct access to the cached artifacts, not counted.
    pub store: Arc<FsStore>,
    /// The store as seen by the engine.
    pub counted: Arc<CountingStore>,
    pub player: MusicPlayer,
}

pub struct HarnessOptions {
    pub interval: Duration,
    pub locator_frames: usize,
    pub with_store: bool,
    pub fetcher: MockFetcher,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2),
            locator_frames: 5,
            with_store: true,
            fetcher: MockFetcher::default(),
        }
    }
}

/// Routes engine logs to the test output. Set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Harness {
    pub fn new(options: HarnessOptions) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let temp_dir = dir.path().join("tmp");
        std::fs::create_dir_all(&temp_dir).unwrap();

        let engine = MockEngine::new(options.interval, options.locator_frames);
        let gateway = Arc::new(MockGateway::default());
        let fetcher = Arc::new(options.fetcher);
        let transcoder = Arc::new(CopyTranscoder::default());
        let store = Arc::new(FsStore::new(&cache_dir).unwrap());
        let counted = Arc::new(CountingStore::new(store.clone()));

        let store_for_acquirer = if options.with_store {
            Some(counted.clone() as Arc<dyn CacheStore>)
        } else {
            None
        };
        let acquirer = Acquirer::new(store_for_acquirer, fetcher.clone(), &temp_dir)
            .with_readahead(4096);
        let context = Arc::new(
            PlayerContext::new(Arc::new(engine.clone()), acquirer)
                .with_transcoder(transcoder.clone()),
        );
        let registry =
            Registry::new(gateway.clone(), context).with_leave_grace(Duration::from_millis(10));
        let player = MusicPlayer::new(registry, Arc::new(UrlResolver::new()));

        Self {
            _dir: dir,
            cache_dir,
            temp_dir,
            engine,
            gateway,
            fetcher,
            transcoder,
            store,
            counted,
            player,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.player.subscribe()
    }

    /// Files left in the acquisition temp directory.
    pub fn temp_files(&self) -> Vec<String> {
        std::fs::read_dir(&self.temp_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }
}

/// A direct-stream track, never cached.
pub fn direct_track(id: &str) -> Track {
    Track::builder(id, format!("/music/{}.ogg", id))
        .title(id.to_uppercase())
        .requester("tester")
        .build()
}

/// A cache-eligible track fetched from `locator`.
pub fn remote_track(id: &str, locator: &str) -> Track {
    Track::builder(id, locator)
        .title(id.to_uppercase())
        .requester("tester")
        .cache_eligible(true)
        .build()
}

/// Waits for the first event matching `predicate`.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<PlayerEvent>, mut predicate: F) -> PlayerEvent
where
    F: FnMut(&PlayerEvent) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for player event")
}

pub async fn wait_idle(rx: &mut broadcast::Receiver<PlayerEvent>, destination: &str) {
    wait_for(rx, |e| matches!(e, PlayerEvent::Idle { destination: d } if d == destination)).await;
}

pub async fn wait_started(rx: &mut broadcast::Receiver<PlayerEvent>, id: &str) -> PlayerEvent {
    wait_for(rx, |e| matches!(e, PlayerEvent::TrackStarted { track, .. } if track.id() == id)).await
}

pub async fn wait_ended(rx: &mut broadcast::Receiver<PlayerEvent>, id: &str) -> TrackOutcome {
    match wait_for(rx, |e| matches!(e, PlayerEvent::TrackEnded { track, .. } if track.id() == id)).await {
        PlayerEvent::TrackEnded { outcome, .. } => outcome,
        _ => unreachable!(),
    }
}

/// Polls `condition` until it holds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}
