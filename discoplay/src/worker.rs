//! Per-destination playback worker.
//!
//! A worker owns a FIFO queue and drives at most one drain loop. The drain
//! loop pops the head track, acquires it, runs one encode/stream session and
//! blocks on its completion, then advances. Commands mutate the worker under
//! its lock and interrupt playback by killing the active session.
//!
//! Whether a drain loop must be spawned is decided under the same lock that
//! appends to the queue: an enqueue on an idle worker moves it to
//! [`PlayerState::Playing`] and returns `true`; any other enqueue only
//! appends.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::acquisition::{Acquisition, PendingWriteback};
use crate::context::PlayerContext;
use crate::error::{ValidationError, WritebackError};
use crate::events::{PlayerEvent, TrackOutcome};
use crate::session::{Session, SessionHandle, SessionOutcome};
use crate::state::{PlayerInput, PlayerState};
use crate::track::Track;
use crate::transport::{VoiceConnection, VoiceTransport};
use crate::volume::Volume;

#[derive(Debug)]
struct WorkerInner {
    state: PlayerState,
    queue: VecDeque<Track>,
    now_playing: Option<Track>,
    session: Option<SessionHandle>,
    volume: Volume,
}

impl WorkerInner {
    fn apply(&mut self, input: PlayerInput) -> bool {
        match self.state.on(input) {
            Some(next) => {
                self.state = next;
                true
            }
            None => false,
        }
    }
}

/// Point-in-time view of a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub state: PlayerState,
    pub now_playing: Option<Track>,
    pub queue: Vec<Track>,
    pub volume: Volume,
}

/// Playback state machine of one destination.
#[derive(Debug)]
pub struct PlaybackWorker {
    destination: String,
    transport: Arc<dyn VoiceTransport>,
    bitrate_kbps: u32,
    context: Arc<PlayerContext>,
    inner: Mutex<WorkerInner>,
}

impl PlaybackWorker {
    pub fn new(
        destination: impl Into<String>,
        connection: VoiceConnection,
        context: Arc<PlayerContext>,
    ) -> Self {
        let bitrate_kbps = if connection.bitrate_kbps > 0 {
            connection.bitrate_kbps
        } else {
            context.default_bitrate_kbps()
        };
        Self {
            destination: destination.into(),
            transport: connection.transport,
            bitrate_kbps,
            inner: Mutex::new(WorkerInner {
                state: PlayerState::Idle,
                queue: VecDeque::new(),
                now_playing: None,
                session: None,
                volume: context.default_volume(),
            }),
            context,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    pub fn transport(&self) -> &Arc<dyn VoiceTransport> {
        &self.transport
    }

    async fn lock(&self) -> MutexGuard<'_, WorkerInner> {
        self.inner.lock().await
    }

    /// Appends `track` to the queue.
    ///
    /// Returns `true` when the worker was idle: the caller must then get a
    /// drain loop started through the dispatcher.
    pub async fn enqueue(&self, track: Track) -> bool {
        let mut inner = self.lock().await;
        debug!(destination = %self.destination, track = %track, "Enqueued");
        inner.queue.push_back(track);
        inner.apply(PlayerInput::Start)
    }

    /// Suspends frame emission. `false` if nothing is playing.
    pub async fn pause(&self) -> bool {
        let mut inner = self.lock().await;
        if !inner.apply(PlayerInput::Pause) {
            return false;
        }
        if let Some(session) = &inner.session {
            session.set_paused(true);
        }
        info!(destination = %self.destination, "Paused");
        true
    }

    /// Resumes frame emission. `false` if the worker was not paused.
    pub async fn resume(&self) -> bool {
        let mut inner = self.lock().await;
        if !inner.apply(PlayerInput::Resume) {
            return false;
        }
        if let Some(session) = &inner.session {
            session.set_paused(false);
        }
        info!(destination = %self.destination, "Resumed");
        true
    }

    /// Skips the current track.
    ///
    /// Returns `Ok(true)` when playback is paused: the skip is refused and
    /// the session is left alive, playback must be resumed first. Returns
    /// `Ok(false)` once the current track is being torn down.
    pub async fn skip(&self) -> Result<bool, ValidationError> {
        let mut inner = self.lock().await;
        match inner.state {
            PlayerState::Idle => Err(ValidationError::NothingToSkip),
            PlayerState::Paused => Ok(true),
            PlayerState::Skipping | PlayerState::Stopping => Ok(false),
            PlayerState::Playing => {
                inner.apply(PlayerInput::Skip);
                if let Some(session) = &inner.session {
                    session.kill();
                }
                info!(destination = %self.destination, "Skipping current track");
                Ok(false)
            }
        }
    }

    /// Stops playback; the queue is cleared once the current track is torn
    /// down. Returns `false` if the worker was already idle.
    pub async fn stop(&self) -> bool {
        let mut inner = self.lock().await;
        if !inner.apply(PlayerInput::Stop) {
            let was_stopping = inner.state == PlayerState::Stopping;
            inner.queue.clear();
            return was_stopping;
        }
        if let Some(session) = &inner.session {
            session.kill();
        }
        info!(destination = %self.destination, "Stopping");
        true
    }

    /// Sets the volume used by the next session.
    pub async fn set_volume(&self, percent: i64) -> Result<Volume, ValidationError> {
        let volume = Volume::new(percent)?;
        self.lock().await.volume = volume;
        debug!(destination = %self.destination, %volume, "Volume set");
        Ok(volume)
    }

    pub async fn state(&self) -> PlayerState {
        self.lock().await.state
    }

    pub async fn now_playing(&self) -> Option<Track> {
        self.lock().await.now_playing.clone()
    }

    /// Tracks waiting after the current one.
    pub async fn queue(&self) -> Vec<Track> {
        self.lock().await.queue.iter().cloned().collect()
    }

    pub async fn snapshot(&self) -> WorkerSnapshot {
        let inner = self.lock().await;
        WorkerSnapshot {
            state: inner.state,
            now_playing: inner.now_playing.clone(),
            queue: inner.queue.iter().cloned().collect(),
            volume: inner.volume,
        }
    }

    /// Drains the queue until it is empty.
    ///
    /// Must only run after an [`enqueue`](Self::enqueue) returned `true`.
    pub async fn drain(self: Arc<Self>) {
        debug!(destination = %self.destination, "Drain loop started");
        loop {
            let (track, volume) = {
                let mut inner = self.lock().await;
                if inner.state == PlayerState::Stopping {
                    inner.queue.clear();
                }
                match inner.queue.pop_front() {
                    Some(track) => {
                        inner.now_playing = Some(track.clone());
                        (track, inner.volume)
                    }
                    None => {
                        inner.now_playing = None;
                        inner.session = None;
                        inner.apply(PlayerInput::Drain);
                        break;
                    }
                }
            };

            self.speaking(true).await;
            let outcome = self.play(&track, volume).await;
            self.speaking(false).await;

            match &outcome {
                TrackOutcome::Finished => {
                    info!(destination = %self.destination, track = %track, "Track finished")
                }
                TrackOutcome::Interrupted => {
                    info!(destination = %self.destination, track = %track, "Track interrupted")
                }
                TrackOutcome::AcquisitionFailed(e) | TrackOutcome::Failed(e) => {
                    warn!(destination = %self.destination, track = %track, error = %e, "Track failed")
                }
            }
            self.context.emit(PlayerEvent::TrackEnded {
                destination: self.destination.clone(),
                track,
                outcome,
            });

            let mut inner = self.lock().await;
            inner.now_playing = None;
            if inner.state == PlayerState::Stopping {
                let dropped = inner.queue.len();
                inner.queue.clear();
                debug!(destination = %self.destination, dropped, "Queue cleared");
            } else {
                inner.apply(PlayerInput::Advance);
            }
        }

        info!(destination = %self.destination, "Queue drained, worker idle");
        self.context.emit(PlayerEvent::Idle {
            destination: self.destination.clone(),
        });
    }

    /// Plays one track to completion or interruption.
    async fn play(&self, track: &Track, volume: Volume) -> TrackOutcome {
        let context = &self.context;
        if self.interrupted().await {
            return TrackOutcome::Interrupted;
        }

        let Acquisition {
            tier,
            input,
            writeback,
        } = match context.acquirer().acquire(track).await {
            Ok(acquisition) => acquisition,
            Err(e) => return TrackOutcome::AcquisitionFailed(e.to_string()),
        };
        debug!(destination = %self.destination, track_id = %track.id(), %tier, "Acquired");

        if self.interrupted().await {
            self.release(writeback, false);
            return TrackOutcome::Interrupted;
        }

        let options = context.encode_options(self.bitrate_kbps, volume);
        let mut frames = match context.engine().start(input, &options).await {
            Ok(frames) => frames,
            Err(e) => {
                self.release(writeback, false);
                return TrackOutcome::Failed(e.to_string());
            }
        };

        let session = {
            let mut inner = self.lock().await;
            if inner.state.is_interrupting() {
                drop(inner);
                frames.shutdown().await;
                drop(frames);
                self.release(writeback, false);
                return TrackOutcome::Interrupted;
            }
            let paused = inner.state == PlayerState::Paused;
            let session = Session::start(frames, self.transport.clone(), paused);
            inner.session = Some(session.handle());
            session
        };

        info!(
            destination = %self.destination,
            track = %track,
            %tier,
            bitrate_kbps = self.bitrate_kbps,
            volume = %volume,
            "Now playing"
        );
        context.emit(PlayerEvent::TrackStarted {
            destination: self.destination.clone(),
            track: track.clone(),
            tier,
        });

        let outcome = session.wait().await;
        self.lock().await.session = None;

        self.release(writeback, outcome.is_finished());
        match outcome {
            SessionOutcome::Finished => TrackOutcome::Finished,
            SessionOutcome::Killed => TrackOutcome::Interrupted,
            SessionOutcome::Failed(e) => TrackOutcome::Failed(e.to_string()),
        }
    }

    async fn interrupted(&self) -> bool {
        self.lock().await.state.is_interrupting()
    }

    /// Hands fetched bytes to the writeback, or discards them.
    fn release(&self, pending: Option<PendingWriteback>, completed: bool) {
        let Some(pending) = pending else {
            return;
        };
        match self.context.writeback() {
            Some(writeback) if completed => writeback.schedule(pending),
            Some(writeback) => writeback.discard(pending),
            None => {
                self.context.tasks().spawn("discard", async move {
                    pending.discard().await;
                    Ok::<(), WritebackError>(())
                });
            }
        }
    }

    async fn speaking(&self, speaking: bool) {
        if let Err(e) = self.transport.set_speaking(speaking).await {
            warn!(destination = %self.destination, speaking, error = %e, "Failed to toggle speaking indicator");
        }
    }
}
