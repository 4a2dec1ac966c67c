//! Command surface consumed by the chat command layer.
//!
//! Every method returns quickly: playback itself runs in drain loops spawned
//! by the [`Dispatcher`]. Only resolution, join, validation and "not joined"
//! errors reach the caller.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{PlayerError, ResolveError};
use crate::events::PlayerEvent;
use crate::registry::Registry;
use crate::resolver::{ResolveRequest, SourceResolver};
use crate::state::PlayerState;
use crate::track::Track;
use crate::volume::Volume;
use crate::worker::{PlaybackWorker, WorkerSnapshot};

/// Entry point of the playback engine.
#[derive(Debug)]
pub struct MusicPlayer {
    registry: Registry,
    dispatcher: Dispatcher,
    resolver: Arc<dyn SourceResolver>,
}

impl MusicPlayer {
    /// Must be called within a tokio runtime.
    pub fn new(registry: Registry, resolver: Arc<dyn SourceResolver>) -> Self {
        Self {
            registry,
            dispatcher: Dispatcher::start(),
            resolver,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.registry.context().subscribe()
    }

    async fn worker(&self, destination: &str) -> Result<Arc<PlaybackWorker>, PlayerError> {
        self.registry
            .get(destination)
            .await
            .ok_or_else(|| PlayerError::NotJoined(destination.to_string()))
    }

    async fn push(&self, worker: &Arc<PlaybackWorker>, track: Track) {
        if worker.enqueue(track).await {
            self.dispatcher.dispatch(worker.clone());
        }
    }

    /// Connects to `destination`. Idempotent.
    pub async fn join(&self, destination: &str) -> Result<(), PlayerError> {
        self.registry.join(destination).await.map(|_| ())
    }

    pub async fn leave(&self, destination: &str) -> Result<(), PlayerError> {
        if self.registry.leave(destination).await {
            Ok(())
        } else {
            Err(PlayerError::NotJoined(destination.to_string()))
        }
    }

    /// Appends an already resolved track to a joined destination.
    pub async fn enqueue(&self, destination: &str, track: Track) -> Result<(), PlayerError> {
        let worker = self.worker(destination).await?;
        self.push(&worker, track).await;
        Ok(())
    }

    /// Resolves `request`, joins `destination` if needed and enqueues the track.
    pub async fn play(
        &self,
        destination: &str,
        request: &ResolveRequest,
    ) -> Result<Track, PlayerError> {
        let track = self.resolver.resolve(request).await?;
        let worker = self.registry.join(destination).await?;
        info!(destination, track = %track, requester = %track.requester(), "Play requested");
        self.push(&worker, track.clone()).await;
        Ok(track)
    }

    /// Resolves every query, skipping failures, and enqueues the rest in order.
    ///
    /// Fails only when no query resolved.
    pub async fn enqueue_all(
        &self,
        destination: &str,
        requests: &[ResolveRequest],
    ) -> Result<Vec<Track>, PlayerError> {
        let mut tracks = Vec::with_capacity(requests.len());
        let mut last_error = None;
        for request in requests {
            match self.resolver.resolve(request).await {
                Ok(track) => tracks.push(track),
                Err(e) => {
                    warn!(destination, query = %request.query, error = %e, "Skipping unresolved entry");
                    last_error = Some(e);
                }
            }
        }

        if tracks.is_empty() {
            return Err(last_error.unwrap_or(ResolveError::EmptyQuery).into());
        }

        let worker = self.registry.join(destination).await?;
        for track in &tracks {
            self.push(&worker, track.clone()).await;
        }
        info!(destination, count = tracks.len(), "Playlist enqueued");
        Ok(tracks)
    }

    pub async fn pause(&self, destination: &str) -> Result<bool, PlayerError> {
        Ok(self.worker(destination).await?.pause().await)
    }

    pub async fn resume(&self, destination: &str) -> Result<bool, PlayerError> {
        Ok(self.worker(destination).await?.resume().await)
    }

    /// `Ok(true)` means playback is paused and nothing was skipped.
    pub async fn skip(&self, destination: &str) -> Result<bool, PlayerError> {
        Ok(self.worker(destination).await?.skip().await?)
    }

    pub async fn stop(&self, destination: &str) -> Result<(), PlayerError> {
        self.worker(destination).await?.stop().await;
        Ok(())
    }

    pub async fn set_volume(&self, destination: &str, percent: i64) -> Result<Volume, PlayerError> {
        Ok(self.worker(destination).await?.set_volume(percent).await?)
    }

    pub async fn now_playing(&self, destination: &str) -> Result<Option<Track>, PlayerError> {
        Ok(self.worker(destination).await?.now_playing().await)
    }

    pub async fn queue(&self, destination: &str) -> Result<Vec<Track>, PlayerError> {
        Ok(self.worker(destination).await?.queue().await)
    }

    pub async fn state(&self, destination: &str) -> Result<PlayerState, PlayerError> {
        Ok(self.worker(destination).await?.state().await)
    }

    pub async fn snapshot(&self, destination: &str) -> Result<WorkerSnapshot, PlayerError> {
        Ok(self.worker(destination).await?.snapshot().await)
    }

    /// Leaves every destination and waits for pending writebacks.
    pub async fn shutdown(&self) {
        self.registry.leave_all().await;
        self.registry.context().tasks().wait_idle().await;
    }
}
