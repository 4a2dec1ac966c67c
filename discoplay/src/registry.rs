//! Destination registry: destination id → playback worker.
//!
//! The map lock only guards structural changes and is never held across an
//! await on the gateway. Each destination owns a slot that is filled once by
//! the first join; concurrent joins of the same destination wait on that slot
//! instead of on the map. Each worker carries its own lock for playback state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::context::PlayerContext;
use crate::error::PlayerError;
use crate::transport::VoiceGateway;
use crate::worker::PlaybackWorker;

pub const DEFAULT_LEAVE_GRACE: Duration = Duration::from_millis(200);

type Slot = Arc<OnceCell<Arc<PlaybackWorker>>>;

#[derive(Debug)]
pub struct Registry {
    gateway: Arc<dyn VoiceGateway>,
    context: Arc<PlayerContext>,
    workers: Mutex<HashMap<String, Slot>>,
    leave_grace: Duration,
}

impl Registry {
    pub fn new(gateway: Arc<dyn VoiceGateway>, context: Arc<PlayerContext>) -> Self {
        Self {
            gateway,
            context,
            workers: Mutex::new(HashMap::new()),
            leave_grace: DEFAULT_LEAVE_GRACE,
        }
    }

    /// Delay between stopping playback and disconnecting on leave.
    pub fn with_leave_grace(mut self, grace: Duration) -> Self {
        self.leave_grace = grace;
        self
    }

    pub fn context(&self) -> &Arc<PlayerContext> {
        &self.context
    }

    /// Returns the worker of `destination`, connecting first if needed.
    ///
    /// Concurrent joins of one destination produce a single connection. A
    /// refused connect leaves the slot empty so that a later join retries.
    pub async fn join(&self, destination: &str) -> Result<Arc<PlaybackWorker>, PlayerError> {
        let slot = self
            .workers
            .lock()
            .await
            .entry(destination.to_string())
            .or_default()
            .clone();

        let worker = slot
            .get_or_try_init(|| async {
                let connection = self.gateway.connect(destination).await.map_err(|source| {
                    PlayerError::Join {
                        destination: destination.to_string(),
                        source,
                    }
                })?;
                let worker = Arc::new(PlaybackWorker::new(
                    destination,
                    connection,
                    self.context.clone(),
                ));
                info!(destination, bitrate_kbps = worker.bitrate_kbps(), "Joined destination");
                Ok::<_, PlayerError>(worker)
            })
            .await?;
        Ok(worker.clone())
    }

    /// The worker of `destination`, if a join completed.
    pub async fn get(&self, destination: &str) -> Option<Arc<PlaybackWorker>> {
        let slot = self.workers.lock().await.get(destination).cloned()?;
        slot.get().cloned()
    }

    /// Stops playback, waits for the transport to settle, disconnects, then
    /// forgets the worker. `false` if the destination was not joined.
    pub async fn leave(&self, destination: &str) -> bool {
        let Some(worker) = self.get(destination).await else {
            return false;
        };

        worker.stop().await;
        tokio::time::sleep(self.leave_grace).await;
        if let Err(e) = worker.transport().disconnect().await {
            warn!(destination, error = %e, "Disconnect failed");
        }

        let mut workers = self.workers.lock().await;
        if workers
            .get(destination)
            .and_then(|slot| slot.get())
            .is_some_and(|current| Arc::ptr_eq(current, &worker))
        {
            workers.remove(destination);
        }
        info!(destination, "Left destination");
        true
    }

    /// Leaves every joined destination.
    pub async fn leave_all(&self) {
        for destination in self.destinations().await {
            self.leave(&destination).await;
        }
    }

    /// Destinations with a completed join, sorted.
    pub async fn destinations(&self) -> Vec<String> {
        let mut destinations: Vec<String> = self
            .workers
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(destination, _)| destination.clone())
            .collect();
        destinations.sort();
        destinations
    }

    pub async fn len(&self) -> usize {
        self.workers
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
