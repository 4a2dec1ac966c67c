//! Global dispatcher of drain loops.
//!
//! Command handlers must return quickly, so they never run a drain loop
//! themselves. They post the worker on a single intake channel and a
//! background consumer spawns the loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::worker::PlaybackWorker;

#[derive(Debug)]
struct DispatchRequest {
    worker: Arc<PlaybackWorker>,
}

/// Intake channel plus the consumer task spawning drain loops.
#[derive(Debug)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<DispatchRequest>,
    spawned: Arc<AtomicUsize>,
    consumer: JoinHandle<()>,
}

impl Dispatcher {
    /// Starts the consumer task. Must be called within a tokio runtime.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DispatchRequest>();
        let spawned = Arc::new(AtomicUsize::new(0));

        let counter = spawned.clone();
        let consumer = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                counter.fetch_add(1, Ordering::AcqRel);
                debug!(destination = %request.worker.destination(), "Spawning drain loop");
                tokio::spawn(request.worker.drain());
            }
            debug!("Dispatcher intake closed");
        });

        Self {
            tx,
            spawned,
            consumer,
        }
    }

    /// Requests a drain loop for `worker`.
    pub fn dispatch(&self, worker: Arc<PlaybackWorker>) {
        if let Err(mpsc::error::SendError(request)) = self.tx.send(DispatchRequest { worker }) {
            warn!(
                destination = %request.worker.destination(),
                "Dispatcher consumer gone, spawning drain loop inline"
            );
            self.spawned.fetch_add(1, Ordering::AcqRel);
            tokio::spawn(request.worker.drain());
        }
    }

    /// Number of drain loops spawned so far.
    pub fn spawned_loops(&self) -> usize {
        self.spawned.load(Ordering::Acquire)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.consumer.abort();
    }
}
