//! Player events broadcast to observers.

use tokio::sync::broadcast;

use crate::acquisition::Tier;
use crate::track::Track;

pub const EVENT_CAPACITY: usize = 256;

/// How a track's playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Finished,
    /// Killed by skip, stop or leave.
    Interrupted,
    /// No tier could be opened.
    AcquisitionFailed(String),
    /// The encoder or the transport failed mid-stream.
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackStarted {
        destination: String,
        track: Track,
        tier: Tier,
    },
    TrackEnded {
        destination: String,
        track: Track,
        outcome: TrackOutcome,
    },
    /// The drain loop of `destination` ended with an empty queue.
    Idle { destination: String },
}

impl PlayerEvent {
    pub fn destination(&self) -> &str {
        match self {
            PlayerEvent::TrackStarted { destination, .. }
            | PlayerEvent::TrackEnded { destination, .. }
            | PlayerEvent::Idle { destination } => destination,
        }
    }
}

pub fn channel() -> (broadcast::Sender<PlayerEvent>, broadcast::Receiver<PlayerEvent>) {
    broadcast::channel(EVENT_CAPACITY)
}
