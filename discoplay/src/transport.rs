//! Voice transport boundary.
//!
//! The gateway protocol itself lives outside this crate. Playback only needs
//! to connect to a destination, push encoded frames and toggle the speaking
//! indicator.

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::TransportError;

/// Live voice connection to one destination.
///
/// Treated as unreliable: a failed `send_frame` ends the current session but
/// never the worker.
#[async_trait::async_trait]
pub trait VoiceTransport: Debug + Send + Sync {
    /// Sends one encoded audio frame.
    async fn send_frame(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Toggles the speaking indicator.
    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError>;

    /// Closes the connection. Further sends fail with
    /// [`TransportError::Disconnected`].
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct VoiceConnection {
    pub transport: Arc<dyn VoiceTransport>,
    /// Target bitrate advertised by the destination, in kbit/s.
    pub bitrate_kbps: u32,
}

/// Opens voice connections by destination identifier.
#[async_trait::async_trait]
pub trait VoiceGateway: Debug + Send + Sync {
    async fn connect(&self, destination: &str) -> Result<VoiceConnection, TransportError>;
}
