//! Collaborators shared by every playback worker.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::acquisition::Acquirer;
use crate::encoder::{EncodeEngine, EncodeOptions, DEFAULT_APPLICATION, DEFAULT_FRAME_DURATION_MS};
use crate::events::{self, PlayerEvent};
use crate::tasks::BackgroundTasks;
use crate::volume::Volume;
use crate::writeback::{Transcoder, Writeback};

pub const DEFAULT_BITRATE_KBPS: u32 = 64;

/// Encoder profile applied to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub application: String,
    pub frame_duration_ms: u32,
    pub raw_output: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            application: DEFAULT_APPLICATION.to_string(),
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
            raw_output: true,
        }
    }
}

/// Engine, acquisition pipeline, writeback and event bus used by workers.
#[derive(Debug)]
pub struct PlayerContext {
    engine: Arc<dyn EncodeEngine>,
    acquirer: Acquirer,
    writeback: Option<Writeback>,
    events: broadcast::Sender<PlayerEvent>,
    tasks: BackgroundTasks,
    encoder: EncoderSettings,
    default_volume: Volume,
    default_bitrate_kbps: u32,
}

impl PlayerContext {
    pub fn new(engine: Arc<dyn EncodeEngine>, acquirer: Acquirer) -> Self {
        let (events, _) = events::channel();
        Self {
            engine,
            acquirer,
            writeback: None,
            events,
            tasks: BackgroundTasks::new(),
            encoder: EncoderSettings::default(),
            default_volume: Volume::default(),
            default_bitrate_kbps: DEFAULT_BITRATE_KBPS,
        }
    }

    /// Enables writeback of fetched tracks. Ignored when the acquirer has no
    /// cache store.
    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.writeback = self
            .acquirer
            .store()
            .cloned()
            .map(|store| Writeback::new(store, transcoder, self.tasks.clone()));
        self
    }

    pub fn with_encoder_settings(mut self, encoder: EncoderSettings) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_default_volume(mut self, volume: Volume) -> Self {
        self.default_volume = volume;
        self
    }

    /// Bitrate used when a destination does not advertise one.
    pub fn with_default_bitrate(mut self, bitrate_kbps: u32) -> Self {
        self.default_bitrate_kbps = bitrate_kbps;
        self
    }

    pub fn engine(&self) -> &Arc<dyn EncodeEngine> {
        &self.engine
    }

    pub fn acquirer(&self) -> &Acquirer {
        &self.acquirer
    }

    pub fn writeback(&self) -> Option<&Writeback> {
        self.writeback.as_ref()
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn default_volume(&self) -> Volume {
        self.default_volume
    }

    pub fn default_bitrate_kbps(&self) -> u32 {
        self.default_bitrate_kbps
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: PlayerEvent) {
        // No subscriber is not an error.
        let _ = self.events.send(event);
    }

    pub(crate) fn encode_options(&self, bitrate_kbps: u32, volume: Volume) -> EncodeOptions {
        EncodeOptions {
            bitrate_kbps,
            volume,
            application: self.encoder.application.clone(),
            frame_duration_ms: self.encoder.frame_duration_ms,
            raw_output: self.encoder.raw_output,
        }
    }
}
