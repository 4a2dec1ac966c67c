//! # discoplay - Playback engine of the Disco voice music agent
//!
//! Given resolved tracks, `discoplay` acquires their audio, encodes it and
//! streams frames into a voice transport, one playback worker per
//! destination.
//!
//! ## Architecture
//!
//! ```text
//! MusicPlayer (commands)
//!     ├── Registry      destination → PlaybackWorker, join/leave
//!     ├── Dispatcher    single intake, spawns drain loops
//!     └── PlaybackWorker
//!           ├── PlayerState      Idle | Playing | Paused | Stopping | Skipping
//!           ├── Acquirer         cache → fetch-and-cache → direct
//!           ├── Session          frames → VoiceTransport, kill/pause
//!           └── Writeback        transcode + upload, in the background
//! ```
//!
//! External collaborators are traits: [`SourceResolver`], [`CacheStore`],
//! [`RemoteFetcher`], [`EncodeEngine`], [`Transcoder`], [`VoiceGateway`] and
//! [`VoiceTransport`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use discoplay::{
//!     Acquirer, FfmpegEngine, HttpFetcher, MusicPlayer, PlayerContext, Registry,
//!     ResolveRequest, UrlResolver, VoiceGateway,
//! };
//!
//! # async fn run(gateway: Arc<dyn VoiceGateway>) -> anyhow::Result<()> {
//! let acquirer = Acquirer::new(None, Arc::new(HttpFetcher::new()?), "/tmp/disco");
//! let context = Arc::new(PlayerContext::new(Arc::new(FfmpegEngine::default()), acquirer));
//! let player = MusicPlayer::new(Registry::new(gateway, context), Arc::new(UrlResolver::new()));
//!
//! let track = player
//!     .play("guild-1", &ResolveRequest::new("https://media.example/song.webm"))
//!     .await?;
//! println!("queued {}", track);
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod commands;
pub mod context;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod events;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod state;
pub mod tasks;
pub mod track;
pub mod transport;
pub mod volume;
pub mod worker;
pub mod writeback;

#[cfg(feature = "discoconfig")]
pub mod config_ext;

pub use acquisition::{Acquirer, Acquisition, HttpFetcher, PendingWriteback, RemoteFetcher, Tier};
pub use commands::MusicPlayer;
pub use context::{EncoderSettings, PlayerContext};
pub use dispatcher::Dispatcher;
pub use encoder::{EncodeEngine, EncodeInput, EncodeOptions, FfmpegEngine, FrameSource};
pub use error::{
    AcquisitionError, EncodeError, PlayerError, ResolveError, SessionError, TransportError,
    ValidationError, WritebackError,
};
pub use events::{PlayerEvent, TrackOutcome};
pub use registry::Registry;
pub use resolver::{locator_id, ResolveRequest, SourceResolver, UrlResolver};
pub use session::{Session, SessionHandle, SessionOutcome};
pub use state::{PlayerInput, PlayerState};
pub use tasks::BackgroundTasks;
pub use track::{format_duration, Track, TrackBuilder};
pub use transport::{VoiceConnection, VoiceGateway, VoiceTransport};
pub use volume::Volume;
pub use worker::{PlaybackWorker, WorkerSnapshot};
pub use writeback::{FfmpegTranscoder, Transcoder, Writeback};

pub use discocache::{ByteStream, CacheError, CacheStore};

#[cfg(feature = "discoconfig")]
pub use config_ext::PlayerConfigExt;
