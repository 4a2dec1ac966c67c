//! Error taxonomy of the playback engine.
//!
//! Per-track failures ([`AcquisitionError`], [`SessionError`],
//! [`WritebackError`]) stay inside the drain loop and are only logged.
//! [`PlayerError`] is what the command surface hands back to its caller.

use std::io;

use discocache::CacheError;

use crate::volume::{MAX_VOLUME, MIN_VOLUME};

/// The source lookup failed; the track never reaches a queue.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("empty query")]
    EmptyQuery,
    #[error("unsupported locator: {0}")]
    Unsupported(String),
    #[error("no results for {0:?}")]
    NotFound(String),
    #[error("resolver failed: {0}")]
    Backend(String),
}

/// Opening the selected acquisition tier failed.
#[derive(thiserror::Error, Debug)]
pub enum AcquisitionError {
    #[error("cache store error: {0}")]
    Cache(#[from] CacheError),
    #[error("remote fetch failed for {locator}: {details}")]
    Fetch { locator: String, details: String },
    #[error("read-ahead failed: {0}")]
    ReadAhead(#[source] io::Error),
    #[error("temporary file error: {0}")]
    TempFile(#[source] io::Error),
}

/// The voice transport refused a frame or an indicator change.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("transport error: {0}")]
    Other(String),
}

/// The external encode engine failed to start or produced garbage.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("failed to spawn encoder {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("encoder I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid encoder output: {0}")]
    Container(String),
    #[error("encoder exited with {0}")]
    Exit(String),
}

/// Why an encode/stream session ended in error.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("session task failed: {0}")]
    Task(String),
}

/// Background transcode-and-upload failure. Logged, never surfaced.
#[derive(thiserror::Error, Debug)]
pub enum WritebackError {
    #[error("fetched stream was not fully persisted")]
    Incomplete,
    #[error("tee writer failed: {0}")]
    Tee(String),
    #[error("transcoding failed: {0}")]
    Transcode(String),
    #[error("upload failed: {0}")]
    Upload(#[from] CacheError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A command argument or precondition was rejected; nothing was mutated.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("volume must be between {min} and {max}, got {0}", min = MIN_VOLUME, max = MAX_VOLUME)]
    VolumeOutOfRange(i64),
    #[error("nothing is playing and the queue is empty")]
    NothingToSkip,
}

/// Errors reported to command callers.
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("not connected to destination {0}")]
    NotJoined(String),
    #[error("failed to join destination {destination}: {source}")]
    Join {
        destination: String,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Resolution(#[from] ResolveError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
