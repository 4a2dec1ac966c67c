//! The object-store seam shared by every cache backend.

use std::fmt::Debug;
use std::io;

use tokio::io::AsyncRead;

/// An owned, readable byte stream handed out by a store or fetcher.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Errors returned by cache backends.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("object store returned status {status} for {key}")]
    Status { status: u16, key: String },
}

impl CacheError {
    /// True when the store answered but holds no object under the key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Http(err.to_string())
    }
}

/// Key/value object store keyed by track identifier.
///
/// Values are opaque encoded artifacts. Implementations must be safe for
/// concurrent use: several background writebacks may `put` distinct keys at
/// the same time while players `get` others.
#[async_trait::async_trait]
pub trait CacheStore: Debug + Send + Sync {
    /// Short backend name used in logs (`fs`, `http`, ...).
    fn name(&self) -> &str;

    /// Opens the object stored under `key`.
    ///
    /// Returns [`CacheError::NotFound`] when the key is absent, any other
    /// variant when the store itself failed.
    async fn get(&self, key: &str) -> Result<ByteStream, CacheError>;

    /// Stores a finished artifact under `key`, replacing any previous value.
    ///
    /// `size` is the artifact length when known; backends may use it to set
    /// a content length.
    async fn put(&self, key: &str, data: ByteStream, size: Option<u64>) -> Result<(), CacheError>;
}

/// Rejects keys that cannot be used as a single path segment.
pub fn validate_key(key: &str) -> Result<(), CacheError> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}
