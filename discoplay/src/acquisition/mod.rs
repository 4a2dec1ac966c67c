//! Tiered acquisition of a track's audio bytes.
//!
//! Tiers are attempted in order, the first one that opens wins:
//!
//! 1. **Cache**: the cache store holds an artifact for the track id.
//! 2. **Fetch**: the origin is fetched remotely and teed into a temporary
//!    file, which the writeback later transcodes and uploads.
//! 3. **Direct**: the encoder opens the origin locator itself.
//!
//! Tiers 1 and 2 only apply to cache-eligible tracks when a store is
//! configured. A tier-1 miss goes straight to tier 2 and is never retried.
//! Once a tier has opened, a failure while reading ahead is terminal for
//! this play attempt.

mod fetch;
mod readahead;
mod tee;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use discocache::CacheStore;
use tokio::fs::File;
use tracing::{debug, info, warn};

use crate::encoder::EncodeInput;
use crate::error::AcquisitionError;
use crate::track::Track;

pub use fetch::{HttpFetcher, RemoteFetcher};
pub use readahead::{read_ahead, PrefixedReader, DEFAULT_READAHEAD_BYTES};
pub use tee::{tee, TeeHandle, TeeReader};

/// Acquisition strategy that produced a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Cache,
    Fetch,
    Direct,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Cache => "cache",
            Tier::Fetch => "fetch",
            Tier::Direct => "direct",
        })
    }
}

/// Raw bytes of a freshly fetched track waiting to be written back.
#[derive(Debug)]
pub struct PendingWriteback {
    track_id: String,
    tee: TeeHandle,
}

impl PendingWriteback {
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Temporary file receiving the raw bytes.
    pub fn raw_path(&self) -> &Path {
        self.tee.path()
    }

    pub(crate) fn into_parts(self) -> (String, TeeHandle) {
        (self.track_id, self.tee)
    }

    /// Drops the raw bytes without writing anything back.
    pub async fn discard(self) {
        debug!(track_id = %self.track_id, "Discarding fetched bytes");
        self.tee.discard().await;
    }
}

/// Result of a successful acquisition.
#[derive(Debug)]
pub struct Acquisition {
    pub tier: Tier,
    pub input: EncodeInput,
    /// Present only for the fetch tier.
    pub writeback: Option<PendingWriteback>,
}

/// Decides among the three tiers for each track.
#[derive(Debug, Clone)]
pub struct Acquirer {
    store: Option<Arc<dyn CacheStore>>,
    fetcher: Arc<dyn RemoteFetcher>,
    readahead_bytes: usize,
    temp_dir: PathBuf,
}

impl Acquirer {
    pub fn new(
        store: Option<Arc<dyn CacheStore>>,
        fetcher: Arc<dyn RemoteFetcher>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            fetcher,
            readahead_bytes: DEFAULT_READAHEAD_BYTES,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn with_readahead(mut self, bytes: usize) -> Self {
        self.readahead_bytes = bytes;
        self
    }

    pub fn store(&self) -> Option<&Arc<dyn CacheStore>> {
        self.store.as_ref()
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Whether tiers 1 and 2 apply to `track`.
    pub fn is_cacheable(&self, track: &Track) -> bool {
        track.cache_eligible() && self.store.is_some()
    }

    /// Opens the audio of `track` through the first tier that succeeds.
    pub async fn acquire(&self, track: &Track) -> Result<Acquisition, AcquisitionError> {
        if let Some(store) = self.store.as_ref().filter(|_| track.cache_eligible()) {
            match store.get(track.id()).await {
                Ok(stream) => {
                    let stream = read_ahead(stream, self.readahead_bytes)
                        .await
                        .map_err(AcquisitionError::ReadAhead)?;
                    info!(track_id = %track.id(), store = store.name(), "Cache hit");
                    return Ok(Acquisition {
                        tier: Tier::Cache,
                        input: EncodeInput::Stream(stream),
                        writeback: None,
                    });
                }
                Err(e) if e.is_not_found() => {
                    debug!(track_id = %track.id(), "Cache miss");
                }
                Err(e) => {
                    warn!(track_id = %track.id(), error = %e, "Cache store unavailable, treating as a miss");
                }
            }

            if let Some(acquisition) = self.open_fetch(track).await? {
                return Ok(acquisition);
            }
        }

        debug!(track_id = %track.id(), locator = %track.locator(), "Streaming directly");
        Ok(Acquisition {
            tier: Tier::Direct,
            input: EncodeInput::Locator(track.locator().to_string()),
            writeback: None,
        })
    }

    /// Tier 2. `Ok(None)` means the tier is unavailable and tier 3 applies.
    async fn open_fetch(&self, track: &Track) -> Result<Option<Acquisition>, AcquisitionError> {
        let stream = match self.fetcher.fetch(track.locator()).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(track_id = %track.id(), error = %e, "Remote fetch failed, falling back to direct stream");
                return Ok(None);
            }
        };

        let path = self.temp_path(track);
        let file = match File::create(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot create temporary file, falling back to direct stream");
                return Ok(None);
            }
        };

        let (reader, handle) = tee(stream, file, path);
        let pending = PendingWriteback {
            track_id: track.id().to_string(),
            tee: handle,
        };

        match read_ahead(Box::new(reader), self.readahead_bytes).await {
            Ok(stream) => {
                info!(track_id = %track.id(), "Fetching and caching");
                Ok(Some(Acquisition {
                    tier: Tier::Fetch,
                    input: EncodeInput::Stream(stream),
                    writeback: Some(pending),
                }))
            }
            Err(e) => {
                pending.discard().await;
                Err(AcquisitionError::ReadAhead(e))
            }
        }
    }

    fn temp_path(&self, track: &Track) -> PathBuf {
        self.temp_dir
            .join(format!("{}-{}", track.id(), uuid::Uuid::new_v4().simple()))
    }

    /// Removes leftovers of an interrupted process from the temp directory.
    pub async fn sweep_temp_dir(&self) -> Result<usize, AcquisitionError> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(AcquisitionError::TempFile)?;

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.temp_dir)
            .await
            .map_err(AcquisitionError::TempFile)?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(AcquisitionError::TempFile)?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(directory = %self.temp_dir.display(), removed, "Swept stale temporary files");
        }
        Ok(removed)
    }
}
