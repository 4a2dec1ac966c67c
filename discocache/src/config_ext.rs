//! Extension building the cache store from discoconfig
//!
//! The backend is selected by `cache.backend`:
//! - `none`: no cache, every track is streamed directly
//! - `fs`: [`FsStore`] rooted at `cache.directory`
//! - `http`: [`HttpStore`] using `cache.http.{endpoint,bucket,token}`

use std::sync::Arc;

use anyhow::{anyhow, Result};
use discoconfig::Config;
use tracing::info;

use crate::{CacheStore, FsStore, HttpStore};

/// Extension trait adding cache store construction to discoconfig
pub trait CacheStoreConfigExt {
    /// Builds the configured cache store, or `None` when caching is disabled.
    fn create_cache_store(&self) -> Result<Option<Arc<dyn CacheStore>>>;
}

impl CacheStoreConfigExt for Config {
    fn create_cache_store(&self) -> Result<Option<Arc<dyn CacheStore>>> {
        let backend = self.get_cache_backend()?.to_lowercase();
        match backend.as_str() {
            "" | "none" => {
                info!("Audio cache disabled");
                Ok(None)
            }
            "fs" => {
                let dir = self.get_cache_dir()?;
                info!(directory = %dir.display(), "Using filesystem audio cache");
                Ok(Some(Arc::new(FsStore::new(dir)?)))
            }
            "http" => {
                let endpoint = self.get_cache_http_endpoint()?;
                let bucket = self.get_cache_http_bucket()?;
                if endpoint.is_empty() || bucket.is_empty() {
                    return Err(anyhow!(
                        "cache.http.endpoint and cache.http.bucket are required for the http backend"
                    ));
                }
                let token = self.get_cache_http_token()?;
                info!(endpoint = %endpoint, bucket = %bucket, "Using HTTP object store audio cache");
                Ok(Some(Arc::new(HttpStore::new(&endpoint, &bucket, Some(token))?)))
            }
            other => Err(anyhow!("unknown cache backend {:?}", other)),
        }
    }
}
