//! Directory-backed cache store.
//!
//! Each object lives in `{root}/{key}`. Writes go to a hidden partial file
//! first and are renamed into place once complete, so a concurrent `get`
//! never observes a half-written artifact.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::store::{validate_key, ByteStream, CacheError, CacheStore};

/// Cache store keeping artifacts as plain files in one directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Creates a store rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the object stored under `key`
    pub fn object_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn partial_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!(".{}.{}.partial", key, uuid::Uuid::new_v4().simple()))
    }
}

#[async_trait::async_trait]
impl CacheStore for FsStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn get(&self, key: &str) -> Result<ByteStream, CacheError> {
        let path = self.object_path(key)?;
        match File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CacheError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        key: &str,
        mut data: ByteStream,
        _size: Option<u64>,
    ) -> Result<(), CacheError> {
        let path = self.object_path(key)?;
        let partial = self.partial_path(key);

        let result = async {
            let mut file = File::create(&partial).await?;
            let written = tokio::io::copy(&mut data, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&partial, &path).await?;
            Ok::<u64, io::Error>(written)
        }
        .await;

        match result {
            Ok(written) => {
                debug!(key, bytes = written, store = %self.root.display(), "Stored object");
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                Err(e.into())
            }
        }
    }
}
