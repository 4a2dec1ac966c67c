//! Background cache population.
//!
//! After a fetched track played to completion without being killed, its raw
//! bytes are transcoded into the storage codec and uploaded under the track
//! id. Every temporary artifact is removed whatever the outcome. Failures
//! only mean the next play fetches again.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use discocache::CacheStore;
use tokio::process::Command;
use tracing::{debug, info};

use crate::acquisition::PendingWriteback;
use crate::error::WritebackError;
use crate::tasks::BackgroundTasks;

pub const DEFAULT_TRANSCODE_BITRATE_KBPS: u32 = 320;
pub const DEFAULT_TRANSCODE_EXTENSION: &str = "mp3";

/// Converts raw fetched media into the cache storage codec.
#[async_trait::async_trait]
pub trait Transcoder: Debug + Send + Sync {
    /// Transcodes `input` and returns the path of the new artifact.
    async fn transcode(&self, input: &Path) -> Result<PathBuf, WritebackError>;
}

/// `ffmpeg -i raw -b:a 320k raw.mp3`
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    bitrate_kbps: u32,
    extension: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            bitrate_kbps: DEFAULT_TRANSCODE_BITRATE_KBPS,
            extension: DEFAULT_TRANSCODE_EXTENSION.to_string(),
        }
    }

    pub fn with_bitrate(mut self, bitrate_kbps: u32) -> Self {
        self.bitrate_kbps = bitrate_kbps;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Artifact path for a raw input path.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let mut name = input.as_os_str().to_os_string();
        name.push(".");
        name.push(&self.extension);
        PathBuf::from(name)
    }
}

#[async_trait::async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path) -> Result<PathBuf, WritebackError> {
        let output = self.output_path(input);
        let result = Command::new(&self.program)
            .args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-vn", "-abr", "1", "-b:a"])
            .arg(format!("{}k", self.bitrate_kbps))
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| WritebackError::Transcode(format!("failed to spawn transcoder: {}", e)))?;

        if !result.status.success() {
            let _ = tokio::fs::remove_file(&output).await;
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(WritebackError::Transcode(format!(
                "{}: {}",
                result.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

/// Removes the listed files when dropped.
struct TempArtifacts(Vec<PathBuf>);

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        for path in &self.0 {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %e, "Failed to remove temporary artifact");
                }
            }
        }
    }
}

/// Schedules transcode-and-upload jobs on the background task registry.
#[derive(Debug, Clone)]
pub struct Writeback {
    store: Arc<dyn CacheStore>,
    transcoder: Arc<dyn Transcoder>,
    tasks: BackgroundTasks,
}

impl Writeback {
    pub fn new(
        store: Arc<dyn CacheStore>,
        transcoder: Arc<dyn Transcoder>,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            store,
            transcoder,
            tasks,
        }
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Fires the writeback of a cleanly completed fetch. Never blocks.
    pub fn schedule(&self, pending: PendingWriteback) {
        let store = self.store.clone();
        let transcoder = self.transcoder.clone();
        self.tasks
            .spawn("writeback", run(store, transcoder, pending));
    }

    /// Drops the raw bytes of an interrupted or failed fetch in the background.
    pub fn discard(&self, pending: PendingWriteback) {
        self.tasks.spawn("discard", async move {
            pending.discard().await;
            Ok::<(), WritebackError>(())
        });
    }
}

async fn run(
    store: Arc<dyn CacheStore>,
    transcoder: Arc<dyn Transcoder>,
    pending: PendingWriteback,
) -> Result<(), WritebackError> {
    let (track_id, tee) = pending.into_parts();
    let raw_path = tee.path().to_path_buf();
    let mut artifacts = TempArtifacts(vec![raw_path.clone()]);

    let raw_bytes = tee.finish().await?;
    let artifact = transcoder.transcode(&raw_path).await?;
    artifacts.0.push(artifact.clone());

    let file = tokio::fs::File::open(&artifact).await?;
    let size = file.metadata().await?.len();
    store.put(&track_id, Box::new(file), Some(size)).await?;

    info!(
        track_id = %track_id,
        store = store.name(),
        raw_bytes,
        artifact_bytes = size,
        "Track written back to cache"
    );
    Ok(())
}
