//! Voice transport writing frames to local files.
//!
//! Each destination gets `<output>/<destination>.frames`, a sequence of
//! `u32` little-endian length + frame payload records, written at the pace
//! a real voice connection would consume them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use discoplay::{TransportError, VoiceConnection, VoiceGateway, VoiceTransport};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

pub const FRAME_PACE: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct FileGateway {
    output_dir: PathBuf,
    bitrate_kbps: u32,
}

impl FileGateway {
    pub fn new(output_dir: impl AsRef<Path>, bitrate_kbps: u32) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            bitrate_kbps,
        }
    }

    pub fn frames_path(&self, destination: &str) -> PathBuf {
        let name: String = destination
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.output_dir.join(format!("{}.frames", name))
    }
}

#[async_trait::async_trait]
impl VoiceGateway for FileGateway {
    async fn connect(&self, destination: &str) -> Result<VoiceConnection, TransportError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.frames_path(destination);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        info!(destination, path = %path.display(), "Voice output opened");

        let mut pacer = tokio::time::interval(FRAME_PACE);
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(VoiceConnection {
            transport: std::sync::Arc::new(FileTransport {
                path,
                sink: Mutex::new(Some(BufWriter::new(file))),
                pacer: Mutex::new(pacer),
            }),
            bitrate_kbps: self.bitrate_kbps,
        })
    }
}

#[derive(Debug)]
pub struct FileTransport {
    path: PathBuf,
    sink: Mutex<Option<BufWriter<File>>>,
    pacer: Mutex<Interval>,
}

#[async_trait::async_trait]
impl VoiceTransport for FileTransport {
    async fn send_frame(&self, frame: Bytes) -> Result<(), TransportError> {
        self.pacer.lock().await.tick().await;

        let mut sink = self.sink.lock().await;
        let writer = sink.as_mut().ok_or(TransportError::Disconnected)?;
        let len = u32::try_from(frame.len())
            .map_err(|_| TransportError::Other(format!("frame of {} bytes", frame.len())))?;
        writer.write_all(&len.to_le_bytes()).await?;
        writer.write_all(&frame).await?;
        Ok(())
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        // End of track: make the written frames visible on disk.
        if !speaking {
            if let Some(writer) = self.sink.lock().await.as_mut() {
                writer.flush().await?;
            }
        }
        debug!(path = %self.path.display(), speaking, "Speaking");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(mut writer) = self.sink.lock().await.take() {
            writer.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_are_length_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::new(dir.path(), 64);

        let connection = gateway.connect("guild/1").await.unwrap();
        let transport = connection.transport;
        transport.set_speaking(true).await.unwrap();
        transport.send_frame(Bytes::from_static(b"abc")).await.unwrap();
        transport.send_frame(Bytes::from_static(b"de")).await.unwrap();
        transport.set_speaking(false).await.unwrap();
        transport.disconnect().await.unwrap();

        let data = std::fs::read(dir.path().join("guild_1.frames")).unwrap();
        assert_eq!(data, b"\x03\x00\x00\x00abc\x02\x00\x00\x00de");

        let err = transport.send_frame(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));
    }
}
