//! Tee of a fetched stream into a temporary file.
//!
//! [`TeeReader`] forwards every chunk it yields to a writer task through an
//! unbounded channel, so a slow disk never stalls the live encode path. The
//! matching [`TeeHandle`] tells the writeback whether the whole stream made
//! it to disk.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::WritebackError;

/// Reader duplicating everything it reads into a file.
pub struct TeeReader<R> {
    reader: R,
    sink: Option<mpsc::UnboundedSender<Bytes>>,
    complete: Arc<AtomicBool>,
}

/// Owner side of the temporary file fed by a [`TeeReader`].
#[derive(Debug)]
pub struct TeeHandle {
    path: PathBuf,
    writer: JoinHandle<io::Result<u64>>,
    complete: Arc<AtomicBool>,
}

/// Starts teeing `reader` into `file`, located at `path`.
pub fn tee<R>(reader: R, file: File, path: PathBuf) -> (TeeReader<R>, TeeHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let complete = Arc::new(AtomicBool::new(false));
    let writer = tokio::spawn(write_chunks(file, rx));

    (
        TeeReader {
            reader,
            sink: Some(tx),
            complete: complete.clone(),
        },
        TeeHandle {
            path,
            writer,
            complete,
        },
    )
}

async fn write_chunks(mut file: File, mut rx: mpsc::UnboundedReceiver<Bytes>) -> io::Result<u64> {
    let mut written = 0u64;
    while let Some(chunk) = rx.recv().await {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

impl<R: AsyncRead + Unpin> AsyncRead for TeeReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let wants_more = buf.remaining() > 0;

        let this = &mut *self;
        match Pin::new(&mut this.reader).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let filled = &buf.filled()[before..];
                if !filled.is_empty() {
                    if let Some(sink) = &this.sink {
                        if sink.send(Bytes::copy_from_slice(filled)).is_err() {
                            // Writer is gone; keep serving the live path.
                            this.sink = None;
                        }
                    }
                } else if wants_more && this.sink.take().is_some() {
                    this.complete.store(true, Ordering::Release);
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                this.sink = None;
                Poll::Ready(Err(e))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl TeeHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for the writer and returns the number of bytes persisted.
    ///
    /// Fails with [`WritebackError::Incomplete`] unless the reader hit a
    /// clean end of stream.
    pub async fn finish(self) -> Result<u64, WritebackError> {
        let written = self
            .writer
            .await
            .map_err(|e| WritebackError::Tee(e.to_string()))??;
        if !self.complete.load(Ordering::Acquire) {
            return Err(WritebackError::Incomplete);
        }
        debug!(path = %self.path.display(), bytes = written, "Fetched stream persisted");
        Ok(written)
    }

    /// Waits for the writer to let go of the file, then removes it.
    pub async fn discard(self) {
        let _ = self.writer.await;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %self.path.display(), error = %e, "Failed to remove temporary file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_tee_copies_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        let file = File::create(&path).await.unwrap();
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();

        let (mut reader, handle) = tee(std::io::Cursor::new(data.clone()), file, path.clone());
        let mut live = Vec::new();
        reader.read_to_end(&mut live).await.unwrap();
        drop(reader);

        assert_eq!(live, data);
        assert_eq!(handle.finish().await.unwrap(), data.len() as u64);
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[tokio::test]
    async fn test_partial_read_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        let file = File::create(&path).await.unwrap();

        let (mut reader, handle) = tee(std::io::Cursor::new(vec![1u8; 8192]), file, path);
        let mut buf = [0u8; 100];
        reader.read_exact(&mut buf).await.unwrap();
        drop(reader);

        assert!(matches!(handle.finish().await, Err(WritebackError::Incomplete)));
    }

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        let file = File::create(&path).await.unwrap();

        let (reader, handle) = tee(std::io::Cursor::new(vec![1u8; 10]), file, path.clone());
        drop(reader);
        handle.discard().await;
        assert!(!path.exists());
    }
}
