//! Read-ahead buffering.
//!
//! A fixed prefix of the acquired stream is pulled before the encoder is
//! started, masking first-byte latency of the store or remote origin. The
//! prefix is then replayed in front of the remaining stream.

use std::{
    cmp, io,
    pin::Pin,
    task::{Context, Poll},
};

use discocache::ByteStream;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// Default read-ahead size.
pub const DEFAULT_READAHEAD_BYTES: usize = 100 * 1024;

/// An async reader that replays a prefix buffer before delegating to the
/// underlying reader.
pub struct PrefixedReader<R> {
    prefix: Vec<u8>,
    position: usize,
    reader: R,
}

impl<R> PrefixedReader<R> {
    pub fn new(prefix: Vec<u8>, reader: R) -> Self {
        Self {
            prefix,
            position: 0,
            reader,
        }
    }

    /// Bytes of the prefix not yet replayed.
    pub fn buffered(&self) -> usize {
        self.prefix.len() - self.position
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for PrefixedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.position < self.prefix.len() && buf.remaining() > 0 {
            let remaining = self.prefix.len() - self.position;
            let to_copy = cmp::min(remaining, buf.remaining());
            buf.put_slice(&self.prefix[self.position..self.position + to_copy]);
            self.position += to_copy;
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

/// Reads up to `limit` bytes from `stream` and returns a stream replaying
/// them followed by the rest.
///
/// A stream shorter than `limit` is fine; an I/O error is not.
pub async fn read_ahead(mut stream: ByteStream, limit: usize) -> io::Result<ByteStream> {
    let mut prefix = Vec::with_capacity(limit);
    (&mut stream).take(limit as u64).read_to_end(&mut prefix).await?;
    Ok(Box::new(PrefixedReader::new(prefix, stream)))
}
