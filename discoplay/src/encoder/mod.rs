//! External encode engine boundary.
//!
//! An [`EncodeEngine`] turns either an acquired byte stream or a directly
//! playable locator into a [`FrameSource`]: a pull-based sequence of encoded
//! transport frames. [`FfmpegEngine`] is the shipped implementation.

mod ffmpeg;
pub mod ogg;

use std::fmt::{self, Debug};

use bytes::{BufMut, Bytes, BytesMut};
use discocache::ByteStream;

use crate::error::EncodeError;
use crate::volume::Volume;

pub use ffmpeg::FfmpegEngine;

/// Latency profile passed to the codec.
pub const DEFAULT_APPLICATION: &str = "lowdelay";
pub const DEFAULT_FRAME_DURATION_MS: u32 = 20;

/// What the engine should encode.
pub enum EncodeInput {
    /// Bytes already opened by the acquisition pipeline.
    Stream(ByteStream),
    /// A locator the engine opens itself (direct stream tier).
    Locator(String),
}

impl EncodeInput {
    pub fn kind(&self) -> &'static str {
        match self {
            EncodeInput::Stream(_) => "stream",
            EncodeInput::Locator(_) => "locator",
        }
    }
}

impl Debug for EncodeInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeInput::Stream(_) => f.write_str("EncodeInput::Stream(..)"),
            EncodeInput::Locator(locator) => {
                f.debug_tuple("EncodeInput::Locator").field(locator).finish()
            }
        }
    }
}

/// Encoder options for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub bitrate_kbps: u32,
    pub volume: Volume,
    pub application: String,
    pub frame_duration_ms: u32,
    /// When false, each frame carries a little-endian `i16` length prefix.
    pub raw_output: bool,
}

impl EncodeOptions {
    pub fn new(bitrate_kbps: u32, volume: Volume) -> Self {
        Self {
            bitrate_kbps,
            volume,
            application: DEFAULT_APPLICATION.to_string(),
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
            raw_output: true,
        }
    }

    /// Codec gain unit for the configured volume.
    pub fn gain(&self) -> u32 {
        self.volume.gain()
    }
}

/// Pull-based source of encoded frames owned by one session.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> Result<Option<Bytes>, EncodeError>;

    /// Terminates the underlying engine and releases its resources.
    /// Must be safe to call more than once.
    async fn shutdown(&mut self);
}

/// Starts encoder instances.
#[async_trait::async_trait]
pub trait EncodeEngine: Debug + Send + Sync {
    async fn start(
        &self,
        input: EncodeInput,
        options: &EncodeOptions,
    ) -> Result<Box<dyn FrameSource>, EncodeError>;
}

/// Wraps a codec packet into a transport frame.
pub fn frame_packet(packet: &[u8], raw_output: bool) -> Result<Bytes, EncodeError> {
    if raw_output {
        return Ok(Bytes::copy_from_slice(packet));
    }
    let len = i16::try_from(packet.len()).map_err(|_| {
        EncodeError::Container(format!("packet of {} bytes cannot be framed", packet.len()))
    })?;
    let mut frame = BytesMut::with_capacity(packet.len() + 2);
    frame.put_i16_le(len);
    frame.put_slice(packet);
    Ok(frame.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_frame() {
        let frame = frame_packet(b"opus", true).unwrap();
        assert_eq!(&frame[..], b"opus");
    }

    #[test]
    fn test_length_prefixed_frame() {
        let frame = frame_packet(b"opus", false).unwrap();
        assert_eq!(&frame[..], &[4, 0, b'o', b'p', b'u', b's']);
    }

    #[test]
    fn test_oversized_packet() {
        let packet = vec![0u8; 40_000];
        assert!(frame_packet(&packet, false).is_err());
    }

    #[test]
    fn test_options_defaults() {
        let options = EncodeOptions::new(96, Volume::default());
        assert_eq!(options.application, "lowdelay");
        assert_eq!(options.frame_duration_ms, 20);
        assert!(options.raw_output);
        assert_eq!(options.gain(), 256);
    }
}
