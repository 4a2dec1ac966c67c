//! Extension building the playback context from discoconfig

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use discocache::CacheStoreConfigExt;
use discoconfig::Config;

use crate::acquisition::{Acquirer, HttpFetcher};
use crate::context::{EncoderSettings, PlayerContext};
use crate::encoder::FfmpegEngine;
use crate::volume::Volume;
use crate::writeback::FfmpegTranscoder;

/// Extension trait adding player construction to discoconfig
pub trait PlayerConfigExt {
    fn encoder_settings(&self) -> Result<EncoderSettings>;

    fn leave_grace(&self) -> Result<Duration>;

    /// Builds the full player context: cache store, fetcher, encoder,
    /// transcoder and defaults.
    fn player_context(&self) -> Result<PlayerContext>;
}

impl PlayerConfigExt for Config {
    fn encoder_settings(&self) -> Result<EncoderSettings> {
        Ok(EncoderSettings {
            application: self.get_encoder_application()?,
            frame_duration_ms: u32::try_from(self.get_frame_duration_ms()?)?,
            raw_output: self.get_raw_output()?,
        })
    }

    fn leave_grace(&self) -> Result<Duration> {
        Ok(Duration::from_millis(self.get_leave_grace_ms()? as u64))
    }

    fn player_context(&self) -> Result<PlayerContext> {
        let store = self.create_cache_store()?;
        let acquirer = Acquirer::new(store, Arc::new(HttpFetcher::new()?), self.get_temp_dir()?)
            .with_readahead(self.get_readahead_bytes()?);

        let ffmpeg = self.get_ffmpeg_path()?;
        let transcoder = FfmpegTranscoder::new(&ffmpeg)
            .with_bitrate(u32::try_from(self.get_transcode_bitrate_kbps()?)?)
            .with_extension(self.get_transcode_extension()?);

        Ok(PlayerContext::new(Arc::new(FfmpegEngine::new(&ffmpeg)), acquirer)
            .with_transcoder(Arc::new(transcoder))
            .with_encoder_settings(self.encoder_settings()?)
            .with_default_volume(Volume::new(self.get_default_volume()? as i64)?)
            .with_default_bitrate(u32::try_from(self.get_default_bitrate_kbps()?)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        let context = config.player_context().unwrap();
        assert!(context.acquirer().store().is_none());
        assert!(context.writeback().is_none());
        assert_eq!(context.default_bitrate_kbps(), 64);
        assert_eq!(context.default_volume(), Volume::default());
        assert_eq!(config.leave_grace().unwrap(), Duration::from_millis(200));
        assert_eq!(config.encoder_settings().unwrap(), EncoderSettings::default());
    }

    #[tokio::test]
    async fn test_context_with_fs_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        config.set_cache_backend("fs".to_string()).unwrap();

        let context = config.player_context().unwrap();
        assert!(context.acquirer().store().is_some());
        assert!(context.writeback().is_some());
        assert!(context.acquirer().temp_dir().ends_with("tmp"));
    }

    #[tokio::test]
    async fn test_invalid_default_volume() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        config.set_default_volume(150).unwrap();
        assert!(config.player_context().is_err());
    }
}
