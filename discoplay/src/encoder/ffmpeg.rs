//! `ffmpeg` backed encode engine.
//!
//! The child reads either the acquired stream on stdin or the locator
//! directly, and writes Ogg/Opus on stdout. Opus packets are handed out as
//! transport frames; the two header packets are dropped.

use std::path::PathBuf;
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::ogg::OggPacketReader;
use super::{frame_packet, EncodeEngine, EncodeInput, EncodeOptions, FrameSource};
use crate::error::EncodeError;

const OPUS_HEAD: &[u8] = b"OpusHead";
const OPUS_TAGS: &[u8] = b"OpusTags";

/// Encode engine spawning one `ffmpeg` process per session.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    program: PathBuf,
}

impl FfmpegEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Command line arguments for one session.
    pub fn arguments(input: &EncodeInput, options: &EncodeOptions) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-loglevel", "warning"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        match input {
            EncodeInput::Stream(_) => {
                args.extend(["-i".to_string(), "pipe:0".to_string()]);
            }
            EncodeInput::Locator(locator) => {
                if locator.starts_with("http://") || locator.starts_with("https://") {
                    args.extend(
                        ["-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "5"]
                            .iter()
                            .map(|s| s.to_string()),
                    );
                }
                args.extend(["-i".to_string(), locator.clone()]);
            }
        }

        args.extend([
            "-map".to_string(),
            "0:a".to_string(),
            "-vn".to_string(),
            "-af".to_string(),
            format!("volume={:.4}", options.volume.factor()),
            "-ac".to_string(),
            "2".to_string(),
            "-ar".to_string(),
            "48000".to_string(),
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            format!("{}k", options.bitrate_kbps),
            "-application".to_string(),
            options.application.clone(),
            "-frame_duration".to_string(),
            options.frame_duration_ms.to_string(),
            "-f".to_string(),
            "ogg".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait::async_trait]
impl EncodeEngine for FfmpegEngine {
    async fn start(
        &self,
        input: EncodeInput,
        options: &EncodeOptions,
    ) -> Result<Box<dyn FrameSource>, EncodeError> {
        let args = Self::arguments(&input, options);
        debug!(program = %self.program.display(), input = input.kind(), ?args, "Spawning encoder");

        let stdin = match input {
            EncodeInput::Stream(_) => Stdio::piped(),
            EncodeInput::Locator(_) => Stdio::null(),
        };
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let feeder = match (input, child.stdin.take()) {
            (EncodeInput::Stream(mut reader), Some(mut stdin)) => Some(tokio::spawn(async move {
                match tokio::io::copy(&mut reader, &mut stdin).await {
                    Ok(bytes) => debug!(bytes, "Encoder input fully written"),
                    // The encoder closing its stdin early is how a kill looks from here.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!("Encoder closed its input")
                    }
                    Err(e) => warn!(error = %e, "Failed to feed encoder"),
                }
                let _ = stdin.shutdown().await;
            })),
            _ => None,
        };

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "discoplay::ffmpeg", "{}", line);
                }
            })
        });

        let stdout = child.stdout.take().ok_or_else(|| {
            EncodeError::Io(std::io::Error::other("encoder stdout was not captured"))
        })?;

        Ok(Box::new(FfmpegFrames {
            child,
            packets: OggPacketReader::new(stdout, true),
            feeder,
            stderr_task,
            raw_output: options.raw_output,
            closed: false,
        }))
    }
}

/// Frames produced by one running `ffmpeg` child.
struct FfmpegFrames {
    child: Child,
    packets: OggPacketReader<ChildStdout>,
    feeder: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    raw_output: bool,
    closed: bool,
}

impl FfmpegFrames {
    async fn reap(&mut self) -> Result<(), EncodeError> {
        self.closed = true;
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        let status = self.child.wait().await?;
        if let Some(task) = self.stderr_task.take() {
            let _ = task.await;
        }
        if status.success() {
            Ok(())
        } else {
            Err(EncodeError::Exit(status.to_string()))
        }
    }
}

#[async_trait::async_trait]
impl FrameSource for FfmpegFrames {
    async fn next_frame(&mut self) -> Result<Option<Bytes>, EncodeError> {
        if self.closed {
            return Ok(None);
        }
        loop {
            match self.packets.next_packet().await? {
                Some(packet) => {
                    if packet.starts_with(OPUS_HEAD) || packet.starts_with(OPUS_TAGS) {
                        continue;
                    }
                    return frame_packet(&packet, self.raw_output).map(Some);
                }
                None => {
                    self.reap().await?;
                    return Ok(None);
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        if let Err(e) = self.child.start_kill() {
            // Already exited.
            debug!(error = %e, "Encoder kill skipped");
        }
        if let Err(e) = self.child.wait().await {
            warn!(error = %e, "Failed to reap encoder");
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        self.closed = true;
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}
