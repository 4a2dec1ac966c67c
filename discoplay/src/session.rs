//! Encode/stream session.
//!
//! A session owns one [`FrameSource`] and pumps its frames into a
//! [`VoiceTransport`] from a spawned task. The worker keeps a cloneable
//! [`SessionHandle`] to kill or pause it and blocks on [`Session::wait`].
//! The frame source is shut down on every exit path of the pump.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::encoder::FrameSource;
use crate::error::SessionError;
use crate::transport::VoiceTransport;

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The encoder reached end of stream.
    Finished,
    /// [`SessionHandle::kill`] was called.
    Killed,
    /// Encoder or transport failure.
    Failed(SessionError),
}

impl SessionOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionOutcome::Finished)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Finished => "finished",
            SessionOutcome::Killed => "killed",
            SessionOutcome::Failed(_) => "failed",
        }
    }
}

/// Control handle of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    /// Terminates the session. Idempotent.
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Suspends or resumes frame emission without terminating the encoder.
    pub fn set_paused(&self, paused: bool) {
        self.paused.send_replace(paused);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }
}

/// A running encode/stream session.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    task: JoinHandle<SessionOutcome>,
}

impl Session {
    /// Starts pumping `frames` into `transport`.
    pub fn start(
        frames: Box<dyn FrameSource>,
        transport: Arc<dyn VoiceTransport>,
        start_paused: bool,
    ) -> Self {
        let (paused_tx, paused_rx) = watch::channel(start_paused);
        let handle = SessionHandle {
            cancel: CancellationToken::new(),
            paused: Arc::new(paused_tx),
        };
        let task = tokio::spawn(pump(frames, transport, handle.clone(), paused_rx));
        Self { handle, task }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Completion signal of the session.
    pub async fn wait(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => SessionOutcome::Failed(SessionError::Task(e.to_string())),
        }
    }
}

async fn pump(
    mut frames: Box<dyn FrameSource>,
    transport: Arc<dyn VoiceTransport>,
    handle: SessionHandle,
    mut paused: watch::Receiver<bool>,
) -> SessionOutcome {
    let cancel = handle.cancel.clone();
    let mut sent: u64 = 0;

    let outcome = 'pump: loop {
        while *paused.borrow_and_update() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'pump SessionOutcome::Killed,
                // The handle keeps the sender alive for the whole pump.
                _ = paused.changed() => {}
            }
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'pump SessionOutcome::Killed,
            next = frames.next_frame() => next,
        };

        match next {
            Ok(Some(frame)) => {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'pump SessionOutcome::Killed,
                    result = transport.send_frame(frame) => result,
                };
                if let Err(e) = result {
                    break 'pump SessionOutcome::Failed(e.into());
                }
                sent += 1;
                trace!(sent, "Frame sent");
            }
            Ok(None) => break 'pump SessionOutcome::Finished,
            Err(e) => break 'pump SessionOutcome::Failed(e.into()),
        }
    };

    frames.shutdown().await;
    drop(handle);
    debug!(frames = sent, outcome = outcome.label(), "Session ended");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EncodeError, TransportError};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFrames {
        remaining: usize,
        interval: Duration,
        shut: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl FrameSource for CountingFrames {
        async fn next_frame(&mut self) -> Result<Option<Bytes>, EncodeError> {
            tokio::time::sleep(self.interval).await;
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(Bytes::from_static(b"frame")))
        }

        async fn shutdown(&mut self) {
            self.shut.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Debug, Default)]
    struct Sink {
        sent: AtomicUsize,
        broken: AtomicBool,
    }

    #[async_trait::async_trait]
    impl VoiceTransport for Sink {
        async fn send_frame(&self, _frame: Bytes) -> Result<(), TransportError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(TransportError::Disconnected);
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_speaking(&self, _speaking: bool) -> Result<(), TransportError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn frames(remaining: usize, interval_ms: u64) -> (Box<dyn FrameSource>, Arc<AtomicBool>) {
        let shut = Arc::new(AtomicBool::new(false));
        let source = CountingFrames {
            remaining,
            interval: Duration::from_millis(interval_ms),
            shut: shut.clone(),
        };
        (Box::new(source), shut)
    }

    #[tokio::test]
    async fn test_session_runs_to_completion() {
        let sink = Arc::new(Sink::default());
        let (source, shut) = frames(5, 1);

        let outcome = Session::start(source, sink.clone(), false).wait().await;
        assert!(outcome.is_finished());
        assert_eq!(sink.sent.load(Ordering::SeqCst), 5);
        assert!(shut.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_kill_terminates_and_shuts_down() {
        let sink = Arc::new(Sink::default());
        let (source, shut) = frames(100_000, 2);

        let session = Session::start(source, sink.clone(), false);
        let handle = session.handle();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.kill();
        handle.kill();

        assert!(matches!(session.wait().await, SessionOutcome::Killed));
        assert!(handle.is_killed());
        assert!(shut.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_paused_session_sends_nothing_until_resumed() {
        let sink = Arc::new(Sink::default());
        let (source, _shut) = frames(3, 1);

        let session = Session::start(source, sink.clone(), true);
        let handle = session.handle();
        assert!(handle.is_paused());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sink.sent.load(Ordering::SeqCst), 0);

        handle.set_paused(false);
        assert!(session.wait().await.is_finished());
        assert_eq!(sink.sent.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_kill_while_paused() {
        let sink = Arc::new(Sink::default());
        let (source, shut) = frames(3, 1);

        let session = Session::start(source, sink, true);
        session.handle().kill();
        assert!(matches!(session.wait().await, SessionOutcome::Killed));
        assert!(shut.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_transport_error_fails_session() {
        let sink = Arc::new(Sink::default());
        sink.broken.store(true, Ordering::SeqCst);
        let (source, shut) = frames(3, 1);

        let outcome = Session::start(source, sink, false).wait().await;
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(SessionError::Transport(TransportError::Disconnected))
        ));
        assert!(shut.load(Ordering::SeqCst));
    }
}
