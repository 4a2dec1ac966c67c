//! Playback worker state machine.
//!
//! ```text
//!            Start                 Pause
//!   Idle ───────────▶ Playing ◀──────────▶ Paused
//!    ▲                 │  ▲      Resume      │
//!    │ Drain      Skip │  │ Advance          │ Stop
//!    │                 ▼  │                  ▼
//!    └──────────── Skipping ──── Stop ───▶ Stopping
//! ```
//!
//! `Drain` (queue exhausted) returns any active state to `Idle`.
//! `Advance` moves on to the next queued track after the current one ended.

use std::fmt;

/// Explicit playback state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerState {
    #[default]
    Idle,
    Playing,
    Paused,
    /// Stop requested: the session is being torn down and the queue will be cleared.
    Stopping,
    /// Skip requested: the session is being torn down, the queue advances.
    Skipping,
}

/// Events driving [`PlayerState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerInput {
    Start,
    Pause,
    Resume,
    Skip,
    Stop,
    Advance,
    Drain,
}

impl PlayerState {
    /// Applies `input`, returning the next state or `None` when the
    /// transition is not allowed from this state.
    pub fn on(self, input: PlayerInput) -> Option<PlayerState> {
        use PlayerInput as I;
        use PlayerState as S;

        match (self, input) {
            (S::Idle, I::Start) => Some(S::Playing),
            (S::Playing, I::Pause) => Some(S::Paused),
            (S::Paused, I::Resume) => Some(S::Playing),
            (S::Playing, I::Skip) => Some(S::Skipping),
            (S::Playing | S::Paused | S::Skipping, I::Stop) => Some(S::Stopping),
            (S::Playing | S::Paused | S::Skipping, I::Advance) => Some(S::Playing),
            (S::Playing | S::Paused | S::Skipping | S::Stopping, I::Drain) => Some(S::Idle),
            _ => None,
        }
    }

    /// True while a drain loop owns the worker.
    pub fn is_active(self) -> bool {
        !matches!(self, PlayerState::Idle)
    }

    /// True once a stop or skip is pending for the current track.
    pub fn is_interrupting(self) -> bool {
        matches!(self, PlayerState::Stopping | PlayerState::Skipping)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Idle => "idle",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Stopping => "stopping",
            PlayerState::Skipping => "skipping",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlayerInput as I;
    use PlayerState as S;

    #[test]
    fn test_nominal_cycle() {
        let s = S::Idle.on(I::Start).unwrap();
        assert_eq!(s, S::Playing);
        let s = s.on(I::Pause).unwrap();
        assert_eq!(s, S::Paused);
        let s = s.on(I::Resume).unwrap();
        assert_eq!(s, S::Playing);
        let s = s.on(I::Skip).unwrap();
        assert_eq!(s, S::Skipping);
        let s = s.on(I::Advance).unwrap();
        assert_eq!(s, S::Playing);
        assert_eq!(s.on(I::Drain), Some(S::Idle));
    }

    #[test]
    fn test_skip_is_refused_while_paused() {
        assert_eq!(S::Paused.on(I::Skip), None);
        assert_eq!(S::Idle.on(I::Skip), None);
    }

    #[test]
    fn test_stop_from_every_active_state() {
        for s in [S::Playing, S::Paused, S::Skipping] {
            assert_eq!(s.on(I::Stop), Some(S::Stopping));
        }
        assert_eq!(S::Idle.on(I::Stop), None);
        assert_eq!(S::Stopping.on(I::Stop), None);
    }

    #[test]
    fn test_stopping_only_drains() {
        for input in [I::Start, I::Pause, I::Resume, I::Skip, I::Advance] {
            assert_eq!(S::Stopping.on(input), None);
        }
        assert_eq!(S::Stopping.on(I::Drain), Some(S::Idle));
    }

    #[test]
    fn test_idle_rejects_everything_but_start() {
        for input in [I::Pause, I::Resume, I::Skip, I::Stop, I::Advance, I::Drain] {
            assert_eq!(S::Idle.on(input), None);
        }
    }
}
