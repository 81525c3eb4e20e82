use std::fmt;
use thiserror::Error;

/// View state of a speaking-exercise recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Paused,
    Finished,
}

impl RecordingState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
            RecordingState::Finished => "finished",
        }
    }

    /// True while the microphone is held (recording or paused).
    #[must_use]
    pub fn holds_microphone(self) -> bool {
        matches!(self, RecordingState::Recording | RecordingState::Paused)
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingAction {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
}

impl fmt::Display for RecordingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordingAction::Start => "start",
            RecordingAction::Pause => "pause",
            RecordingAction::Resume => "resume",
            RecordingAction::Stop => "stop",
            RecordingAction::Reset => "reset",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordingError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: RecordingState,
        action: RecordingAction,
    },
}

impl RecordingState {
    /// Applies `action`, returning the next state.
    ///
    /// ```text
    /// idle --start--> recording --pause--> paused --resume--> recording
    /// recording|paused --stop--> finished --reset--> idle
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `RecordingError::InvalidTransition` for any other combination.
    pub fn apply(self, action: RecordingAction) -> Result<Self, RecordingError> {
        use RecordingAction as A;
        use RecordingState as S;

        match (self, action) {
            (S::Idle, A::Start) | (S::Paused, A::Resume) => Ok(S::Recording),
            (S::Recording, A::Pause) => Ok(S::Paused),
            (S::Recording | S::Paused, A::Stop) => Ok(S::Finished),
            (S::Finished, A::Reset) => Ok(S::Idle),
            (from, action) => Err(RecordingError::InvalidTransition { from, action }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_with_pause() {
        let s = RecordingState::Idle
            .apply(RecordingAction::Start)
            .and_then(|s| s.apply(RecordingAction::Pause))
            .and_then(|s| s.apply(RecordingAction::Resume))
            .and_then(|s| s.apply(RecordingAction::Stop))
            .unwrap();
        assert_eq!(s, RecordingState::Finished);
        assert_eq!(s.apply(RecordingAction::Reset).unwrap(), RecordingState::Idle);
    }

    #[test]
    fn cannot_pause_when_idle() {
        let err = RecordingState::Idle.apply(RecordingAction::Pause).unwrap_err();
        assert_eq!(err.to_string(), "cannot pause while idle");
    }

    #[test]
    fn microphone_held_only_mid_recording() {
        assert!(RecordingState::Recording.holds_microphone());
        assert!(RecordingState::Paused.holds_microphone());
        assert!(!RecordingState::Finished.holds_microphone());
        assert!(!RecordingState::Idle.holds_microphone());
    }
}
