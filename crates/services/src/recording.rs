//! Microphone recorder for speaking exercises.

use kwave_core::recording::{RecordingAction, RecordingError, RecordingState};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AudioError {
    #[error("audio device error: {0}")]
    Device(String),
    #[error(transparent)]
    Transition(#[from] RecordingError),
}

/// Platform audio hooks.
pub trait AudioBackend {
    /// Acquire the microphone and begin capturing.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::Device` if the microphone is unavailable.
    fn open_microphone(&mut self) -> Result<(), AudioError>;

    /// # Errors
    ///
    /// Returns `AudioError::Device` on device failures.
    fn pause_capture(&mut self) -> Result<(), AudioError>;

    /// # Errors
    ///
    /// Returns `AudioError::Device` on device failures.
    fn resume_capture(&mut self) -> Result<(), AudioError>;

    /// Stop capturing and release the microphone.
    fn release_microphone(&mut self);

    /// Load the finished take for playback.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::Device` if the recording cannot be loaded.
    fn load_playback(&mut self) -> Result<(), AudioError>;

    fn unload_playback(&mut self);
}

/// Drives a [`RecordingState`] against an [`AudioBackend`].
///
/// The microphone and the playback buffer are each released exactly once, either
/// by the matching transition or when the recorder is dropped.
pub struct Recorder<B: AudioBackend> {
    backend: B,
    state: RecordingState,
    microphone_held: bool,
    playback_loaded: bool,
}

impl<B: AudioBackend> Recorder<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: RecordingState::Idle,
            microphone_held: false,
            playback_loaded: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// # Errors
    ///
    /// Returns `AudioError` for an illegal transition or a device failure.
    pub fn start(&mut self) -> Result<(), AudioError> {
        let next = self.state.apply(RecordingAction::Start)?;
        self.backend.open_microphone()?;
        self.microphone_held = true;
        self.state = next;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `AudioError` for an illegal transition or a device failure.
    pub fn pause(&mut self) -> Result<(), AudioError> {
        let next = self.state.apply(RecordingAction::Pause)?;
        self.backend.pause_capture()?;
        self.state = next;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `AudioError` for an illegal transition or a device failure.
    pub fn resume(&mut self) -> Result<(), AudioError> {
        let next = self.state.apply(RecordingAction::Resume)?;
        self.backend.resume_capture()?;
        self.state = next;
        Ok(())
    }

    /// Finishes the take, releases the microphone and loads the take for playback.
    ///
    /// # Errors
    ///
    /// Returns `AudioError` for an illegal transition or if playback cannot be loaded.
    /// The microphone is released either way.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        let next = self.state.apply(RecordingAction::Stop)?;
        self.release_microphone();
        self.state = next;
        self.backend.load_playback()?;
        self.playback_loaded = true;
        Ok(())
    }

    /// Discards the take and returns to idle.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::Transition` unless the recorder is finished.
    pub fn reset(&mut self) -> Result<(), AudioError> {
        let next = self.state.apply(RecordingAction::Reset)?;
        self.unload_playback();
        self.state = next;
        Ok(())
    }

    fn release_microphone(&mut self) {
        if std::mem::take(&mut self.microphone_held) {
            self.backend.release_microphone();
        }
    }

    fn unload_playback(&mut self) {
        if std::mem::take(&mut self.playback_loaded) {
            self.backend.unload_playback();
        }
    }
}

impl<B: AudioBackend> Drop for Recorder<B> {
    fn drop(&mut self) {
        self.release_microphone();
        self.unload_playback();
    }
}
