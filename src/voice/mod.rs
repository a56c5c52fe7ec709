//! Push-to-talk capture.
//!
//! [`VoiceCapture`] is the pure press/hold/release state machine driven by
//! the conversation core. The [`Microphone`] collaborator does the actual
//! capture and is driven by the runtime.

pub mod microphone;

pub use microphone::{AudioClip, FileMicrophone, Microphone};

use serde::{Deserialize, Serialize};

/// Transient recording state. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    /// Button is down but the hold threshold has not elapsed yet.
    Holding,
    Recording,
    Transcribing,
}

/// Identifies one press of the mic button.
///
/// Timer and collaborator results carry it back so late results from an
/// abandoned press can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PressId(pub u64);

/// What a release did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Released before the hold threshold. Nothing was recorded.
    Tap,
    /// Recording stopped; the clip should go to transcription.
    Finish(PressId),
    /// Nothing was in progress.
    Ignored,
}

/// What a cancellation interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    Nothing,
    Hold,
    /// A live recording; its input stream must be released.
    Recording(PressId),
}

/// Press-and-hold state machine.
#[derive(Debug, Default)]
pub struct VoiceCapture {
    state: RecordingState,
    press: Option<PressId>,
    next_press: u64,
}

impl VoiceCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// `idle -> holding`. Returns `None` while another capture is active.
    pub fn press(&mut self) -> Option<PressId> {
        if self.state != RecordingState::Idle {
            return None;
        }
        self.next_press += 1;
        let id = PressId(self.next_press);
        self.press = Some(id);
        self.state = RecordingState::Holding;
        Some(id)
    }

    /// `holding -> recording` once the threshold elapses for the same press.
    pub fn hold_elapsed(&mut self, press: PressId) -> bool {
        if self.state == RecordingState::Holding && self.press == Some(press) {
            self.state = RecordingState::Recording;
            true
        } else {
            false
        }
    }

    pub fn release(&mut self) -> Release {
        match self.state {
            RecordingState::Holding => {
                self.reset();
                Release::Tap
            }
            RecordingState::Recording => match self.press {
                Some(id) => {
                    self.state = RecordingState::Transcribing;
                    Release::Finish(id)
                }
                None => {
                    self.reset();
                    Release::Ignored
                }
            },
            RecordingState::Idle | RecordingState::Transcribing => Release::Ignored,
        }
    }

    /// Abandon a hold or live recording. Transcription in flight is left alone.
    pub fn cancel(&mut self) -> Cancelled {
        match (self.state, self.press) {
            (RecordingState::Holding, _) => {
                self.reset();
                Cancelled::Hold
            }
            (RecordingState::Recording, Some(id)) => {
                self.reset();
                Cancelled::Recording(id)
            }
            _ => Cancelled::Nothing,
        }
    }

    /// Microphone could not be opened (or died) for `press`.
    ///
    /// Returns `true` if that press was still live and the machine went idle.
    pub fn microphone_failed(&mut self, press: PressId) -> bool {
        let live = matches!(
            self.state,
            RecordingState::Recording | RecordingState::Transcribing
        );
        if live && self.press == Some(press) {
            self.reset();
            true
        } else {
            false
        }
    }

    /// `transcribing -> idle` for the current press. Stale results return `false`.
    pub fn transcription_finished(&mut self, press: PressId) -> bool {
        if self.state == RecordingState::Transcribing && self.press == Some(press) {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Drop everything, invalidating any outstanding press.
    pub fn reset(&mut self) {
        self.state = RecordingState::Idle;
        self.press = None;
    }
}

/// Local sanity check on a finished clip, applied before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipCheck {
    Ok,
    /// Too small to contain speech; treated as an empty transcription.
    TooShort,
    /// Over the upload limit; treated as a failed transcription.
    TooLarge,
}

#[must_use]
pub fn check_clip(clip: &AudioClip, min_bytes: usize, max_bytes: usize) -> ClipCheck {
    let len = clip.bytes.len();
    if len < min_bytes {
        ClipCheck::TooShort
    } else if len > max_bytes {
        ClipCheck::TooLarge
    } else {
        ClipCheck::Ok
    }
}
