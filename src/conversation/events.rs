//! Inputs consumed and effects produced by the conversation core.

use super::message::{Message, Role, TurnId, UiMode};
use crate::session::{Identity, Session};
use crate::voice::{PressId, RecordingState};
use std::time::Duration;

/// Something that happened: a user gesture or a collaborator result.
#[derive(Debug, Clone)]
pub enum Input {
    /// The text field changed.
    DraftChanged(String),
    /// The user pressed send (or Enter).
    SubmitText(String),
    /// The relay call for `turn` came back.
    RelayCompleted { turn: TurnId, outcome: RelayOutcome },
    MicPressed,
    /// The hold timer started by `press` fired.
    HoldElapsed { press: PressId },
    MicReleased,
    MicrophoneFailed { press: PressId, reason: String },
    TranscriptionFinished {
        press: PressId,
        outcome: TranscriptionOutcome,
    },
    NewSession,
    /// Replace all state with a session read back from the store.
    RestoreSession(Session),
}

/// Result of one relay call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Reply(Message),
    /// Non-2xx or transport failure, already rendered as bubble text.
    Failed(String),
}

/// Result of transcribing one clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionOutcome {
    Text(String),
    /// No speech detected (or the clip was too short to upload).
    Empty,
    Failed(String),
}

/// Transient log entries that are replaced once a result arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Waiting for the relay.
    Thinking,
    /// Recording or transcribing.
    Listening,
}

impl Placeholder {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Thinking => "Thinking…",
            Self::Listening => "Listening…",
        }
    }
}

/// Instructions for whatever draws the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOp {
    SetMode(UiMode),
    ClearInput,
    /// A message bubble. `animate` is off when replaying a restored log.
    AppendBubble {
        role: Role,
        content: String,
        animate: bool,
    },
    ShowPlaceholder(Placeholder),
    RemovePlaceholder(Placeholder),
    /// Assistant-role bubble describing a failed turn. Not part of the log.
    ErrorBubble(String),
    /// Assistant-role nudge (e.g. "try again"). Not part of the log.
    HintBubble(String),
    /// Short-lived status line, no bubble.
    Status(String),
    ClearLog,
    SetRecording(RecordingState),
}

/// Work the core wants done, in order.
#[derive(Debug, Clone)]
pub enum Effect {
    Render(RenderOp),
    /// Write this snapshot of the active session.
    Persist(Session),
    /// Send the full history to the relay, tagged with `turn`.
    SendToRelay { turn: TurnId, messages: Vec<Message> },
    /// Feed `HoldElapsed { press }` back after `after`.
    StartHoldTimer { press: PressId, after: Duration },
    AcquireMicrophone { press: PressId },
    /// Stop recording and transcribe; report via `TranscriptionFinished`.
    FinishRecording { press: PressId },
    /// Drop the live recording without transcribing.
    AbortRecording,
    /// Prime audio output on the first user gesture.
    UnlockPlayback,
    Speak(String),
    /// Open the booking surface, prefilled with what is known.
    OpenBooking(Identity),
}

impl From<RenderOp> for Effect {
    fn from(op: RenderOp) -> Self {
        Self::Render(op)
    }
}
