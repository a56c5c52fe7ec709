//! The conversation state machine.
//!
//! [`ConversationCore`] owns every piece of mutable conversation state and
//! never performs I/O: each input returns the ordered list of effects the
//! runtime must carry out.

use super::events::{Effect, Input, Placeholder, RelayOutcome, RenderOp, TranscriptionOutcome};
use super::message::{Message, TurnId, TurnOrigin, UiMode};
use crate::config::WidgetConfig;
use crate::intent::{IdentityExtractor, PhraseDetector, RegexIdentityExtractor, SchedulingDetector};
use crate::session::Session;
use crate::voice::{Cancelled, PressId, RecordingState, Release, VoiceCapture};
use std::time::Duration;

/// Shown when the mic button is tapped instead of held.
pub const HOLD_HINT: &str = "Hold the mic button to talk.";
/// Shown when the microphone cannot be opened.
pub const MIC_UNAVAILABLE: &str = "Microphone unavailable. Check permissions and try again.";
/// Shown when a recording produced no usable transcript.
pub const TRY_AGAIN: &str = "Sorry, I didn't catch that. Please try again.";

/// Core tunables, normally taken from [`WidgetConfig`].
#[derive(Debug, Clone)]
pub struct CoreSettings {
    pub hold_threshold: Duration,
    /// Speak replies to voice-originated turns.
    pub speak_replies: bool,
}

impl CoreSettings {
    #[must_use]
    pub fn from_config(config: &WidgetConfig) -> Self {
        Self {
            hold_threshold: config.voice.hold_threshold(),
            speak_replies: config.playback.enabled,
        }
    }
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            hold_threshold: crate::config::VoiceConfig::default().hold_threshold(),
            speak_replies: true,
        }
    }
}

/// Point-in-time copy of the core's observable state.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub session: Session,
    pub ui_mode: UiMode,
    pub recording: RecordingState,
    pub pending_turn: Option<TurnId>,
    pub draft: String,
}

#[derive(Debug, Clone, Copy)]
struct PendingTurn {
    turn: TurnId,
    origin: TurnOrigin,
}

pub struct ConversationCore {
    settings: CoreSettings,
    session: Session,
    ui_mode: UiMode,
    voice: VoiceCapture,
    draft: String,
    next_turn: u64,
    pending: Option<PendingTurn>,
    scheduling: Box<dyn SchedulingDetector>,
    identity: Box<dyn IdentityExtractor>,
}

impl ConversationCore {
    /// Fresh core with an empty session and the default heuristics.
    #[must_use]
    pub fn new(settings: CoreSettings) -> Self {
        Self {
            settings,
            session: Session::new(),
            ui_mode: UiMode::Hero,
            voice: VoiceCapture::new(),
            draft: String::new(),
            next_turn: 0,
            pending: None,
            scheduling: Box::new(PhraseDetector::default()),
            identity: Box::new(RegexIdentityExtractor),
        }
    }

    /// Core configured from the widget config, including its phrase list.
    #[must_use]
    pub fn from_config(config: &WidgetConfig) -> Self {
        Self::new(CoreSettings::from_config(config))
            .with_scheduling_detector(PhraseDetector::new(&config.calendar.phrases))
    }

    #[must_use]
    pub fn with_scheduling_detector(mut self, detector: impl SchedulingDetector + 'static) -> Self {
        self.scheduling = Box::new(detector);
        self
    }

    #[must_use]
    pub fn with_identity_extractor(mut self, extractor: impl IdentityExtractor + 'static) -> Self {
        self.identity = Box::new(extractor);
        self
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn ui_mode(&self) -> UiMode {
        self.ui_mode
    }

    #[must_use]
    pub fn recording_state(&self) -> RecordingState {
        self.voice.state()
    }

    #[must_use]
    pub fn pending_turn(&self) -> Option<TurnId> {
        self.pending.map(|p| p.turn)
    }

    #[must_use]
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            session: self.session.clone(),
            ui_mode: self.ui_mode,
            recording: self.voice.state(),
            pending_turn: self.pending_turn(),
            draft: self.draft.clone(),
        }
    }

    /// Dispatch one input.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::DraftChanged(text) => self.draft_changed(text),
            Input::SubmitText(text) => self.submit_text(&text),
            Input::RelayCompleted { turn, outcome } => match outcome {
                RelayOutcome::Reply(message) => self.receive_reply(turn, message),
                RelayOutcome::Failed(text) => self.relay_failed(turn, text),
            },
            Input::MicPressed => self.press(),
            Input::HoldElapsed { press } => self.hold_elapsed(press),
            Input::MicReleased => self.release(),
            Input::MicrophoneFailed { press, reason } => self.microphone_failed(press, &reason),
            Input::TranscriptionFinished { press, outcome } => {
                self.transcription_finished(press, outcome)
            }
            Input::NewSession => self.new_session(),
            Input::RestoreSession(session) => self.restore(session),
        }
    }

    /// Send a typed message. Whitespace-only text does nothing.
    pub fn submit_text(&mut self, text: &str) -> Vec<Effect> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.gesture(&mut effects);
        self.cancel_voice(&mut effects);
        self.draft.clear();
        effects.push(RenderOp::ClearInput.into());
        self.send_user(text, TurnOrigin::Typed, &mut effects);
        effects
    }

    /// Track the text field. Typing cancels a hold or live recording.
    pub fn draft_changed(&mut self, text: String) -> Vec<Effect> {
        let typing = !text.trim().is_empty();
        self.draft = text;
        let mut effects = Vec::new();
        if typing {
            self.cancel_voice(&mut effects);
        }
        effects
    }

    /// Apply a relay reply. Replies for anything but the outstanding turn
    /// are dropped.
    pub fn receive_reply(&mut self, turn: TurnId, message: Message) -> Vec<Effect> {
        let Some(pending) = self.take_pending(turn) else {
            return Vec::new();
        };
        let content = message.content;
        tracing::info!(%turn, chars = content.len(), "assistant reply received");

        let mut effects = vec![RenderOp::RemovePlaceholder(Placeholder::Thinking).into()];
        self.append(Message::assistant(content.clone()), true, &mut effects);
        effects.push(Effect::Persist(self.session.clone()));

        if let Some(hit) = self.scheduling.detect(&content) {
            tracing::info!(phrase = %hit.phrase, "scheduling intent detected");
            effects.push(Effect::OpenBooking(self.session.identity.clone()));
        }
        if pending.origin == TurnOrigin::Voice && self.settings.speak_replies {
            effects.push(Effect::Speak(content));
        }
        effects
    }

    /// Show a failed turn. Nothing is appended or persisted.
    pub fn relay_failed(&mut self, turn: TurnId, bubble: String) -> Vec<Effect> {
        if self.take_pending(turn).is_none() {
            return Vec::new();
        }
        tracing::warn!(%turn, error = %bubble, "relay call failed");
        vec![
            RenderOp::RemovePlaceholder(Placeholder::Thinking).into(),
            RenderOp::ErrorBubble(bubble).into(),
        ]
    }

    /// Mic button down.
    pub fn press(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.gesture(&mut effects);
        match self.voice.press() {
            Some(press) => {
                effects.push(RenderOp::SetRecording(RecordingState::Holding).into());
                effects.push(Effect::StartHoldTimer {
                    press,
                    after: self.settings.hold_threshold,
                });
            }
            None => tracing::debug!(state = ?self.voice.state(), "press ignored; capture busy"),
        }
        effects
    }

    /// The hold timer fired. Starts recording if the same press is still down.
    pub fn hold_elapsed(&mut self, press: PressId) -> Vec<Effect> {
        if !self.voice.hold_elapsed(press) {
            tracing::debug!(press = press.0, "stale hold timer");
            return Vec::new();
        }
        self.draft.clear();
        vec![
            RenderOp::ClearInput.into(),
            RenderOp::SetRecording(RecordingState::Recording).into(),
            Effect::AcquireMicrophone { press },
            RenderOp::ShowPlaceholder(Placeholder::Listening).into(),
        ]
    }

    /// Mic button up.
    pub fn release(&mut self) -> Vec<Effect> {
        match self.voice.release() {
            Release::Tap => vec![
                RenderOp::SetRecording(RecordingState::Idle).into(),
                RenderOp::Status(HOLD_HINT.to_owned()).into(),
            ],
            Release::Finish(press) => vec![
                RenderOp::SetRecording(RecordingState::Transcribing).into(),
                Effect::FinishRecording { press },
            ],
            Release::Ignored => Vec::new(),
        }
    }

    pub fn microphone_failed(&mut self, press: PressId, reason: &str) -> Vec<Effect> {
        if !self.voice.microphone_failed(press) {
            return Vec::new();
        }
        tracing::warn!(press = press.0, reason, "microphone unavailable");
        vec![
            Effect::AbortRecording,
            RenderOp::RemovePlaceholder(Placeholder::Listening).into(),
            RenderOp::SetRecording(RecordingState::Idle).into(),
            RenderOp::Status(MIC_UNAVAILABLE.to_owned()).into(),
        ]
    }

    /// A transcript (or its absence) for `press`. Non-empty text becomes a
    /// voice-originated user turn.
    pub fn transcription_finished(
        &mut self,
        press: PressId,
        outcome: TranscriptionOutcome,
    ) -> Vec<Effect> {
        if !self.voice.transcription_finished(press) {
            tracing::debug!(press = press.0, "stale transcription result");
            return Vec::new();
        }
        let mut effects = vec![
            RenderOp::RemovePlaceholder(Placeholder::Listening).into(),
            RenderOp::SetRecording(RecordingState::Idle).into(),
        ];
        match outcome {
            TranscriptionOutcome::Text(text) if !text.trim().is_empty() => {
                self.send_user(text.trim(), TurnOrigin::Voice, &mut effects);
            }
            TranscriptionOutcome::Failed(reason) => {
                tracing::warn!(press = press.0, reason = %reason, "transcription failed");
                effects.push(RenderOp::HintBubble(TRY_AGAIN.to_owned()).into());
            }
            _ => {
                tracing::info!(press = press.0, "no speech detected");
                effects.push(RenderOp::HintBubble(TRY_AGAIN.to_owned()).into());
            }
        }
        effects
    }

    /// Start over with an empty session. Stored sessions are kept.
    pub fn new_session(&mut self) -> Vec<Effect> {
        let mut effects = self.reset();
        self.session = Session::new();
        self.ui_mode = UiMode::Hero;
        tracing::info!(id = %self.session.id, "new session");
        effects.extend(
            [
                RenderOp::ClearLog,
                RenderOp::SetMode(UiMode::Hero),
                RenderOp::ClearInput,
            ]
            .map(Effect::Render),
        );
        effects
    }

    /// Replace all in-memory state with a stored session and replay its log.
    pub fn restore(&mut self, session: Session) -> Vec<Effect> {
        let mut effects = self.reset();
        self.ui_mode = if session.messages.is_empty() {
            UiMode::Hero
        } else {
            UiMode::Docked
        };
        effects.push(RenderOp::ClearLog.into());
        effects.push(RenderOp::SetMode(self.ui_mode).into());
        effects.extend(session.messages.iter().map(|m| {
            Effect::from(RenderOp::AppendBubble {
                role: m.role,
                content: m.content.clone(),
                animate: false,
            })
        }));
        tracing::info!(id = %session.id, messages = session.messages.len(), "session restored");
        self.session = session;
        effects
    }

    fn send_user(&mut self, text: &str, origin: TurnOrigin, effects: &mut Vec<Effect>) {
        if let Some(found) = self.identity.extract(text) {
            if self.session.identity.absorb(found.name, found.email) {
                tracing::debug!(
                    has_name = self.session.identity.name.is_some(),
                    has_email = self.session.identity.email.is_some(),
                    "identity updated"
                );
            }
        }
        self.append(Message::user(text), true, effects);
        effects.push(Effect::Persist(self.session.clone()));

        self.next_turn += 1;
        let turn = TurnId(self.next_turn);
        match self.pending.replace(PendingTurn { turn, origin }) {
            // The superseded turn's placeholder stays up for this one.
            Some(previous) => {
                tracing::debug!(superseded = %previous.turn, %turn, "new turn supersedes pending reply");
            }
            None => effects.push(RenderOp::ShowPlaceholder(Placeholder::Thinking).into()),
        }
        tracing::info!(%turn, ?origin, history = self.session.messages.len(), "sending turn");
        effects.push(Effect::SendToRelay {
            turn,
            messages: self.session.messages.clone(),
        });
    }

    fn append(&mut self, message: Message, animate: bool, effects: &mut Vec<Effect>) {
        if self.ui_mode == UiMode::Hero {
            self.ui_mode = UiMode::Docked;
            effects.push(RenderOp::SetMode(UiMode::Docked).into());
        }
        effects.push(
            RenderOp::AppendBubble {
                role: message.role,
                content: message.content.clone(),
                animate,
            }
            .into(),
        );
        self.session.messages.push(message);
        self.session.touch();
    }

    fn take_pending(&mut self, turn: TurnId) -> Option<PendingTurn> {
        match self.pending {
            Some(p) if p.turn == turn => self.pending.take(),
            _ => {
                tracing::debug!(%turn, latest = ?self.pending_turn(), "discarding stale relay result");
                None
            }
        }
    }

    /// Every gesture asks for an unlock; the playback side ignores it once
    /// unlocked, and a failed unlock is retried on the next one.
    fn gesture(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::UnlockPlayback);
    }

    fn cancel_voice(&mut self, effects: &mut Vec<Effect>) {
        match self.voice.cancel() {
            Cancelled::Nothing => {}
            Cancelled::Hold => {
                effects.push(RenderOp::SetRecording(RecordingState::Idle).into());
            }
            Cancelled::Recording(press) => {
                tracing::debug!(press = press.0, "recording cancelled by typing");
                effects.push(Effect::AbortRecording);
                effects.push(RenderOp::RemovePlaceholder(Placeholder::Listening).into());
                effects.push(RenderOp::SetRecording(RecordingState::Idle).into());
            }
        }
    }

    /// Drop pending turn, draft and any capture before a session switch.
    fn reset(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.voice.state() == RecordingState::Recording {
            effects.push(Effect::AbortRecording);
        }
        if self.voice.state() != RecordingState::Idle {
            effects.push(RenderOp::SetRecording(RecordingState::Idle).into());
        }
        self.voice.reset();
        self.pending = None;
        self.draft.clear();
        effects
    }
}
