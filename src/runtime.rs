//! Async driver for the conversation core.
//!
//! [`ConversationRuntime`] owns one [`ConversationCore`] and its
//! collaborators. It runs a single event loop: inputs go into the core, the
//! effects that come out are executed, and collaborator results are fed back
//! in as new inputs. Nothing slow runs on the loop itself; relay calls, timers
//! and playback are spawned, microphone work and persistence each have a
//! worker task so their calls stay ordered.

use crate::backend::{ChatRelay, Transcriber};
use crate::booking::{BookingRequest, BookingSurface, EventBookingSurface};
use crate::config::VoiceConfig;
use crate::conversation::{
    ConversationCore, ConversationSnapshot, Effect, Input, Message, RelayOutcome, RenderOp,
    TranscriptionOutcome, TurnId,
};
use crate::error::{Result, WidgetError};
use crate::playback::SpeechPlayback;
use crate::session::{Identity, Session, SessionStore, SessionSummary};
use crate::voice::{AudioClip, ClipCheck, Microphone, PressId, check_clip};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;
/// How long shutdown waits for the microphone worker to release the input.
const MIC_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// What the runtime reports to rendering adapters.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Draw something.
    Render(RenderOp),
    /// The active session was written to the store.
    Persisted { session_id: String, messages: usize },
    /// A save failed. The conversation carries on.
    PersistFailed { session_id: String, error: String },
    /// The booking page should be shown.
    BookingOpened(BookingRequest),
    /// A reply was spoken aloud.
    Spoken { chars: usize },
}

/// External services the runtime drives.
pub struct Collaborators {
    pub relay: Arc<dyn ChatRelay>,
    pub transcriber: Arc<dyn Transcriber>,
    pub playback: Arc<SpeechPlayback>,
    pub microphone: Arc<dyn Microphone>,
    pub store: Arc<dyn SessionStore>,
}

enum Command {
    Input(Input),
    Snapshot(oneshot::Sender<ConversationSnapshot>),
}

enum MicCommand {
    Acquire(PressId),
    Finish(PressId),
    Release,
}

/// Bytes a clip must have to be uploaded.
#[derive(Debug, Clone, Copy)]
struct ClipLimits {
    min: usize,
    max: usize,
}

impl From<&VoiceConfig> for ClipLimits {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            min: config.min_clip_bytes,
            max: config.max_clip_bytes,
        }
    }
}

pub struct ConversationRuntime {
    core: ConversationCore,
    relay: Arc<dyn ChatRelay>,
    transcriber: Arc<dyn Transcriber>,
    playback: Arc<SpeechPlayback>,
    microphone: Arc<dyn Microphone>,
    store: Arc<dyn SessionStore>,
    booking: Arc<dyn BookingSurface>,
    booking_link: Option<Url>,
    clip_limits: ClipLimits,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: mpsc::Receiver<Command>,
    events_tx: broadcast::Sender<RuntimeEvent>,
    cancel: CancellationToken,
}

impl ConversationRuntime {
    #[must_use]
    pub fn new(core: ConversationCore, collaborators: Collaborators) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            core,
            relay: collaborators.relay,
            transcriber: collaborators.transcriber,
            playback: collaborators.playback,
            microphone: collaborators.microphone,
            store: collaborators.store,
            booking: Arc::new(EventBookingSurface::new(events_tx.clone())),
            booking_link: None,
            clip_limits: ClipLimits::from(&VoiceConfig::default()),
            commands_tx,
            commands_rx,
            events_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Where the booking surface points. Without a link, scheduling intent
    /// is logged but nothing opens.
    #[must_use]
    pub fn with_booking_link(mut self, link: Option<Url>) -> Self {
        self.booking_link = link;
        self
    }

    /// Replace the default event-publishing booking surface.
    #[must_use]
    pub fn with_booking_surface(mut self, surface: Arc<dyn BookingSurface>) -> Self {
        self.booking = surface;
        self
    }

    #[must_use]
    pub fn with_voice_config(mut self, config: &VoiceConfig) -> Self {
        self.clip_limits = ClipLimits::from(config);
        self
    }

    #[must_use]
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            commands: self.commands_tx.clone(),
            events: self.events_tx.clone(),
            store: self.store.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Run the loop on a new task.
    pub fn spawn(self) -> (RuntimeHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run until [`RuntimeHandle::shutdown`]. Pending saves are flushed and
    /// the microphone is released before returning.
    pub async fn run(mut self) {
        let (mic_tx, mic_rx) = mpsc::unbounded_channel();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let mut mic_worker = tokio::spawn(microphone_worker(
            self.microphone.clone(),
            self.transcriber.clone(),
            self.clip_limits,
            mic_rx,
            self.commands_tx.clone(),
        ));
        let persist_worker = tokio::spawn(persistence_worker(
            self.store.clone(),
            persist_rx,
            self.events_tx.clone(),
        ));

        tracing::info!(session = %self.core.session().id, "conversation runtime started");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                command = self.commands_rx.recv() => match command {
                    Some(Command::Input(input)) => {
                        for effect in self.core.handle(input) {
                            self.execute(effect, &mic_tx, &persist_tx);
                        }
                    }
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.core.snapshot());
                    }
                    None => break,
                },
            }
        }

        let _ = mic_tx.send(MicCommand::Release);
        drop(mic_tx);
        drop(persist_tx);
        if let Err(e) = persist_worker.await {
            tracing::warn!(error = %e, "persistence worker ended abnormally");
        }
        // The worker drains queued commands and releases the input on exit.
        if tokio::time::timeout(MIC_SHUTDOWN_GRACE, &mut mic_worker)
            .await
            .is_err()
        {
            tracing::warn!("microphone worker did not stop in time");
            mic_worker.abort();
            self.microphone.release().await;
        }
        tracing::info!("conversation runtime stopped");
    }

    fn execute(
        &self,
        effect: Effect,
        mic_tx: &mpsc::UnboundedSender<MicCommand>,
        persist_tx: &mpsc::UnboundedSender<Session>,
    ) {
        match effect {
            Effect::Render(op) => self.emit(RuntimeEvent::Render(op)),
            Effect::Persist(session) => {
                if persist_tx.send(session).is_err() {
                    tracing::warn!("persistence worker gone; session not saved");
                }
            }
            Effect::SendToRelay { turn, messages } => self.spawn_relay(turn, messages),
            Effect::StartHoldTimer { press, after } => self.spawn_hold_timer(press, after),
            Effect::AcquireMicrophone { press } => send_mic(mic_tx, MicCommand::Acquire(press)),
            Effect::FinishRecording { press } => send_mic(mic_tx, MicCommand::Finish(press)),
            Effect::AbortRecording => send_mic(mic_tx, MicCommand::Release),
            Effect::UnlockPlayback => {
                if self.playback.is_unlocked() {
                    return;
                }
                let playback = self.playback.clone();
                tokio::spawn(async move {
                    playback.unlock().await;
                });
            }
            Effect::Speak(text) => {
                let playback = self.playback.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    if playback.speak(&text).await {
                        let _ = events.send(RuntimeEvent::Spoken {
                            chars: text.chars().count(),
                        });
                    }
                });
            }
            Effect::OpenBooking(prefill) => self.open_booking(prefill),
        }
    }

    fn emit(&self, event: RuntimeEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn spawn_relay(&self, turn: TurnId, messages: Vec<Message>) {
        let relay = self.relay.clone();
        let commands = self.commands_tx.clone();
        tokio::spawn(async move {
            let outcome = match relay.chat(&messages).await {
                Ok(reply) => RelayOutcome::Reply(reply),
                Err(e) => RelayOutcome::Failed(e.bubble_text()),
            };
            let _ = commands
                .send(Command::Input(Input::RelayCompleted { turn, outcome }))
                .await;
        });
    }

    fn spawn_hold_timer(&self, press: PressId, after: Duration) {
        let commands = self.commands_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    let _ = commands.send(Command::Input(Input::HoldElapsed { press })).await;
                }
            }
        });
    }

    fn open_booking(&self, prefill: Identity) {
        let Some(link) = &self.booking_link else {
            tracing::warn!("scheduling intent detected but no booking link is configured");
            return;
        };
        let request = BookingRequest::new(link, prefill);
        match self.booking.open(&request) {
            Ok(()) => tracing::info!(url = %request.url, "booking surface opened"),
            Err(e) => tracing::warn!(error = %e, "booking surface failed to open"),
        }
    }
}

fn send_mic(tx: &mpsc::UnboundedSender<MicCommand>, command: MicCommand) {
    if tx.send(command).is_err() {
        tracing::warn!("microphone worker gone");
    }
}

/// Serializes microphone calls so acquire, finish and release for one press
/// never overlap. Transcription runs on its own task.
async fn microphone_worker(
    microphone: Arc<dyn Microphone>,
    transcriber: Arc<dyn Transcriber>,
    limits: ClipLimits,
    mut rx: mpsc::UnboundedReceiver<MicCommand>,
    commands: mpsc::Sender<Command>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            MicCommand::Acquire(press) => {
                if let Err(e) = microphone.acquire().await {
                    microphone.release().await;
                    let input = Input::MicrophoneFailed {
                        press,
                        reason: e.to_string(),
                    };
                    let _ = commands.send(Command::Input(input)).await;
                }
            }
            MicCommand::Finish(press) => match microphone.finish().await {
                Ok(clip) => {
                    let transcriber = transcriber.clone();
                    let commands = commands.clone();
                    tokio::spawn(async move {
                        let outcome = transcribe_clip(transcriber.as_ref(), &clip, limits).await;
                        let input = Input::TranscriptionFinished { press, outcome };
                        let _ = commands.send(Command::Input(input)).await;
                    });
                }
                Err(e) => {
                    microphone.release().await;
                    let input = Input::MicrophoneFailed {
                        press,
                        reason: e.to_string(),
                    };
                    let _ = commands.send(Command::Input(input)).await;
                }
            },
            MicCommand::Release => microphone.release().await,
        }
    }
    microphone.release().await;
}

async fn transcribe_clip(
    transcriber: &dyn Transcriber,
    clip: &AudioClip,
    limits: ClipLimits,
) -> TranscriptionOutcome {
    match check_clip(clip, limits.min, limits.max) {
        ClipCheck::TooShort => {
            tracing::info!(bytes = clip.bytes.len(), "clip too short; skipping transcription");
            return TranscriptionOutcome::Empty;
        }
        ClipCheck::TooLarge => {
            return TranscriptionOutcome::Failed(format!(
                "clip of {} bytes exceeds the {} byte limit",
                clip.bytes.len(),
                limits.max
            ));
        }
        ClipCheck::Ok => {}
    }
    match transcriber.transcribe(clip).await {
        Ok(t) if t.text.trim().is_empty() => TranscriptionOutcome::Empty,
        Ok(t) => {
            tracing::info!(chars = t.text.len(), confidence = ?t.confidence, "clip transcribed");
            TranscriptionOutcome::Text(t.text)
        }
        Err(e) => TranscriptionOutcome::Failed(e.to_string()),
    }
}

/// Applies saves in order; the store is synchronous so each one runs on the
/// blocking pool.
async fn persistence_worker(
    store: Arc<dyn SessionStore>,
    mut rx: mpsc::UnboundedReceiver<Session>,
    events: broadcast::Sender<RuntimeEvent>,
) {
    while let Some(session) = rx.recv().await {
        let session_id = session.id.clone();
        let messages = session.messages.len();
        let store = store.clone();
        let result = tokio::task::spawn_blocking(move || store.save(&session))
            .await
            .map_err(|e| WidgetError::Session(format!("save task failed: {e}")))
            .and_then(|r| r);
        let event = match result {
            Ok(()) => RuntimeEvent::Persisted {
                session_id,
                messages,
            },
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "failed to persist session");
                RuntimeEvent::PersistFailed {
                    session_id,
                    error: e.to_string(),
                }
            }
        };
        let _ = events.send(event);
    }
}

/// Cloneable front door to a running [`ConversationRuntime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<RuntimeEvent>,
    store: Arc<dyn SessionStore>,
    cancel: CancellationToken,
}

impl RuntimeHandle {
    /// # Errors
    ///
    /// Returns [`WidgetError::Channel`] once the runtime has stopped.
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.input(Input::SubmitText(text.into())).await
    }

    /// # Errors
    ///
    /// Returns [`WidgetError::Channel`] once the runtime has stopped.
    pub async fn draft_changed(&self, text: impl Into<String>) -> Result<()> {
        self.input(Input::DraftChanged(text.into())).await
    }

    /// Mic button down.
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::Channel`] once the runtime has stopped.
    pub async fn press(&self) -> Result<()> {
        self.input(Input::MicPressed).await
    }

    /// Mic button up.
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::Channel`] once the runtime has stopped.
    pub async fn release(&self) -> Result<()> {
        self.input(Input::MicReleased).await
    }

    /// # Errors
    ///
    /// Returns [`WidgetError::Channel`] once the runtime has stopped.
    pub async fn new_session(&self) -> Result<()> {
        self.input(Input::NewSession).await
    }

    /// Load a stored session and make it the active one.
    ///
    /// Returns `false` if no session has this id.
    ///
    /// # Errors
    ///
    /// Store failures, invalid ids, or a stopped runtime.
    pub async fn load_session(&self, id: &str) -> Result<bool> {
        let store = self.store.clone();
        let id = id.to_owned();
        let loaded = tokio::task::spawn_blocking(move || store.load(&id))
            .await
            .map_err(|e| WidgetError::Session(format!("load task failed: {e}")))??;
        match loaded {
            Some(session) => {
                self.input(Input::RestoreSession(session)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Recent sessions, most recent first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.list())
            .await
            .map_err(|e| WidgetError::Session(format!("list task failed: {e}")))?
    }

    /// Current core state, after every input sent before this call.
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::Channel`] once the runtime has stopped.
    pub async fn snapshot(&self) -> Result<ConversationSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await
            .map_err(|_| WidgetError::Channel("runtime dropped snapshot request".into()))
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    /// Stop the loop. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn input(&self, input: Input) -> Result<()> {
        self.send(Command::Input(input)).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(WidgetError::Channel("runtime stopped".into()));
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| WidgetError::Channel("runtime stopped".into()))
    }
}
