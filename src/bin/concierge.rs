//! Terminal front end for the concierge widget.
//!
//! Typed lines are sent as chat turns. Voice turns are simulated with
//! `/voice <file>`: the file is queued on the file-backed microphone and the
//! mic button is held past the threshold, then released.
//!
//! Tracing goes to stderr so the conversation on stdout stays readable.

use concierge::backend::BackendClient;
use concierge::booking::booking_link;
use concierge::conversation::{Placeholder, RenderOp, Role, UiMode};
use concierge::playback::{FileAudioOutput, SpeechPlayback};
use concierge::session::JsonSessionStore;
use concierge::voice::FileMicrophone;
use concierge::{
    Collaborators, ConversationCore, ConversationRuntime, RuntimeEvent, RuntimeHandle,
    WidgetConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use url::Url;

const HELP: &str = "\
Commands:
  /voice <file>   send an audio file as a push-to-talk turn
  /tap            tap the mic button without holding
  /new            start a new conversation
  /history        list recent conversations
  /load <id>      resume a conversation
  /health         check the backend
  /help           show this help
  /quit           exit
Anything else is sent as a message.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("concierge=info")),
        )
        .init();

    let config_path = WidgetConfig::default_config_path();
    let config = WidgetConfig::load_or_default(&config_path)?;
    let backend = Arc::new(BackendClient::new(&config.backend)?);
    tracing::info!(config = %config_path.display(), backend = %backend.base_url(), "concierge starting");
    let link = resolve_booking_link(&config, &backend).await;

    let microphone = Arc::new(FileMicrophone::new());
    let output = Arc::new(FileAudioOutput::from_config(&config.playback));
    let playback = Arc::new(SpeechPlayback::new(
        backend.clone(),
        output.clone(),
        &config.playback,
    ));
    let store = Arc::new(JsonSessionStore::new(&config.sessions));
    tracing::info!(
        sessions = %store.root().display(),
        replies = %output.dir().display(),
        "storage ready"
    );

    let runtime = ConversationRuntime::new(
        ConversationCore::from_config(&config),
        Collaborators {
            relay: backend.clone(),
            transcriber: backend.clone(),
            playback,
            microphone: microphone.clone(),
            store,
        },
    )
    .with_booking_link(link)
    .with_voice_config(&config.voice);

    let (handle, task) = runtime.spawn();
    let renderer = tokio::spawn(render_events(handle.subscribe()));

    println!("Concierge v{}", env!("CARGO_PKG_VERSION"));
    println!("Hi! How can we help today? (/help for commands)\n");

    let hold = config.voice.hold_threshold() + Duration::from_millis(100);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(c, a)| (c, a.trim()));
        let result = match command {
            "/quit" | "/exit" => break,
            "/help" => {
                println!("{HELP}");
                Ok(())
            }
            "/voice" if arg.is_empty() => {
                println!("usage: /voice <file>");
                Ok(())
            }
            "/voice" => {
                microphone.enqueue(arg);
                voice_turn(&handle, hold).await
            }
            "/tap" => tap(&handle).await,
            "/new" => handle.new_session().await,
            "/history" => show_history(&handle).await,
            "/load" => load(&handle, arg).await,
            "/health" => {
                show_health(&backend).await;
                Ok(())
            }
            _ => handle.submit_text(line).await,
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "command failed");
        }
    }

    handle.shutdown();
    task.await?;
    renderer.abort();
    tracing::info!("concierge shut down cleanly");
    Ok(())
}

/// Booking link from config, falling back to the backend's `/config`.
async fn resolve_booking_link(config: &WidgetConfig, backend: &BackendClient) -> Option<Url> {
    let raw = match &config.calendar.booking_url {
        Some(url) => url.clone(),
        None => match backend.booking_config().await {
            Ok(remote) => remote.cal_link,
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch booking config from backend");
                return None;
            }
        },
    };
    match booking_link(&raw) {
        Ok(link) => link,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring booking link");
            None
        }
    }
}

async fn voice_turn(handle: &RuntimeHandle, hold: Duration) -> concierge::Result<()> {
    handle.press().await?;
    tokio::time::sleep(hold).await;
    handle.release().await
}

async fn tap(handle: &RuntimeHandle) -> concierge::Result<()> {
    handle.press().await?;
    handle.release().await
}

async fn show_history(handle: &RuntimeHandle) -> concierge::Result<()> {
    let sessions = handle.list_sessions().await?;
    if sessions.is_empty() {
        println!("No saved conversations yet.");
    }
    for s in sessions {
        println!(
            "  {}  {}  {}",
            s.id,
            s.updated_at.format("%Y-%m-%d %H:%M"),
            s.preview
        );
    }
    Ok(())
}

async fn load(handle: &RuntimeHandle, id: &str) -> concierge::Result<()> {
    if id.is_empty() {
        println!("usage: /load <id>");
        return Ok(());
    }
    if !handle.load_session(id).await? {
        println!("No conversation with id {id}.");
    }
    Ok(())
}

async fn show_health(backend: &BackendClient) {
    match backend.health().await {
        Ok(report) => println!(
            "backend ok={} openai={} firestore={} model={}",
            report.ok,
            report.openai,
            report.firestore,
            report.model.as_deref().unwrap_or("?")
        ),
        Err(e) => println!("backend unreachable: {e}"),
    }
}

async fn render_events(mut events: broadcast::Receiver<RuntimeEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => render(&event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "renderer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn render(event: &RuntimeEvent) {
    match event {
        RuntimeEvent::Render(op) => match op {
            RenderOp::AppendBubble { role, content, .. } => {
                let who = match role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                println!("{who}: {content}");
            }
            RenderOp::ShowPlaceholder(p) => println!("  {}", p.label()),
            RenderOp::RemovePlaceholder(Placeholder::Listening | Placeholder::Thinking) => {}
            RenderOp::ErrorBubble(text) | RenderOp::HintBubble(text) => {
                println!("assistant: {text}");
            }
            RenderOp::Status(text) => println!("  [{text}]"),
            RenderOp::ClearLog => println!("\n--- new conversation ---"),
            RenderOp::SetMode(UiMode::Hero) => println!("Hi! How can we help today?\n"),
            RenderOp::SetMode(UiMode::Docked) | RenderOp::ClearInput => {}
            RenderOp::SetRecording(state) => tracing::debug!(?state, "recording state"),
        },
        RuntimeEvent::BookingOpened(request) => {
            println!("  Book a time: {}", request.url);
        }
        RuntimeEvent::PersistFailed { error, .. } => {
            println!("  [could not save conversation: {error}]");
        }
        RuntimeEvent::Persisted { .. } | RuntimeEvent::Spoken { .. } => {}
    }
}
