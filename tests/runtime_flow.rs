//! End-to-end conversation flows through `ConversationRuntime`, using the
//! real HTTP client against a mock backend and an on-disk session store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use concierge::backend::BackendClient;
use concierge::booking::booking_link;
use concierge::conversation::{Message, Placeholder, RenderOp, Role};
use concierge::playback::{FileAudioOutput, SpeechPlayback};
use concierge::session::{JsonSessionStore, SessionStore};
use concierge::voice::{FileMicrophone, RecordingState};
use concierge::{
    Collaborators, ConversationCore, ConversationRuntime, RuntimeEvent, RuntimeHandle,
    WidgetConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    handle: RuntimeHandle,
    events: broadcast::Receiver<RuntimeEvent>,
    store: Arc<JsonSessionStore>,
    output: Arc<FileAudioOutput>,
    microphone: Arc<FileMicrophone>,
    task: JoinHandle<()>,
    dir: TempDir,
}

fn config_for(server: &MockServer, dir: &TempDir, hold_threshold_ms: u64) -> WidgetConfig {
    let mut config = WidgetConfig::default();
    config.backend.base_url = server.uri();
    config.voice.hold_threshold_ms = hold_threshold_ms;
    config.sessions.root_dir = dir.path().join("sessions");
    config.playback.output_dir = Some(dir.path().join("replies"));
    config
}

fn start(server: &MockServer, hold_threshold_ms: u64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(server, &dir, hold_threshold_ms);

    let backend = Arc::new(BackendClient::new(&config.backend).unwrap());
    let store = Arc::new(JsonSessionStore::new(&config.sessions));
    let output = Arc::new(FileAudioOutput::from_config(&config.playback));
    let microphone = Arc::new(FileMicrophone::new());
    let playback = Arc::new(SpeechPlayback::new(
        backend.clone(),
        output.clone(),
        &config.playback,
    ));

    let runtime = ConversationRuntime::new(
        ConversationCore::from_config(&config),
        Collaborators {
            relay: backend.clone(),
            transcriber: backend,
            playback,
            microphone: microphone.clone(),
            store: store.clone(),
        },
    )
    .with_booking_link(booking_link("studio/intro").unwrap())
    .with_voice_config(&config.voice);

    let (handle, task) = runtime.spawn();
    let events = handle.subscribe();
    Harness {
        handle,
        events,
        store,
        output,
        microphone,
        task,
        dir,
    }
}

async fn wait_for(
    events: &mut broadcast::Receiver<RuntimeEvent>,
    pred: impl Fn(&RuntimeEvent) -> bool,
) -> RuntimeEvent {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for runtime event")
}

fn persisted(count: usize) -> impl Fn(&RuntimeEvent) -> bool {
    move |e| matches!(e, RuntimeEvent::Persisted { messages, .. } if *messages == count)
}

async fn mount_chat_reply(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": content}
        })))
        .mount(server)
        .await;
}

/// Write a clip big enough to pass the local size check.
fn write_clip(dir: &TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, vec![0x1a; 4096]).unwrap();
    path
}

#[tokio::test]
async fn booking_scenario_opens_surface_and_persists_both_turns() {
    let server = MockServer::start().await;
    mount_chat_reply(&server, "Sure — what time works for you?").await;
    let mut h = start(&server, 250);
    let mut saves = h.handle.subscribe();

    h.handle
        .submit_text("I want to book an appointment next Tuesday at 3pm")
        .await
        .unwrap();

    let opened = wait_for(&mut h.events, |e| matches!(e, RuntimeEvent::BookingOpened(_))).await;
    let RuntimeEvent::BookingOpened(request) = opened else {
        unreachable!()
    };
    assert!(request.url.as_str().starts_with("https://cal.com/studio/intro"));

    wait_for(&mut saves, persisted(2)).await;
    let snapshot = h.handle.snapshot().await.unwrap();
    let roles: Vec<_> = snapshot.session.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);

    let stored = h.store.load(&snapshot.session.id).unwrap().unwrap();
    assert_eq!(stored.messages, snapshot.session.messages);
    h.handle.shutdown();
}

#[tokio::test]
async fn relay_500_shows_error_bubble_and_keeps_only_user_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;
    let mut h = start(&server, 250);
    let mut saves = h.handle.subscribe();

    h.handle
        .submit_text("I want to book an appointment next Tuesday at 3pm")
        .await
        .unwrap();

    let bubble = wait_for(&mut h.events, |e| {
        matches!(e, RuntimeEvent::Render(RenderOp::ErrorBubble(_)))
    })
    .await;
    let RuntimeEvent::Render(RenderOp::ErrorBubble(text)) = bubble else {
        unreachable!()
    };
    assert_eq!(text, "Error 500: Internal Server Error");

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot.session.messages,
        vec![Message::user(
            "I want to book an appointment next Tuesday at 3pm"
        )]
    );
    assert!(snapshot.pending_turn.is_none());

    wait_for(&mut saves, persisted(1)).await;
    h.handle.shutdown();
    let stored = h.store.load(&snapshot.session.id).unwrap().unwrap();
    assert_eq!(stored.messages, snapshot.session.messages);
}

#[tokio::test]
async fn whitespace_submit_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let h = start(&server, 250);

    h.handle.submit_text("   \n ").await.unwrap();
    let snapshot = h.handle.snapshot().await.unwrap();
    assert!(snapshot.session.messages.is_empty());
    assert!(snapshot.pending_turn.is_none());
    h.handle.shutdown();
}

#[tokio::test]
async fn voice_turn_is_transcribed_sent_and_spoken_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/stt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "I need a new website"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_chat_reply(&server, "Great! What's the site for?").await;
    Mock::given(method("POST"))
        .and(path("/v1/tts"))
        .and(body_json(json!({"text": "Great! What's the site for?"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(b"ID3fake".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;
    let mut h = start(&server, 20);

    h.microphone.enqueue(write_clip(&h.dir, "turn.webm"));
    h.handle.press().await.unwrap();
    wait_for(&mut h.events, |e| {
        matches!(e, RuntimeEvent::Render(RenderOp::ShowPlaceholder(Placeholder::Listening)))
    })
    .await;
    h.handle.release().await.unwrap();

    wait_for(&mut h.events, |e| matches!(e, RuntimeEvent::Spoken { .. })).await;
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot.session.messages,
        vec![
            Message::user("I need a new website"),
            Message::assistant("Great! What's the site for?"),
        ]
    );
    assert_eq!(snapshot.recording, RecordingState::Idle);
    assert!(h.output.last_written().is_some());
    assert!(!h.microphone.is_active());
    h.handle.shutdown();
}

#[tokio::test]
async fn typed_turn_is_never_spoken() {
    let server = MockServer::start().await;
    mount_chat_reply(&server, "Hello!").await;
    Mock::given(method("POST"))
        .and(path("/v1/tts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
        .expect(0)
        .mount(&server)
        .await;
    let mut h = start(&server, 250);

    h.handle.submit_text("hi").await.unwrap();
    wait_for(&mut h.events, persisted(2)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.output.last_written().is_none());
    h.handle.shutdown();
}

#[tokio::test]
async fn empty_transcript_shows_hint_and_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/stt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": ""})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let mut h = start(&server, 20);

    h.microphone.enqueue(write_clip(&h.dir, "silence.webm"));
    h.handle.press().await.unwrap();
    wait_for(&mut h.events, |e| {
        matches!(e, RuntimeEvent::Render(RenderOp::SetRecording(RecordingState::Recording)))
    })
    .await;
    h.handle.release().await.unwrap();

    wait_for(&mut h.events, |e| {
        matches!(e, RuntimeEvent::Render(RenderOp::HintBubble(_)))
    })
    .await;
    let snapshot = h.handle.snapshot().await.unwrap();
    assert!(snapshot.session.messages.is_empty());
    assert!(snapshot.pending_turn.is_none());
    h.handle.shutdown();
}

#[tokio::test]
async fn tap_shows_status_and_never_transcribes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/stt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "nope"})))
        .expect(0)
        .mount(&server)
        .await;
    let mut h = start(&server, 300);

    h.microphone.enqueue(write_clip(&h.dir, "tap.webm"));
    h.handle.press().await.unwrap();
    h.handle.release().await.unwrap();

    wait_for(&mut h.events, |e| {
        matches!(e, RuntimeEvent::Render(RenderOp::Status(_)))
    })
    .await;
    // Outlive the hold threshold; the stale timer must not start recording.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording, RecordingState::Idle);
    assert!(!h.microphone.is_active());
    h.handle.shutdown();
}

#[tokio::test]
async fn microphone_unavailable_returns_to_idle() {
    let server = MockServer::start().await;
    let mut h = start(&server, 20);

    // Nothing queued: acquisition fails like a denied permission prompt.
    h.handle.press().await.unwrap();
    wait_for(&mut h.events, |e| {
        matches!(e, RuntimeEvent::Render(RenderOp::Status(_)))
    })
    .await;
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording, RecordingState::Idle);
    assert!(snapshot.session.messages.is_empty());

    // The button works again afterwards.
    h.handle.press().await.unwrap();
    wait_for(&mut h.events, |e| {
        matches!(e, RuntimeEvent::Render(RenderOp::SetRecording(RecordingState::Holding)))
    })
    .await;
    h.handle.shutdown();
}

#[tokio::test]
async fn shutdown_mid_recording_releases_microphone() {
    let server = MockServer::start().await;
    let mut h = start(&server, 20);

    h.microphone.enqueue(write_clip(&h.dir, "held.webm"));
    h.handle.press().await.unwrap();
    wait_for(&mut h.events, |e| {
        matches!(e, RuntimeEvent::Render(RenderOp::SetRecording(RecordingState::Recording)))
    })
    .await;
    tokio::time::timeout(TIMEOUT, async {
        while !h.microphone.is_active() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("microphone never became active");

    h.handle.shutdown();
    assert!(h.handle.is_shutdown());
    tokio::time::timeout(TIMEOUT, h.task).await.unwrap().unwrap();
    assert!(!h.microphone.is_active());
}

#[tokio::test]
async fn stale_reply_is_discarded_in_favour_of_latest_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(body_json(json!({"messages": [{"role": "user", "content": "first"}]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({"message": {"role": "assistant", "content": "late"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(body_json(json!({"messages": [
            {"role": "user", "content": "first"},
            {"role": "user", "content": "second"}
        ]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": {"role": "assistant", "content": "current"}})),
        )
        .mount(&server)
        .await;
    let mut h = start(&server, 250);

    h.handle.submit_text("first").await.unwrap();
    h.handle.submit_text("second").await.unwrap();
    wait_for(&mut h.events, persisted(3)).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    let contents: Vec<_> = snapshot
        .session
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["first", "second", "current"]);
    h.handle.shutdown();
}

#[tokio::test]
async fn sessions_are_listed_and_restored() {
    let server = MockServer::start().await;
    mount_chat_reply(&server, "Happy to help with that.").await;
    let mut h = start(&server, 250);

    h.handle.submit_text("Logo refresh for my bakery").await.unwrap();
    wait_for(&mut h.events, persisted(2)).await;
    let first_id = h.handle.snapshot().await.unwrap().session.id;

    h.handle.new_session().await.unwrap();
    let fresh = h.handle.snapshot().await.unwrap();
    assert_ne!(fresh.session.id, first_id);
    assert!(fresh.session.messages.is_empty());

    let recent = h.handle.list_sessions().await.unwrap();
    assert_eq!(recent[0].id, first_id);
    assert_eq!(recent[0].preview, "Logo refresh for my bakery");

    assert!(h.handle.load_session(&first_id).await.unwrap());
    let restored = h.handle.snapshot().await.unwrap();
    assert_eq!(restored.session.id, first_id);
    assert_eq!(restored.session.messages.len(), 2);
    assert_eq!(restored.ui_mode, concierge::conversation::UiMode::Docked);

    assert!(!h.handle.load_session("no-such-session").await.unwrap());
    assert!(h.handle.load_session("../escape").await.is_err());

    h.handle.shutdown();
    assert!(h.handle.submit_text("after shutdown").await.is_err());
}
