//! HTTP contract tests for `BackendClient` against a mock backend.
//!
//! Covers the request shapes the widget backend expects and how each
//! response class maps onto `WidgetError`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use concierge::backend::{BackendClient, ChatRelay, SpeechSynthesizer, Transcriber};
use concierge::config::BackendConfig;
use concierge::WidgetError;
use concierge::conversation::Message;
use concierge::voice::AudioClip;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> BackendClient {
    BackendClient::new(&BackendConfig {
        base_url: server.uri(),
        ..BackendConfig::default()
    })
    .unwrap()
}

fn clip() -> AudioClip {
    AudioClip::new(vec![7u8; 4096], "audio/webm", "recording.webm")
}

// ────────────────────────────────────────────────────────────────────────────
// Chat relay
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_sends_full_history_and_parses_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(header_exists("X-Request-ID"))
        .and(body_json(json!({
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello! What are you working on?"},
                {"role": "user", "content": "A new logo"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "Love it. Tell me about your brand."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![
        Message::user("Hi"),
        Message::assistant("Hello! What are you working on?"),
        Message::user("A new logo"),
    ];
    let reply = client(&server).chat(&history).await.unwrap();
    assert_eq!(reply, Message::assistant("Love it. Tell me about your brand."));
}

#[tokio::test]
async fn chat_null_content_becomes_empty_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": {"role": "assistant", "content": null}})),
        )
        .mount(&server)
        .await;

    let reply = client(&server).chat(&[Message::user("hi")]).await.unwrap();
    assert_eq!(reply, Message::assistant(""));
}

#[tokio::test]
async fn chat_500_maps_to_relay_error_with_status_and_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = client(&server).chat(&[Message::user("hi")]).await.unwrap_err();
    assert!(matches!(err, WidgetError::Relay { status: 500, .. }));
    assert_eq!(err.bubble_text(), "Error 500: Internal Server Error");
}

#[tokio::test]
async fn chat_error_body_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": "rate_limited",
            "message": "Too many requests, please wait a moment"
        })))
        .mount(&server)
        .await;

    let err = client(&server).chat(&[Message::user("hi")]).await.unwrap_err();
    assert_eq!(
        err.bubble_text(),
        "Error 429: Too Many Requests (Too many requests, please wait a moment)"
    );
}

#[tokio::test]
async fn chat_transport_failure_is_network_error() {
    // Nothing listens on this port once the server is dropped.
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };
    let client = BackendClient::new(&BackendConfig {
        base_url: uri,
        request_timeout_secs: 2,
        ..BackendConfig::default()
    })
    .unwrap();
    let err = client.chat(&[Message::user("hi")]).await.unwrap_err();
    assert!(matches!(err, WidgetError::Network(_)));
    assert!(err.bubble_text().starts_with("Error: "));
}

#[tokio::test]
async fn user_id_header_is_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(header("X-User-ID", "visitor-42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": {"role": "assistant", "content": "ok"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(&BackendConfig {
        base_url: server.uri(),
        user_id: Some("visitor-42".into()),
        ..BackendConfig::default()
    })
    .unwrap();
    client.chat(&[Message::user("hi")]).await.unwrap();
}

// ────────────────────────────────────────────────────────────────────────────
// Speech-to-text
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stt_uploads_audio_field_and_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/stt"))
        .and(body_string_contains("name=\"audio\""))
        .and(body_string_contains("filename=\"recording.webm\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"text": " I need a website ", "confidence": 0.93})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let t = client(&server).transcribe(&clip()).await.unwrap();
    assert_eq!(t.text, "I need a website");
    assert_eq!(t.confidence, Some(0.93));
}

#[tokio::test]
async fn stt_no_speech_is_empty_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/stt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": ""})))
        .mount(&server)
        .await;

    let t = client(&server).transcribe(&clip()).await.unwrap();
    assert!(t.text.is_empty());
}

#[tokio::test]
async fn stt_audio_too_short_is_empty_not_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/stt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"text": "", "error": "audio_too_short"})),
        )
        .mount(&server)
        .await;

    let t = client(&server).transcribe(&clip()).await.unwrap();
    assert!(t.text.is_empty());
}

#[tokio::test]
async fn stt_server_error_is_transcription_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/stt"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "text": "",
            "error": "transcription_failed",
            "detail": "recognizer unavailable"
        })))
        .mount(&server)
        .await;

    let err = client(&server).transcribe(&clip()).await.unwrap_err();
    match err {
        WidgetError::Stt(msg) => assert!(msg.contains("500"), "{msg}"),
        other => panic!("expected STT error, got {other:?}"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Text-to-speech
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tts_returns_audio_bytes_and_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tts"))
        .and(body_json(json!({"text": "Happy to help!"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(b"ID3\x03fake-mp3".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let audio = client(&server).synthesize("Happy to help!").await.unwrap();
    assert_eq!(audio.bytes.as_ref(), b"ID3\x03fake-mp3");
    assert_eq!(audio.content_type, "audio/mpeg");
    assert_eq!(audio.extension(), "mp3");
}

#[tokio::test]
async fn tts_error_is_tts_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tts"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": "tts_unavailable",
            "message": "Voice service is temporarily down"
        })))
        .mount(&server)
        .await;

    let err = client(&server).synthesize("hello").await.unwrap_err();
    match err {
        WidgetError::Tts(msg) => assert_eq!(msg, "503: Voice service is temporarily down"),
        other => panic!("expected TTS error, got {other:?}"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Health and widget config
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_and_booking_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "openai": true,
            "firestore": false,
            "model": "gpt-4o-mini",
            "environment": "staging"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calLink": "studio/intro",
            "brandColor": "#111827"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let health = client.health().await.unwrap();
    assert!(health.ok);
    assert!(!health.firestore);
    assert_eq!(health.extra["environment"], "staging");

    let booking = client.booking_config().await.unwrap();
    assert_eq!(booking.cal_link, "studio/intro");
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(&BackendConfig {
        base_url: format!("{}/api", server.uri()),
        ..BackendConfig::default()
    })
    .unwrap();
    assert_eq!(client.base_url().path(), "/api/");
    assert!(client.health().await.unwrap().ok);
}
