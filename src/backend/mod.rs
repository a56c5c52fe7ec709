//! Collaborator contracts for the HTTP backend.
//!
//! The conversation runtime only sees these traits; [`BackendClient`] is the
//! reqwest implementation that talks to the widget's relay server.

pub mod client;

pub use client::BackendClient;

use crate::conversation::Message;
use crate::error::Result;
use crate::voice::AudioClip;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The chat relay: full history in, one assistant message out.
#[async_trait]
pub trait ChatRelay: Send + Sync {
    async fn chat(&self, messages: &[Message]) -> Result<Message>;
}

/// Speech-to-text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, clip: &AudioClip) -> Result<Transcription>;
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio>;
}

/// Transcript of one clip. Empty `text` means no speech was detected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Encoded audio returned by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Bytes,
    /// `content-type` reported by the service, e.g. `audio/mpeg`.
    pub content_type: String,
}

impl SynthesizedAudio {
    /// File extension matching the content type.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        let mime = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        match mime {
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            "audio/webm" => "webm",
            "audio/flac" => "flac",
            _ => "mp3",
        }
    }
}

/// `GET /healthz` body. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub openai: bool,
    #[serde(default)]
    pub firestore: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `GET /config` body: where the booking surface points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfig {
    #[serde(default)]
    pub cal_link: String,
    #[serde(default)]
    pub brand_color: Option<String>,
}
