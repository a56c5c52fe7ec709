//! reqwest client for the widget backend.

use super::{
    BookingConfig, ChatRelay, HealthReport, SpeechSynthesizer, SynthesizedAudio, Transcriber,
    Transcription,
};
use crate::config::BackendConfig;
use crate::conversation::Message;
use crate::error::{Result, WidgetError};
use crate::voice::AudioClip;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use url::Url;

/// Correlation id sent with every request and echoed in backend logs.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
/// Optional caller identity.
pub const USER_ID_HEADER: &str = "X-User-ID";

/// The STT service's marker for clips too short to contain speech.
const AUDIO_TOO_SHORT: &str = "audio_too_short";

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ReplyMessage,
}

/// Tool-calling backends may send `content: null`.
#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct SttResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// `{ error, message }` as produced by the backend's error handlers.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// HTTP client for `/v1/chat`, `/v1/stt`, `/v1/tts`, `/healthz` and `/config`.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base: Url,
    user_id: Option<String>,
}

impl BackendClient {
    /// # Errors
    ///
    /// Returns [`WidgetError::Config`] if the base URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| WidgetError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base: parse_base_url(&config.base_url)?,
            user_id: config.user_id.clone().filter(|u| !u.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Backend readiness.
    ///
    /// # Errors
    ///
    /// Transport failures and non-2xx responses.
    pub async fn health(&self) -> Result<HealthReport> {
        let resp = self.send(self.client.get(self.endpoint("healthz")?), "healthz").await?;
        let resp = ensure_success(resp).await?;
        decode_json(resp, "health report").await
    }

    /// Booking link and brand color served to the widget.
    ///
    /// # Errors
    ///
    /// Transport failures and non-2xx responses.
    pub async fn booking_config(&self) -> Result<BookingConfig> {
        let resp = self.send(self.client.get(self.endpoint("config")?), "config").await?;
        let resp = ensure_success(resp).await?;
        decode_json(resp, "booking config").await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| WidgetError::Config(format!("invalid endpoint {path}: {e}")))
    }

    async fn send(&self, request: RequestBuilder, path: &'static str) -> Result<Response> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut request = request.header(REQUEST_ID_HEADER, &request_id);
        if let Some(user) = &self.user_id {
            request = request.header(USER_ID_HEADER, user);
        }

        let started = Instant::now();
        match request.send().await {
            Ok(resp) => {
                tracing::debug!(
                    request_id = %request_id,
                    path,
                    status = resp.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "backend response"
                );
                Ok(resp)
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, path, error = %e, "backend request failed");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl ChatRelay for BackendClient {
    async fn chat(&self, messages: &[Message]) -> Result<Message> {
        let request = self
            .client
            .post(self.endpoint("v1/chat")?)
            .json(&ChatRequest { messages });
        let resp = self.send(request, "v1/chat").await?;
        let resp = ensure_success(resp).await?;
        let body: ChatResponse = decode_json(resp, "chat reply").await?;
        Ok(Message::assistant(body.message.content.unwrap_or_default()))
    }
}

#[async_trait]
impl Transcriber for BackendClient {
    async fn transcribe(&self, clip: &AudioClip) -> Result<Transcription> {
        let part = reqwest::multipart::Part::bytes(clip.bytes.to_vec())
            .file_name(clip.file_name.clone())
            .mime_str(&clip.mime)
            .map_err(|e| WidgetError::Stt(format!("invalid clip mime type {}: {e}", clip.mime)))?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let request = self.client.post(self.endpoint("v1/stt")?).multipart(form);
        let resp = self.send(request, "v1/stt").await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let reason = error_message(&body).unwrap_or_else(|| canonical_reason(status));
            return Err(WidgetError::Stt(format!("{}: {reason}", status.as_u16())));
        }

        let parsed: SttResponse = serde_json::from_str(&body)
            .map_err(|e| WidgetError::Stt(format!("invalid transcription response: {e}")))?;
        match parsed.error.as_deref() {
            None | Some(AUDIO_TOO_SHORT) => Ok(Transcription {
                text: parsed.text.trim().to_owned(),
                confidence: parsed.confidence,
            }),
            Some(other) => Err(WidgetError::Stt(other.to_owned())),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for BackendClient {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        let request = self
            .client
            .post(self.endpoint("v1/tts")?)
            .json(&TtsRequest { text });
        let resp = self.send(request, "v1/tts").await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let reason = error_message(&body).unwrap_or_else(|| canonical_reason(status));
            return Err(WidgetError::Tts(format!("{}: {reason}", status.as_u16())));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_owned();
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(WidgetError::Tts("synthesizer returned no audio".into()));
        }
        Ok(SynthesizedAudio {
            bytes,
            content_type,
        })
    }
}

/// Parse the base URL, making sure relative joins keep any path prefix.
fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| WidgetError::Config(format!("invalid backend base_url {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(WidgetError::Config(format!(
            "backend base_url must be http(s), got {other}"
        ))),
    }
}

/// Turn a non-2xx response into [`WidgetError::Relay`].
async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(WidgetError::Relay {
        status: status.as_u16(),
        reason: canonical_reason(status),
        message: error_message(&body),
    })
}

async fn decode_json<T: serde::de::DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| WidgetError::Network(format!("invalid {what}: {e}")))
}

fn canonical_reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown").to_owned()
}

/// Human-readable message from an error body, if it has one.
fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .message
        .or(parsed.error)
        .or_else(|| {
            parsed
                .detail
                .and_then(|d| d.as_str().map(str::to_owned))
        })
        .filter(|m| !m.trim().is_empty())
}
