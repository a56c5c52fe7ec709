//! Error types for the concierge widget core.

/// Top-level error type for the chat widget.
#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    /// The chat relay answered with a non-2xx status.
    #[error("relay returned {status} {reason}")]
    Relay {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status ("Internal Server Error").
        reason: String,
        /// Human-readable message from the backend error body, if any.
        message: Option<String>,
    },

    /// Transport-level failure talking to the backend (connect, timeout, decode).
    #[error("network error: {0}")]
    Network(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech synthesis or playback error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Microphone acquisition or capture error.
    #[error("microphone error: {0}")]
    Microphone(String),

    /// Session persistence error.
    #[error("session error: {0}")]
    Session(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Booking surface error.
    #[error("booking error: {0}")]
    Booking(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl WidgetError {
    /// Text shown in the assistant-role error bubble when a turn fails.
    #[must_use]
    pub fn bubble_text(&self) -> String {
        match self {
            Self::Relay {
                status,
                reason,
                message,
            } => match message {
                Some(msg) if !msg.trim().is_empty() => {
                    format!("Error {status}: {reason} ({})", msg.trim())
                }
                _ => format!("Error {status}: {reason}"),
            },
            other => format!("Error: {other}"),
        }
    }
}

impl From<reqwest::Error> for WidgetError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WidgetError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn relay_bubble_names_status_and_reason() {
        let err = WidgetError::Relay {
            status: 500,
            reason: "Internal Server Error".into(),
            message: None,
        };
        assert_eq!(err.bubble_text(), "Error 500: Internal Server Error");
    }

    #[test]
    fn relay_bubble_appends_backend_message() {
        let err = WidgetError::Relay {
            status: 429,
            reason: "Too Many Requests".into(),
            message: Some("Slow down".into()),
        };
        assert_eq!(
            err.bubble_text(),
            "Error 429: Too Many Requests (Slow down)"
        );
    }

    #[test]
    fn network_bubble_is_prefixed() {
        let err = WidgetError::Network("connection refused".into());
        assert_eq!(err.bubble_text(), "Error: network error: connection refused");
    }
}
