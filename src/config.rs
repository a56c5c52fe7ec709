//! Configuration types for the chat widget client.

use crate::error::{Result, WidgetError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Backend endpoints (chat relay, STT, TTS, health).
    pub backend: BackendConfig,
    /// Push-to-talk capture settings.
    pub voice: VoiceConfig,
    /// Spoken reply settings.
    pub playback: PlaybackConfig,
    /// Local session persistence.
    pub sessions: SessionConfig,
    /// Scheduling-intent trigger and booking link.
    pub calendar: CalendarConfig,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL the `/v1/*` paths are resolved against.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Optional `X-User-ID` sent with every request.
    pub user_id: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_owned(),
            request_timeout_secs: 60,
            user_id: None,
        }
    }
}

impl BackendConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Push-to-talk settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// How long the mic button must be held before recording starts.
    ///
    /// Releases before this are treated as a tap and discarded.
    pub hold_threshold_ms: u64,
    /// Clips smaller than this are treated as "no speech" without calling STT.
    pub min_clip_bytes: usize,
    /// Clips larger than this are rejected before upload.
    pub max_clip_bytes: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            hold_threshold_ms: 250,
            min_clip_bytes: 1000,
            max_clip_bytes: 10 * 1024 * 1024,
        }
    }
}

impl VoiceConfig {
    #[must_use]
    pub fn hold_threshold(&self) -> Duration {
        Duration::from_millis(self.hold_threshold_ms)
    }
}

/// Spoken reply settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Whether voice-originated turns are spoken back at all.
    pub enabled: bool,
    /// Replies longer than this are clamped before synthesis (backend limit).
    pub max_chars: usize,
    /// Where the file output writes synthesized clips (None = data dir).
    pub output_dir: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: 5000,
            output_dir: None,
        }
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root directory for session records and the recent-sessions index.
    pub root_dir: PathBuf,
    /// Maximum entries kept in the recent-sessions index.
    pub max_recent: usize,
    /// Length (in characters) of the first-message preview in the index.
    pub preview_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root_dir: crate::concierge_dirs::data_dir(),
            max_recent: 20,
            preview_chars: 60,
        }
    }
}

/// Scheduling trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Case-insensitive phrases that open the booking surface when they
    /// appear in an assistant reply.
    pub phrases: Vec<String>,
    /// Booking link. When unset the backend's `/config` `calLink` is used.
    pub booking_url: Option<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            phrases: DEFAULT_SCHEDULING_PHRASES
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
            booking_url: None,
        }
    }
}

/// Default scheduling-intent phrases.
pub const DEFAULT_SCHEDULING_PHRASES: &[&str] = &[
    "what time works",
    "pick a time",
    "ready to schedule",
    "choose a time",
    "find a time",
    "book a call",
    "schedule a call",
    "booking link",
];

impl WidgetConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| WidgetError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| WidgetError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::concierge_dirs::config_file()
    }
}
