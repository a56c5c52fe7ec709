//! Spoken replies.
//!
//! [`SpeechPlayback`] turns assistant text into audio via a
//! [`SpeechSynthesizer`] and plays it on an [`AudioOutput`]. Failures are
//! logged and swallowed: speech is a courtesy, the text reply is already on
//! screen.

use crate::backend::{SpeechSynthesizer, SynthesizedAudio};
use crate::config::PlaybackConfig;
use crate::error::{Result, WidgetError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Platform audio output.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Silent priming playback that unlocks autoplay. Called on user
    /// gestures until it succeeds.
    async fn prime(&self) -> Result<()>;

    async fn play(&self, audio: &SynthesizedAudio) -> Result<()>;
}

pub struct SpeechPlayback {
    synth: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    unlocked: AtomicBool,
    max_chars: usize,
}

impl SpeechPlayback {
    #[must_use]
    pub fn new(
        synth: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        config: &PlaybackConfig,
    ) -> Self {
        Self {
            synth,
            output,
            unlocked: AtomicBool::new(false),
            max_chars: config.max_chars.max(1),
        }
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Acquire)
    }

    /// Prime the output. Returns whether playback is now allowed.
    pub async fn unlock(&self) -> bool {
        if self.is_unlocked() {
            return true;
        }
        match self.output.prime().await {
            Ok(()) => {
                self.unlocked.store(true, Ordering::Release);
                tracing::debug!("audio playback unlocked");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "audio unlock failed; retrying on next gesture");
                false
            }
        }
    }

    /// Synthesize and play `text`. Returns whether anything was played.
    pub async fn speak(&self, text: &str) -> bool {
        let Some(text) = clamp(text, self.max_chars) else {
            return false;
        };
        if !self.is_unlocked() {
            tracing::warn!("playback still locked; skipping spoken reply");
            return false;
        }
        match self.try_speak(&text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, chars = text.chars().count(), "spoken reply failed");
                false
            }
        }
    }

    async fn try_speak(&self, text: &str) -> Result<()> {
        let audio = self.synth.synthesize(text).await?;
        tracing::debug!(
            bytes = audio.bytes.len(),
            content_type = %audio.content_type,
            "reply synthesized"
        );
        self.output.play(&audio).await
    }
}

/// Trim and cut to `max_chars`. `None` for blank text.
fn clamp(text: &str, max_chars: usize) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

/// Writes each reply to a file instead of a speaker.
#[derive(Debug)]
pub struct FileAudioOutput {
    dir: PathBuf,
    counter: AtomicU64,
    last: Mutex<Option<PathBuf>>,
}

impl FileAudioOutput {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }

    /// Output under the configured directory, or `data_dir()/replies`.
    #[must_use]
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(
            config
                .output_dir
                .clone()
                .unwrap_or_else(crate::concierge_dirs::replies_dir),
        )
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the most recently written reply.
    #[must_use]
    pub fn last_written(&self) -> Option<PathBuf> {
        self.last.lock().ok().and_then(|l| l.clone())
    }
}

#[async_trait]
impl AudioOutput for FileAudioOutput {
    async fn prime(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn play(&self, audio: &SynthesizedAudio) -> Result<()> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!(
            "reply-{}-{n}.{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            audio.extension()
        );
        let path = self.dir.join(name);
        tokio::fs::write(&path, &audio.bytes).await?;
        tracing::info!(path = %path.display(), bytes = audio.bytes.len(), "spoken reply written");
        let mut last = self
            .last
            .lock()
            .map_err(|_| WidgetError::Tts("audio output state poisoned".into()))?;
        *last = Some(path);
        Ok(())
    }
}
