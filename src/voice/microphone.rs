//! Microphone collaborator and the file-backed implementation.

use crate::error::{Result, WidgetError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A finished recording. Opaque bytes in whatever container the platform
/// recorder produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Bytes,
    pub mime: String,
    pub file_name: String,
}

impl AudioClip {
    #[must_use]
    pub fn new(
        bytes: impl Into<Bytes>,
        mime: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
            file_name: file_name.into(),
        }
    }
}

/// Platform audio input.
///
/// Calls for one recording arrive strictly in order: `acquire`, then either
/// `finish` or `release`. Implementations must release the input stream on
/// both paths.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Open the input stream and start buffering.
    async fn acquire(&self) -> Result<()>;

    /// Stop buffering, release the stream and hand back the clip.
    async fn finish(&self) -> Result<AudioClip>;

    /// Abort the current recording, discarding audio. Idempotent.
    async fn release(&self);
}

/// "Records" pre-recorded audio files, one per acquisition.
///
/// Files are queued with [`FileMicrophone::enqueue`]; acquiring with an empty
/// queue fails the way a denied permission prompt would.
#[derive(Debug, Default)]
pub struct FileMicrophone {
    queue: Mutex<VecDeque<PathBuf>>,
    active: Mutex<Option<PathBuf>>,
}

impl FileMicrophone {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a file to be returned by the next recording.
    pub fn enqueue(&self, path: impl Into<PathBuf>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(path.into());
        }
    }

    /// Whether a recording is currently open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    fn take_active(&self) -> Result<Option<PathBuf>> {
        self.active
            .lock()
            .map(|mut a| a.take())
            .map_err(|_| WidgetError::Microphone("microphone state poisoned".into()))
    }
}

#[async_trait]
impl Microphone for FileMicrophone {
    async fn acquire(&self) -> Result<()> {
        let next = self
            .queue
            .lock()
            .map_err(|_| WidgetError::Microphone("microphone queue poisoned".into()))?
            .pop_front();
        let Some(path) = next else {
            return Err(WidgetError::Microphone("no audio input available".into()));
        };
        tracing::debug!(path = %path.display(), "microphone opened");
        let mut active = self
            .active
            .lock()
            .map_err(|_| WidgetError::Microphone("microphone state poisoned".into()))?;
        *active = Some(path);
        Ok(())
    }

    async fn finish(&self) -> Result<AudioClip> {
        let path = self
            .take_active()?
            .ok_or_else(|| WidgetError::Microphone("no recording in progress".into()))?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| WidgetError::Microphone(format!("{}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("recording.webm")
            .to_owned();
        tracing::debug!(bytes = bytes.len(), file = %file_name, "microphone closed");
        Ok(AudioClip::new(bytes, mime_for(&path), file_name))
    }

    async fn release(&self) {
        if let Ok(Some(path)) = self.take_active() {
            tracing::debug!(path = %path.display(), "recording discarded");
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg" | "oga") => "audio/ogg",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("flac") => "audio/flac",
        _ => "audio/webm",
    }
}
