//! Session persistence backends.

use super::schema::{decode_index, decode_session, encode_index, encode_session};
use super::types::{Session, SessionSummary};
use crate::config::SessionConfig;
use crate::error::{Result, WidgetError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SESSIONS_SUBDIR: &str = "sessions";
const INDEX_FILE: &str = "index.json";
const MAX_SESSION_ID_LEN: usize = 128;

/// Storage for conversation sessions and the recent-sessions index.
///
/// Implementations are single-writer: two processes sharing one store race
/// and the last write wins.
pub trait SessionStore: Send + Sync {
    /// Write the full session and move it to the front of the recent index.
    fn save(&self, session: &Session) -> Result<()>;

    /// Read a session back. `Ok(None)` if no session has this id.
    fn load(&self, id: &str) -> Result<Option<Session>>;

    /// Recent sessions, most recent first.
    fn list(&self) -> Result<Vec<SessionSummary>>;
}

/// Move `summary` to the front of `index`, dropping any older entry for the
/// same session and trimming to `max_recent`.
fn upsert_summary(index: &mut Vec<SessionSummary>, summary: SessionSummary, max_recent: usize) {
    index.retain(|entry| entry.id != summary.id);
    index.insert(0, summary);
    index.truncate(max_recent.max(1));
}

/// Reject ids that could escape the sessions directory.
pub(crate) fn validate_session_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(WidgetError::Session(format!("invalid session id: {id:?}")))
    }
}

/// JSON files on local disk: `sessions/<id>.json` plus `index.json`.
#[derive(Debug)]
pub struct JsonSessionStore {
    root: PathBuf,
    max_recent: usize,
    preview_chars: usize,
    index_lock: Mutex<()>,
}

impl JsonSessionStore {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            root: config.root_dir.clone(),
            max_recent: config.max_recent,
            preview_chars: config.preview_chars,
            index_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.root.join(SESSIONS_SUBDIR).join(format!("{id}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn read_index(&self) -> Result<Vec<SessionSummary>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        decode_index(&raw)
    }
}

impl SessionStore for JsonSessionStore {
    fn save(&self, session: &Session) -> Result<()> {
        validate_session_id(&session.id)?;
        write_atomic(&self.session_path(&session.id), &encode_session(session)?)?;

        let _guard = self
            .index_lock
            .lock()
            .map_err(|_| WidgetError::Session("session index lock poisoned".into()))?;
        let mut index = match self.read_index() {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable session index; rebuilding");
                Vec::new()
            }
        };
        upsert_summary(
            &mut index,
            session.summary(self.preview_chars),
            self.max_recent,
        );
        write_atomic(&self.index_path(), &encode_index(&index)?)?;

        tracing::debug!(
            id = %session.id,
            messages = session.messages.len(),
            "session saved"
        );
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<Session>> {
        validate_session_id(id)?;
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        decode_session(&raw, id).map(Some)
    }

    fn list(&self) -> Result<Vec<SessionSummary>> {
        self.read_index()
    }
}

/// In-process store with the same index semantics as [`JsonSessionStore`].
#[derive(Debug)]
pub struct MemorySessionStore {
    max_recent: usize,
    preview_chars: usize,
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    sessions: HashMap<String, Session>,
    index: Vec<SessionSummary>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(max_recent: usize, preview_chars: usize) -> Self {
        Self {
            max_recent,
            preview_chars,
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| WidgetError::Session("memory session store lock poisoned".into()))
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        let config = SessionConfig::default();
        Self::new(config.max_recent, config.preview_chars)
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &Session) -> Result<()> {
        validate_session_id(&session.id)?;
        let mut inner = self.lock()?;
        inner.sessions.insert(session.id.clone(), session.clone());
        let summary = session.summary(self.preview_chars);
        upsert_summary(&mut inner.index, summary, self.max_recent);
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.lock()?.sessions.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.lock()?.index.clone())
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("session"),
        std::process::id()
    );
    let tmp_path = path
        .parent()
        .map(|p| p.join(&tmp_name))
        .unwrap_or_else(|| PathBuf::from(&tmp_name));

    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
