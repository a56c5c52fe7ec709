//! On-disk record layout for sessions and the recent-sessions index.
//!
//! Every record carries `schema_version`. Records written before versioning
//! existed (the widget's original `{ messages, name, email, updatedAt }`
//! shape) are upgraded on read; records from a newer schema are refused.

use super::types::{Identity, Session, SessionSummary};
use crate::conversation::message::Message;
use crate::error::{Result, WidgetError};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version written by this build.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    schema_version: u32,
    #[serde(flatten)]
    session: Session,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexRecord {
    schema_version: u32,
    sessions: Vec<SessionSummary>,
}

/// Unversioned session layout.
#[derive(Debug, Deserialize)]
struct LegacySession {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<i64>,
    #[serde(default, rename = "updatedAt")]
    updated_at: Option<i64>,
}

/// Unversioned index entry.
#[derive(Debug, Deserialize)]
struct LegacySummary {
    id: String,
    #[serde(default)]
    preview: String,
    #[serde(default, rename = "updatedAt")]
    updated_at: Option<i64>,
}

pub(crate) fn encode_session(session: &Session) -> Result<String> {
    let record = SessionRecord {
        schema_version: CURRENT_SCHEMA_VERSION,
        session: session.clone(),
    };
    serde_json::to_string_pretty(&record)
        .map_err(|e| WidgetError::Session(format!("failed to serialize session: {e}")))
}

/// Decode a session record, migrating older layouts.
///
/// `fallback_id` is used when a legacy record does not carry its own id
/// (it was keyed by storage key only).
pub(crate) fn decode_session(raw: &str, fallback_id: &str) -> Result<Session> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| WidgetError::Session(format!("invalid session record: {e}")))?;

    match record_version(&value)? {
        0 => migrate_legacy_session(value, fallback_id),
        _ => serde_json::from_value::<SessionRecord>(value)
            .map(|r| r.session)
            .map_err(|e| WidgetError::Session(format!("invalid session record: {e}"))),
    }
}

pub(crate) fn encode_index(sessions: &[SessionSummary]) -> Result<String> {
    let record = IndexRecord {
        schema_version: CURRENT_SCHEMA_VERSION,
        sessions: sessions.to_vec(),
    };
    serde_json::to_string_pretty(&record)
        .map_err(|e| WidgetError::Session(format!("failed to serialize session index: {e}")))
}

pub(crate) fn decode_index(raw: &str) -> Result<Vec<SessionSummary>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| WidgetError::Session(format!("invalid session index: {e}")))?;

    // The unversioned index was a bare array.
    if let Value::Array(entries) = value {
        return Ok(entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<LegacySummary>(entry).ok())
            .map(|legacy| SessionSummary {
                id: legacy.id,
                updated_at: millis_to_utc(legacy.updated_at),
                preview: legacy.preview,
            })
            .collect());
    }

    record_version(&value)?;
    serde_json::from_value::<IndexRecord>(value)
        .map(|r| r.sessions)
        .map_err(|e| WidgetError::Session(format!("invalid session index: {e}")))
}

fn record_version(value: &Value) -> Result<u32> {
    let Some(raw) = value.get("schema_version") else {
        return Ok(0);
    };
    let version = raw
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| WidgetError::Session(format!("invalid schema_version: {raw}")))?;
    if version > CURRENT_SCHEMA_VERSION {
        return Err(WidgetError::Session(format!(
            "session schema v{version} is newer than supported v{CURRENT_SCHEMA_VERSION}"
        )));
    }
    Ok(version)
}

fn migrate_legacy_session(value: Value, fallback_id: &str) -> Result<Session> {
    let legacy: LegacySession = serde_json::from_value(value)
        .map_err(|e| WidgetError::Session(format!("invalid legacy session: {e}")))?;

    // Legacy logs may hold system/tool entries; only user/assistant survive.
    let messages: Vec<Message> = legacy
        .messages
        .into_iter()
        .filter_map(|m| serde_json::from_value::<Message>(m).ok())
        .collect();

    let updated_at = millis_to_utc(legacy.updated_at);
    let created_at = legacy
        .created_at
        .map(|ms| millis_to_utc(Some(ms)))
        .unwrap_or(updated_at);

    tracing::info!(
        id = legacy.id.as_deref().unwrap_or(fallback_id),
        messages = messages.len(),
        "migrated unversioned session record"
    );

    Ok(Session {
        id: legacy.id.unwrap_or_else(|| fallback_id.to_owned()),
        created_at,
        updated_at,
        messages,
        identity: Identity {
            name: legacy.name.filter(|n| !n.trim().is_empty()),
            email: legacy.email.filter(|e| !e.trim().is_empty()),
        },
    })
}

fn millis_to_utc(ms: Option<i64>) -> DateTime<Utc> {
    ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_default()
}
