//! Local persistence of conversation sessions.
//!
//! One record per session plus a bounded recent-sessions index. Loading a
//! session replaces in-memory state wholesale; sessions are never merged.

mod schema;
pub mod store;
pub mod types;

pub use store::{JsonSessionStore, MemorySessionStore, SessionStore};
pub use types::{Identity, Session, SessionSummary};
