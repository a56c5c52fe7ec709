//! Concierge: conversation core for a customer-facing chat widget.
//!
//! Visitors type or hold-to-talk; every turn is relayed to an HTTP backend
//! with the full history, replies to voice turns are spoken back, and the
//! booking page opens when the assistant starts talking about a time.
//!
//! # Architecture
//!
//! - **Conversation core**: a pure state machine (`conversation`) that maps
//!   inputs to ordered effects
//! - **Runtime**: the async driver (`runtime`) that executes effects and
//!   feeds collaborator results back in
//! - **Collaborators**: the chat relay, STT and TTS (`backend`), the
//!   microphone (`voice`), the speaker (`playback`), the session store
//!   (`session`) and the booking surface (`booking`)

pub mod backend;
pub mod booking;
pub mod concierge_dirs;
pub mod config;
pub mod conversation;
pub mod error;
pub mod intent;
pub mod playback;
pub mod runtime;
pub mod session;
pub mod voice;

pub use backend::BackendClient;
pub use config::WidgetConfig;
pub use conversation::{ConversationCore, CoreSettings};
pub use error::{Result, WidgetError};
pub use runtime::{Collaborators, ConversationRuntime, RuntimeEvent, RuntimeHandle};
