//! Conversation controller: the pure state-machine core of the widget.

pub mod controller;
pub mod events;
pub mod message;

pub use controller::{ConversationCore, ConversationSnapshot, CoreSettings};
pub use events::{Effect, Input, Placeholder, RelayOutcome, RenderOp, TranscriptionOutcome};
pub use message::{Message, Role, TurnId, TurnOrigin, UiMode};
