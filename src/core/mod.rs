//! Core client logic
//!
//! Trigger storage, matching and editing, plus the small pieces of session
//! handling the client does around them (line assembly, logon prompts,
//! favorites, the chatlog). NO terminal or transport code lives here.

pub mod chatlog;
pub mod editor;
pub mod engine;
pub mod favorites;
pub mod line_buffer;
pub mod logon;
pub mod matcher;
pub mod triggers;

pub use chatlog::{ChatRecorder, Chatlog, LinkHistory};
pub use editor::EditorSlots;
pub use engine::{MessageSink, TriggerEngine};
pub use favorites::Favorites;
pub use line_buffer::LineBuffer;
pub use matcher::{check, TriggerMatcher};
pub use triggers::{AddOutcome, TriggerField, TriggerRule, TriggerSet, TriggerStore};
