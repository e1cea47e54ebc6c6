//! # Conversation Module
//!
//! Conversation memory for the voice assistant:
//! - **prompt**: the system prompt, loaded once at startup
//! - **session**: per-caller histories and their lifecycle
//! - **turn**: messages and their attached audio

pub mod prompt;
pub mod session;
pub mod turn;

pub use prompt::SystemPrompt;
pub use session::{ConversationSession, SessionError, SessionStore};
pub use turn::{Media, Role, Turn};
