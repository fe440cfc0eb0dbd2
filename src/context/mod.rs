//! Conversation context carried across turns

mod history;

pub use history::{ConversationHistory, ConversationTurn, Role};
