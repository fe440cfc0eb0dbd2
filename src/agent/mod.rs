//! Conversation orchestration

mod conversation;

pub use conversation::{
    Conversation, HANDLER_FAILURE_NOTICE, MISSING_HANDLER_NOTICE, MODEL_FAILURE_NOTICE,
    SpeechSink, TurnReport, TurnState,
};
