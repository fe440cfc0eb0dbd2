//! Jarvix - voice assistant with smart home control
//!
//! This library provides the core functionality for Jarvix:
//! - Voice processing (wake word detection, recording, STT, TTS)
//! - Language model backends (`OpenAI`, Anthropic, Ollama) with function calling
//! - Home Assistant device control
//! - Conversation orchestration with bounded history
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Voice                           │
//! │   Wake Word  │  Recorder  │  Whisper  │  TTS        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ transcript
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Conversation                        │
//! │   Model Backend  │  Capability Registry  │  History │
//! └────────────────────┬────────────────────────────────┘
//!                      │ control_home_device
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Home Assistant                       │
//! │   Entities  │  Services  │  Auth  │  Supervisor      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod daemon;
pub mod error;
pub mod home;
pub mod lifecycle;
pub mod llm;
pub mod tools;
pub mod voice;

pub use agent::{Conversation, SpeechSink, TurnReport, TurnState};
pub use config::Config;
pub use context::{ConversationHistory, ConversationTurn, Role};
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use home::{DeviceEntity, DeviceRegistry, HomeClient};
pub use llm::{BackendKind, ModelBackend, ModelReply};
pub use tools::{CapabilityDeclaration, CapabilityInvocation, CapabilityRegistry};
