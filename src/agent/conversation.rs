//! One request/response turn: model call, capability dispatch, speech

use async_trait::async_trait;

use crate::context::{ConversationHistory, Role};
use crate::llm::{ModelBackend, ModelReply};
use crate::tools::{CapabilityInvocation, CapabilityRegistry};
use crate::Result;

/// Spoken when the model backend fails
pub const MODEL_FAILURE_NOTICE: &str = "Sorry, I couldn't reach my language model. Please try again.";

/// Spoken when the model names a capability that has no handler
pub const MISSING_HANDLER_NOTICE: &str = "Sorry, I can't do that yet.";

/// Spoken when a capability handler fails
pub const HANDLER_FAILURE_NOTICE: &str = "Sorry, something went wrong while doing that.";

/// Destination for the spoken reply
#[async_trait(?Send)]
pub trait SpeechSink {
    /// Speak `text`, returning once playback has finished
    async fn speak(&mut self, text: &str) -> Result<()>;
}

/// Where a turn is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    Dispatching,
    AwaitingModel,
    /// Model answered with text
    Responding,
    /// Model asked for a capability
    Invoking,
    Done,
}

/// Trace of a completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// States visited, in order
    pub states: Vec<TurnState>,

    /// Text handed to speech output
    pub reply: String,

    /// Capability invoked, if any
    pub capability: Option<String>,

    /// Whether the model backend failed
    pub failed: bool,
}

impl TurnReport {
    fn new() -> Self {
        Self {
            states: vec![TurnState::AwaitingInput],
            reply: String::new(),
            capability: None,
            failed: false,
        }
    }

    fn enter(&mut self, state: TurnState) {
        tracing::trace!(?state, "turn state");
        self.states.push(state);
    }

    /// Last state reached
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.states.last().copied().unwrap_or(TurnState::AwaitingInput)
    }
}

/// Drives turns for one session; owns the registry and history
pub struct Conversation {
    backend: ModelBackend,
    registry: CapabilityRegistry,
    history: ConversationHistory,
}

impl Conversation {
    #[must_use]
    pub const fn new(
        backend: ModelBackend,
        registry: CapabilityRegistry,
        history: ConversationHistory,
    ) -> Self {
        Self {
            backend,
            registry,
            history,
        }
    }

    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    #[must_use]
    pub const fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn backend(&self) -> &ModelBackend {
        &self.backend
    }

    /// Produce the reply for `text` without speaking it
    pub async fn respond(&mut self, text: &str) -> TurnReport {
        let mut report = self.dispatch(text).await;
        report.enter(TurnState::Done);
        report
    }

    /// Produce the reply for `text` and speak it through `sink`
    ///
    /// Model and capability failures are spoken, not returned.
    ///
    /// # Errors
    ///
    /// Returns error only if the sink fails to speak
    pub async fn run_turn<S: SpeechSink + ?Sized>(
        &mut self,
        text: &str,
        sink: &mut S,
    ) -> Result<TurnReport> {
        let mut report = self.dispatch(text).await;
        let spoken = sink.speak(&report.reply).await;
        report.enter(TurnState::Done);
        spoken.map(|()| report)
    }

    async fn dispatch(&mut self, text: &str) -> TurnReport {
        let mut report = TurnReport::new();
        report.enter(TurnState::Dispatching);

        let declarations = self.registry.declarations();
        report.enter(TurnState::AwaitingModel);

        let reply = match self.backend.process(text, &self.history, &declarations).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, backend = %self.backend.kind(), "model call failed");
                report.failed = true;
                report.reply = MODEL_FAILURE_NOTICE.to_string();
                return report;
            }
        };

        report.reply = match reply {
            ModelReply::FinalText(answer) => {
                report.enter(TurnState::Responding);
                answer
            }
            ModelReply::Invocation(invocation) => {
                report.enter(TurnState::Invoking);
                report.capability = Some(invocation.name.clone());
                self.invoke(invocation).await
            }
        };

        self.history.append(Role::User, text);
        self.history.append(Role::Assistant, report.reply.clone());
        self.history.truncate();

        tracing::info!(reply = %report.reply, "turn complete");
        report
    }

    async fn invoke(&self, invocation: CapabilityInvocation) -> String {
        let Some(handler) = self.registry.get(&invocation.name) else {
            tracing::warn!(capability = %invocation.name, "no handler registered");
            return MISSING_HANDLER_NOTICE.to_string();
        };

        tracing::info!(capability = %invocation.name, args = ?invocation.arguments, "invoking capability");
        match handler.call(invocation.arguments).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(capability = %invocation.name, error = %e, "capability failed");
                HANDLER_FAILURE_NOTICE.to_string()
            }
        }
    }
}
