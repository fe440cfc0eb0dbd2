//! Daemon - the voice assistant loop
//!
//! Wake word, record, transcribe, converse, speak; one turn at a time until
//! interrupted.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::{Conversation, SpeechSink};
use crate::context::ConversationHistory;
use crate::home::HomeClient;
use crate::llm::ModelBackend;
use crate::tools::{CapabilityRegistry, ControlDeviceHandler};
use crate::voice::{
    AudioCapture, AudioPlayback, SpeechOutput, SpeechToText, TextToSpeech, UtteranceRecorder,
    WakeWordDetector, WakeWordListener,
};
use crate::{Config, Error, Result};

/// Spoken right after a bare wake phrase
const ACKNOWLEDGEMENT: &str = "Yes?";

/// Spoken when the utterance could not be transcribed
const NOT_UNDERSTOOD: &str = "Sorry, I didn't catch that.";

/// Build the conversation for `config`: backend, capabilities and history
///
/// Registers `control_home_device` only when Home Assistant is configured,
/// and makes a best effort to bring local backends up first.
///
/// # Errors
///
/// Returns error if the backend is unsupported or misconfigured
pub async fn build_conversation(config: &Config) -> Result<Conversation> {
    let backend = ModelBackend::from_config(config)?;
    if let ModelBackend::Ollama(ollama) = &backend {
        if let Err(e) = ollama.warm_up().await {
            tracing::warn!(error = %e, "ollama warm-up failed, will retry on first request");
        }
    }

    let mut registry = CapabilityRegistry::new();
    if let Some(home) = &config.home {
        let client = HomeClient::new(home)?;
        match client.ensure_running().await {
            Ok(readiness) => tracing::info!(url = client.base_url(), ?readiness, "home assistant ready"),
            Err(e) => tracing::warn!(error = %e, "home assistant is not reachable, device control will report failures"),
        }
        registry.register(Arc::new(ControlDeviceHandler::new(Arc::new(client))))?;
    }

    tracing::info!(capabilities = registry.len(), "capability registry built");

    Ok(Conversation::new(
        backend,
        registry,
        ConversationHistory::new(config.llm.max_history_tokens),
    ))
}

/// Build the single speech output for this process
///
/// # Errors
///
/// Returns error if the `OpenAI` key is missing or no output device exists
pub fn build_speech_output(config: &Config) -> Result<SpeechOutput> {
    let tts = TextToSpeech::new_openai(
        openai_key(config)?,
        config.voice.tts_model.clone(),
        config.voice.tts_voice.clone(),
        config.voice.tts_speed,
    )?
    .with_base_url(&config.llm.openai_base_url);

    Ok(SpeechOutput::new(tts, AudioPlayback::new()?))
}

fn openai_key(config: &Config) -> Result<String> {
    config
        .api_keys
        .openai
        .clone()
        .ok_or_else(|| Error::Config("OPENAI_API_KEY is required for speech".to_string()))
}

/// The Jarvix daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the voice loop until Ctrl-C
    ///
    /// Turn failures are logged and the loop keeps listening.
    ///
    /// # Errors
    ///
    /// Returns error if voice is disabled or audio/backends cannot be set up
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        if !self.config.voice.enabled {
            return Err(Error::Config(
                "voice is disabled; use `jarvix chat` for text mode".to_string(),
            ));
        }

        let mut conversation = build_conversation(&self.config).await?;
        let mut speech = build_speech_output(&self.config)?;
        let stt = SpeechToText::new_whisper(openai_key(&self.config)?, self.config.voice.stt_model.clone())?
            .with_base_url(&self.config.llm.openai_base_url);

        let mut listener = WakeWordListener::new(WakeWordDetector::new(&self.config.voice.wake_word)?);
        let recorder = UtteranceRecorder::new(self.config.voice.recording);
        let mut capture = AudioCapture::new()?;

        // Set up shutdown signal
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        capture.start()?;
        tracing::info!(wake_word = %self.config.voice.wake_word, "jarvix ready");

        loop {
            match listener
                .wait_for_wake_word(&capture, &stt, &mut shutdown_rx)
                .await
            {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::error!(error = %e, "wake word detection error");
                    continue;
                }
            }

            if let Err(e) = handle_wake(
                &mut conversation,
                &mut speech,
                &mut listener,
                &recorder,
                &capture,
                &stt,
            )
            .await
            {
                tracing::error!(error = %e, "voice turn failed");
            }
        }

        capture.stop();
        Ok(())
    }
}

/// One turn after the wake phrase
#[allow(clippy::future_not_send)]
async fn handle_wake(
    conversation: &mut Conversation,
    speech: &mut SpeechOutput,
    listener: &mut WakeWordListener,
    recorder: &UtteranceRecorder,
    capture: &AudioCapture,
    stt: &SpeechToText,
) -> Result<()> {
    // The utterance file lives until the turn is done
    let (text, _utterance) = if let Some(command) = listener.take_command() {
        (command, None)
    } else {
        speech.speak(ACKNOWLEDGEMENT).await?;

        let utterance = recorder.record_utterance(capture).await?;
        if !utterance.contains_speech() {
            tracing::debug!("no speech after wake word");
            return Ok(());
        }

        match stt.transcribe_utterance(&utterance).await {
            Ok(text) => (text, Some(utterance)),
            Err(e) => {
                tracing::warn!(error = %e, "STT failed");
                return speech.speak(NOT_UNDERSTOOD).await;
            }
        }
    };

    if text.trim().is_empty() {
        tracing::debug!("empty transcript, skipping turn");
        return Ok(());
    }

    tracing::info!(command = %text, "command received");
    let report = conversation.run_turn(&text, speech).await?;
    tracing::debug!(states = ?report.states, capability = ?report.capability, "turn finished");
    Ok(())
}
