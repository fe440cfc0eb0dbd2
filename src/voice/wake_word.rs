//! Wake phrase detection
//!
//! A local energy gate finds short speech segments; each segment is
//! transcribed and checked for the wake phrase.

use std::time::Duration;

use tokio::sync::mpsc;

use super::capture::{AudioCapture, SAMPLE_RATE, rms, samples_to_wav};
use super::stt::SpeechToText;
use crate::{Error, Result};

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to trigger (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of segment (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Longest segment sent for transcription
const MAX_SEGMENT_SAMPLES: usize = SAMPLE_RATE as usize * 5;

/// Capture poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// State of the energy gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Accumulating a speech segment
    Listening,
}

/// Finds speech segments and matches the wake phrase in transcripts
pub struct WakeWordDetector {
    wake_word: String,
    state: DetectorState,
    segment: Vec<f32>,
    silence: usize,
}

impl WakeWordDetector {
    /// Create a detector for `wake_word` (matched case-insensitively)
    ///
    /// # Errors
    ///
    /// Returns error if the phrase is empty
    pub fn new(wake_word: &str) -> Result<Self> {
        let wake_word = wake_word.trim().to_lowercase();
        if wake_word.is_empty() {
            return Err(Error::WakeWord("wake word must not be empty".to_string()));
        }

        tracing::debug!(wake_word = %wake_word, "wake word detector initialized");

        Ok(Self {
            wake_word,
            state: DetectorState::Idle,
            segment: Vec::new(),
            silence: 0,
        })
    }

    /// Feed captured samples; returns a finished speech segment
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        let energy = rms(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.segment.clear();
                    self.segment.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
                None
            }
            DetectorState::Listening => {
                self.segment.extend_from_slice(samples);
                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                let ended = self.silence > SILENCE_SAMPLES || self.segment.len() >= MAX_SEGMENT_SAMPLES;
                if ended && self.segment.len() > MIN_SPEECH_SAMPLES + self.silence {
                    tracing::debug!(samples = self.segment.len(), "speech segment complete");
                    self.state = DetectorState::Idle;
                    self.silence = 0;
                    return Some(std::mem::take(&mut self.segment));
                }
                if ended {
                    tracing::trace!("segment too short, resetting");
                    self.reset();
                }
                None
            }
        }
    }

    /// If `transcript` contains the wake phrase, return whatever follows it
    #[must_use]
    pub fn match_transcript(&self, transcript: &str) -> Option<String> {
        let lower = transcript.to_lowercase();
        let pos = lower.find(&self.wake_word)?;

        tracing::info!(wake_word = %self.wake_word, transcript, "wake word detected");

        // Lowercasing can shift byte offsets for non-ASCII text
        let rest = lower.get(pos + self.wake_word.len()..).unwrap_or_default();
        let offset = transcript.len().saturating_sub(rest.len());
        let command = transcript
            .get(offset..)
            .unwrap_or(rest)
            .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.' || c == '!')
            .trim_end();
        Some(command.to_string())
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.segment.clear();
        self.silence = 0;
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    #[must_use]
    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }
}

/// Blocks until the wake phrase is heard
pub struct WakeWordListener {
    detector: WakeWordDetector,
    pending_command: Option<String>,
}

impl WakeWordListener {
    #[must_use]
    pub const fn new(detector: WakeWordDetector) -> Self {
        Self {
            detector,
            pending_command: None,
        }
    }

    /// Wait for the wake phrase
    ///
    /// Returns `false` when shutdown is requested. Transcription failures
    /// are logged and listening continues.
    ///
    /// # Errors
    ///
    /// Returns error if a segment cannot be encoded
    #[allow(clippy::future_not_send)]
    pub async fn wait_for_wake_word(
        &mut self,
        capture: &AudioCapture,
        stt: &SpeechToText,
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) -> Result<bool> {
        self.detector.reset();
        self.pending_command = None;
        capture.clear_buffer();

        tracing::info!(wake_word = %self.detector.wake_word(), "listening for wake word");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    return Ok(false);
                }
                () = tokio::time::sleep(POLL_INTERVAL) => {
                    let samples = capture.take_buffer();
                    let Some(segment) = self.detector.process(&samples) else {
                        continue;
                    };

                    let wav = samples_to_wav(&segment, SAMPLE_RATE)?;
                    let transcript = match stt.transcribe(&wav).await {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(error = %e, "wake segment transcription failed");
                            continue;
                        }
                    };

                    if let Some(command) = self.detector.match_transcript(&transcript) {
                        self.pending_command = Some(command).filter(|c| !c.is_empty());
                        capture.clear_buffer();
                        return Ok(true);
                    }
                    tracing::debug!(transcript = %transcript, "no wake word in segment");
                }
            }
        }
    }

    /// Command spoken in the same breath as the wake phrase, if any
    pub fn take_command(&mut self) -> Option<String> {
        self.pending_command.take()
    }
}
