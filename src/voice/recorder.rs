//! Silence-based end-pointing for utterance recording

use std::time::{Duration, Instant};

use super::capture::{AudioCapture, SAMPLE_RATE, Utterance, rms, samples_duration};
use crate::config::RecordingConfig;
use crate::Result;

/// How often the capture buffer is drained while recording
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Trailing silence after the minimum duration
    TrailingSilence,
    /// Hit the maximum duration
    MaxDuration,
}

/// Decides when to stop recording from chunk amplitudes
#[derive(Debug, Clone)]
pub struct SilenceGate {
    config: RecordingConfig,
    sample_rate: u32,
    total_samples: usize,
    silent_samples: usize,
    heard_speech: bool,
}

impl SilenceGate {
    #[must_use]
    pub const fn new(config: RecordingConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            total_samples: 0,
            silent_samples: 0,
            heard_speech: false,
        }
    }

    /// Feed one chunk; returns a reason once recording should stop
    pub fn push(&mut self, chunk: &[f32]) -> Option<StopReason> {
        self.total_samples += chunk.len();
        if rms(chunk) < self.config.silence_threshold {
            self.silent_samples += chunk.len();
        } else {
            self.silent_samples = 0;
            self.heard_speech = true;
        }

        let elapsed = self.to_duration(self.total_samples);
        if elapsed >= self.config.max_duration {
            return Some(StopReason::MaxDuration);
        }
        if elapsed >= self.config.min_duration
            && self.to_duration(self.silent_samples) >= self.config.trailing_silence
        {
            return Some(StopReason::TrailingSilence);
        }
        None
    }

    /// Recorded length so far
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.to_duration(self.total_samples)
    }

    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    fn to_duration(&self, samples: usize) -> Duration {
        samples_duration(samples, self.sample_rate)
    }
}

/// Records one utterance from a running [`AudioCapture`]
pub struct UtteranceRecorder {
    config: RecordingConfig,
}

impl UtteranceRecorder {
    #[must_use]
    pub const fn new(config: RecordingConfig) -> Self {
        Self { config }
    }

    /// Record until trailing silence or the maximum duration
    ///
    /// # Errors
    ///
    /// Returns error if the recording cannot be written to disk
    pub async fn record_utterance(&self, capture: &AudioCapture) -> Result<Utterance> {
        capture.clear_buffer();

        let mut gate = SilenceGate::new(self.config, SAMPLE_RATE);
        let mut samples = Vec::new();
        let started = Instant::now();
        // Wall-clock guard in case the device stops delivering samples
        let deadline = self.config.max_duration + Duration::from_secs(1);

        tracing::info!("recording utterance");

        let reason = loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let chunk = capture.take_buffer();
            samples.extend_from_slice(&chunk);

            if let Some(reason) = gate.push(&chunk) {
                break reason;
            }
            if started.elapsed() >= deadline {
                tracing::warn!("input device stalled while recording");
                break StopReason::MaxDuration;
            }
        };

        tracing::info!(?reason, elapsed = ?gate.elapsed(), speech = gate.heard_speech(), "recording finished");
        Utterance::from_samples(&samples, SAMPLE_RATE, gate.heard_speech())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 100ms chunk at 16kHz
    fn chunk(amplitude: f32) -> Vec<f32> {
        vec![amplitude; 1600]
    }

    fn feed(gate: &mut SilenceGate, amplitude: f32, chunks: usize) -> Option<StopReason> {
        for _ in 0..chunks {
            if let Some(reason) = gate.push(&chunk(amplitude)) {
                return Some(reason);
            }
        }
        None
    }

    #[test]
    fn speech_then_trailing_silence_stops() {
        let mut gate = SilenceGate::new(RecordingConfig::default(), SAMPLE_RATE);

        assert_eq!(feed(&mut gate, 0.2, 15), None);
        assert!(gate.heard_speech());
        // 1.3s of silence ends it on the 13th quiet chunk
        assert_eq!(feed(&mut gate, 0.0, 12), None);
        assert_eq!(gate.push(&chunk(0.0)), Some(StopReason::TrailingSilence));
    }

    #[test]
    fn silence_never_stops_before_minimum() {
        let config = RecordingConfig {
            trailing_silence: Duration::from_millis(200),
            ..RecordingConfig::default()
        };
        let mut gate = SilenceGate::new(config, SAMPLE_RATE);

        // Silent from the start: must still run for the 1s minimum
        assert_eq!(feed(&mut gate, 0.0, 9), None);
        assert_eq!(gate.push(&chunk(0.0)), Some(StopReason::TrailingSilence));
        assert!(!gate.heard_speech());
    }

    #[test]
    fn continuous_speech_stops_at_maximum() {
        let config = RecordingConfig {
            max_duration: Duration::from_secs(2),
            ..RecordingConfig::default()
        };
        let mut gate = SilenceGate::new(config, SAMPLE_RATE);

        assert_eq!(feed(&mut gate, 0.3, 19), None);
        assert_eq!(gate.push(&chunk(0.3)), Some(StopReason::MaxDuration));
    }

    #[test]
    fn speech_resets_silence_run() {
        let mut gate = SilenceGate::new(RecordingConfig::default(), SAMPLE_RATE);

        assert_eq!(feed(&mut gate, 0.2, 10), None);
        assert_eq!(feed(&mut gate, 0.0, 10), None);
        assert_eq!(feed(&mut gate, 0.2, 1), None);
        assert_eq!(feed(&mut gate, 0.0, 10), None);
    }
}
