//! Voice processing module
//!
//! Audio capture and end-pointing, wake phrase detection, Whisper
//! transcription, and TTS playback.

mod capture;
mod output;
mod playback;
mod recorder;
mod stt;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, SAMPLE_RATE, Utterance, rms, samples_duration, samples_to_wav};
pub use output::SpeechOutput;
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3, sine_tone};
pub use recorder::{SilenceGate, StopReason, UtteranceRecorder};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;
pub use wake_word::{DetectorState, WakeWordDetector, WakeWordListener};
