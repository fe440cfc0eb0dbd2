//! Speech output: synthesis plus playback

use async_trait::async_trait;

use super::playback::AudioPlayback;
use super::tts::TextToSpeech;
use crate::agent::SpeechSink;
use crate::Result;

/// The process's single speech output, owned by whoever drives turns
pub struct SpeechOutput {
    tts: TextToSpeech,
    playback: AudioPlayback,
}

impl SpeechOutput {
    #[must_use]
    pub const fn new(tts: TextToSpeech, playback: AudioPlayback) -> Self {
        Self { tts, playback }
    }
}

#[async_trait(?Send)]
impl SpeechSink for SpeechOutput {
    async fn speak(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        tracing::debug!(text, "speaking");
        let audio = self.tts.synthesize(text).await?;
        self.playback.play_mp3(&audio).await
    }
}
