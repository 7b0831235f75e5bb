pub mod edge;
pub mod voice;

use futures_util::stream::{BoxStream, StreamExt};
use serde::Deserialize;

pub use edge::EdgeTts;

pub const DEFAULT_VOICE: &str = "en-GB-RyanNeural";
pub const DEFAULT_RATE: &str = "+0%";
pub const DEFAULT_PITCH: &str = "-5Hz";

/// Text plus the prosody settings forwarded to the synthesis provider.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_rate")]
    pub rate: String,
    #[serde(default = "default_pitch")]
    pub pitch: String,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_rate() -> String {
    DEFAULT_RATE.to_string()
}

fn default_pitch() -> String {
    DEFAULT_PITCH.to_string()
}

impl SpeechRequest {
    #[cfg(test)]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: default_voice(),
            rate: default_rate(),
            pitch: default_pitch(),
        }
    }

    /// Leading characters of the text, for log lines.
    pub fn preview(&self) -> String {
        self.text.chars().take(20).collect()
    }
}

/// Timing metadata the provider emits alongside audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// Offset from the start of the utterance, in 100ns ticks.
    pub offset: u64,
    /// Duration in 100ns ticks.
    pub duration: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisChunk {
    Audio(Vec<u8>),
    WordBoundary(Boundary),
    SentenceBoundary(Boundary),
}

pub type ChunkStream = BoxStream<'static, Result<SynthesisChunk, TtsError>>;

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("Invalid voice '{0}'.")]
    InvalidVoice(String),

    #[error("Invalid rate '{0}'.")]
    InvalidRate(String),

    #[error("Invalid pitch '{0}'.")]
    InvalidPitch(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Unexpected response from service: {0}")]
    UnexpectedResponse(String),

    #[error("No audio was received. Please verify that your parameters are correct.")]
    NoAudioReceived,
}

/// A streaming text-to-speech backend.
///
/// The returned stream is lazy: nothing is sent to the provider until it is
/// polled, and it ends once every piece of the text has been spoken.
pub trait SpeechSynthesizer: Send + Sync {
    fn stream(&self, request: &SpeechRequest) -> ChunkStream;

    fn name(&self) -> &str;
}

/// Drain a chunk stream, keeping only audio in arrival order.
///
/// The first provider error aborts the whole collection, so callers never see
/// a truncated buffer.
pub async fn collect_audio(mut chunks: ChunkStream) -> Result<Vec<u8>, TtsError> {
    let mut audio = Vec::new();

    while let Some(chunk) = chunks.next().await {
        match chunk? {
            SynthesisChunk::Audio(data) => audio.extend_from_slice(&data),
            SynthesisChunk::WordBoundary(b) | SynthesisChunk::SentenceBoundary(b) => {
                tracing::trace!("boundary '{}' at {} (+{})", b.text, b.offset, b.duration);
            }
        }
    }

    Ok(audio)
}
