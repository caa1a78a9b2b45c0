pub mod command;
pub mod whisper;

pub use command::CommandTranscriber;
pub use whisper::WhisperApiTranscriber;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A timed piece of recognized speech, in milliseconds from the start of the audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    #[serde(rename = "start")]
    pub start_ms: u64,
    #[serde(rename = "end")]
    pub end_ms: u64,
    pub text: String,
}

impl TranscriptionSegment {
    pub fn new(start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
        }
    }
}

/// One result item from a transcriber.
///
/// Units without `sentence_info` carry no timed speech and produce no subtitles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionUnit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_info: Option<Vec<TranscriptionSegment>>,
}

impl TranscriptionUnit {
    pub fn with_segments(segments: Vec<TranscriptionSegment>) -> Self {
        Self {
            sentence_info: Some(segments),
            ..Default::default()
        }
    }
}

/// Per-call state for a transcription request.
///
/// Created by the caller for each audio file and dropped afterwards, so
/// nothing leaks from one unit into the next.
#[derive(Debug, Clone)]
pub struct TranscribeContext {
    /// Language code, or `auto`.
    pub language: String,
    /// Inverse text normalization (punctuation, numerals).
    pub use_itn: bool,
    /// Seconds of audio per inference batch.
    pub batch_size_secs: u32,
    /// Filled in by transcribers that report the detected language.
    pub detected_language: Option<String>,
}

impl TranscribeContext {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            use_itn: true,
            batch_size_secs: 300,
            detected_language: None,
        }
    }
}

impl Default for TranscribeContext {
    fn default() -> Self {
        Self::new("auto")
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn generate(
        &self,
        audio: &Path,
        ctx: &mut TranscribeContext,
    ) -> Result<Vec<TranscriptionUnit>>;

    fn name(&self) -> &'static str;
}
