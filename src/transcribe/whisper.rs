use crate::error::{Result, SubbatchError};
use crate::transcribe::{TranscribeContext, Transcriber, TranscriptionSegment, TranscriptionUnit};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// OpenAI-compatible API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Maximum upload size accepted by the transcription endpoint (25 MB).
const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Transcriber backed by an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct WhisperApiTranscriber {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry_delay_ms: u64,
}

impl WhisperApiTranscriber {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "whisper-1".to_string(),
            retry_delay_ms: BASE_DELAY_MS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }

    async fn build_form(&self, audio: &Path, ctx: &TranscribeContext) -> Result<Form> {
        let file_bytes = fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let mime_type = match audio.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            _ => "application/octet-stream",
        };

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str(mime_type)?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        if ctx.language != "auto" && !ctx.language.is_empty() {
            form = form.text("language", ctx.language.clone());
        }

        Ok(form)
    }

    /// One request. The error side says whether retrying can help.
    async fn call_api(
        &self,
        form: Form,
    ) -> std::result::Result<WhisperResponse, (SubbatchError, bool)> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| (SubbatchError::Http(e), true))?;

        let status = response.status();
        debug!("Transcription API response status: {}", status);

        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| (SubbatchError::Http(e), true))?;
            return serde_json::from_str(&body).map_err(|e| (SubbatchError::Json(e), false));
        }

        let error_body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorResponse>(&error_body) {
            Ok(api_error) => format!(
                "Transcription API error ({}): {}",
                status, api_error.error.message
            ),
            Err(_) => format!("Transcription API error ({}): {}", status, error_body),
        };

        Err((SubbatchError::Api(message), !status.is_client_error()))
    }

    async fn transcribe_with_retry(
        &self,
        audio: &Path,
        ctx: &TranscribeContext,
    ) -> Result<WhisperResponse> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_delay_ms * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            // The form is consumed by the request, so rebuild it every attempt.
            let form = self.build_form(audio, ctx).await?;

            match self.call_api(form).await {
                Ok(response) => return Ok(response),
                Err((e, false)) => return Err(e),
                Err((e, true)) => {
                    warn!("Attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SubbatchError::Api("Unknown error".to_string())))
    }
}

fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

fn parse_response(response: WhisperResponse) -> TranscriptionUnit {
    let segments = match response.segments {
        Some(api_segments) => api_segments
            .into_iter()
            .map(|seg| {
                TranscriptionSegment::new(
                    secs_to_ms(seg.start),
                    secs_to_ms(seg.end),
                    seg.text.trim(),
                )
            })
            .collect(),
        // No segment timing: one segment spanning the whole audio.
        None if !response.text.trim().is_empty() => vec![TranscriptionSegment::new(
            0,
            secs_to_ms(response.duration.unwrap_or(0.0)),
            response.text.trim(),
        )],
        None => Vec::new(),
    };

    TranscriptionUnit {
        key: None,
        text: Some(response.text),
        sentence_info: Some(segments),
    }
}

#[async_trait]
impl Transcriber for WhisperApiTranscriber {
    async fn generate(
        &self,
        audio: &Path,
        ctx: &mut TranscribeContext,
    ) -> Result<Vec<TranscriptionUnit>> {
        let metadata = fs::metadata(audio).await?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(SubbatchError::StageFailure(format!(
                "Audio too large for transcription API: {} bytes (max {} bytes)",
                metadata.len(),
                MAX_FILE_SIZE
            )));
        }

        let response = self.transcribe_with_retry(audio, ctx).await?;
        if let Some(ref language) = response.language {
            ctx.detected_language = Some(language.clone());
        }

        let unit = parse_response(response);
        debug!(
            "Transcription API returned {} segments",
            unit.sentence_info.as_ref().map_or(0, Vec::len)
        );

        Ok(vec![unit])
    }

    fn name(&self) -> &'static str {
        "whisper-api"
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
