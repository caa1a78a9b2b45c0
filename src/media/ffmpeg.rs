use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::MediaTranscoder;
use crate::error::{Result, SubbatchError};

/// Check that `program` runs and answers `-version`.
pub async fn check_ffmpeg(program: &str) -> Result<()> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .await
        .map_err(|e| {
            SubbatchError::Config(format!(
                "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(SubbatchError::Config("FFmpeg check failed".to_string()));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Extracts mono 16-bit PCM at 16kHz, the input speech recognizers expect.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    sample_rate: u32,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            sample_rate: 16000,
        }
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, source: &Path, dest: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            source.display().to_string(),
            "-vn".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            dest.display().to_string(),
        ]
    }
}

#[async_trait]
impl MediaTranscoder for FfmpegTranscoder {
    async fn extract_audio(&self, source: &Path, dest: &Path) -> Result<PathBuf> {
        if !source.exists() {
            return Err(SubbatchError::FileNotFound(source.display().to_string()));
        }

        info!("Extracting audio from {}", source.display());

        let output = Command::new(&self.program)
            .args(self.args(source, dest))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SubbatchError::StageFailure(format!("Failed to run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(SubbatchError::StageFailure(format!(
                "Audio extraction failed ({}): {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }

        if !dest.exists() {
            return Err(SubbatchError::StageFailure(
                "Audio output file was not created".to_string(),
            ));
        }

        debug!("Audio extracted to {}", dest.display());
        Ok(dest.to_path_buf())
    }
}
