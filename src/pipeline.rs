use crate::batch::{ArtifactCheck, Stage, StageOutput};
use crate::config::{Config, Provider};
use crate::error::{Result, SubbatchError};
use crate::identity::derive_path_key;
use crate::media::{FfmpegTranscoder, MediaTranscoder};
use crate::subtitle::{synthesize, write_srt};
use crate::transcribe::{CommandTranscriber, TranscribeContext, Transcriber, WhisperApiTranscriber};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};
use tempfile::TempDir;
use tracing::{debug, info};

/// Build the transcriber selected in the configuration.
pub fn build_transcriber(config: &Config) -> Result<Box<dyn Transcriber>> {
    match config.provider {
        Provider::Command => Ok(Box::new(CommandTranscriber::new(&config.transcribe_command)?)),
        Provider::Whisper => {
            let api_key = config.openai_api_key.as_ref().ok_or_else(|| {
                SubbatchError::Config(
                    "OpenAI API key not set. Set OPENAI_API_KEY environment variable."
                        .to_string(),
                )
            })?;
            Ok(Box::new(
                WhisperApiTranscriber::new(api_key.clone())
                    .with_base_url(config.whisper_base_url.clone())
                    .with_model(config.whisper_model.clone()),
            ))
        }
    }
}

/// Media file → SubRip file: extract audio, transcribe, synthesize, write.
pub struct SubtitleStage {
    transcoder: Box<dyn MediaTranscoder>,
    transcriber: Box<dyn Transcriber>,
    output_dir: PathBuf,
    language: String,
}

impl SubtitleStage {
    pub fn new(
        transcoder: Box<dyn MediaTranscoder>,
        transcriber: Box<dyn Transcriber>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transcoder,
            transcriber,
            output_dir: output_dir.into(),
            language: "auto".to_string(),
        }
    }

    pub fn from_config(config: &Config, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let transcoder = FfmpegTranscoder::new().with_program(config.ffmpeg_program.clone());
        Ok(Self::new(
            Box::new(transcoder),
            build_transcriber(config)?,
            output_dir,
        )
        .with_language(config.language.clone()))
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// `<output_dir>/<source stem>.srt`
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        let stem = source.file_stem().unwrap_or_default();
        self.output_dir
            .join(format!("{}.srt", stem.to_string_lossy()))
    }

    /// Run the whole chain for one file. Returns the number of subtitle entries.
    pub async fn convert_file(&self, source: &Path, output: &Path) -> Result<usize> {
        let start_time = Instant::now();

        // Intermediate audio lives only as long as this call.
        let temp_dir = TempDir::new()?;
        let audio_path = temp_dir.path().join("audio.wav");

        let audio = self.transcoder.extract_audio(source, &audio_path).await?;
        debug!("Audio ready at {}", audio.display());

        let mut ctx = TranscribeContext::new(self.language.clone());
        let units = self.transcriber.generate(&audio, &mut ctx).await?;
        if let Some(ref detected) = ctx.detected_language {
            debug!("Detected language: {}", detected);
        }

        let entries = synthesize(&units);
        write_srt(&entries, output)?;

        info!(
            "{} -> {} ({} entries, {:.1}s)",
            source.display(),
            output.display(),
            entries.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(entries.len())
    }
}

/// Source modification time as seconds since the epoch.
fn freshness_token(source: &Path) -> Option<String> {
    let modified = std::fs::metadata(source).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_secs_f64().to_string())
}

#[async_trait]
impl Stage for SubtitleStage {
    type Unit = PathBuf;

    fn name(&self) -> &'static str {
        "subtitles"
    }

    fn identify(&self, unit: &PathBuf) -> Result<String> {
        derive_path_key(unit)
    }

    fn describe(&self, unit: &PathBuf) -> String {
        unit.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| unit.display().to_string())
    }

    fn artifact_check(&self) -> ArtifactCheck {
        ArtifactCheck::RecordedPath
    }

    async fn process(&self, unit: &PathBuf) -> Result<StageOutput> {
        let output = self.output_path_for(unit);
        self.convert_file(unit, &output).await?;

        Ok(StageOutput {
            output_path: Some(output),
            freshness_token: freshness_token(unit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::{TranscriptionSegment, TranscriptionUnit};

    struct CopyTranscoder;

    #[async_trait]
    impl MediaTranscoder for CopyTranscoder {
        async fn extract_audio(&self, source: &Path, dest: &Path) -> Result<PathBuf> {
            std::fs::copy(source, dest)?;
            Ok(dest.to_path_buf())
        }
    }

    struct FixedTranscriber;

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn generate(
            &self,
            _audio: &Path,
            ctx: &mut TranscribeContext,
        ) -> Result<Vec<TranscriptionUnit>> {
            ctx.detected_language = Some("zh".to_string());
            Ok(vec![TranscriptionUnit::with_segments(vec![
                TranscriptionSegment::new(0, 1500, "a"),
                TranscriptionSegment::new(1500, 4200, "b"),
            ])])
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn stage(output_dir: &Path) -> SubtitleStage {
        SubtitleStage::new(Box::new(CopyTranscoder), Box::new(FixedTranscriber), output_dir)
    }

    #[test]
    fn test_output_path_for() {
        let stage = stage(Path::new("/subs"));
        assert_eq!(
            stage.output_path_for(Path::new("/videos/talk.final.mp4")),
            PathBuf::from("/subs/talk.final.srt")
        );
    }

    #[tokio::test]
    async fn test_process_writes_srt_and_token() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"media").unwrap();

        let output = stage(dir.path()).process(&source).await.unwrap();
        let srt_path = output.output_path.unwrap();
        assert_eq!(srt_path, dir.path().join("clip.srt"));
        assert!(output.freshness_token.is_some());

        let srt = std::fs::read_to_string(srt_path).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,500\na\n\n2\n"));
    }

    #[tokio::test]
    async fn test_missing_output_dir_is_serialization_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"media").unwrap();

        let err = stage(&dir.path().join("absent"))
            .process(&source)
            .await
            .unwrap_err();
        assert!(matches!(err, SubbatchError::Serialization(_)));
    }

    #[test]
    fn test_build_transcriber_requires_settings() {
        let mut config = Config::default();
        config.provider = Provider::Whisper;
        assert!(build_transcriber(&config).is_err());

        config.openai_api_key = Some("sk-test".to_string());
        assert_eq!(build_transcriber(&config).unwrap().name(), "whisper-api");

        config.provider = Provider::Command;
        config.transcribe_command = vec!["asr".to_string(), "{audio}".to_string()];
        assert_eq!(build_transcriber(&config).unwrap().name(), "command");
    }
}
