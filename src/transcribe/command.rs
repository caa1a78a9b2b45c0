use crate::error::{Result, SubbatchError};
use crate::transcribe::{TranscribeContext, Transcriber, TranscriptionUnit};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Runs an external speech recognizer and parses its JSON output.
///
/// The program receives its arguments with `{audio}`, `{language}`,
/// `{use_itn}` and `{batch_size_s}` substituted, and must print a JSON array
/// of transcription units on stdout.
pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
}

impl CommandTranscriber {
    /// Build from a command line; the first element is the program.
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command.split_first().ok_or_else(|| {
            SubbatchError::Config("Transcribe command is empty".to_string())
        })?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn render_args(&self, audio: &Path, ctx: &TranscribeContext) -> Vec<String> {
        let audio = audio.display().to_string();
        let batch = ctx.batch_size_secs.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{audio}", &audio)
                    .replace("{language}", &ctx.language)
                    .replace("{use_itn}", if ctx.use_itn { "true" } else { "false" })
                    .replace("{batch_size_s}", &batch)
            })
            .collect()
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn generate(
        &self,
        audio: &Path,
        ctx: &mut TranscribeContext,
    ) -> Result<Vec<TranscriptionUnit>> {
        let args = self.render_args(audio, ctx);
        debug!("Running transcriber: {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SubbatchError::StageFailure(format!("Failed to run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SubbatchError::StageFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let units: Vec<TranscriptionUnit> =
            serde_json::from_slice(&output.stdout).map_err(|e| {
                SubbatchError::StageFailure(format!(
                    "{} produced invalid output: {e}",
                    self.program
                ))
            })?;

        debug!("Transcriber returned {} units", units.len());
        Ok(units)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
