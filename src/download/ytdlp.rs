use super::{Downloader, FetchOutcome};
use crate::error::{Result, SubbatchError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Downloads through the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: String,
    /// Arguments placed before the yt-dlp options, e.g. `-m yt_dlp` for python.
    prefix_args: Vec<String>,
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            prefix_args: Vec::new(),
        }
    }
}

impl YtDlpDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_prefix_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn fetch(
        &self,
        locator: &str,
        template: &str,
        timeout: Duration,
    ) -> Result<FetchOutcome> {
        debug!("{} -o {} {}", self.program, template, locator);

        // Dropping the future on timeout kills the child process.
        let mut command = Command::new(&self.program);
        command
            .args(&self.prefix_args)
            .args(["--no-warnings", "--progress", "-o", template, locator])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(result) => result.map_err(|e| {
                SubbatchError::StageFailure(format!("Failed to run {}: {e}", self.program))
            })?,
            Err(_) => return Err(SubbatchError::StageTimeout(timeout.as_secs())),
        };

        Ok(FetchOutcome {
            exit_code: output.status.code(),
            captured_error: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    // `sh -c <script> sh <yt-dlp args...>` runs the script and ignores the rest.
    fn shell(script: &str) -> YtDlpDownloader {
        YtDlpDownloader::new()
            .with_program("sh")
            .with_prefix_args(vec!["-c".to_string(), script.to_string(), "sh".to_string()])
    }

    #[tokio::test]
    async fn test_timeout_is_enforced() {
        let err = shell("sleep 5")
            .fetch("https://example.com/video/BV1", "out.%(ext)s", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, SubbatchError::StageTimeout(_)));
    }

    #[tokio::test]
    async fn test_captures_exit_code_and_stderr() {
        let outcome = shell("echo 'ERROR: unavailable' >&2; exit 2")
            .fetch("https://example.com/video/BV1", "out.%(ext)s", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(2));
        assert_eq!(outcome.captured_error, "ERROR: unavailable");
    }

    #[tokio::test]
    async fn test_passes_template_and_locator() {
        let outcome = shell(r#"[ "$4" = "out.%(ext)s" ] && [ "$5" = "https://x/video/BV1" ]"#)
            .fetch("https://x/video/BV1", "out.%(ext)s", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn test_missing_program_is_stage_failure() {
        let downloader = YtDlpDownloader::new().with_program("/nonexistent/yt-dlp");
        let err = downloader
            .fetch("u", "t", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SubbatchError::StageFailure(_)));
    }
}
