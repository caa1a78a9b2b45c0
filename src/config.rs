use crate::error::{Result, SubbatchError};
use crate::identity::{SourceIdPattern, DEFAULT_SOURCE_ID_PATTERN};
use crate::transcribe::whisper::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// External recognizer program printing JSON units.
    #[default]
    Command,
    /// OpenAI-compatible transcription API.
    Whisper,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Command => write!(f, "command"),
            Provider::Whisper => write!(f, "whisper"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command" => Ok(Provider::Command),
            "whisper" => Ok(Provider::Whisper),
            _ => Err(format!("Unknown provider: {}. Use 'command' or 'whisper'", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Provider,
    /// Recognizer command line for the `command` provider.
    pub transcribe_command: Vec<String>,
    pub openai_api_key: Option<String>,
    pub whisper_base_url: String,
    pub whisper_model: String,
    /// Source language code, or `auto`.
    pub language: String,
    pub ffmpeg_program: String,
    pub ytdlp_program: String,
    /// Job ledger for the subtitle batch.
    pub ledger_path: PathBuf,
    /// Identity set for the download batch.
    pub tracking_path: PathBuf,
    /// Job ledger for the download batch, next to the identity set.
    pub download_ledger_path: PathBuf,
    pub download_timeout_secs: u64,
    pub source_id_pattern: String,
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            transcribe_command: Vec::new(),
            openai_api_key: None,
            whisper_base_url: DEFAULT_BASE_URL.to_string(),
            whisper_model: "whisper-1".to_string(),
            language: "auto".to_string(),
            ffmpeg_program: "ffmpeg".to_string(),
            ytdlp_program: "yt-dlp".to_string(),
            ledger_path: PathBuf::from("processing_records.json"),
            tracking_path: PathBuf::from("downloaded_videos.json"),
            download_ledger_path: PathBuf::from("download_records.json"),
            download_timeout_secs: 600,
            source_id_pattern: DEFAULT_SOURCE_ID_PATTERN.to_string(),
            concurrency: 1,
        }
    }
}

impl Config {
    /// Defaults, then the config file (explicit path or the user config dir),
    /// then environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_file_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SubbatchError::Config(format!("Cannot read {}: {e}", path.display()))
        })?;
        let config = toml::from_str::<Config>(&contents).map_err(|e| {
            SubbatchError::Config(format!("Invalid config {}: {e}", path.display()))
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `SUBBATCH_*` style overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(provider) = lookup("SUBBATCH_PROVIDER") {
            if let Ok(p) = provider.parse() {
                self.provider = p;
            }
        }
        if let Some(command) = lookup("SUBBATCH_TRANSCRIBE_COMMAND") {
            self.transcribe_command = command.split_whitespace().map(str::to_string).collect();
        }
        if let Some(language) = lookup("SUBBATCH_LANGUAGE") {
            self.language = language;
        }
        if let Some(path) = lookup("SUBBATCH_LEDGER") {
            self.ledger_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("SUBBATCH_TRACKING") {
            self.tracking_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("SUBBATCH_DOWNLOAD_LEDGER") {
            self.download_ledger_path = PathBuf::from(path);
        }
        if let Some(timeout) = lookup("SUBBATCH_DOWNLOAD_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                self.download_timeout_secs = t;
            }
        }
        if let Some(concurrency) = lookup("SUBBATCH_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.concurrency = c;
            }
        }
    }

    /// Checks shared by every command.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SubbatchError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }
        if self.download_timeout_secs == 0 {
            return Err(SubbatchError::Config(
                "Download timeout must be greater than 0".to_string(),
            ));
        }
        self.source_pattern()?;
        Ok(())
    }

    /// Checks for commands that transcribe.
    pub fn validate_transcription(&self) -> Result<()> {
        self.validate()?;
        match self.provider {
            Provider::Command if self.transcribe_command.is_empty() => Err(SubbatchError::Config(
                "transcribe_command not set. Add it to the config file or SUBBATCH_TRANSCRIBE_COMMAND"
                    .to_string(),
            )),
            Provider::Whisper if self.openai_api_key.is_none() => Err(SubbatchError::Config(
                "OPENAI_API_KEY not set. Export it with: export OPENAI_API_KEY=sk-...".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn source_pattern(&self) -> Result<SourceIdPattern> {
        SourceIdPattern::new(&self.source_id_pattern)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("subbatch").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("command".parse::<Provider>().unwrap(), Provider::Command);
        assert_eq!("WHISPER".parse::<Provider>().unwrap(), Provider::Whisper);
        assert!("gemini".parse::<Provider>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider, Provider::Command);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.download_timeout(), Duration::from_secs(600));
        assert_eq!(config.ledger_path, PathBuf::from("processing_records.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_transcription() {
        let mut config = Config::default();
        assert!(config.validate_transcription().is_err());

        config.transcribe_command = vec!["asr".to_string()];
        assert!(config.validate_transcription().is_ok());

        config.provider = Provider::Whisper;
        assert!(config.validate_transcription().is_err());
        config.openai_api_key = Some("sk-test".to_string());
        assert!(config.validate_transcription().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values_and_bad_pattern() {
        let mut config = Config::default();
        config.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source_id_pattern = "no-group".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "language = \"zh\"\ntranscribe_command = [\"asr\", \"{audio}\"]\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.language, "zh");
        assert_eq!(config.transcribe_command, vec!["asr", "{audio}"]);
        assert_eq!(config.download_timeout_secs, 600);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "concurrency = \"many\"").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(SubbatchError::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("SUBBATCH_PROVIDER", "whisper"),
            ("OPENAI_API_KEY", "sk-env"),
            ("SUBBATCH_CONCURRENCY", "not-a-number"),
            ("SUBBATCH_TRANSCRIBE_COMMAND", "asr --in {audio}"),
            ("SUBBATCH_LEDGER", "/data/ledger.json"),
            ("SUBBATCH_DOWNLOAD_LEDGER", "/data/downloads.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.provider, Provider::Whisper);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.transcribe_command, vec!["asr", "--in", "{audio}"]);
        assert_eq!(config.ledger_path, PathBuf::from("/data/ledger.json"));
        assert_eq!(config.download_ledger_path, PathBuf::from("/data/downloads.json"));
    }
}
