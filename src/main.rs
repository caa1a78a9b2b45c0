use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use subbatch::config::{Config, Provider};
use subbatch::download::{load_sources, DownloadStage, YtDlpDownloader};
use subbatch::media::{check_ffmpeg, discover_media};
use subbatch::{
    print_summary, BatchOrchestrator, BatchSummary, DownloadLedger, JobLedger, SubtitleStage,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "subbatch")]
#[command(version, about = "Resumable batch subtitle generation")]
#[command(long_about = "Generate SubRip subtitles for a directory of videos and download source videos, \
skipping work that an earlier run already finished.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Transcription provider: command, whisper
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Source language code (e.g., zh, en) or auto
    #[arg(short, long, global = true)]
    language: Option<String>,

    /// Hide the progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate subtitles for every video in a directory
    Batch {
        /// Directory containing the videos
        input_dir: PathBuf,

        /// Where subtitles go (defaults to the input directory)
        output_dir: Option<PathBuf>,

        /// Job ledger file
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Number of videos processed at the same time
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Reprocess videos the ledger marks as completed
        #[arg(short, long)]
        force: bool,
    },

    /// Download every entry of a source list
    Download {
        /// JSON array of {title, url} objects
        #[arg(default_value = "sources.json")]
        sources: PathBuf,

        /// Download directory
        #[arg(default_value = "videos")]
        output_dir: PathBuf,

        /// Downloaded-identity tracking file
        #[arg(long)]
        tracking: Option<PathBuf>,

        /// Download outcome ledger
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Per-download timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Download entries even if already tracked
        #[arg(short, long)]
        force: bool,
    },

    /// Generate subtitles for a single video, without the ledger
    Convert {
        /// Input video file
        input: PathBuf,

        /// Output subtitle file (defaults to the input name with .srt)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// First Ctrl+C stops new units from starting; the second exits immediately.
fn install_cancel_handler() -> Result<Arc<AtomicBool>> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();

    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\nInterrupted: finishing in-flight work, press Ctrl+C again to abort");
    })
    .context("Failed to install Ctrl+C handler")?;

    Ok(cancelled)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn exit_code(summary: &BatchSummary) -> ExitCode {
    if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(ref provider) = cli.provider {
        config.provider = provider
            .parse::<Provider>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    if let Some(ref language) = cli.language {
        config.language = language.clone();
    }
    let show_progress = !cli.no_progress;

    match cli.command {
        Command::Batch {
            input_dir,
            output_dir,
            ledger,
            concurrency,
            force,
        } => {
            if let Some(path) = ledger {
                config.ledger_path = path;
            }
            if let Some(c) = concurrency {
                config.concurrency = c;
            }
            config
                .validate_transcription()
                .context("Configuration validation failed")?;
            check_ffmpeg(&config.ffmpeg_program).await?;

            let output_dir = output_dir.unwrap_or_else(|| input_dir.clone());
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;
            ensure_parent_dir(&config.ledger_path)?;

            let videos = discover_media(&input_dir)
                .with_context(|| format!("Failed to list {}", input_dir.display()))?;
            info!("Found {} video files", videos.len());
            info!("Output:   {}", output_dir.display());
            info!("Ledger:   {}", config.ledger_path.display());
            info!("Provider: {}", config.provider);

            let mut ledger = JobLedger::load(&config.ledger_path)?;
            let stage = SubtitleStage::from_config(&config, &output_dir)?;
            let orchestrator = BatchOrchestrator::new(stage)
                .with_force(force)
                .with_concurrency(config.concurrency)
                .with_progress(show_progress)
                .with_cancel_flag(install_cancel_handler()?);

            let summary = orchestrator
                .run(videos, &mut ledger)
                .await
                .context("Batch aborted: the job ledger could not be written")?;
            print_summary("Subtitle batch", &summary);
            Ok(exit_code(&summary))
        }

        Command::Download {
            sources,
            output_dir,
            tracking,
            ledger,
            timeout,
            force,
        } => {
            if let Some(path) = tracking {
                config.tracking_path = path;
            }
            if let Some(path) = ledger {
                config.download_ledger_path = path;
            }
            if let Some(t) = timeout {
                config.download_timeout_secs = t;
            }
            config.validate().context("Configuration validation failed")?;

            let entries = load_sources(&sources)
                .with_context(|| format!("Failed to read source list {}", sources.display()))?;
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;
            ensure_parent_dir(&config.tracking_path)?;
            ensure_parent_dir(&config.download_ledger_path)?;

            let mut records =
                DownloadLedger::load(&config.tracking_path, &config.download_ledger_path)?;
            info!(
                "Downloading {} entries to {} ({} already tracked)",
                entries.len(),
                output_dir.display(),
                records.tracked().len()
            );

            let downloader = YtDlpDownloader::new().with_program(config.ytdlp_program.clone());
            let stage = DownloadStage::new(downloader, &output_dir)
                .with_pattern(config.source_pattern()?)
                .with_timeout(config.download_timeout());
            let orchestrator = BatchOrchestrator::new(stage)
                .with_force(force)
                .with_progress(show_progress)
                .with_cancel_flag(install_cancel_handler()?);

            let summary = orchestrator
                .run(entries, &mut records)
                .await
                .context("Download aborted: the download records could not be written")?;
            print_summary("Download", &summary);
            Ok(exit_code(&summary))
        }

        Command::Convert { input, output } => {
            config
                .validate_transcription()
                .context("Configuration validation failed")?;
            check_ffmpeg(&config.ffmpeg_program).await?;

            if !input.exists() {
                anyhow::bail!("Input file not found: {}", input.display());
            }

            let output_dir = input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let stage = SubtitleStage::from_config(&config, output_dir)?;
            let output = output.unwrap_or_else(|| stage.output_path_for(&input));

            match stage.convert_file(&input, &output).await {
                Ok(entries) => {
                    println!("Subtitle saved to: {} ({} entries)", output.display(), entries);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    warn!("Conversion failed: {}", e);
                    Err(e.into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_batch() {
        let cli = Cli::parse_from([
            "subbatch", "batch", "videos", "subs", "--force", "-c", "2", "--language", "zh",
        ]);
        assert_eq!(cli.language.as_deref(), Some("zh"));
        match cli.command {
            Command::Batch {
                input_dir,
                output_dir,
                concurrency,
                force,
                ledger,
            } => {
                assert_eq!(input_dir, PathBuf::from("videos"));
                assert_eq!(output_dir, Some(PathBuf::from("subs")));
                assert_eq!(concurrency, Some(2));
                assert!(force);
                assert!(ledger.is_none());
            }
            _ => panic!("expected batch command"),
        }
    }

    #[test]
    fn test_cli_download_defaults() {
        let cli = Cli::parse_from(["subbatch", "download"]);
        match cli.command {
            Command::Download {
                sources,
                output_dir,
                force,
                ..
            } => {
                assert_eq!(sources, PathBuf::from("sources.json"));
                assert_eq!(output_dir, PathBuf::from("videos"));
                assert!(!force);
            }
            _ => panic!("expected download command"),
        }
    }

    #[test]
    fn test_convert_requires_input() {
        assert!(Cli::try_parse_from(["subbatch", "convert"]).is_err());

        let cli = Cli::try_parse_from(["subbatch", "convert", "talk.mp4", "-o", "talk.srt"]).unwrap();
        match cli.command {
            Command::Convert { input, output } => {
                assert_eq!(input, PathBuf::from("talk.mp4"));
                assert_eq!(output, Some(PathBuf::from("talk.srt")));
            }
            _ => panic!("expected convert command"),
        }
    }
}
