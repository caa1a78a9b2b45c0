pub mod ffmpeg;

pub use ffmpeg::{check_ffmpeg, FfmpegTranscoder};

use crate::error::{Result, SubbatchError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Video extensions picked up by directory discovery. Matching is case-sensitive.
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv"];

#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    /// Extract the audio track of `source` into `dest`.
    async fn extract_audio(&self, source: &Path, dest: &Path) -> Result<PathBuf>;
}

/// List media files directly inside `dir`, sorted by path.
pub fn discover_media(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SubbatchError::FileNotFound(dir.display().to_string()));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| has_media_extension(p))
        .collect();

    files.sort();
    debug!("Discovered {} media files in {}", files.len(), dir.display());
    Ok(files)
}

fn has_media_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
