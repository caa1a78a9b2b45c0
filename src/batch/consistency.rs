use std::path::{Path, PathBuf};
use tracing::debug;

use crate::ledger::Completion;

/// External evidence that a unit recorded as completed really is.
///
/// Stores can be optimistic: outputs get deleted or moved out of band. Before a
/// completed unit is skipped, the stage's check must pass as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactCheck {
    /// Accept the store's word.
    Trust,
    /// The output path recorded on completion must exist.
    RecordedPath,
    /// Some finished regular file in the directory must carry `[<key>]` in its name.
    DirectoryContains(PathBuf),
}

impl ArtifactCheck {
    pub fn is_satisfied(&self, key: &str, completion: &Completion) -> bool {
        match self {
            ArtifactCheck::Trust => true,
            ArtifactCheck::RecordedPath => match &completion.output_path {
                Some(path) => path.exists(),
                None => {
                    debug!("{} has no recorded output path", key);
                    false
                }
            },
            ArtifactCheck::DirectoryContains(dir) => directory_contains(dir, key).is_some(),
        }
    }
}

/// Suffixes of files a downloader is still writing.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl"];

/// First regular file in `dir` whose name contains the bracketed `[token]`,
/// in name order. Partial downloads do not count.
pub fn directory_contains(dir: &Path, token: &str) -> Option<PathBuf> {
    if token.is_empty() {
        return None;
    }
    let tag = format!("[{token}]");

    let entries = std::fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.contains(&tag) && !PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
        })
        .map(|e| e.path())
        .collect();
    matches.sort();
    matches.into_iter().next()
}
