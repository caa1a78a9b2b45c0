// Write-new-then-replace persistence shared by every durable document.
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Result, SubbatchError};

/// Replace `path` with `contents` so that readers observe either the old or
/// the new document, never a truncated one.
///
/// The new file keeps the mode of the file it replaces. A fresh file gets
/// `0o666` filtered through the process umask, like a plain `File::create`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = tempfile::Builder::new();
    builder.prefix(".subbatch-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }

    let mut tmp = builder.tempfile_in(dir)?;
    if let Ok(existing) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(existing.permissions())?;
    }
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    sync_dir(dir);
    debug!("Persisted {} bytes to {}", contents.len(), path.display());
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // The rename itself is atomic; syncing the directory makes it durable.
    let result = std::fs::File::open(dir).and_then(|handle| handle.sync_all());
    if let Err(e) = result {
        warn!("Failed to sync directory {}: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Load a JSON document, treating a missing file as `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SubbatchError::ledger_io(path, e)),
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| SubbatchError::ledger_io(path, format!("corrupt document: {e}")))
}

/// Serialize `value` as pretty JSON and persist it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|e| SubbatchError::ledger_io(path, e))?;
    bytes.push(b'\n');
    write_atomic(path, &bytes).map_err(|e| SubbatchError::ledger_io(path, e))
}
