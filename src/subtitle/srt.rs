// SubRip subtitle format
use super::SubtitleEntry;
use crate::error::{Result, SubbatchError};
use crate::ledger::write_atomic;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Render entries as a SubRip document: index line, time range, text lines,
/// blank separator.
pub fn format_srt(entries: &[SubtitleEntry]) -> String {
    let mut output = String::new();

    for entry in entries {
        let _ = writeln!(output, "{}", entry.index);
        let _ = writeln!(
            output,
            "{} --> {}",
            format_timestamp(entry.start),
            format_timestamp(entry.end)
        );
        output.push_str(&text_block(&entry.text));
        output.push('\n');
    }

    output
}

/// A blank line would end the cue early, so blank lines inside the text are dropped.
fn text_block(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();

    let mut block = lines.join("\n");
    block.push('\n');
    block
}

/// `HH:MM:SS,mmm`. Hours are not wrapped.
pub fn format_timestamp(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = d.subsec_millis();
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Write entries to `path` as UTF-8 SubRip.
///
/// The file is replaced atomically, so an interrupted write never leaves a
/// truncated subtitle that a later run would mistake for finished output.
pub fn write_srt(entries: &[SubtitleEntry], path: &Path) -> Result<()> {
    let document = format_srt(entries);
    write_atomic(path, document.as_bytes()).map_err(|e| {
        SubbatchError::Serialization(format!("cannot write {}: {e}", path.display()))
    })?;

    info!("Wrote {} entries to {}", entries.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(index: usize, start_ms: u64, end_ms: u64, text: &str) -> SubtitleEntry {
        SubtitleEntry {
            index,
            start: Duration::from_millis(start_ms),
            end: Duration::from_millis(end_ms),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(Duration::ZERO), "00:00:00,000");
        assert_eq!(
            format_timestamp(Duration::from_millis(1500)),
            "00:00:01,500"
        );
        assert_eq!(
            format_timestamp(Duration::from_secs(3661) + Duration::from_millis(123)),
            "01:01:01,123"
        );
        assert_eq!(
            format_timestamp(Duration::from_secs(100 * 3600)),
            "100:00:00,000"
        );
    }

    #[test]
    fn test_srt_document() {
        let entries = vec![entry(1, 0, 1500, "a"), entry(2, 1500, 4200, "b")];

        assert_eq!(
            format_srt(&entries),
            "1\n00:00:00,000 --> 00:00:01,500\na\n\n2\n00:00:01,500 --> 00:00:04,200\nb\n\n"
        );
    }

    #[test]
    fn test_multiline_text() {
        let entries = vec![entry(1, 0, 5000, "line one\r\n\r\nline two  ")];
        assert_eq!(
            format_srt(&entries),
            "1\n00:00:00,000 --> 00:00:05,000\nline one\nline two\n\n"
        );
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(format_srt(&[]), "");
    }

    #[test]
    fn test_write_srt_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.srt");

        write_srt(&[entry(1, 0, 1000, "你好，世界")], &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("你好，世界"));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_srt_is_readable_like_a_plain_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let srt = dir.path().join("out.srt");
        let plain = dir.path().join("plain.srt");
        write_srt(&[entry(1, 0, 1000, "x")], &srt).unwrap();
        std::fs::write(&plain, "x").unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&srt), mode(&plain));
    }

    #[test]
    fn test_write_srt_failure_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.srt");

        let err = write_srt(&[entry(1, 0, 1000, "x")], &path).unwrap_err();
        assert!(matches!(err, SubbatchError::Serialization(_)));
        assert!(!err.is_fatal());
    }
}
