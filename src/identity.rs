//! Stable identity keys for units of work and filesystem-safe names.

use crate::error::{Result, SubbatchError};
use regex::Regex;
use std::path::{Component, Path, PathBuf};

/// Default pattern for source identifiers: the token after `/video/`.
pub const DEFAULT_SOURCE_ID_PATTERN: &str = r"/video/(BV\w+)";

/// Longest name `sanitize_name` will return, in characters.
pub const MAX_NAME_CHARS: usize = 200;

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Derive the ledger key for a filesystem unit.
///
/// The key is the path rebuilt from its components: repeated separators,
/// interior `.` segments and a leading `./` do not change it, so
/// `videos/a.mp4`, `./videos/a.mp4` and `videos//a.mp4` share one key. The
/// path is not resolved against the filesystem. Paths that are not valid
/// UTF-8 cannot be stored in the ledger document and are rejected.
pub fn derive_path_key(path: &Path) -> Result<String> {
    let normalized: PathBuf = path
        .components()
        .skip_while(|c| matches!(c, Component::CurDir))
        .collect();

    let key = normalized.to_str().ok_or_else(|| {
        SubbatchError::InvalidIdentity(format!(
            "path is not valid UTF-8: {}",
            path.display()
        ))
    })?;
    if key.is_empty() {
        return Err(SubbatchError::InvalidIdentity(format!(
            "empty path: '{}'",
            path.display()
        )));
    }
    Ok(key.to_string())
}

/// Extracts a short identity token from a remote locator.
#[derive(Debug, Clone)]
pub struct SourceIdPattern {
    regex: Regex,
}

impl Default for SourceIdPattern {
    fn default() -> Self {
        Self {
            regex: Regex::new(DEFAULT_SOURCE_ID_PATTERN).expect("default pattern is valid"),
        }
    }
}

impl SourceIdPattern {
    /// Compile a custom pattern. It must contain at least one capture group;
    /// the first group is the identity token.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| SubbatchError::Config(format!("Invalid source id pattern: {e}")))?;
        if regex.captures_len() < 2 {
            return Err(SubbatchError::Config(format!(
                "Source id pattern '{pattern}' has no capture group"
            )));
        }
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn derive_key(&self, locator: &str) -> Result<String> {
        self.regex
            .captures(locator)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                SubbatchError::InvalidIdentity(format!("no source id in locator '{locator}'"))
            })
    }
}

/// Make arbitrary text usable as a file name.
///
/// Removes characters illegal in file names and control characters, caps the
/// length at [`MAX_NAME_CHARS`] and trims surrounding whitespace.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect();
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_path_key_is_path_string() {
        let path = PathBuf::from("videos/b.mp4");
        assert_eq!(derive_path_key(&path).unwrap(), "videos/b.mp4");
    }

    #[test]
    fn test_derive_path_key_ignores_spelling_of_input_dir() {
        let plain = derive_path_key(&Path::new("videos").join("a.mp4")).unwrap();
        assert_eq!(plain, "videos/a.mp4");
        assert_eq!(derive_path_key(&Path::new("./videos").join("a.mp4")).unwrap(), plain);
        assert_eq!(derive_path_key(&Path::new("videos//").join("a.mp4")).unwrap(), plain);
        assert_eq!(derive_path_key(Path::new("videos/./a.mp4")).unwrap(), plain);
        assert_eq!(
            derive_path_key(Path::new("/data//videos/a.mp4")).unwrap(),
            "/data/videos/a.mp4"
        );
    }

    #[test]
    fn test_derive_path_key_rejects_empty() {
        assert!(derive_path_key(Path::new(".")).is_err());
        assert!(derive_path_key(Path::new("")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_derive_path_key_rejects_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"videos/\xff.mp4"));
        assert!(matches!(
            derive_path_key(path),
            Err(SubbatchError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_source_id_extraction() {
        let pattern = SourceIdPattern::default();
        assert_eq!(
            pattern
                .derive_key("https://www.bilibili.com/video/BV1xx411c7mD/?spm=1")
                .unwrap(),
            "BV1xx411c7mD"
        );
    }

    #[test]
    fn test_source_id_missing_is_invalid_identity() {
        let pattern = SourceIdPattern::default();
        let err = pattern
            .derive_key("https://space.bilibili.com/24647191")
            .unwrap_err();
        assert!(matches!(err, SubbatchError::InvalidIdentity(_)));
        assert!(pattern.derive_key("").is_err());
    }

    #[test]
    fn test_custom_pattern_requires_group() {
        assert!(SourceIdPattern::new(r"/watch\?v=\w+").is_err());
        assert!(SourceIdPattern::new(r"(unclosed").is_err());

        let pattern = SourceIdPattern::new(r"[?&]v=([\w-]{11})").unwrap();
        assert_eq!(
            pattern
                .derive_key("https://example.com/watch?v=dQw4w9WgXcQ")
                .unwrap(),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_sanitize_strips_forbidden_and_control() {
        assert_eq!(sanitize_name("a<b>c:d\"e/f\\g|h?i*j"), "abcdefghij");
        assert_eq!(sanitize_name("line\none\ttab\u{7f}\u{9f}"), "lineonetab");
        assert_eq!(sanitize_name("  padded  "), "padded");
    }

    #[test]
    fn test_sanitize_truncates_by_chars() {
        let long = "直".repeat(MAX_NAME_CHARS + 50);
        let safe = sanitize_name(&long);
        assert_eq!(safe.chars().count(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "  【直播】 title: part 1/2?  ",
            "\u{0}\u{1f}plain",
            "",
            "***",
            &format!("{} tail", "x".repeat(MAX_NAME_CHARS - 1)),
            &format!("{}<>{}", " ".repeat(150), "y".repeat(120)),
        ];

        for raw in samples {
            let once = sanitize_name(raw);
            let twice = sanitize_name(&once);
            assert_eq!(once, twice, "not idempotent for {raw:?}");
            assert!(once.chars().count() <= MAX_NAME_CHARS);
            assert!(!once.chars().any(|c| FORBIDDEN_CHARS.contains(&c) || c.is_control()));
        }
    }
}
