pub mod srt;
pub mod synthesize;

pub use srt::{format_srt, format_timestamp, write_srt};
pub use synthesize::synthesize;

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    /// 1-based, contiguous within a document.
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}
