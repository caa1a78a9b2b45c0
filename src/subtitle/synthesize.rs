use super::SubtitleEntry;
use crate::transcribe::TranscriptionUnit;
use std::time::Duration;
use tracing::debug;

/// Convert transcription units to subtitle entries.
///
/// Segments keep the order they arrive in; entries are numbered from 1 in
/// that order and are not re-sorted by time. Units without segment
/// information are skipped.
pub fn synthesize(units: &[TranscriptionUnit]) -> Vec<SubtitleEntry> {
    let mut entries = Vec::new();

    for unit in units {
        let Some(segments) = unit.sentence_info.as_ref() else {
            debug!("Skipping transcription unit without segments: {:?}", unit.key);
            continue;
        };

        for segment in segments {
            let start = Duration::from_millis(segment.start_ms);
            let end = Duration::from_millis(segment.end_ms.max(segment.start_ms));

            entries.push(SubtitleEntry {
                index: entries.len() + 1,
                start,
                end,
                text: segment.text.clone(),
            });
        }
    }

    entries
}
