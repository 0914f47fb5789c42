//! Recording-side data models shared by the store and the HTTP API.

use serde::{Deserialize, Serialize};

use super::RecordingId;

/// A validated `(timestamp, hash)` pair ready to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingEntry {
    pub hash: String,
    pub at_ms: i64,
}

impl RecordingEntry {
    pub fn new(hash: impl Into<String>, at_ms: i64) -> Self {
        Self {
            hash: hash.into(),
            at_ms,
        }
    }
}

/// One step of a recording timeline as returned by `read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineItem {
    pub hash: String,
    pub at_ms: i64,
    /// Milliseconds until the next item; 0 for the last one.
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub recording_id: RecordingId,
}

/// Turn time-sorted entries into items carrying the gap to their successor.
pub fn with_durations(entries: Vec<RecordingEntry>) -> Vec<TimelineItem> {
    let next_at: Vec<Option<i64>> = entries
        .iter()
        .skip(1)
        .map(|entry| Some(entry.at_ms))
        .chain(std::iter::once(None))
        .collect();

    entries
        .into_iter()
        .zip(next_at)
        .map(|(entry, next)| TimelineItem {
            duration_ms: next.map_or(0, |at| at.saturating_sub(entry.at_ms)),
            hash: entry.hash,
            at_ms: entry.at_ms,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_item_has_zero_duration() {
        let items = with_durations(vec![
            RecordingEntry::new("a", 1_000),
            RecordingEntry::new("b", 2_500),
            RecordingEntry::new("c", 2_600),
        ]);

        let durations: Vec<i64> = items.iter().map(|item| item.duration_ms).collect();
        assert_eq!(durations, vec![1_500, 100, 0]);
    }

    #[test]
    fn extreme_gaps_saturate() {
        let items = with_durations(vec![
            RecordingEntry::new("a", i64::MIN),
            RecordingEntry::new("b", i64::MAX),
        ]);
        assert_eq!(items[0].duration_ms, i64::MAX);
        assert_eq!(items[1].duration_ms, 0);
    }

    #[test]
    fn empty_input_yields_no_items() {
        assert!(with_durations(Vec::new()).is_empty());
    }
}
