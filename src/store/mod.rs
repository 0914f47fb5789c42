//! The recording store: the only component allowed to touch persisted
//! recording data. The HTTP API and tests talk to it through
//! [`RecordingStore`]; [`SqliteRecordingStore`] is the production backend.

mod sqlite;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use thiserror::Error;

use crate::models::{RecordingEntry, RecordingId, TimelineItem};

pub use sqlite::SqliteRecordingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("recording {0} not found")]
    NotFound(RecordingId),
    #[error("{} entries carry an invalid fingerprint", .0.len())]
    InvalidFingerprint(Vec<String>),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Create an empty recording under a freshly generated id.
    async fn create(&self) -> StoreResult<RecordingId>;

    /// Append entries atomically. Nothing is written if any hash is invalid.
    async fn append(&self, id: &RecordingId, entries: Vec<RecordingEntry>) -> StoreResult<()>;

    async fn exists(&self, id: &RecordingId) -> StoreResult<bool>;

    /// Ids of every recording, oldest first.
    async fn list(&self) -> StoreResult<Vec<RecordingId>>;

    /// The recording's entries sorted by timestamp, each with the gap to the next.
    async fn read(&self, id: &RecordingId) -> StoreResult<Vec<TimelineItem>>;
}

/// Base36 creation time, a dash, and a random base36 suffix.
pub fn generate_recording_id() -> RecordingId {
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    let suffix: u64 = rand::thread_rng().gen();
    RecordingId::new(format!("{}-{}", to_base36(millis), to_base36(suffix)))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_recording_id();
        let b = generate_recording_id();
        assert_ne!(a, b);
        assert!(a.as_str().contains('-'));
    }
}
