use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a recording, issued by the recording store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingId(String);

impl RecordingId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One sampled frame: the fingerprint plus the instant it was captured.
///
/// `recording_id` is `None` for a frame that belongs to no recording. The sync
/// processor never sends such a frame over the network. No caller builds one
/// today; the variant is kept so the no-recording path stays explicit.
/// On the wire the key is required and only an explicit `null` means `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    #[serde(deserialize_with = "Option::deserialize")]
    recording_id: Option<RecordingId>,
    hash: String,
    #[serde(rename = "at")]
    captured_at: DateTime<Utc>,
}

impl FrameRecord {
    pub fn new(recording_id: RecordingId, hash: String, captured_at: DateTime<Utc>) -> Self {
        Self {
            recording_id: Some(recording_id),
            hash,
            captured_at,
        }
    }

    pub fn detached(hash: String, captured_at: DateTime<Utc>) -> Self {
        Self {
            recording_id: None,
            hash,
            captured_at,
        }
    }

    pub fn recording_id(&self) -> Option<&RecordingId> {
        self.recording_id.as_ref()
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Body of the `PATCH /api/recordings/{id}` call for this frame.
    pub fn to_entry(&self) -> FramePayload<'_> {
        FramePayload {
            hash: &self.hash,
            at: self.captured_at,
        }
    }
}

/// Wire shape of a single appended entry: `{ "hash": ..., "at": ... }`.
#[derive(Debug, Serialize)]
pub struct FramePayload<'a> {
    pub hash: &'a str,
    pub at: DateTime<Utc>,
}
