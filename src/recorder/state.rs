use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::RecordingId;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecorderStatus {
    #[default]
    Idle,
    Starting,
    Recording,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecorderState {
    pub status: RecorderStatus,
    pub recording_id: Option<RecordingId>,
    pub started_at: Option<DateTime<Utc>>,
}

impl RecorderState {
    pub fn begin_start(&mut self) {
        self.status = RecorderStatus::Starting;
        self.recording_id = None;
        self.started_at = None;
    }

    pub fn begin_recording(&mut self, recording_id: RecordingId) {
        self.status = RecorderStatus::Recording;
        self.recording_id = Some(recording_id);
        self.started_at = Some(Utc::now());
    }

    /// Back to idle, returning the recording that was active.
    pub fn reset(&mut self) -> Option<RecordingId> {
        self.status = RecorderStatus::Idle;
        self.started_at = None;
        self.recording_id.take()
    }
}
