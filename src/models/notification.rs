use serde::{Deserialize, Serialize};

use super::RecordingId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
}

impl NotificationRequest {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn recording_started(id: &RecordingId) -> Self {
        Self::new(
            "Recording started",
            format!("Recording started for recording {id}."),
        )
    }

    pub fn recording_stopped(id: &RecordingId) -> Self {
        Self::new(
            "Recording finished",
            format!("Recording finished for recording {id}."),
        )
    }

    pub fn connectivity_lost() -> Self {
        Self::new(
            "You are no longer connected to the internet!",
            "You are offline, starting a recording is not possible.",
        )
    }
}
