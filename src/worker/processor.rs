use std::time::Duration;

use tokio::sync::Mutex;

use super::{sync_queue::SyncQueue, SyncError};
use crate::net::RecordingApi;

// Set to true to log every drained entry
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Pause after an entry that had no recording to send to.
pub const IDLE_ENTRY_THROTTLE: Duration = Duration::from_millis(350);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub persisted: usize,
    pub skipped: usize,
}

/// Drains the sync queue newest-first and stops at the first transport failure.
pub struct SyncProcessor {
    api: RecordingApi,
    idle_throttle: Duration,
}

impl SyncProcessor {
    pub fn new(api: RecordingApi) -> Self {
        Self {
            api,
            idle_throttle: IDLE_ENTRY_THROTTLE,
        }
    }

    /// One drain cycle. The queue lock is only held for a single pop or
    /// restore, never across the network call or the throttle sleep.
    pub async fn drain(&self, queue: &Mutex<SyncQueue>) -> Result<DrainReport, SyncError> {
        let mut report = DrainReport::default();

        loop {
            let Some(entry) = queue.lock().await.pop_latest() else {
                break;
            };

            let Some(recording_id) = entry.record.recording_id().cloned() else {
                log_debug!("Skipping frame #{} with no recording", entry.position);
                report.skipped += 1;
                tokio::time::sleep(self.idle_throttle).await;
                continue;
            };

            match self.api.append_frame(&recording_id, &entry.record).await {
                Ok(status) => {
                    log_debug!(
                        "Synced frame #{} of recording {recording_id} (status {status})",
                        entry.position
                    );
                    report.persisted += 1;
                }
                Err(source) => {
                    let position = entry.position;
                    let attempts = entry.attempts + 1;
                    let remaining = {
                        let mut guard = queue.lock().await;
                        guard.restore_front(entry);
                        guard.len()
                    };
                    log_warn!(
                        "Sync of frame #{position} failed (attempt {attempts}), {remaining} frames left queued: {source}"
                    );
                    return Err(SyncError::Interrupted {
                        source,
                        persisted: report.persisted,
                        remaining,
                    });
                }
            }
        }

        if report.persisted > 0 || report.skipped > 0 {
            log_info!(
                "Drain complete: {} persisted, {} skipped",
                report.persisted,
                report.skipped
            );
        }
        Ok(report)
    }
}
