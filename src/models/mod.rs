pub mod frame;
pub mod notification;
pub mod recording;

pub use frame::{FramePayload, FrameRecord, RecordingId};
pub use notification::NotificationRequest;
pub use recording::{with_durations, RecordingEntry, RecordingSummary, TimelineItem};
