//! Recording lifecycle on the page side: the record toggle and the
//! connectivity state that gates it.

pub mod connectivity;
pub mod controller;
pub mod state;

use thiserror::Error;

use crate::{models::RecordingId, net::ApiError};

pub use connectivity::ConnectivityMonitor;
pub use controller::RecordingController;
pub use state::{RecorderState, RecorderStatus};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("cannot start a recording while offline")]
    Offline,
    #[error("a recording is already being started")]
    StartInFlight,
    #[error("recording {0} is already active")]
    AlreadyRecording(RecordingId),
    #[error("no recording is active")]
    NotRecording,
    #[error("no recording started: {0}")]
    Api(#[from] ApiError),
}
