//! Side channel for failures of fire-and-forget tasks.
//!
//! Nothing waits on those tasks, so their errors are logged and also pushed
//! here for whoever wants to watch. The channel is bounded; when full, new
//! reports are dropped after being logged.

use log::warn;
use tokio::sync::mpsc;

use crate::models::RecordingId;

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The page-side fallback write of a frame never reached the server.
    DirectWriteFailed {
        recording_id: RecordingId,
        error: String,
    },
    /// The worker mailbox could not decode a message.
    MessageRejected { kind: String, error: String },
    /// A message could not be encoded for the worker.
    EncodeFailed { kind: String, error: String },
}

#[derive(Clone)]
pub struct DiagnosticSink {
    tx: mpsc::Sender<Diagnostic>,
}

impl DiagnosticSink {
    pub fn report(&self, diagnostic: Diagnostic) {
        if let Err(err) = self.tx.try_send(diagnostic) {
            warn!("Diagnostic dropped: {err}");
        }
    }
}

pub fn channel(capacity: usize) -> (DiagnosticSink, mpsc::Receiver<Diagnostic>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DiagnosticSink { tx }, rx)
}
