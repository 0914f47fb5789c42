//! Page-side entry point to the worker.
//!
//! While a worker controls the page, messages go to its mailbox and requests
//! go through its cache. Without one, frames are written straight to the
//! server and everything else is dropped.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink},
    net::{Fetch, RecordingApi},
    worker::{messages::WorkerMessage, ControllerSlot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Posted,
    DirectWrite,
    Dropped,
}

#[derive(Clone)]
pub struct Bridge {
    controller: ControllerSlot,
    network: Arc<dyn Fetch>,
    diagnostics: DiagnosticSink,
}

impl Bridge {
    pub fn new(controller: ControllerSlot, network: Arc<dyn Fetch>, diagnostics: DiagnosticSink) -> Self {
        Self {
            controller,
            network,
            diagnostics,
        }
    }

    pub fn is_controlled(&self) -> bool {
        self.controller.current().is_some()
    }

    /// The page's request path: the worker cache when controlled, the raw
    /// network otherwise.
    pub fn fetcher(&self) -> Arc<dyn Fetch> {
        match self.controller.current() {
            Some(worker) => worker.fetcher(),
            None => Arc::clone(&self.network),
        }
    }

    /// Fire-and-forget. Must be called inside a tokio runtime.
    pub fn send(&self, message: WorkerMessage) -> SendOutcome {
        if let Some(worker) = self.controller.current() {
            match message.to_envelope() {
                Ok(envelope) => {
                    if worker.post(envelope) {
                        return SendOutcome::Posted;
                    }
                    debug!("Worker mailbox closed, falling back to direct path");
                }
                Err(err) => {
                    warn!("Failed to encode '{}' message: {err}", message.kind());
                    self.diagnostics.report(Diagnostic::EncodeFailed {
                        kind: message.kind().to_string(),
                        error: err.to_string(),
                    });
                    return SendOutcome::Dropped;
                }
            }
        }

        match message {
            WorkerMessage::RecordFrame(record) => {
                let Some(recording_id) = record.recording_id().cloned() else {
                    debug!("No worker and no recording for frame, dropping it");
                    return SendOutcome::Dropped;
                };

                let api = RecordingApi::new(Arc::clone(&self.network));
                let diagnostics = self.diagnostics.clone();
                tokio::spawn(async move {
                    if let Err(err) = api.append_frame(&recording_id, &record).await {
                        warn!("Direct write for recording {recording_id} failed: {err}");
                        diagnostics.report(Diagnostic::DirectWriteFailed {
                            recording_id,
                            error: err.to_string(),
                        });
                    }
                });
                SendOutcome::DirectWrite
            }
            WorkerMessage::SendNotification(request) => {
                debug!("No worker to show '{}', dropping it", request.title);
                SendOutcome::Dropped
            }
        }
    }
}
