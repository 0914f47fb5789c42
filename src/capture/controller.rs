use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::CaptureLoop;

/// Owns the running capture loop, if any.
pub struct CaptureController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start_capture(&mut self, capture: CaptureLoop) -> Result<()> {
        if self.handle.is_some() {
            bail!("capture already active");
        }

        info!(
            "Starting capture every {}ms on a {}x{} canvas",
            capture.config.interval.as_millis(),
            capture.config.canvas_width,
            capture.config.canvas_height
        );

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(capture.run(cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop_capture(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("capture loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bridge::Bridge,
        capture::{loop_worker::CaptureConfig, preview::NoPreview, source::PatternSource},
        diagnostics,
        metrics::MetricsCollector,
        testing::ScriptedFetch,
        worker::ControllerSlot,
    };
    use std::sync::{Arc, Mutex};
    use tokio::sync::watch;

    fn capture_loop() -> CaptureLoop {
        let (sink, _rx) = diagnostics::channel(4);
        let (_tx, recording) = watch::channel(None);
        CaptureLoop {
            source: Arc::new(Mutex::new(Box::new(PatternSource::new(8, 8)))),
            config: CaptureConfig {
                canvas_width: 8,
                canvas_height: 8,
                ..CaptureConfig::default()
            },
            recording,
            bridge: Bridge::new(ControllerSlot::new(), ScriptedFetch::new(), sink),
            preview: Arc::new(NoPreview),
            metrics: MetricsCollector::new(),
        }
    }

    #[tokio::test]
    async fn refuses_second_start_and_stops_cleanly() {
        let mut controller = CaptureController::new();
        controller.start_capture(capture_loop()).unwrap();
        assert!(controller.is_running());
        assert!(controller.start_capture(capture_loop()).is_err());

        controller.stop_capture().await.unwrap();
        assert!(!controller.is_running());
        controller.stop_capture().await.unwrap();
    }
}
