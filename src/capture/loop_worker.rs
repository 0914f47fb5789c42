use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use image::imageops::{self, FilterType};
use tokio::{
    sync::{watch, Semaphore},
    task::JoinHandle,
    time::{Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::{Bridge, SendOutcome},
    fingerprint,
    metrics::{CaptureMetrics, MetricsCollector},
    models::{FrameRecord, RecordingId},
    worker::messages::WorkerMessage,
};

use super::{
    preview::{Preview, PreviewSink},
    source::FrameSource,
};

// Set to true to enable per-tick logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub interval: Duration,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub components_x: u32,
    pub components_y: u32,
    pub punch: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            canvas_width: 300,
            canvas_height: 150,
            components_x: fingerprint::DEFAULT_COMPONENTS_X,
            components_y: fingerprint::DEFAULT_COMPONENTS_Y,
            punch: fingerprint::DEFAULT_PUNCH,
        }
    }
}

/// Everything a capture loop reads from. Shared by every render it spawns.
pub struct CaptureLoop {
    pub source: SharedSource,
    pub config: CaptureConfig,
    pub recording: watch::Receiver<Option<RecordingId>>,
    pub bridge: Bridge,
    pub preview: Arc<dyn PreviewSink>,
    pub metrics: MetricsCollector,
}

struct RenderedFrame {
    hash: String,
    sample_ms: u64,
    hash_ms: u64,
    preview_ms: u64,
}

impl CaptureLoop {
    /// Tick until cancelled. A tick that finds the previous render still
    /// pending aborts it first; the single permit keeps at most one hash
    /// computation running.
    pub async fn run(self, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let state = Arc::new(self);
        let permits = Arc::new(Semaphore::new(1));
        let mut pending: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(previous) = pending.take() {
                        if !previous.is_finished() {
                            previous.abort();
                            state.metrics.record_cancelled().await;
                            log_debug!("Previous render still pending, cancelled it");
                        }
                    }

                    let state = Arc::clone(&state);
                    let permits = Arc::clone(&permits);
                    pending = Some(tokio::spawn(async move {
                        if let Err(err) = state.capture_once(permits).await {
                            log_error!("capture failed: {err:#}");
                        }
                    }));
                }
                _ = cancel_token.cancelled() => {
                    if let Some(previous) = pending.take() {
                        previous.abort();
                    }
                    log_info!("capture loop shutting down");
                    break;
                }
            }
        }
    }

    async fn capture_once(&self, permits: Arc<Semaphore>) -> Result<()> {
        let permit = permits
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("render semaphore closed"))?;

        let captured_at = Utc::now();
        let started = Instant::now();

        let rendered = tokio::task::spawn_blocking({
            let source = Arc::clone(&self.source);
            let config = self.config.clone();
            let preview = Arc::clone(&self.preview);
            move || {
                let _permit = permit;
                render_frame(&source, &config, preview.as_ref())
            }
        })
        .await
        .context("render worker join failed")??;

        let recording = self.recording.borrow().clone();
        let emitted = match recording {
            Some(recording_id) => {
                let record = FrameRecord::new(recording_id, rendered.hash.clone(), captured_at);
                let outcome = self.bridge.send(WorkerMessage::RecordFrame(record));
                outcome != SendOutcome::Dropped
            }
            None => false,
        };

        let system = self.metrics.sample_system_metrics().await;
        let total_ms = started.elapsed().as_millis() as u64;
        log_debug!(
            "Frame {} in {total_ms}ms (sample: {}ms, hash: {}ms, preview: {}ms, emitted: {emitted})",
            rendered.hash,
            rendered.sample_ms,
            rendered.hash_ms,
            rendered.preview_ms
        );

        self.metrics
            .record_capture(CaptureMetrics {
                timestamp: captured_at,
                sample_ms: rendered.sample_ms,
                hash_ms: rendered.hash_ms,
                preview_ms: rendered.preview_ms,
                total_ms,
                emitted,
                cpu_percent: system.cpu_percent,
                memory_mb: system.memory_mb,
            })
            .await;

        Ok(())
    }
}

/// Grab a frame, squeeze it onto the canvas, hash it and draw the decoded
/// preview. Blocking.
fn render_frame(
    source: &Mutex<Box<dyn FrameSource>>,
    config: &CaptureConfig,
    preview: &dyn PreviewSink,
) -> Result<RenderedFrame> {
    let sample_start = std::time::Instant::now();
    let frame = {
        let mut guard = source
            .lock()
            .map_err(|_| anyhow!("frame source lock poisoned"))?;
        guard.next_frame()?
    };
    let canvas = imageops::resize(
        &frame,
        config.canvas_width,
        config.canvas_height,
        FilterType::Triangle,
    );
    let sample_ms = sample_start.elapsed().as_millis() as u64;

    let hash_start = std::time::Instant::now();
    let hash = fingerprint::encode(
        canvas.as_raw(),
        config.canvas_width,
        config.canvas_height,
        config.components_x,
        config.components_y,
    )?;
    let hash_ms = hash_start.elapsed().as_millis() as u64;

    let preview_start = std::time::Instant::now();
    let rgba = fingerprint::decode(&hash, config.canvas_width, config.canvas_height, config.punch)?;
    let drawn = Preview {
        hash: hash.clone(),
        width: config.canvas_width,
        height: config.canvas_height,
        rgba,
    };
    if let Err(err) = preview.show(&drawn) {
        log_warn!("preview update failed: {err:#}");
    }
    let preview_ms = preview_start.elapsed().as_millis() as u64;

    Ok(RenderedFrame {
        hash,
        sample_ms,
        hash_ms,
        preview_ms,
    })
}
