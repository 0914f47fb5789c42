//! Wires the page side and the worker side of a capture agent together.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::Bridge,
    capture::{
        CaptureController, CaptureLoop, DirectorySource, FrameSource, NoPreview, PatternSource,
        PngPreview, PreviewSink,
    },
    db::{Database, CACHE_SCHEMA},
    diagnostics,
    metrics::MetricsCollector,
    net::{Fetch, NetworkFetch, RecordingApi},
    recorder::{ConnectivityMonitor, RecordingController},
    settings::AgentSettings,
    worker::{
        notifications::{LogNotifier, NotificationDispatcher, NotificationPermission, Permission},
        ControllerSlot, ServiceWorker,
    },
};

const DIAGNOSTIC_CAPACITY: usize = 64;
const PATTERN_SIZE: (u32, u32) = (640, 360);
const DRAIN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub server_url: String,
    /// Still images to replay; a synthetic pattern when unset.
    pub frames_dir: Option<PathBuf>,
    pub preview_path: Option<PathBuf>,
    /// Start a recording as soon as the agent is up.
    pub record: bool,
    /// How long shutdown waits for queued frames to sync.
    pub drain_grace: Duration,
    pub debug: bool,
}

impl AgentOptions {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            frames_dir: None,
            preview_path: None,
            record: false,
            drain_grace: Duration::from_secs(5),
            debug: false,
        }
    }
}

pub struct Agent {
    bridge: Bridge,
    recorder: RecordingController,
    capture: CaptureController,
    worker: Option<ServiceWorker>,
    metrics: MetricsCollector,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    drain_grace: Duration,
}

impl Agent {
    pub async fn start(settings: AgentSettings, options: AgentOptions) -> Result<Self> {
        let network: Arc<dyn Fetch> = Arc::new(
            NetworkFetch::new(&options.server_url, settings.request_timeout())
                .with_context(|| format!("invalid server url {}", options.server_url))?,
        );
        let cancel = CancellationToken::new();
        let controller = ControllerSlot::new();
        let (sink, mut diagnostics_rx) = diagnostics::channel(DIAGNOSTIC_CAPACITY);

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(async move {
            while let Some(diagnostic) = diagnostics_rx.recv().await {
                debug!("diagnostic: {diagnostic:?}");
            }
        }));

        let answer = if settings.notifications.enabled {
            Permission::Granted
        } else {
            Permission::Denied
        };
        let permission = NotificationPermission::new(Permission::Default, answer);

        let worker = if settings.worker_enabled {
            let cache_db = match &settings.cache_db_path {
                Some(path) => Database::new(path.clone(), &CACHE_SCHEMA)?,
                None => Database::in_memory(&CACHE_SCHEMA)?,
            };
            let dispatcher = NotificationDispatcher::new(permission.clone(), Arc::new(LogNotifier));
            match ServiceWorker::start(
                settings.worker_options(options.debug),
                Arc::clone(&network),
                cache_db,
                dispatcher,
                controller.clone(),
                sink.clone(),
                cancel.child_token(),
            )
            .await
            {
                Ok(worker) => Some(worker),
                Err(err) => {
                    warn!("Worker install failed, frames will be written directly: {err}");
                    None
                }
            }
        } else {
            info!("Worker disabled, frames will be written directly");
            None
        };

        let bridge = Bridge::new(controller, Arc::clone(&network), sink);

        let monitor = ConnectivityMonitor::new(
            Arc::clone(&network),
            bridge.clone(),
            settings.probe_interval(options.debug),
        );
        monitor.check().await;
        let recorder = RecordingController::new(bridge.clone(), permission, monitor.subscribe());
        tasks.push(tokio::spawn(monitor.run(cancel.child_token())));

        let source: Box<dyn FrameSource> = match &options.frames_dir {
            Some(dir) => Box::new(DirectorySource::open(dir)?),
            None => Box::new(PatternSource::new(PATTERN_SIZE.0, PATTERN_SIZE.1)),
        };
        let preview: Arc<dyn PreviewSink> = match &options.preview_path {
            Some(path) => Arc::new(PngPreview::new(path.clone())),
            None => Arc::new(NoPreview),
        };

        let metrics = MetricsCollector::new();
        let mut capture = CaptureController::new();
        capture.start_capture(CaptureLoop {
            source: Arc::new(Mutex::new(source)),
            config: settings.capture_config(),
            recording: recorder.subscribe(),
            bridge: bridge.clone(),
            preview,
            metrics: metrics.clone(),
        })?;

        let agent = Self {
            bridge,
            recorder,
            capture,
            worker,
            metrics,
            cancel,
            tasks,
            drain_grace: options.drain_grace,
        };

        if options.record {
            if let Err(err) = agent.recorder.start_recording().await {
                warn!("Could not start recording: {err}");
            }
        }

        Ok(agent)
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn recorder(&self) -> &RecordingController {
        &self.recorder
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Frames the worker still holds; always 0 without a worker.
    pub async fn pending_frames(&self) -> usize {
        match &self.worker {
            Some(worker) => worker.context().pending().await,
            None => 0,
        }
    }

    /// Stop the recording and the capture loop, give the worker a moment to
    /// sync what it holds, then stop everything else.
    pub async fn shutdown(mut self) -> Result<()> {
        let mut stopped = None;
        if self.recorder.get_state().await.recording_id.is_some() {
            match self.recorder.stop_recording().await {
                Ok(id) => stopped = Some(id),
                Err(err) => warn!("Failed to stop recording: {err}"),
            }
        }
        self.capture.stop_capture().await?;

        let deadline = tokio::time::Instant::now() + self.drain_grace;
        while self.pending_frames().await > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL).await;
        }

        if let Some(id) = stopped {
            match RecordingApi::new(self.bridge.fetcher()).read(&id).await {
                Ok(items) => info!("Recording {id} holds {} frames on the server", items.len()),
                Err(err) => warn!("Could not read back recording {id}: {err}"),
            }
        }

        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }

        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let snapshot = self.metrics.get_snapshot().await;
        info!(
            "Agent stopped: {} captures, {} emitted, {} cancelled",
            snapshot.capture_count, snapshot.emitted_count, snapshot.cancelled_count
        );
        Ok(())
    }
}
