//! The background worker: owns the sync queue, the response cache and the
//! notification dispatcher, and talks to the page side only through its
//! mailbox and the controller slot.

pub mod background_sync;
pub mod cache;
pub mod messages;
pub mod notifications;
pub mod processor;
pub mod sync_queue;

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    db::Database,
    diagnostics::{Diagnostic, DiagnosticSink},
    net::{Fetch, RecordingApi, TransportError},
};

use background_sync::{BackgroundSync, BackoffPolicy, SyncHandler, SyncTag};
use cache::{CacheError, CacheManager};
use messages::{Envelope, MessageError, WorkerMessage};
use notifications::{DispatchOutcome, NotificationDispatcher};
use processor::SyncProcessor;
use sync_queue::SyncQueue;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("drain stopped after {persisted} frames, {remaining} still queued: {source}")]
    Interrupted {
        source: TransportError,
        persisted: usize,
        remaining: usize,
    },
    #[error("background sync is not running")]
    Closed,
}

/// How the worker handled one mailbox message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Queued { position: u64 },
    Notified(DispatchOutcome),
    Ignored { kind: String },
    Malformed { kind: String, error: String },
}

/// Sending half of a running worker, as seen by the page.
#[derive(Clone)]
pub struct WorkerHandle {
    mailbox: mpsc::UnboundedSender<Envelope>,
    fetcher: Arc<dyn Fetch>,
}

impl WorkerHandle {
    pub(crate) fn new(mailbox: mpsc::UnboundedSender<Envelope>, fetcher: Arc<dyn Fetch>) -> Self {
        Self { mailbox, fetcher }
    }

    /// Post without waiting. False once the worker has stopped.
    pub fn post(&self, envelope: Envelope) -> bool {
        self.mailbox.send(envelope).is_ok()
    }

    /// The intercepting request path.
    pub fn fetcher(&self) -> Arc<dyn Fetch> {
        Arc::clone(&self.fetcher)
    }
}

/// The slot a worker claims to control the page. Empty until activation.
#[derive(Clone)]
pub struct ControllerSlot {
    tx: Arc<watch::Sender<Option<WorkerHandle>>>,
}

impl Default for ControllerSlot {
    fn default() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }
}

impl ControllerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, handle: WorkerHandle) {
        self.tx.send_replace(Some(handle));
    }

    pub fn release(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<WorkerHandle> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<WorkerHandle>> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub cache_name: String,
    pub seed_paths: Vec<String>,
    pub backoff: BackoffPolicy,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            cache_name: cache::DEFAULT_CACHE_NAME.to_string(),
            seed_paths: cache::DEFAULT_SEED_PATHS
                .iter()
                .map(|path| path.to_string())
                .collect(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// State shared by every worker task. Built once at start-up.
pub struct WorkerContext {
    queue: Mutex<SyncQueue>,
    processor: SyncProcessor,
    notifications: NotificationDispatcher,
}

impl WorkerContext {
    pub fn new(processor: SyncProcessor, notifications: NotificationDispatcher) -> Self {
        Self {
            queue: Mutex::new(SyncQueue::new()),
            processor,
            notifications,
        }
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn handle_message(&self, sync: &BackgroundSync, envelope: Envelope) -> MessageOutcome {
        match WorkerMessage::parse(envelope) {
            Ok(WorkerMessage::RecordFrame(record)) => {
                let position = self.queue.lock().await.push(record);
                if let Err(err) = sync.register(SyncTag::SyncFrames) {
                    warn!("Frame #{position} queued but sync not registered: {err}");
                }
                MessageOutcome::Queued { position }
            }
            Ok(WorkerMessage::SendNotification(request)) => {
                MessageOutcome::Notified(self.notifications.dispatch(&request).await)
            }
            Err(MessageError::Unknown(kind)) => MessageOutcome::Ignored { kind },
            Err(MessageError::Malformed { kind, source }) => MessageOutcome::Malformed {
                kind,
                error: source.to_string(),
            },
        }
    }
}

#[async_trait]
impl SyncHandler for WorkerContext {
    async fn on_sync(&self, tag: SyncTag) -> Result<(), SyncError> {
        match tag {
            SyncTag::SyncFrames => self.processor.drain(&self.queue).await.map(|_| ()),
        }
    }
}

/// A running worker: cache installed and activated, page claimed.
pub struct ServiceWorker {
    context: Arc<WorkerContext>,
    controller: ControllerSlot,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceWorker {
    /// Install the seed cache, evict stale generations, spawn the worker
    /// tasks and claim the page. The processor writes through `network`
    /// directly; only page-side requests go through the cache.
    pub async fn start(
        options: WorkerOptions,
        network: Arc<dyn Fetch>,
        cache_db: Database,
        notifications: NotificationDispatcher,
        controller: ControllerSlot,
        diagnostics: DiagnosticSink,
        cancel: CancellationToken,
    ) -> Result<Self, CacheError> {
        let cache = Arc::new(CacheManager::new(
            cache_db,
            options.cache_name.clone(),
            Arc::clone(&network),
        ));
        cache.install(&options.seed_paths).await?;
        cache.activate().await?;

        let processor = SyncProcessor::new(RecordingApi::new(network));
        let context = Arc::new(WorkerContext::new(processor, notifications));

        let (sync, sync_task) = BackgroundSync::spawn(
            Arc::clone(&context) as Arc<dyn SyncHandler>,
            options.backoff.clone(),
            cancel.clone(),
        );

        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let mailbox_task = tokio::spawn(run_mailbox(
            mailbox_rx,
            Arc::clone(&context),
            sync,
            diagnostics,
            cancel.clone(),
        ));

        info!("Worker active with cache '{}'", cache.generation());
        controller.claim(WorkerHandle::new(mailbox_tx, cache as Arc<dyn Fetch>));

        Ok(Self {
            context,
            controller,
            cancel,
            tasks: vec![sync_task, mailbox_task],
        })
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.context
    }

    /// Release the page and stop every worker task. Queued frames are lost.
    pub async fn shutdown(self) {
        self.controller.release();
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!("Worker task ended abnormally: {err}");
            }
        }

        let left = self.context.pending().await;
        if left > 0 {
            warn!("Worker stopped with {left} frames still queued");
        }
    }
}

async fn run_mailbox(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    context: Arc<WorkerContext>,
    sync: BackgroundSync,
    diagnostics: DiagnosticSink,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            envelope = rx.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        match context.handle_message(&sync, envelope).await {
            MessageOutcome::Ignored { kind } => debug!("Ignoring message of type '{kind}'"),
            MessageOutcome::Malformed { kind, error } => {
                warn!("Rejected '{kind}' message: {error}");
                diagnostics.report(Diagnostic::MessageRejected { kind, error });
            }
            outcome => debug!("Handled message: {outcome:?}"),
        }
    }

    debug!("Worker mailbox closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::CACHE_SCHEMA,
        diagnostics,
        models::{FrameRecord, NotificationRequest},
        testing::ScriptedFetch,
    };
    use chrono::Utc;
    use super::notifications::{LogNotifier, NotificationPermission, Permission};
    use std::time::Duration;

    fn dispatcher(permission: Permission) -> NotificationDispatcher {
        NotificationDispatcher::new(
            NotificationPermission::new(permission, permission),
            Arc::new(LogNotifier),
        )
    }

    fn idle_sync() -> (BackgroundSync, CancellationToken) {
        struct Noop;
        #[async_trait]
        impl SyncHandler for Noop {
            async fn on_sync(&self, _tag: SyncTag) -> Result<(), SyncError> {
                Ok(())
            }
        }
        let cancel = CancellationToken::new();
        let (sync, _) = BackgroundSync::spawn(Arc::new(Noop), BackoffPolicy::default(), cancel.clone());
        (sync, cancel)
    }

    #[tokio::test]
    async fn mailbox_outcomes_cover_every_message_kind() {
        let fetch = ScriptedFetch::new();
        let context = WorkerContext::new(
            SyncProcessor::new(RecordingApi::new(fetch)),
            dispatcher(Permission::Granted),
        );
        let (sync, cancel) = idle_sync();

        let frame = WorkerMessage::RecordFrame(FrameRecord::new(
            "r1".into(),
            "LEHV6nWB2yk8pyo0adR*.7kCMdnj".into(),
            Utc::now(),
        ));
        let outcome = context
            .handle_message(&sync, frame.to_envelope().unwrap())
            .await;
        assert_eq!(outcome, MessageOutcome::Queued { position: 0 });
        assert_eq!(context.pending().await, 1);

        let note = WorkerMessage::SendNotification(NotificationRequest::new("t", "b"));
        let outcome = context.handle_message(&sync, note.to_envelope().unwrap()).await;
        assert_eq!(outcome, MessageOutcome::Notified(DispatchOutcome::Shown));

        let outcome = context
            .handle_message(
                &sync,
                Envelope {
                    kind: "recording:unknown".into(),
                    data: serde_json::Value::Null,
                },
            )
            .await;
        assert_eq!(
            outcome,
            MessageOutcome::Ignored {
                kind: "recording:unknown".into()
            }
        );

        cancel.cancel();
    }

    #[tokio::test]
    async fn start_claims_page_and_syncs_posted_frames() {
        let network = ScriptedFetch::new();
        for _ in 0..cache::DEFAULT_SEED_PATHS.len() {
            network.push_json(200, "{}");
        }
        let controller = ControllerSlot::new();
        let (sink, _diagnostics) = diagnostics::channel(8);
        let worker = ServiceWorker::start(
            WorkerOptions::default(),
            network.clone(),
            Database::in_memory(&CACHE_SCHEMA).unwrap(),
            dispatcher(Permission::Default),
            controller.clone(),
            sink,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let handle = controller.current().expect("worker should control the page");
        let frame = WorkerMessage::RecordFrame(FrameRecord::new(
            "r1".into(),
            "LEHV6nWB2yk8pyo0adR*.7kCMdnj".into(),
            Utc::now(),
        ));
        assert!(handle.post(frame.to_envelope().unwrap()));

        for _ in 0..50 {
            if network.urls().contains(&"/api/recordings/r1".to_string()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(network.urls().contains(&"/api/recordings/r1".to_string()));

        worker.shutdown().await;
        assert!(controller.current().is_none());
    }

    #[tokio::test]
    async fn failed_install_leaves_page_uncontrolled() {
        let network = ScriptedFetch::new();
        network.push_unreachable();
        let controller = ControllerSlot::new();
        let (sink, _diagnostics) = diagnostics::channel(8);

        let result = ServiceWorker::start(
            WorkerOptions::default(),
            network,
            Database::in_memory(&CACHE_SCHEMA).unwrap(),
            dispatcher(Permission::Default),
            controller.clone(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(CacheError::SeedUnreachable { .. })));
        assert!(controller.current().is_none());
    }
}
