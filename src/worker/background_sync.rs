//! Deferred-work triggers for the worker.
//!
//! Callers register a named tag; a single task fires the handler for it.
//! Registrations that pile up while a cycle runs collapse into one follow-up
//! cycle. A failed cycle is retried with exponential backoff until
//! `max_attempts`, after which the tag waits for the next registration.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTag {
    SyncFrames,
}

impl SyncTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTag::SyncFrames => "SyncFrames",
        }
    }
}

#[async_trait]
pub trait SyncHandler: Send + Sync + 'static {
    async fn on_sync(&self, tag: SyncTag) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(300),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

#[derive(Clone)]
pub struct BackgroundSync {
    tx: mpsc::UnboundedSender<SyncTag>,
}

impl BackgroundSync {
    pub fn spawn(
        handler: Arc<dyn SyncHandler>,
        policy: BackoffPolicy,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(rx, handler, policy, cancel));
        (Self { tx }, handle)
    }

    /// Ask for a future `on_sync(tag)` call.
    pub fn register(&self, tag: SyncTag) -> Result<(), SyncError> {
        self.tx.send(tag).map_err(|_| SyncError::Closed)
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<SyncTag>,
    handler: Arc<dyn SyncHandler>,
    policy: BackoffPolicy,
    cancel: CancellationToken,
) {
    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            tag = rx.recv() => match tag {
                Some(tag) => tag,
                None => break,
            },
        };

        let mut tags = vec![first];
        while let Ok(next) = rx.try_recv() {
            if !tags.contains(&next) {
                tags.push(next);
            }
        }

        for tag in tags {
            if !fire(handler.as_ref(), tag, &policy, &cancel).await {
                info!("Background sync stopped while handling {}", tag.as_str());
                return;
            }
        }
    }

    debug!("Background sync loop exited");
}

/// Run `tag` until it succeeds or exhausts its attempts. Returns false when
/// cancelled mid-backoff.
async fn fire(
    handler: &dyn SyncHandler,
    tag: SyncTag,
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
) -> bool {
    let mut attempt = 0;
    loop {
        match handler.on_sync(tag).await {
            Ok(()) => return true,
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    warn!(
                        "Sync '{}' failed {attempt} times, waiting for next registration: {err}",
                        tag.as_str()
                    );
                    return true;
                }

                let delay = policy.delay(attempt);
                warn!(
                    "Sync '{}' failed (attempt {attempt}), retrying in {}ms: {err}",
                    tag.as_str(),
                    delay.as_millis()
                );
                tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TransportError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyHandler {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl SyncHandler for FlakyHandler {
        async fn on_sync(&self, _tag: SyncTag) -> Result<(), SyncError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(SyncError::Interrupted {
                    source: TransportError::Unreachable {
                        url: "test".into(),
                        message: "down".into(),
                    },
                    persisted: 0,
                    remaining: 1,
                })
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
            max_attempts: 10,
        };
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(5));
        assert_eq!(policy.delay(40), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_failed_cycle_after_backoff() {
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            failures: 2,
        });
        let cancel = CancellationToken::new();
        let (sync, task) = BackgroundSync::spawn(handler.clone(), BackoffPolicy::default(), cancel.clone());

        sync.register(SyncTag::SyncFrames).unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            failures: u32::MAX,
        });
        let policy = BackoffPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(10),
            max_attempts: 3,
        };
        let cancel = CancellationToken::new();
        let (sync, task) = BackgroundSync::spawn(handler.clone(), policy, cancel.clone());

        sync.register(SyncTag::SyncFrames).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

        sync.register(SyncTag::SyncFrames).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 6);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn register_after_shutdown_reports_closed() {
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            failures: 0,
        });
        let cancel = CancellationToken::new();
        let (sync, task) = BackgroundSync::spawn(handler, BackoffPolicy::default(), cancel.clone());
        cancel.cancel();
        task.await.unwrap();

        assert!(matches!(sync.register(SyncTag::SyncFrames), Err(SyncError::Closed)));
    }
}
