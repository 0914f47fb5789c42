use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::NotificationRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Default,
    Granted,
    Denied,
}

/// Process-wide notification permission.
///
/// `request` only changes a `Default` permission, to the answer configured at
/// start-up; a granted or denied permission sticks.
#[derive(Clone)]
pub struct NotificationPermission {
    state: Arc<watch::Sender<Permission>>,
    answer: Permission,
}

impl NotificationPermission {
    pub fn new(initial: Permission, answer: Permission) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
            answer,
        }
    }

    pub fn current(&self) -> Permission {
        *self.state.borrow()
    }

    pub fn request(&self) -> Permission {
        if self.current() == Permission::Default {
            self.state.send_replace(self.answer);
            info!("Notification permission resolved to {:?}", self.answer);
        }
        self.current()
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, request: &NotificationRequest) -> anyhow::Result<()>;
}

/// Shows notifications as log lines.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, request: &NotificationRequest) -> anyhow::Result<()> {
        info!("[notification] {}: {}", request.title, request.body);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Shown,
    Skipped,
    Failed,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    permission: NotificationPermission,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(permission: NotificationPermission, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            permission,
            notifier,
        }
    }

    /// Show a notification if permission is already granted. Never asks.
    pub async fn dispatch(&self, request: &NotificationRequest) -> DispatchOutcome {
        if self.permission.current() != Permission::Granted {
            debug!("Notification '{}' skipped, permission not granted", request.title);
            return DispatchOutcome::Skipped;
        }

        match self.notifier.show(request).await {
            Ok(()) => DispatchOutcome::Shown,
            Err(err) => {
                warn!("Failed to show notification '{}': {err:#}", request.title);
                DispatchOutcome::Failed
            }
        }
    }
}
