use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::{sync::watch, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::Bridge,
    models::NotificationRequest,
    net::{Fetch, FetchRequest},
    worker::messages::WorkerMessage,
};

const PROBE_PATH: &str = "/api/recordings";

/// Tracks whether the server is reachable by probing it on an interval.
///
/// Any HTTP response counts as online. The probe must use the raw network:
/// through the cache it would always get an answer.
pub struct ConnectivityMonitor {
    probe: Arc<dyn Fetch>,
    bridge: Bridge,
    interval: Duration,
    online: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn Fetch>, bridge: Bridge, interval: Duration) -> Self {
        let (online, _) = watch::channel(true);
        Self {
            probe,
            bridge,
            interval,
            online,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Probe once and publish the result. Going offline sends the
    /// connectivity-lost notification.
    pub async fn check(&self) -> bool {
        let online = match self.probe.fetch(FetchRequest::get(PROBE_PATH)).await {
            Ok(_) => true,
            Err(err) => {
                debug!("Connectivity probe failed: {err}");
                false
            }
        };

        let was_online = self.online.send_replace(online);
        match (was_online, online) {
            (true, false) => {
                warn!("Server unreachable, now offline");
                self.bridge.send(WorkerMessage::SendNotification(
                    NotificationRequest::connectivity_lost(),
                ));
            }
            (false, true) => info!("Server reachable again"),
            _ => {}
        }
        online
    }

    pub async fn run(self, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = cancel_token.cancelled() => {
                    debug!("Connectivity monitor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics,
        testing::ScriptedFetch,
        worker::{messages::SEND_NOTIFICATION, ControllerSlot, WorkerHandle},
    };
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn transition_to_offline_notifies_once() {
        let network = ScriptedFetch::new();
        network.push_json(200, r#"{"recordings":[]}"#);
        network.push_unreachable();
        network.push_unreachable();
        network.push_json(500, "");

        let slot = ControllerSlot::new();
        let (mailbox_tx, mut mailbox) = mpsc::unbounded_channel();
        slot.claim(WorkerHandle::new(mailbox_tx, network.clone()));
        let (sink, _rx) = diagnostics::channel(4);
        let monitor = ConnectivityMonitor::new(
            network.clone(),
            Bridge::new(slot, network.clone(), sink),
            Duration::from_secs(1),
        );
        let online = monitor.subscribe();

        assert!(monitor.check().await);
        assert!(!monitor.check().await);
        assert!(!*online.borrow());
        assert!(!monitor.check().await);
        assert!(monitor.check().await);
        assert!(monitor.is_online());

        let notice = mailbox.try_recv().unwrap();
        assert_eq!(notice.kind, SEND_NOTIFICATION);
        assert_eq!(
            notice.data["title"],
            "You are no longer connected to the internet!"
        );
        assert!(mailbox.try_recv().is_err());
    }
}
