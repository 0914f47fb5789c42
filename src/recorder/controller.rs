use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{watch, Mutex};

use crate::{
    bridge::Bridge,
    models::{NotificationRequest, RecordingId},
    net::{ApiError, RecordingApi},
    worker::{messages::WorkerMessage, notifications::NotificationPermission},
};

use super::{RecorderError, RecorderState, RecorderStatus};

/// The record button: starts and stops recordings and publishes the active
/// recording to the capture loop.
#[derive(Clone)]
pub struct RecordingController {
    state: Arc<Mutex<RecorderState>>,
    current: Arc<watch::Sender<Option<RecordingId>>>,
    bridge: Bridge,
    permission: NotificationPermission,
    online: watch::Receiver<bool>,
}

impl RecordingController {
    pub fn new(bridge: Bridge, permission: NotificationPermission, online: watch::Receiver<bool>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            state: Arc::new(Mutex::new(RecorderState::default())),
            current: Arc::new(current),
            bridge,
            permission,
            online,
        }
    }

    /// The active recording, as seen by the capture loop.
    pub fn subscribe(&self) -> watch::Receiver<Option<RecordingId>> {
        self.current.subscribe()
    }

    pub async fn get_state(&self) -> RecorderState {
        self.state.lock().await.clone()
    }

    pub async fn start_recording(&self) -> Result<RecordingId, RecorderError> {
        if !*self.online.borrow() {
            return Err(RecorderError::Offline);
        }

        {
            let mut state = self.state.lock().await;
            match state.status {
                RecorderStatus::Starting => return Err(RecorderError::StartInFlight),
                RecorderStatus::Recording => {
                    let id = state
                        .recording_id
                        .clone()
                        .ok_or(RecorderError::NotRecording)?;
                    return Err(RecorderError::AlreadyRecording(id));
                }
                RecorderStatus::Idle => state.begin_start(),
            }
        }

        let permission = self.permission.request();
        info!("Starting recording (notification permission {permission:?})");

        let api = RecordingApi::new(self.bridge.fetcher());
        let created = api.create().await;

        let mut state = self.state.lock().await;
        match created {
            Ok(recording_id) => {
                state.begin_recording(recording_id.clone());
                self.current.send_replace(Some(recording_id.clone()));
                drop(state);

                info!("Recording {recording_id} started");
                self.bridge.send(WorkerMessage::SendNotification(
                    NotificationRequest::recording_started(&recording_id),
                ));
                Ok(recording_id)
            }
            Err(err) => {
                state.reset();
                if matches!(err, ApiError::Offline) {
                    warn!("No recording started, server answered offline");
                } else {
                    warn!("No recording started: {err}");
                }
                Err(RecorderError::Api(err))
            }
        }
    }

    pub async fn stop_recording(&self) -> Result<RecordingId, RecorderError> {
        let recording_id = {
            let mut state = self.state.lock().await;
            if state.status != RecorderStatus::Recording {
                return Err(RecorderError::NotRecording);
            }
            state.reset().ok_or(RecorderError::NotRecording)?
        };

        self.current.send_replace(None);
        info!("Recording {recording_id} stopped");
        self.bridge.send(WorkerMessage::SendNotification(
            NotificationRequest::recording_stopped(&recording_id),
        ));
        Ok(recording_id)
    }

    /// Start when idle, stop when recording.
    pub async fn toggle(&self) -> Result<RecorderState, RecorderError> {
        let status = self.state.lock().await.status;
        match status {
            RecorderStatus::Recording => {
                self.stop_recording().await?;
            }
            RecorderStatus::Idle | RecorderStatus::Starting => {
                self.start_recording().await?;
            }
        }
        Ok(self.get_state().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics,
        testing::ScriptedFetch,
        worker::{
            messages::{Envelope, SEND_NOTIFICATION},
            notifications::Permission,
            ControllerSlot, WorkerHandle,
        },
    };
    use tokio::sync::mpsc;

    struct Fixture {
        network: Arc<ScriptedFetch>,
        mailbox: mpsc::UnboundedReceiver<Envelope>,
        online: watch::Sender<bool>,
        controller: RecordingController,
        permission: NotificationPermission,
    }

    /// A controller whose page is claimed by a fake worker that just collects
    /// mailbox messages and forwards requests to the scripted network.
    fn fixture() -> Fixture {
        let network = ScriptedFetch::new();
        let slot = ControllerSlot::new();
        let (mailbox_tx, mailbox) = mpsc::unbounded_channel();
        slot.claim(WorkerHandle::new(mailbox_tx, network.clone()));
        let (sink, _rx) = diagnostics::channel(4);
        let bridge = Bridge::new(slot, network.clone(), sink);
        let (online, online_rx) = watch::channel(true);
        let permission = NotificationPermission::new(Permission::Default, Permission::Granted);
        let controller = RecordingController::new(bridge, permission.clone(), online_rx);
        Fixture {
            network,
            mailbox,
            online,
            controller,
            permission,
        }
    }

    #[tokio::test]
    async fn start_and_stop_publish_active_recording() {
        let mut fx = fixture();
        fx.network.push_json(200, r#"{"recordingId":"r1"}"#);
        let active = fx.controller.subscribe();

        let id = fx.controller.start_recording().await.unwrap();
        assert_eq!(id.as_str(), "r1");
        assert_eq!(active.borrow().clone(), Some(id.clone()));
        assert_eq!(fx.permission.current(), Permission::Granted);

        let started = fx.mailbox.recv().await.unwrap();
        assert_eq!(started.kind, SEND_NOTIFICATION);
        assert_eq!(started.data["title"], "Recording started");

        assert_eq!(fx.controller.stop_recording().await.unwrap(), id);
        assert!(active.borrow().is_none());
        let stopped = fx.mailbox.recv().await.unwrap();
        assert_eq!(stopped.data["title"], "Recording finished");
    }

    #[tokio::test]
    async fn refuses_to_start_while_offline() {
        let fx = fixture();
        fx.online.send_replace(false);

        assert!(matches!(
            fx.controller.start_recording().await,
            Err(RecorderError::Offline)
        ));
        assert!(fx.network.requests().is_empty());
    }

    #[tokio::test]
    async fn offline_placeholder_starts_nothing() {
        let fx = fixture();
        fx.network.push_json(200, r#"{"error":"offline"}"#);

        let err = fx.controller.start_recording().await.unwrap_err();
        assert!(matches!(err, RecorderError::Api(ApiError::Offline)));
        assert_eq!(fx.controller.get_state().await.status, RecorderStatus::Idle);
        assert!(fx.controller.subscribe().borrow().is_none());
    }

    #[tokio::test]
    async fn toggle_alternates_between_start_and_stop() {
        let fx = fixture();
        fx.network.push_json(200, r#"{"recordingId":"r1"}"#);

        let state = fx.controller.toggle().await.unwrap();
        assert_eq!(state.status, RecorderStatus::Recording);
        let state = fx.controller.toggle().await.unwrap();
        assert_eq!(state.status, RecorderStatus::Idle);
        assert!(matches!(
            fx.controller.stop_recording().await,
            Err(RecorderError::NotRecording)
        ));
    }
}
