use std::{net::SocketAddr, sync::Arc, time::Duration};

use framesync_lib::{
    agent::{Agent, AgentOptions},
    fingerprint,
    net::{NetworkFetch, RecordingApi},
    server::{self, ApiState},
    settings::{AgentSettings, SyncBackoffSettings},
    store::{RecordingStore, SqliteRecordingStore},
};
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;

struct RunningServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

async fn start_server(store: Arc<dyn RecordingStore>, addr: SocketAddr) -> RunningServer {
    let router = server::create_router(
        ApiState {
            store,
            pages_dir: None,
        },
        None,
    );
    let shutdown = CancellationToken::new();
    let (bound_tx, bound_rx) = oneshot::channel();
    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        server::serve(addr, router, token, |bound| {
            let _ = bound_tx.send(bound);
        })
        .await
        .unwrap();
    });

    RunningServer {
        addr: bound_rx.await.unwrap(),
        shutdown,
        task,
    }
}

impl RunningServer {
    async fn stop(self) {
        self.shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

fn fast_settings() -> AgentSettings {
    AgentSettings {
        fps: 20.0,
        canvas_width: 32,
        canvas_height: 16,
        seed_paths: vec!["/api/recordings".to_string()],
        probe_interval_secs: 1,
        sync_backoff: SyncBackoffSettings {
            initial_ms: 50,
            max_ms: 200,
            max_attempts: 100,
        },
        ..AgentSettings::default()
    }
}

fn options(addr: SocketAddr) -> AgentOptions {
    let mut options = AgentOptions::new(format!("http://{addr}"));
    options.record = true;
    options
}

async fn wait_until_synced(agent: &Agent) {
    for _ in 0..100 {
        if agent.pending_frames().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("worker never drained its queue");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_reach_the_store_through_the_worker() {
    let store: Arc<dyn RecordingStore> = Arc::new(SqliteRecordingStore::in_memory().unwrap());
    let server = start_server(Arc::clone(&store), "127.0.0.1:0".parse().unwrap()).await;

    let agent = Agent::start(fast_settings(), options(server.addr)).await.unwrap();
    assert!(agent.bridge().is_controlled());
    let recording_id = agent.recorder().get_state().await.recording_id.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    agent.shutdown().await.unwrap();

    let items = store.read(&recording_id).await.unwrap();
    assert!(!items.is_empty());
    assert!(items.iter().all(|item| fingerprint::is_valid(&item.hash)));
    assert_eq!(items.last().unwrap().duration_ms, 0);

    let network = NetworkFetch::new(&format!("http://{}", server.addr), Duration::from_secs(5)).unwrap();
    let served = RecordingApi::new(Arc::new(network)).read(&recording_id).await.unwrap();
    let served_hashes: Vec<&str> = served.iter().map(|item| item.hash.as_str()).collect();
    let stored_hashes: Vec<&str> = items.iter().map(|item| item.hash.as_str()).collect();
    assert_eq!(served_hashes, stored_hashes);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_captured_offline_sync_after_reconnect() {
    let store: Arc<dyn RecordingStore> = Arc::new(SqliteRecordingStore::in_memory().unwrap());
    let server = start_server(Arc::clone(&store), "127.0.0.1:0".parse().unwrap()).await;
    let addr = server.addr;

    let agent = Agent::start(fast_settings(), options(addr)).await.unwrap();
    let recording_id = agent.recorder().get_state().await.recording_id.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    server.stop().await;
    let before_outage = store.read(&recording_id).await.unwrap().len();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(agent.pending_frames().await > 0);

    let server = start_server(Arc::clone(&store), addr).await;
    agent.recorder().stop_recording().await.unwrap();
    wait_until_synced(&agent).await;

    let after = store.read(&recording_id).await.unwrap().len();
    assert!(after > before_outage);

    agent.shutdown().await.unwrap();
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn without_worker_frames_are_written_directly() {
    let store: Arc<dyn RecordingStore> = Arc::new(SqliteRecordingStore::in_memory().unwrap());
    let server = start_server(Arc::clone(&store), "127.0.0.1:0".parse().unwrap()).await;

    let settings = AgentSettings {
        worker_enabled: false,
        ..fast_settings()
    };
    let agent = Agent::start(settings, options(server.addr)).await.unwrap();
    assert!(!agent.bridge().is_controlled());
    let recording_id = agent.recorder().get_state().await.recording_id.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    agent.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!store.read(&recording_id).await.unwrap().is_empty());
    server.stop().await;
}
