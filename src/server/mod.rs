//! HTTP surface of the recording store.
//!
//! Routes:
//! - `GET /api/recordings`, `POST /api/recordings`
//! - `GET /api/recordings/:id`, `PATCH /api/recordings/:id`
//! - `/`, `/recordings`, `/recordings/:id.html` shell pages
//! - everything else falls through to the public directory, when configured

mod pages;
pub(crate) mod routes;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    routing::get,
    Router,
};
use log::info;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use crate::store::RecordingStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn RecordingStore>,
    pub pages_dir: Option<PathBuf>,
}

pub fn create_router(state: ApiState, public_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route(
            "/api/recordings",
            get(routes::list_recordings).post(routes::create_recording),
        )
        .route(
            "/api/recordings/:recording_id",
            get(routes::read_recording).patch(routes::append_frames),
        )
        .route("/", get(pages::index_page))
        .route("/recordings", get(pages::recordings_page))
        .route("/recordings/:file", get(pages::recording_page))
        .with_state(state);

    match public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

/// Bind `addr` and serve until `shutdown` fires. Returns the bound address
/// through `on_bound` so callers may pass port 0.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
    on_bound: impl FnOnce(SocketAddr),
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to read bound address")?;
    info!("Recording API listening on http://{local_addr}");
    on_bound(local_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server terminated")?;

    info!("Recording API stopped");
    Ok(())
}
