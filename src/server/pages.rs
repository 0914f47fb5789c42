//! HTML shell pages. `/recordings/{id}.html` is a template with the id
//! substituted into `$$$RECORDING_ID$$$`.

use std::path::Path as FsPath;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use log::warn;

use super::ApiState;
use crate::models::RecordingId;

const RECORDING_ID_PLACEHOLDER: &str = "$$$RECORDING_ID$$$";

pub async fn index_page(State(state): State<ApiState>) -> Response {
    serve_page(&state, "index").await
}

pub async fn recordings_page(State(state): State<ApiState>) -> Response {
    serve_page(&state, "recordings").await
}

pub async fn recording_page(
    State(state): State<ApiState>,
    Path(file): Path<String>,
) -> Response {
    let Some(recording_id) = file.strip_suffix(".html") else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let id = RecordingId::from(recording_id);
    match state.store.exists(&id).await {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            warn!("Failed to look up recording {id}: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match load_page(&state, "recording").await {
        Some(template) => Html(template.replace(RECORDING_ID_PLACEHOLDER, id.as_str())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve_page(state: &ApiState, name: &str) -> Response {
    match load_page(state, name).await {
        Some(contents) => Html(contents).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn load_page(state: &ApiState, name: &str) -> Option<String> {
    let dir = state.pages_dir.as_deref()?;
    read_page(dir, name).await
}

async fn read_page(dir: &FsPath, name: &str) -> Option<String> {
    let path = dir.join(format!("{name}.html"));
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Some(contents),
        Err(err) => {
            warn!("Failed to read page {}: {err}", path.display());
            None
        }
    }
}
