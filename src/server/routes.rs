//! JSON handlers for `/api/recordings`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;
use serde_json::{json, Value};

use super::ApiState;
use crate::{
    fingerprint,
    models::{RecordingEntry, RecordingId, RecordingSummary},
    store::StoreError,
};

const NOT_FOUND_MESSAGE: &str = "Recording not found";
const INVALID_BODY_MESSAGE: &str = "Invalid body. Expected keys 'hash' and 'at'.";
const INVALID_HASH_MESSAGE: &str = "Invalid blurhash";

#[derive(Serialize)]
struct ListResponse {
    recordings: Vec<RecordingSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResponse {
    recording_id: RecordingId,
}

#[derive(Serialize)]
struct ReadResponse {
    items: Vec<ReadItem>,
}

#[derive(Serialize)]
struct ReadItem {
    hash: String,
    duration: i64,
}

/// Why a PATCH payload was refused before reaching the store.
#[derive(Debug, PartialEq)]
pub(crate) enum PayloadRejection {
    /// Entries that are not objects or lack a truthy `hash`/`at`.
    InvalidEntries(Vec<Value>),
    /// Entries whose `hash` fails the fingerprint grammar.
    InvalidHashes(Vec<Value>),
}

/// GET /api/recordings
pub async fn list_recordings(State(state): State<ApiState>) -> Response {
    match state.store.list().await {
        Ok(ids) => Json(ListResponse {
            recordings: ids
                .into_iter()
                .map(|recording_id| RecordingSummary { recording_id })
                .collect(),
        })
        .into_response(),
        Err(err) => internal_error(err),
    }
}

/// POST /api/recordings
pub async fn create_recording(State(state): State<ApiState>) -> Response {
    match state.store.create().await {
        Ok(recording_id) => {
            info!("Recording {recording_id} created");
            Json(CreatedResponse { recording_id }).into_response()
        }
        Err(err) => internal_error(err),
    }
}

/// PATCH /api/recordings/:recording_id
pub async fn append_frames(
    State(state): State<ApiState>,
    Path(recording_id): Path<String>,
    body: Bytes,
) -> Response {
    let id = RecordingId::new(recording_id);

    match state.store.exists(&id).await {
        Ok(true) => {}
        Ok(false) => return not_found(),
        Err(err) => return internal_error(err),
    }

    let raw: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let entries = match parse_entries(&raw) {
        Ok(entries) => entries,
        Err(PayloadRejection::InvalidEntries(entries)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": INVALID_BODY_MESSAGE,
                    "_body": raw,
                    "_entries": entries,
                })),
            )
                .into_response();
        }
        Err(PayloadRejection::InvalidHashes(entries)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": INVALID_HASH_MESSAGE,
                    "_hashes": entries,
                })),
            )
                .into_response();
        }
    };

    match state.store.append(&id, entries).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(StoreError::NotFound(_)) => not_found(),
        Err(StoreError::InvalidFingerprint(hashes)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": INVALID_HASH_MESSAGE, "_hashes": hashes })),
        )
            .into_response(),
        Err(err) => internal_error(err),
    }
}

/// GET /api/recordings/:recording_id
pub async fn read_recording(
    State(state): State<ApiState>,
    Path(recording_id): Path<String>,
) -> Response {
    let id = RecordingId::new(recording_id);
    match state.store.read(&id).await {
        Ok(items) => Json(ReadResponse {
            items: items
                .into_iter()
                .map(|item| ReadItem {
                    hash: item.hash,
                    duration: item.duration_ms,
                })
                .collect(),
        })
        .into_response(),
        Err(StoreError::NotFound(_)) => not_found(),
        Err(err) => internal_error(err),
    }
}

/// Validate a PATCH body: one entry object or an array of them.
pub(crate) fn parse_entries(body: &Value) -> Result<Vec<RecordingEntry>, PayloadRejection> {
    let payload: Vec<&Value> = match body {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let invalid_entries: Vec<Value> = payload
        .iter()
        .filter(|entry| !has_required_keys(entry))
        .map(|entry| (*entry).clone())
        .collect();
    if !invalid_entries.is_empty() {
        return Err(PayloadRejection::InvalidEntries(invalid_entries));
    }

    let invalid_hashes: Vec<Value> = payload
        .iter()
        .filter(|entry| {
            !entry
                .get("hash")
                .and_then(Value::as_str)
                .is_some_and(fingerprint::is_valid)
        })
        .map(|entry| (*entry).clone())
        .collect();
    if !invalid_hashes.is_empty() {
        return Err(PayloadRejection::InvalidHashes(invalid_hashes));
    }

    let mut entries = Vec::with_capacity(payload.len());
    for entry in payload {
        let hash = entry.get("hash").and_then(Value::as_str).unwrap_or_default();
        let Some(at_ms) = entry.get("at").and_then(timestamp_millis) else {
            return Err(PayloadRejection::InvalidEntries(vec![entry.clone()]));
        };
        entries.push(RecordingEntry::new(hash, at_ms));
    }
    Ok(entries)
}

fn has_required_keys(entry: &Value) -> bool {
    let Value::Object(map) = entry else {
        return false;
    };
    map.get("hash").is_some_and(is_truthy) && map.get("at").is_some_and(is_truthy)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `at` is either epoch milliseconds or an RFC 3339 timestamp, and must lie
/// within the range chrono can represent.
fn timestamp_millis(value: &Value) -> Option<i64> {
    let ms = match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|ms| ms.is_finite() && ms.abs() < i64::MAX as f64)
                .map(|ms| ms.round() as i64)
        }),
        Value::String(text) => text.parse::<i64>().ok().or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.timestamp_millis())
        }),
        _ => None,
    }?;
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.timestamp_millis())
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": NOT_FOUND_MESSAGE })),
    )
        .into_response()
}

fn internal_error(err: StoreError) -> Response {
    error!("Recording store failure: {err:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal error" })),
    )
        .into_response()
}
