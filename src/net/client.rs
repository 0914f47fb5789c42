use std::sync::Arc;

use log::warn;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::{Fetch, FetchRequest, FetchResponse, TransportError};
use crate::models::{FrameRecord, RecordingId};

const RECORDINGS_PATH: &str = "/api/recordings";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The cache interceptor answered with its `{"error":"offline"}` placeholder.
    #[error("server unreachable, got the offline placeholder")]
    Offline,
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedBody {
    recording_id: Option<RecordingId>,
    error: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ReadItem {
    pub hash: String,
    pub duration: i64,
}

#[derive(Deserialize)]
struct ReadBody {
    items: Vec<ReadItem>,
}

/// Typed client for the recording API over any [`Fetch`].
#[derive(Clone)]
pub struct RecordingApi {
    fetcher: Arc<dyn Fetch>,
}

impl RecordingApi {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self { fetcher }
    }

    pub async fn create(&self) -> Result<RecordingId, ApiError> {
        let response = self.fetcher.fetch(FetchRequest::post(RECORDINGS_PATH)).await?;
        let body: CreatedBody = decode(&response)?;
        if body.error.as_deref() == Some("offline") {
            return Err(ApiError::Offline);
        }
        body.recording_id
            .ok_or_else(|| ApiError::Decode("response carries no recordingId".to_string()))
    }

    /// PATCH a single frame. Any HTTP status counts as delivered; only a
    /// transport failure is an error.
    pub async fn append_frame(
        &self,
        recording_id: &RecordingId,
        frame: &FrameRecord,
    ) -> Result<u16, TransportError> {
        let url = format!("{RECORDINGS_PATH}/{recording_id}");
        let request = FetchRequest::patch_json(&url, &frame.to_entry()).map_err(|err| {
            TransportError::InvalidUrl {
                url: url.clone(),
                message: format!("unserializable frame: {err}"),
            }
        })?;

        let response = self.fetcher.fetch(request).await?;
        if !response.is_success() {
            warn!(
                "Frame for recording {recording_id} answered with status {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            );
        }
        Ok(response.status)
    }

    /// The server's timeline for one recording.
    pub async fn read(&self, recording_id: &RecordingId) -> Result<Vec<ReadItem>, ApiError> {
        let response = self
            .fetcher
            .fetch(FetchRequest::get(format!("{RECORDINGS_PATH}/{recording_id}")))
            .await?;
        expect_success(&response)?;
        let body: ReadBody = decode(&response)?;
        Ok(body.items)
    }
}

fn expect_success(response: &FetchResponse) -> Result<(), ApiError> {
    if response.is_success() {
        if let Ok(Value::Object(map)) = response.json::<Value>() {
            if map.get("error").and_then(Value::as_str) == Some("offline") {
                return Err(ApiError::Offline);
            }
        }
        return Ok(());
    }
    Err(ApiError::Status {
        status: response.status,
        body: String::from_utf8_lossy(&response.body).into_owned(),
    })
}

fn decode<T: serde::de::DeserializeOwned>(response: &FetchResponse) -> Result<T, ApiError> {
    response
        .json()
        .map_err(|err| ApiError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetch;
    use chrono::Utc;

    #[tokio::test]
    async fn create_reads_recording_id() {
        let fetch = ScriptedFetch::new();
        fetch.push_json(200, r#"{"recordingId":"r1"}"#);
        let api = RecordingApi::new(fetch.clone());

        assert_eq!(api.create().await.unwrap(), RecordingId::from("r1"));
        assert_eq!(fetch.requests()[0].method, reqwest::Method::POST);
    }

    #[tokio::test]
    async fn create_recognises_offline_placeholder() {
        let fetch = ScriptedFetch::new();
        fetch.push_json(200, r#"{"error":"offline"}"#);
        let api = RecordingApi::new(fetch);

        assert!(matches!(api.create().await, Err(ApiError::Offline)));
    }

    #[tokio::test]
    async fn append_frame_treats_error_status_as_delivered() {
        let fetch = ScriptedFetch::new();
        fetch.push_json(404, r#"{"error":"Recording not found"}"#);
        let api = RecordingApi::new(fetch.clone());
        let id = RecordingId::from("gone");
        let frame = FrameRecord::new(id.clone(), "LEHV6nWB2yk8pyo0adR*.7kCMdnj".into(), Utc::now());

        assert_eq!(api.append_frame(&id, &frame).await.unwrap(), 404);

        let sent = &fetch.requests()[0];
        assert_eq!(sent.url, "/api/recordings/gone");
        let body: Value = serde_json::from_slice(sent.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["hash"], "LEHV6nWB2yk8pyo0adR*.7kCMdnj");
        assert!(body.get("at").is_some());
        assert!(body.get("recordingId").is_none());
    }

    #[tokio::test]
    async fn append_frame_surfaces_transport_failure() {
        let fetch = ScriptedFetch::new();
        fetch.push_unreachable();
        let api = RecordingApi::new(fetch);
        let id = RecordingId::from("r1");
        let frame = FrameRecord::new(id.clone(), "LEHV6nWB2yk8pyo0adR*.7kCMdnj".into(), Utc::now());

        assert!(api.append_frame(&id, &frame).await.is_err());
    }

    #[tokio::test]
    async fn read_decodes_items_and_rejects_error_statuses() {
        let fetch = ScriptedFetch::new();
        fetch.push_json(200, r#"{"items":[{"hash":"a","duration":40},{"hash":"b","duration":0}]}"#);
        fetch.push_json(404, r#"{"error":"Recording not found"}"#);
        fetch.push_json(200, r#"{"error":"offline"}"#);
        let api = RecordingApi::new(fetch.clone());
        let id = RecordingId::from("r1");

        let items = api.read(&id).await.unwrap();
        assert_eq!(
            items,
            vec![
                ReadItem { hash: "a".into(), duration: 40 },
                ReadItem { hash: "b".into(), duration: 0 },
            ]
        );
        assert_eq!(fetch.requests()[0].url, "/api/recordings/r1");

        assert!(matches!(api.read(&id).await, Err(ApiError::Status { status: 404, .. })));
        assert!(matches!(api.read(&id).await, Err(ApiError::Offline)));
    }
}
