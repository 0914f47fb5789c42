//! Request plumbing shared by the page side and the worker side.
//!
//! Everything outbound goes through [`Fetch`]. The raw network
//! ([`NetworkFetch`]) and the worker's cache interceptor both implement it,
//! so callers never know which one they hold.

mod client;
mod network;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use client::{ApiError, ReadItem, RecordingApi};
pub use network::NetworkFetch;

/// A failure to get any HTTP response at all. Non-2xx statuses are responses,
/// not transport errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Unreachable { url: String, message: String },
    #[error("request to {url} timed out")]
    TimedOut { url: String },
    #[error("invalid request url {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    /// Absolute URL, or a path resolved against the fetcher's origin.
    pub url: String,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
            content_type: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(url)
        }
    }

    pub fn patch_json<T: serde::Serialize>(
        url: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            method: Method::PATCH,
            url: url.into(),
            body: Some(Bytes::from(serde_json::to_vec(payload)?)),
            content_type: Some("application/json".to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError>;
}
