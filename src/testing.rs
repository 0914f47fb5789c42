//! Test doubles shared by unit tests across modules.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::net::{Fetch, FetchRequest, FetchResponse, TransportError};

/// A [`Fetch`] that replays scripted outcomes in order and records every
/// request it sees. Once the script runs dry it answers 204.
#[derive(Default)]
pub struct ScriptedFetch {
    script: Mutex<VecDeque<Result<FetchResponse, TransportError>>>,
    seen: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: Result<FetchResponse, TransportError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn push_json(&self, status: u16, body: &str) {
        self.push(Ok(FetchResponse::new(
            status,
            Some("application/json".to_string()),
            body.to_string(),
        )));
    }

    pub fn push_unreachable(&self) {
        self.push(Err(TransportError::Unreachable {
            url: "scripted".to_string(),
            message: "connection refused".to_string(),
        }));
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|request| request.url).collect()
    }
}

#[async_trait]
impl Fetch for ScriptedFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError> {
        self.seen.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchResponse::new(204, None, Vec::new())))
    }
}
