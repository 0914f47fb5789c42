use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};

use super::{Fetch, FetchRequest, FetchResponse, TransportError};

/// Plain network access through a shared `reqwest::Client`.
#[derive(Clone)]
pub struct NetworkFetch {
    client: Client,
    origin: Url,
}

impl NetworkFetch {
    pub fn new(origin: &str, timeout: Duration) -> anyhow::Result<Self> {
        let origin = Url::parse(origin)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve a path against the origin; absolute URLs pass through.
    pub fn resolve(&self, url: &str) -> Result<Url, TransportError> {
        self.origin
            .join(url)
            .map_err(|err| TransportError::InvalidUrl {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

#[async_trait]
impl Fetch for NetworkFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError> {
        let url = self.resolve(&request.url)?;
        let mut builder = self.client.request(request.method, url.clone());
        if let Some(content_type) = &request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|err| classify(&url, err))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|err| classify(&url, err))?;

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

fn classify(url: &Url, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::TimedOut {
            url: url.to_string(),
        }
    } else {
        TransportError::Unreachable {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
