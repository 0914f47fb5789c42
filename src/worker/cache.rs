//! Network-first request interception with a SQLite-backed fallback.
//!
//! Every page-side request passes through [`CacheManager`] while a worker
//! controls the page. Successful responses are written through to the
//! current cache generation; when the network is unreachable the last
//! successful response for the same key is replayed, or a synthetic
//! `{"error":"offline"}` body is returned with status 200.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;

use crate::{
    db::{helpers::to_u16, Database},
    net::{Fetch, FetchRequest, FetchResponse, TransportError},
};

// Set to true to log cache hits and misses
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_CACHE_NAME: &str = "framesync-cache-v1";

/// Shell assets fetched at install: page, manifest, script bundle, icon and
/// the hashing module.
pub const DEFAULT_SEED_PATHS: &[&str] = &[
    "/",
    "/manifest.json",
    "/main.js",
    "/icon.png",
    "/blurhash.js",
];

pub const OFFLINE_BODY: &str = r#"{"error":"offline"}"#;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("seed asset {path} unreachable: {source}")]
    SeedUnreachable {
        path: String,
        source: TransportError,
    },
    #[error("seed asset {path} answered with status {status}")]
    SeedRejected { path: String, status: u16 },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// The response every uncached request gets while offline.
pub fn offline_response() -> FetchResponse {
    FetchResponse::new(200, Some("application/json".to_string()), OFFLINE_BODY)
}

/// `"{METHOD} {body} {url}"`, with `null` standing in for a missing body.
pub fn cache_key(request: &FetchRequest) -> String {
    let body = match &request.body {
        Some(body) => String::from_utf8_lossy(body).into_owned(),
        None => "null".to_string(),
    };
    format!("{} {} {}", request.method, body, request.url)
}

struct StoredResponse {
    key: String,
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl StoredResponse {
    fn new(key: String, response: &FetchResponse) -> Self {
        Self {
            key,
            status: response.status,
            content_type: response.content_type.clone(),
            body: response.body.to_vec(),
        }
    }
}

pub struct CacheManager {
    db: Database,
    generation: String,
    network: Arc<dyn Fetch>,
}

impl CacheManager {
    pub fn new(db: Database, generation: impl Into<String>, network: Arc<dyn Fetch>) -> Self {
        Self {
            db,
            generation: generation.into(),
            network,
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Fetch every seed path and store them as the current generation.
    /// All-or-nothing: one failed or non-2xx seed stores nothing.
    pub async fn install(&self, seed_paths: &[String]) -> Result<usize, CacheError> {
        let mut batch = Vec::with_capacity(seed_paths.len());
        for path in seed_paths {
            let request = FetchRequest::get(path.clone());
            let key = cache_key(&request);
            let response = self.network.fetch(request).await.map_err(|source| {
                CacheError::SeedUnreachable {
                    path: path.clone(),
                    source,
                }
            })?;
            if !response.is_success() {
                return Err(CacheError::SeedRejected {
                    path: path.clone(),
                    status: response.status,
                });
            }
            batch.push(StoredResponse::new(key, &response));
        }

        let count = batch.len();
        let generation = self.generation.clone();
        self.db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                for entry in &batch {
                    upsert(&tx, &generation, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .context("failed to store seed assets")?;

        log_info!("Cache '{}' installed with {count} seed assets", self.generation);
        Ok(count)
    }

    /// Delete every generation other than the current one, in one transaction.
    pub async fn activate(&self) -> Result<usize, CacheError> {
        let generation = self.generation.clone();
        let removed = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute(
                    "DELETE FROM cache_entries WHERE generation != ?1",
                    params![generation],
                )?;
                tx.commit()?;
                Ok(removed)
            })
            .await
            .context("failed to evict stale cache generations")?;

        if removed > 0 {
            log_info!(
                "Cache '{}' activated, evicted {removed} stale entries",
                self.generation
            );
        }
        Ok(removed)
    }

    pub async fn lookup(&self, key: &str) -> Result<Option<FetchResponse>, CacheError> {
        let generation = self.generation.clone();
        let key = key.to_string();
        let found = self
            .db
            .execute(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT status, content_type, body FROM cache_entries
                         WHERE generation = ?1 AND cache_key = ?2",
                        params![generation, key],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, Option<String>>(1)?,
                                row.get::<_, Vec<u8>>(2)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .context("failed to read cache entry")?;

        match found {
            Some((status, content_type, body)) => {
                let status = to_u16(status, "cache_entries.status")?;
                Ok(Some(FetchResponse::new(status, content_type, Bytes::from(body))))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, key: String, response: &FetchResponse) -> Result<(), CacheError> {
        let generation = self.generation.clone();
        let entry = StoredResponse::new(key, response);
        self.db
            .execute(move |conn| {
                upsert(conn, &generation, &entry)?;
                Ok(())
            })
            .await
            .context("failed to write cache entry")?;
        Ok(())
    }
}

fn upsert(conn: &rusqlite::Connection, generation: &str, entry: &StoredResponse) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO cache_entries (generation, cache_key, status, content_type, body, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (generation, cache_key) DO UPDATE SET
            status = excluded.status,
            content_type = excluded.content_type,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            generation,
            entry.key,
            i64::from(entry.status),
            entry.content_type,
            entry.body,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl Fetch for CacheManager {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError> {
        let key = cache_key(&request);

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    if let Err(err) = self.store(key, &response).await {
                        log_warn!("Cache write-through failed: {err}");
                    }
                }
                Ok(response)
            }
            Err(err) => match self.lookup(&key).await {
                Ok(Some(cached)) => {
                    log_debug!("Network failed ({err}), serving cached '{key}'");
                    Ok(cached)
                }
                Ok(None) => {
                    log_debug!("Network failed ({err}), no cache for '{key}'");
                    Ok(offline_response())
                }
                Err(lookup_err) => {
                    log_warn!("Cache lookup for '{key}' failed: {lookup_err}");
                    Ok(offline_response())
                }
            },
        }
    }
}
