use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use rusqlite::{params, OptionalExtension};

use crate::{
    db::{Database, RECORDINGS_SCHEMA},
    fingerprint,
    models::{with_durations, RecordingEntry, RecordingId, TimelineItem},
};

use super::{generate_recording_id, RecordingStore, StoreError, StoreResult};

#[derive(Clone)]
pub struct SqliteRecordingStore {
    db: Database,
}

impl SqliteRecordingStore {
    pub fn open(path: std::path::PathBuf) -> anyhow::Result<Self> {
        Ok(Self {
            db: Database::new(path, &RECORDINGS_SCHEMA)?,
        })
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            db: Database::in_memory(&RECORDINGS_SCHEMA)?,
        })
    }
}

fn recording_exists(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM recordings WHERE id = ?1",
        params![id],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

#[async_trait]
impl RecordingStore for SqliteRecordingStore {
    async fn create(&self) -> StoreResult<RecordingId> {
        let id = generate_recording_id();
        let record_id = id.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO recordings (id, created_at) VALUES (?1, ?2)",
                    params![record_id.as_str(), Utc::now().to_rfc3339()],
                )
                .context("failed to insert recording")?;
                Ok(())
            })
            .await?;

        debug!("Created recording {id}");
        Ok(id)
    }

    async fn append(&self, id: &RecordingId, entries: Vec<RecordingEntry>) -> StoreResult<()> {
        let invalid: Vec<String> = entries
            .iter()
            .filter(|entry| !fingerprint::is_valid(&entry.hash))
            .map(|entry| entry.hash.clone())
            .collect();
        if !invalid.is_empty() {
            return Err(StoreError::InvalidFingerprint(invalid));
        }

        let recording_id = id.clone();
        let appended = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                if !recording_exists(&tx, recording_id.as_str())? {
                    return Ok(false);
                }

                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO recording_frames (recording_id, at_ms, hash) VALUES (?1, ?2, ?3)",
                    )?;
                    for entry in &entries {
                        stmt.execute(params![recording_id.as_str(), entry.at_ms, entry.hash])?;
                    }
                }

                tx.commit().context("failed to commit appended frames")?;
                Ok(true)
            })
            .await?;

        if appended {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    async fn exists(&self, id: &RecordingId) -> StoreResult<bool> {
        let recording_id = id.clone();
        let found = self
            .db
            .execute(move |conn| Ok(recording_exists(conn, recording_id.as_str())?))
            .await?;
        Ok(found)
    }

    async fn list(&self) -> StoreResult<Vec<RecordingId>> {
        let ids = self
            .db
            .execute(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id FROM recordings ORDER BY created_at ASC, rowid ASC")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

                let mut ids = Vec::new();
                for row in rows {
                    ids.push(RecordingId::new(row?));
                }
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    async fn read(&self, id: &RecordingId) -> StoreResult<Vec<TimelineItem>> {
        let recording_id = id.clone();
        let entries = self
            .db
            .execute(move |conn| {
                if !recording_exists(conn, recording_id.as_str())? {
                    return Ok(None);
                }

                let mut stmt = conn.prepare(
                    "SELECT at_ms, hash FROM recording_frames
                     WHERE recording_id = ?1
                     ORDER BY at_ms ASC, seq ASC",
                )?;
                let rows = stmt.query_map(params![recording_id.as_str()], |row| {
                    Ok(RecordingEntry {
                        at_ms: row.get(0)?,
                        hash: row.get(1)?,
                    })
                })?;

                let mut entries = Vec::new();
                for row in rows {
                    entries.push(row?);
                }
                Ok(Some(entries))
            })
            .await?;

        let Some(entries) = entries else {
            return Err(StoreError::NotFound(id.clone()));
        };

        let total = entries.len();
        let valid: Vec<RecordingEntry> = entries
            .into_iter()
            .filter(|entry| fingerprint::is_valid(&entry.hash))
            .collect();
        if valid.len() != total {
            warn!(
                "Skipped {} stored entries with invalid fingerprints in recording {id}",
                total - valid.len()
            );
        }

        Ok(with_durations(valid))
    }
}
