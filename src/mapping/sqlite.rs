//! SQLite-backed MappingStore
//!
//! Three record types share one database file:
//! - `mappings`: the full record, keyed by left id
//! - `right_index`: right id → left id, written in the same transaction as `mappings`
//! - `meta`: process-wide scalars (the last poll instant)
//!
//! rusqlite is blocking, so every call hops onto the blocking pool.

use super::ensure_pair_unchanged;
use super::models::{Origin, SyncMapping, VersionMarker};
use super::traits::MappingStore;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const LAST_POLLED_KEY: &str = "last_polled";

const SELECT_MAPPING: &str = "SELECT left_id, right_id, last_synced_left_version, \
     last_synced_right_version, last_write_origin, last_write_at_us FROM mappings";

pub struct SqliteMappingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMappingStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Storage(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| SyncError::Storage("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| SyncError::Storage(format!("store task failed: {}", e)))?
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS mappings (
          left_id TEXT PRIMARY KEY,
          right_id TEXT NOT NULL,
          last_synced_left_version TEXT NOT NULL,
          last_synced_right_version TEXT NOT NULL,
          last_write_origin TEXT NOT NULL,
          last_write_at_us INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS right_index (
          right_id TEXT PRIMARY KEY,
          left_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

struct MappingRow {
    left_id: String,
    right_id: String,
    left_version: String,
    right_version: String,
    origin: String,
    written_at_us: i64,
}

impl MappingRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            left_id: row.get(0)?,
            right_id: row.get(1)?,
            left_version: row.get(2)?,
            right_version: row.get(3)?,
            origin: row.get(4)?,
            written_at_us: row.get(5)?,
        })
    }

    fn into_mapping(self) -> Result<SyncMapping> {
        let last_write_origin: Origin = self.origin.parse().map_err(SyncError::Storage)?;
        Ok(SyncMapping {
            left_id: self.left_id,
            right_id: self.right_id,
            last_synced_left_version: VersionMarker::new(self.left_version),
            last_synced_right_version: VersionMarker::new(self.right_version),
            last_write_origin,
            last_write_timestamp: from_micros(self.written_at_us)?,
        })
    }
}

fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| SyncError::Storage(format!("timestamp out of range: {}", us)))
}

fn query_one(conn: &Connection, sql: &str, key: &str) -> Result<Option<SyncMapping>> {
    conn.query_row(sql, params![key], MappingRow::from_row)
        .optional()?
        .map(MappingRow::into_mapping)
        .transpose()
}

#[async_trait]
impl MappingStore for SqliteMappingStore {
    async fn get(&self, left_id: &str) -> Result<Option<SyncMapping>> {
        let left_id = left_id.to_string();
        self.with_conn(move |conn| {
            query_one(conn, &format!("{} WHERE left_id = ?1", SELECT_MAPPING), &left_id)
        })
        .await
    }

    async fn get_by_right_id(&self, right_id: &str) -> Result<Option<SyncMapping>> {
        let right_id = right_id.to_string();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!(
                    "{} WHERE left_id = (SELECT left_id FROM right_index WHERE right_id = ?1)",
                    SELECT_MAPPING
                ),
                &right_id,
            )
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<SyncMapping>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(SELECT_MAPPING)?;
            let rows = stmt
                .query_map([], MappingRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(MappingRow::into_mapping).collect()
        })
        .await
    }

    async fn upsert(&self, mapping: &SyncMapping) -> Result<()> {
        let mapping = mapping.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let current_right: Option<String> = tx
                .query_row(
                    "SELECT right_id FROM mappings WHERE left_id = ?1",
                    params![mapping.left_id],
                    |row| row.get(0),
                )
                .optional()?;
            let indexed_left: Option<String> = tx
                .query_row(
                    "SELECT left_id FROM right_index WHERE right_id = ?1",
                    params![mapping.right_id],
                    |row| row.get(0),
                )
                .optional()?;
            ensure_pair_unchanged(&mapping, current_right.as_deref(), indexed_left.as_deref())?;

            tx.execute(
                "INSERT INTO mappings (left_id, right_id, last_synced_left_version, \
                 last_synced_right_version, last_write_origin, last_write_at_us) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(left_id) DO UPDATE SET \
                   right_id = excluded.right_id, \
                   last_synced_left_version = excluded.last_synced_left_version, \
                   last_synced_right_version = excluded.last_synced_right_version, \
                   last_write_origin = excluded.last_write_origin, \
                   last_write_at_us = excluded.last_write_at_us",
                params![
                    mapping.left_id,
                    mapping.right_id,
                    mapping.last_synced_left_version.as_str(),
                    mapping.last_synced_right_version.as_str(),
                    mapping.last_write_origin.as_str(),
                    mapping.last_write_timestamp.timestamp_micros(),
                ],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO right_index (right_id, left_id) VALUES (?1, ?2)",
                params![mapping.right_id, mapping.left_id],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, left_id: &str) -> Result<()> {
        let left_id = left_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM right_index WHERE left_id = ?1", params![left_id])?;
            tx.execute("DELETE FROM mappings WHERE left_id = ?1", params![left_id])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn record_last_polled(&self, at: DateTime<Utc>) -> Result<()> {
        let us = at.timestamp_micros();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![LAST_POLLED_KEY, us],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_last_polled(&self) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| {
            let us: Option<i64> = conn
                .query_row(
                    "SELECT value FROM meta WHERE key = ?1",
                    params![LAST_POLLED_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            us.map(from_micros).transpose()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_mapping;

    #[tokio::test]
    async fn test_upsert_then_lookup_by_either_key() {
        let store = SqliteMappingStore::in_memory().unwrap();
        let mapping = test_mapping("doc1", "notes/1");
        store.upsert(&mapping).await.unwrap();

        let by_left = store.get("doc1").await.unwrap().unwrap();
        let by_right = store.get_by_right_id("notes/1").await.unwrap().unwrap();
        assert_eq!(by_left, by_right);
        assert_eq!(by_left.last_write_origin, mapping.last_write_origin);
        assert_eq!(
            by_left.last_write_timestamp.timestamp_micros(),
            mapping.last_write_timestamp.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_upsert_replaces_whole_record() {
        let store = SqliteMappingStore::in_memory().unwrap();
        store.upsert(&test_mapping("doc1", "notes/1")).await.unwrap();

        let mut updated = test_mapping("doc1", "notes/1");
        updated.last_synced_left_version = "2024-05-01T00:00:00Z".into();
        updated.last_write_origin = Origin::Left;
        store.upsert(&updated).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].last_synced_left_version.as_str(), "2024-05-01T00:00:00Z");
        assert_eq!(all[0].last_write_origin, Origin::Left);
    }

    #[tokio::test]
    async fn test_upsert_rejects_repointed_right_id() {
        let store = SqliteMappingStore::in_memory().unwrap();
        store.upsert(&test_mapping("doc1", "notes/1")).await.unwrap();

        let err = store.upsert(&test_mapping("doc1", "notes/2")).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        let err = store.upsert(&test_mapping("doc2", "notes/1")).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));

        // Rejected writes leave the index untouched
        assert!(store.get_by_right_id("notes/2").await.unwrap().is_none());
        assert!(store.get("doc2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_index() {
        let store = SqliteMappingStore::in_memory().unwrap();
        store.upsert(&test_mapping("doc1", "notes/1")).await.unwrap();
        store.delete("doc1").await.unwrap();

        assert!(store.get("doc1").await.unwrap().is_none());
        assert!(store.get_by_right_id("notes/1").await.unwrap().is_none());

        // The freed right id can be claimed again
        store.upsert(&test_mapping("doc2", "notes/1")).await.unwrap();
        assert_eq!(
            store.get_by_right_id("notes/1").await.unwrap().unwrap().left_id,
            "doc2"
        );
    }

    #[tokio::test]
    async fn test_last_polled_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bridge.db");
        let at = Utc::now();
        {
            let store = SqliteMappingStore::open(&path).unwrap();
            assert!(store.get_last_polled().await.unwrap().is_none());
            store.record_last_polled(at).await.unwrap();
            store.upsert(&test_mapping("doc1", "notes/1")).await.unwrap();
        }

        let reopened = SqliteMappingStore::open(&path).unwrap();
        let polled = reopened.get_last_polled().await.unwrap().unwrap();
        assert_eq!(polled.timestamp_micros(), at.timestamp_micros());
        assert!(reopened.get_by_right_id("notes/1").await.unwrap().is_some());
    }
}
