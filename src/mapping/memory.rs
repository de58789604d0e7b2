//! In-memory MappingStore, used by tests and by `serve --memory` dev runs.

use super::ensure_pair_unchanged;
use super::models::SyncMapping;
use super::traits::MappingStore;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    by_left: HashMap<String, SyncMapping>,
    right_index: HashMap<String, String>,
    last_polled: Option<DateTime<Utc>>,
}

/// Both key spaces live behind one lock so an upsert updates them together.
#[derive(Default)]
pub struct MemoryMappingStore {
    inner: RwLock<Inner>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed mappings (test fixtures, imports)
    pub fn with_mappings(mappings: impl IntoIterator<Item = SyncMapping>) -> Self {
        let mut inner = Inner::default();
        for m in mappings {
            inner.right_index.insert(m.right_id.clone(), m.left_id.clone());
            inner.by_left.insert(m.left_id.clone(), m);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn get(&self, left_id: &str) -> Result<Option<SyncMapping>> {
        Ok(self.inner.read().await.by_left.get(left_id).cloned())
    }

    async fn get_by_right_id(&self, right_id: &str) -> Result<Option<SyncMapping>> {
        let inner = self.inner.read().await;
        Ok(inner
            .right_index
            .get(right_id)
            .and_then(|left_id| inner.by_left.get(left_id))
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<SyncMapping>> {
        Ok(self.inner.read().await.by_left.values().cloned().collect())
    }

    async fn upsert(&self, mapping: &SyncMapping) -> Result<()> {
        let mut inner = self.inner.write().await;
        ensure_pair_unchanged(
            mapping,
            inner.by_left.get(&mapping.left_id).map(|m| m.right_id.as_str()),
            inner.right_index.get(&mapping.right_id).map(String::as_str),
        )?;
        inner
            .right_index
            .insert(mapping.right_id.clone(), mapping.left_id.clone());
        inner
            .by_left
            .insert(mapping.left_id.clone(), mapping.clone());
        Ok(())
    }

    async fn delete(&self, left_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(removed) = inner.by_left.remove(left_id) {
            inner.right_index.remove(&removed.right_id);
        }
        Ok(())
    }

    async fn record_last_polled(&self, at: DateTime<Utc>) -> Result<()> {
        self.inner.write().await.last_polled = Some(at);
        Ok(())
    }

    async fn get_last_polled(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.inner.read().await.last_polled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_mapping;

    #[tokio::test]
    async fn test_upsert_maintains_both_keys() {
        let store = MemoryMappingStore::new();
        store.upsert(&test_mapping("doc1", "notes/1")).await.unwrap();

        assert_eq!(store.get("doc1").await.unwrap().unwrap().right_id, "notes/1");
        assert_eq!(
            store.get_by_right_id("notes/1").await.unwrap().unwrap().left_id,
            "doc1"
        );
        assert!(store.get_by_right_id("notes/2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_drops_index_entry() {
        let store = MemoryMappingStore::with_mappings([test_mapping("doc1", "notes/1")]);
        store.delete("doc1").await.unwrap();
        store.delete("doc1").await.unwrap();

        assert!(store.get("doc1").await.unwrap().is_none());
        assert!(store.get_by_right_id("notes/1").await.unwrap().is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_rejects_repointing() {
        let store = MemoryMappingStore::with_mappings([
            test_mapping("doc1", "notes/1"),
            test_mapping("doc2", "notes/2"),
        ]);

        let err = store
            .upsert(&test_mapping("doc1", "notes/9"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage");

        let err = store
            .upsert(&test_mapping("doc3", "notes/2"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage");

        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_last_polled_roundtrip() {
        let store = MemoryMappingStore::new();
        assert!(store.get_last_polled().await.unwrap().is_none());
        let now = Utc::now();
        store.record_last_polled(now).await.unwrap();
        assert_eq!(store.get_last_polled().await.unwrap(), Some(now));
    }
}
