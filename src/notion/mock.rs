//! In-memory mock implementation of DocumentApi for testing.

use super::models::{Document, DocumentFields};
use super::traits::DocumentApi;
use crate::error::{Result, SyncError};
use crate::mapping::VersionMarker;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Stores documents in a map and stamps every write with a fresh, strictly
/// increasing `last_edited_time`.
pub struct MockDocumentApi {
    pub documents: RwLock<HashMap<String, Document>>,
    clock: AtomicU64,
    next_id: AtomicU64,
    pub creates: AtomicU64,
    pub updates: AtomicU64,
    /// Error returned by the next write call, then cleared
    pub fail_next_write: RwLock<Option<SyncError>>,
}

impl MockDocumentApi {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            creates: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            fail_next_write: RwLock::new(None),
        }
    }

    /// Next version marker: one second after the previous one
    pub fn tick(&self) -> VersionMarker {
        let n = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        VersionMarker::new((base + chrono::Duration::seconds(n)).to_rfc3339())
    }

    pub async fn insert(&self, doc: Document) {
        self.documents.write().await.insert(doc.id.clone(), doc);
    }

    pub fn write_count(&self) -> u64 {
        self.creates.load(Ordering::SeqCst) + self.updates.load(Ordering::SeqCst)
    }

    async fn take_failure(&self) -> Result<()> {
        match self.fail_next_write.write().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentApi for MockDocumentApi {
    async fn fetch_document(&self, id: &str) -> Result<Document> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::TransientIo(format!("404 document {} not found", id)))
    }

    async fn create_document(&self, parent_id: &str, fields: &DocumentFields) -> Result<Document> {
        self.take_failure().await?;
        let id = format!("page-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let doc = Document {
            id: id.clone(),
            parent_id: Some(parent_id.to_string()),
            title: fields.title.clone(),
            content: fields.content.clone(),
            last_edited_time: self.tick(),
            archived: false,
        };
        self.documents.write().await.insert(id, doc.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(doc)
    }

    async fn update_document(&self, id: &str, fields: &DocumentFields) -> Result<Document> {
        self.take_failure().await?;
        let version = self.tick();
        let mut docs = self.documents.write().await;
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| SyncError::TransientIo(format!("404 document {} not found", id)))?;
        doc.title = fields.title.clone();
        doc.content = fields.content.clone();
        doc.last_edited_time = version;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(doc.clone())
    }
}
