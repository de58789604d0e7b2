//! In-memory mock implementation of NoteApi for testing.

use super::models::{Note, NoteBody, NoteFields, TextContent};
use super::traits::NoteApi;
use crate::error::{Result, SyncError};
use crate::mapping::VersionMarker;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Notes kept sorted by id so batch tests are deterministic.
pub struct MockNoteApi {
    pub notes: RwLock<BTreeMap<String, Note>>,
    clock: AtomicU64,
    next_id: AtomicU64,
    pub creates: AtomicU64,
    pub updates: AtomicU64,
    pub fail_next_write: RwLock<Option<SyncError>>,
    pub fail_list: RwLock<Option<SyncError>>,
}

impl MockNoteApi {
    pub fn new() -> Self {
        Self {
            notes: RwLock::new(BTreeMap::new()),
            clock: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            creates: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            fail_next_write: RwLock::new(None),
            fail_list: RwLock::new(None),
        }
    }

    pub fn tick(&self) -> VersionMarker {
        let n = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        VersionMarker::new((base + chrono::Duration::seconds(n)).to_rfc3339())
    }

    pub async fn insert(&self, note: Note) {
        let id = note.id.clone().unwrap_or_default();
        self.notes.write().await.insert(id, note);
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

    fn body(text: &str) -> NoteBody {
        NoteBody {
            text: Some(TextContent {
                text: text.to_string(),
            }),
        }
    }
}

#[async_trait]
impl NoteApi for MockNoteApi {
    async fn list_notes(&self) -> Result<Vec<Note>> {
        if let Some(err) = self.fail_list.read().await.clone() {
            return Err(err);
        }
        Ok(self.notes.read().await.values().cloned().collect())
    }

    async fn create_note(&self, fields: &NoteFields) -> Result<Note> {
        self.take_failure().await?;
        let id = format!("notes/{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let note = Note {
            id: Some(id.clone()),
            title: fields.title.clone(),
            body: Self::body(&fields.text),
            update_time: Some(self.tick()),
            trashed: false,
        };
        self.notes.write().await.insert(id, note.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(note)
    }

    async fn update_note(&self, id: &str, fields: &NoteFields) -> Result<Note> {
        self.take_failure().await?;
        let version = self.tick();
        let mut notes = self.notes.write().await;
        let note = notes
            .get_mut(id)
            .ok_or_else(|| SyncError::TransientIo(format!("404 note {} not found", id)))?;
        note.title = fields.title.clone();
        note.body = Self::body(&fields.text);
        note.update_time = Some(version);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(note.clone())
    }
}
