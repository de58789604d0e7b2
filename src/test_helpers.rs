//! Shared test helpers: mock bridge builders and factory functions.
//!
//! Only compiled in test mode (`#[cfg(test)]`).

use crate::keep::mock::MockNoteApi;
use crate::keep::models::{NoteBody, TextContent};
use crate::keep::Note;
use crate::mapping::{MemoryMappingStore, Origin, SyncMapping};
use crate::notion::mock::MockDocumentApi;
use crate::notion::Document;
use crate::error::{Result, SyncError};
use crate::sync::{Payload, Reconciler, ReconcilerSettings, SyncTarget, WriteReceipt};
use crate::translate::DefaultTranslator;
use crate::{AppState, Config};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use crate::mapping::MappingStore;

/// Database new documents are created under in tests
pub const TEST_PARENT_ID: &str = "parent-db";

// ============================================================================
// Mock bridge builders
// ============================================================================

/// Mocks for both remotes and the store, wired to one reconciler
pub struct MockBridge {
    pub store: Arc<MemoryMappingStore>,
    pub documents: Arc<MockDocumentApi>,
    pub notes: Arc<MockNoteApi>,
    pub reconciler: Arc<Reconciler>,
}

impl MockBridge {
    /// AppState over the same mocks, for exercising the HTTP surface
    pub fn app_state(&self) -> AppState {
        AppState::from_parts(
            test_config(),
            self.store.clone(),
            self.documents.clone(),
            self.notes.clone(),
        )
    }
}

/// Empty store, empty remotes
pub fn mock_bridge() -> MockBridge {
    mock_bridge_with(Vec::new())
}

/// Store pre-seeded with `mappings`
pub fn mock_bridge_with(mappings: Vec<SyncMapping>) -> MockBridge {
    let store = Arc::new(MemoryMappingStore::with_mappings(mappings));
    let documents = Arc::new(MockDocumentApi::new());
    let notes = Arc::new(MockNoteApi::new());
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        documents.clone(),
        notes.clone(),
        Arc::new(DefaultTranslator),
        ReconcilerSettings {
            call_timeout: Duration::from_secs(5),
            left_parent_id: Some(TEST_PARENT_ID.to_string()),
            ..Default::default()
        },
    ));
    MockBridge {
        store,
        documents,
        notes,
        reconciler,
    }
}

/// Defaults with the test parent configured and no webhook secret
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.left_parent_id = Some(TEST_PARENT_ID.to_string());
    config.request_timeout_secs = 5;
    config
}

// ============================================================================
// Factory functions
// ============================================================================

pub fn test_document(id: &str, version: &str) -> Document {
    Document {
        id: id.to_string(),
        parent_id: Some(TEST_PARENT_ID.to_string()),
        title: format!("Document {}", id),
        content: "Some body text".to_string(),
        last_edited_time: version.into(),
        archived: false,
    }
}

pub fn test_note(id: &str, version: &str) -> Note {
    Note {
        id: Some(id.to_string()),
        title: format!("Note {}", id),
        body: NoteBody {
            text: Some(TextContent {
                text: "Some note text".to_string(),
            }),
        },
        update_time: Some(version.into()),
        trashed: false,
    }
}

/// Settled mapping: last written from the right a day ago
pub fn test_mapping(left_id: &str, right_id: &str) -> SyncMapping {
    SyncMapping {
        left_id: left_id.to_string(),
        right_id: right_id.to_string(),
        last_synced_left_version: "t0".into(),
        last_synced_right_version: "t0".into(),
        last_write_origin: Origin::Right,
        last_write_timestamp: Utc::now() - chrono::Duration::days(1),
    }
}

// ============================================================================
// Scripted write target
// ============================================================================

/// Version every `ScriptedTarget` create reports
pub const CREATED_VERSION: &str = "v1";

/// Write target with fixed latencies, for driving timing-sensitive paths.
///
/// A create is counted as soon as it is sent, before its answer arrives.
pub struct ScriptedTarget {
    pub created_id: String,
    pub create_delay: Duration,
    pub update_delay: Duration,
    pub update_error: Option<SyncError>,
    pub creates: AtomicUsize,
}

impl ScriptedTarget {
    pub fn new(created_id: &str, delay: Duration) -> Self {
        Self {
            created_id: created_id.to_string(),
            create_delay: delay,
            update_delay: delay,
            update_error: None,
            creates: AtomicUsize::new(0),
        }
    }

    /// Updates fail with `error` after `delay`
    pub fn failing_updates(mut self, error: SyncError, delay: Duration) -> Self {
        self.update_error = Some(error);
        self.update_delay = delay;
        self
    }
}

#[async_trait]
impl SyncTarget for ScriptedTarget {
    async fn create(&self, _payload: &Payload) -> Result<WriteReceipt> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.create_delay).await;
        Ok(WriteReceipt {
            id: self.created_id.clone(),
            version: CREATED_VERSION.into(),
        })
    }

    async fn update(&self, id: &str, _payload: &Payload) -> Result<WriteReceipt> {
        tokio::time::sleep(self.update_delay).await;
        if let Some(err) = &self.update_error {
            return Err(err.clone());
        }
        Ok(WriteReceipt {
            id: id.to_string(),
            version: "v2".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_functions_produce_valid_objects() {
        let doc = test_document("doc1", "t1");
        assert_eq!(doc.parent_id.as_deref(), Some(TEST_PARENT_ID));
        let note = test_note("notes/1", "t1");
        assert_eq!(note.resolvable_id(), Some("notes/1"));
        assert_eq!(note.text(), "Some note text");
    }

    #[tokio::test]
    async fn test_mock_bridge_with_seeds_store() {
        let bridge = mock_bridge_with(vec![test_mapping("doc1", "notes/1")]);
        let mapping = bridge.store.get_by_right_id("notes/1").await.unwrap();
        assert_eq!(mapping.unwrap().left_id, "doc1");
    }
}
