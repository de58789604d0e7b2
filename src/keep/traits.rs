//! Trait abstraction for note store operations

use super::models::{Note, NoteFields};
use crate::error::Result;
use async_trait::async_trait;

/// Operations the sync core needs from the poll-only note store.
#[async_trait]
pub trait NoteApi: Send + Sync {
    /// Enumerate every note, trashed ones included
    async fn list_notes(&self) -> Result<Vec<Note>>;

    /// Create a note; the result carries the new id and version
    async fn create_note(&self, fields: &NoteFields) -> Result<Note>;

    /// Overwrite the writable fields of an existing note
    async fn update_note(&self, id: &str, fields: &NoteFields) -> Result<Note>;
}
