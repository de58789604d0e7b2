//! Trait abstraction for document store operations

use super::models::{Document, DocumentFields};
use crate::error::Result;
use async_trait::async_trait;

/// Operations the sync core needs from the event-sourced document store.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Resolve the full current state of a document
    async fn fetch_document(&self, id: &str) -> Result<Document>;

    /// Create a document under `parent_id`; the result carries the new id and version
    async fn create_document(&self, parent_id: &str, fields: &DocumentFields) -> Result<Document>;

    /// Overwrite the writable fields of an existing document
    async fn update_document(&self, id: &str, fields: &DocumentFields) -> Result<Document>;
}
