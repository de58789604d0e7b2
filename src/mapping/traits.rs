//! MappingStore trait definition

use super::models::SyncMapping;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable record of left/right correspondences plus the process-wide poll marker.
///
/// Implementations keep a primary key space by left id and a reverse index by
/// right id, and must write both in the same transaction so `get_by_right_id`
/// never needs a scan.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Look up a mapping by its left-side id
    async fn get(&self, left_id: &str) -> Result<Option<SyncMapping>>;

    /// Look up a mapping through the right-side index
    async fn get_by_right_id(&self, right_id: &str) -> Result<Option<SyncMapping>>;

    /// All mappings, in no particular order
    async fn list_all(&self) -> Result<Vec<SyncMapping>>;

    /// Replace the full record (and its index entry) atomically.
    ///
    /// Fails with `Storage` if the record would re-point an existing pair.
    async fn upsert(&self, mapping: &SyncMapping) -> Result<()>;

    /// Remove a mapping and its index entry. Deleting an unknown id is a no-op.
    async fn delete(&self, left_id: &str) -> Result<()>;

    async fn record_last_polled(&self, at: DateTime<Utc>) -> Result<()>;

    async fn get_last_polled(&self) -> Result<Option<DateTime<Utc>>>;
}
