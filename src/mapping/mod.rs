//! Mapping store: durable left/right correspondences

pub mod memory;
pub mod models;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryMappingStore;
pub use models::{Origin, SyncMapping, VersionMarker};
pub use sqlite::SqliteMappingStore;
pub use traits::MappingStore;

use crate::error::{Result, SyncError};

/// Reject a write that would break the one-mapping-per-pair invariant.
///
/// `current_right` is the right id already stored for `mapping.left_id`;
/// `indexed_left` is the left id the index holds for `mapping.right_id`.
pub(crate) fn ensure_pair_unchanged(
    mapping: &SyncMapping,
    current_right: Option<&str>,
    indexed_left: Option<&str>,
) -> Result<()> {
    if let Some(right_id) = current_right {
        if right_id != mapping.right_id {
            return Err(SyncError::Storage(format!(
                "left id {} is already mapped to {}, refusing to re-point it to {}",
                mapping.left_id, right_id, mapping.right_id
            )));
        }
    }
    if let Some(left_id) = indexed_left {
        if left_id != mapping.left_id {
            return Err(SyncError::Storage(format!(
                "right id {} already belongs to {}",
                mapping.right_id, left_id
            )));
        }
    }
    Ok(())
}
