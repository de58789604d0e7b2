//! Document shapes for the event-sourced side

use crate::mapping::VersionMarker;
use serde::{Deserialize, Serialize};

/// A document as resolved from the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Database (or page) the document lives under
    pub parent_id: Option<String>,
    pub title: String,
    pub content: String,
    pub last_edited_time: VersionMarker,
    /// Archived or moved to trash
    #[serde(default)]
    pub archived: bool,
}

/// Writable fields of a document, as produced by the translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFields {
    pub title: String,
    pub content: String,
}

/// Compare ids regardless of dash formatting (`abcd-ef` vs `abcdef`).
pub fn same_id(a: &str, b: &str) -> bool {
    let strip = |s: &str| -> String {
        s.chars()
            .filter(|c| *c != '-')
            .flat_map(char::to_lowercase)
            .collect()
    };
    strip(a) == strip(b)
}
