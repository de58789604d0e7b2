//! Note shapes for the poll-only side
//!
//! `Note` mirrors the wire resource (`name`, nested `body.text.text`,
//! `updateTime`) so it can be deserialized straight from list responses.

use crate::mapping::VersionMarker;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Resource name, e.g. `notes/abc123`
    #[serde(rename = "name", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: NoteBody,
    pub update_time: Option<VersionMarker>,
    #[serde(default)]
    pub trashed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub text: String,
}

impl Note {
    /// Plain text body; list-item and attachment bodies read as empty
    pub fn text(&self) -> &str {
        self.body.text.as_ref().map(|t| t.text.as_str()).unwrap_or("")
    }

    /// Identifier, if present and non-empty
    pub fn resolvable_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// Writable fields of a note, as produced by the translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFields {
    pub title: String,
    pub text: String,
}

impl NoteFields {
    /// Wire representation for create/update bodies
    pub fn to_resource(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "body": { "text": { "text": self.text } },
        })
    }
}

/// One page of a list call
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotesResponse {
    #[serde(default)]
    pub notes: Vec<Note>,
    pub next_page_token: Option<String>,
}
