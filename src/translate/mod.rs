//! Field mapping between documents and notes
//!
//! The default mapping is title ↔ title and body property ↔ note text. Both
//! directions reject shapes the other side cannot hold, so the reconciler can
//! skip the item instead of sending a write that is bound to fail.

use crate::error::{Result, SyncError};
use crate::keep::{Note, NoteFields};
use crate::notion::{Document, DocumentFields};

/// Keep limits, in characters
pub const MAX_NOTE_TITLE: usize = 1_000;
pub const MAX_NOTE_TEXT: usize = 20_000;

/// Converts one side's shape into the other side's writable fields.
pub trait ChangeTranslator: Send + Sync {
    fn to_right(&self, doc: &Document) -> Result<NoteFields>;

    fn to_left(&self, note: &Note) -> Result<DocumentFields>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTranslator;

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").trim_end().to_string()
}

impl ChangeTranslator for DefaultTranslator {
    fn to_right(&self, doc: &Document) -> Result<NoteFields> {
        let title = normalize(&doc.title);
        let text = normalize(&doc.content);

        if title.is_empty() && text.is_empty() {
            return Err(SyncError::Translation(format!(
                "document {} has neither title nor content",
                doc.id
            )));
        }
        if title.chars().count() > MAX_NOTE_TITLE {
            return Err(SyncError::Translation(format!(
                "document {} title exceeds {} characters",
                doc.id, MAX_NOTE_TITLE
            )));
        }
        if text.chars().count() > MAX_NOTE_TEXT {
            return Err(SyncError::Translation(format!(
                "document {} content exceeds {} characters",
                doc.id, MAX_NOTE_TEXT
            )));
        }

        Ok(NoteFields { title, text })
    }

    fn to_left(&self, note: &Note) -> Result<DocumentFields> {
        let title = normalize(&note.title);
        let content = normalize(note.text());

        if title.is_empty() && content.is_empty() {
            return Err(SyncError::Translation(format!(
                "note {} has no title and no text body",
                note.id.as_deref().unwrap_or("<unnamed>")
            )));
        }

        Ok(DocumentFields { title, content })
    }
}
