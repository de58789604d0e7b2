//! Notion (event-sourced side) client and document model

pub mod client;
pub mod models;
pub mod traits;

pub use client::NotionClient;
pub use models::{same_id, Document, DocumentFields};
pub use traits::DocumentApi;

#[cfg(test)]
pub(crate) mod mock;
