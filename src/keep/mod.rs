//! Keep (poll-only side) client and note model

pub mod client;
pub mod models;
pub mod traits;

pub use client::KeepClient;
pub use models::{Note, NoteFields};
pub use traits::NoteApi;

#[cfg(test)]
pub(crate) mod mock;
