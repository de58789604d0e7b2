//! HTTP client for the Keep notes API

use super::models::{ListNotesResponse, Note, NoteFields};
use super::traits::NoteApi;
use crate::error::Result;
use crate::http::{build_client, decode};
use async_trait::async_trait;
use std::time::Duration;

const PAGE_SIZE: &str = "100";

/// Client for Keep note operations
pub struct KeepClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl KeepClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// `id` is a resource name (`notes/...`), used as a path suffix
    fn note_url(&self, id: &str) -> String {
        format!("{}/v1/{}", self.base_url, id.trim_start_matches('/'))
    }
}

#[async_trait]
impl NoteApi for KeepClient {
    async fn list_notes(&self) -> Result<Vec<Note>> {
        let url = format!("{}/v1/notes", self.base_url);
        let mut notes = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListNotesResponse = decode(request.send().await?).await?;
            notes.extend(page.notes);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(count = notes.len(), "Listed Keep notes");
        Ok(notes)
    }

    async fn create_note(&self, fields: &NoteFields) -> Result<Note> {
        let response = self
            .http
            .post(format!("{}/v1/notes", self.base_url))
            .bearer_auth(&self.token)
            .json(&fields.to_resource())
            .send()
            .await?;
        decode(response).await
    }

    async fn update_note(&self, id: &str, fields: &NoteFields) -> Result<Note> {
        let response = self
            .http
            .patch(self.note_url(id))
            .bearer_auth(&self.token)
            .query(&[("updateMask", "title,body")])
            .json(&fields.to_resource())
            .send()
            .await?;
        decode(response).await
    }
}
