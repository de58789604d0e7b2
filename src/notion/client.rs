//! HTTP client for the Notion pages API

use super::models::{Document, DocumentFields};
use super::traits::DocumentApi;
use crate::error::Result;
use crate::http::{build_client, decode};
use crate::mapping::VersionMarker;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Notion caps a single rich text object at this many characters
const RICH_TEXT_CHUNK: usize = 2000;

/// Client for Notion page operations
pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    api_version: String,
    title_property: String,
    body_property: String,
}

#[derive(Deserialize)]
struct PageResponse {
    id: String,
    last_edited_time: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    in_trash: bool,
    parent: Option<PageParent>,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct PageParent {
    database_id: Option<String>,
    page_id: Option<String>,
}

impl NotionClient {
    pub fn new(
        base_url: &str,
        token: &str,
        api_version: &str,
        title_property: &str,
        body_property: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            api_version: api_version.to_string(),
            title_property: title_property.to_string(),
            body_property: body_property.to_string(),
        })
    }

    fn page_url(&self, id: &str) -> String {
        format!("{}/v1/pages/{}", self.base_url, id)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.api_version)
    }

    /// Property payload for the configured title and body properties
    fn properties(&self, fields: &DocumentFields) -> Value {
        let mut props = Map::new();
        props.insert(
            self.title_property.clone(),
            json!({ "title": rich_text(&fields.title) }),
        );
        props.insert(
            self.body_property.clone(),
            json!({ "rich_text": rich_text(&fields.content) }),
        );
        Value::Object(props)
    }

    fn into_document(&self, page: PageResponse) -> Document {
        // The title property is unique per database, so match it by type
        let title = page
            .properties
            .values()
            .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
            .map(|p| plain_text(&p["title"]))
            .unwrap_or_default();
        let content = page
            .properties
            .get(&self.body_property)
            .map(|p| plain_text(&p["rich_text"]))
            .unwrap_or_default();

        Document {
            id: page.id,
            parent_id: page.parent.and_then(|p| p.database_id.or(p.page_id)),
            title,
            content,
            last_edited_time: VersionMarker::new(page.last_edited_time),
            archived: page.archived || page.in_trash,
        }
    }
}

/// Split text into rich text objects that respect the per-object size cap.
fn rich_text(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    let items: Vec<Value> = chars
        .chunks(RICH_TEXT_CHUNK)
        .map(|chunk| {
            let content: String = chunk.iter().collect();
            json!({ "type": "text", "text": { "content": content } })
        })
        .collect();
    Value::Array(items)
}

/// Concatenate the `plain_text` of every rich text object in an array.
fn plain_text(value: &Value) -> String {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DocumentApi for NotionClient {
    async fn fetch_document(&self, id: &str) -> Result<Document> {
        let response = self
            .request(reqwest::Method::GET, self.page_url(id))
            .send()
            .await?;
        let page: PageResponse = decode(response).await?;
        Ok(self.into_document(page))
    }

    async fn create_document(&self, parent_id: &str, fields: &DocumentFields) -> Result<Document> {
        let body = json!({
            "parent": { "database_id": parent_id },
            "properties": self.properties(fields),
        });
        let response = self
            .request(reqwest::Method::POST, format!("{}/v1/pages", self.base_url))
            .json(&body)
            .send()
            .await?;
        let page: PageResponse = decode(response).await?;
        tracing::debug!(page_id = %page.id, "Created Notion page");
        Ok(self.into_document(page))
    }

    async fn update_document(&self, id: &str, fields: &DocumentFields) -> Result<Document> {
        let body = json!({ "properties": self.properties(fields) });
        let response = self
            .request(reqwest::Method::PATCH, self.page_url(id))
            .json(&body)
            .send()
            .await?;
        let page: PageResponse = decode(response).await?;
        Ok(self.into_document(page))
    }
}
