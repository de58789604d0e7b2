//! Shared reqwest plumbing for the two remote clients

use crate::error::{Result, SyncError};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Build a client whose every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("notes-bridge/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SyncError::TransientIo(format!("failed to build HTTP client: {}", e)))
}

/// Turn a response into `T`, classifying non-success statuses.
pub async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "no body".to_string());
        return Err(SyncError::from_status(status, &body));
    }
    Ok(response.json::<T>().await?)
}
