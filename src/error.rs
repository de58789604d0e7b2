//! Error taxonomy shared by the mapping store, the API clients and the reconciler.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors the sync core can observe.
///
/// The kind decides the propagation policy: `Auth` and `Storage` are fatal for
/// the current invocation, `Translation` skips a single item, and
/// `TransientIo` is left for the next natural cycle to retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Remote API unreachable, timed out or rate-limited
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// Credentials rejected by a remote API
    #[error("authentication error: {0}")]
    Auth(String),

    /// Document shape could not be mapped, or was rejected by the other side
    #[error("translation error: {0}")]
    Translation(String),

    /// Mapping store unreachable or refused the write
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Classify a non-success HTTP response from either remote API.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = format!("{} {}", status, body.trim());
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Self::Translation(message)
            }
            _ => Self::TransientIo(message),
        }
    }

    /// Short machine-readable label, used in logs and batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientIo(_) => "transient_io",
            Self::Auth(_) => "auth",
            Self::Translation(_) => "translation",
            Self::Storage(_) => "storage",
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Translation(format!("unexpected response body: {}", err));
        }
        if let Some(status) = err.status() {
            return Self::from_status(status, "");
        }
        Self::TransientIo(err.to_string())
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
