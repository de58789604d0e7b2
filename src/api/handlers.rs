//! API request handlers

use super::signature::{self, SIGNATURE_HEADER};
use crate::error::SyncError;
use crate::mapping::SyncMapping;
use crate::sync::{BatchSummary, PushOutcome, WebhookNotification};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Health check
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled: Option<DateTime<Utc>>,
}

/// Health check handler. Reads the poll marker, so an unreachable store
/// reports 503 + `"unhealthy"`.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();
    match state.store.get_last_polled().await {
        Ok(last_polled) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".into(),
                version,
                last_polled,
            }),
        ),
        Err(e) => {
            tracing::warn!("Health check could not read the mapping store: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".into(),
                    version,
                    last_polled: None,
                }),
            )
        }
    }
}

// ============================================================================
// Push (webhooks and manual)
// ============================================================================

/// Body returned for every push delivery
#[derive(Debug, Serialize)]
pub struct PushResponse {
    /// `verified`, `ignored`, or the reconcile outcome
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_id: Option<String>,
}

impl PushResponse {
    fn from_outcome(outcome: PushOutcome) -> Result<Self, AppError> {
        match outcome {
            PushOutcome::Verification => Ok(Self {
                status: "verified".into(),
                reason: None,
                applied_id: None,
            }),
            PushOutcome::Ignored { reason } => Ok(Self {
                status: "ignored".into(),
                reason: Some(reason),
                applied_id: None,
            }),
            PushOutcome::Reconciled(report) => {
                if let Some(err) = report.error {
                    return Err(err.into());
                }
                let status = serde_json::to_value(report.outcome)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| format!("{:?}", report.outcome));
                Ok(Self {
                    status,
                    reason: None,
                    applied_id: report.applied_id,
                })
            }
        }
    }
}

/// Webhook receiver for the document store.
///
/// The body is taken raw so the signature can be checked over the exact
/// bytes that were signed.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PushResponse>, AppError> {
    if let Some(secret) = state.config.left_webhook_secret.as_deref() {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing webhook signature".into()))?;
        if !signature::verify(secret, &body, header) {
            return Err(AppError::Unauthorized("Invalid webhook signature".into()));
        }
    }

    let notification: WebhookNotification = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;
    tracing::debug!(kind = %notification.kind, "Received webhook");

    let outcome = state.pusher.handle(&notification).await?;
    Ok(Json(PushResponse::from_outcome(outcome)?))
}

/// Reconcile one left document on demand
pub async fn push_document(
    State(state): State<AppState>,
    Path(left_id): Path<String>,
) -> Result<Json<PushResponse>, AppError> {
    let outcome = state.pusher.push_document(&left_id).await?;
    Ok(Json(PushResponse::from_outcome(outcome)?))
}

// ============================================================================
// Poll
// ============================================================================

/// Run one poll cycle now and return its summary
pub async fn trigger_poll(State(state): State<AppState>) -> Result<Json<BatchSummary>, AppError> {
    Ok(Json(state.poller.run_cycle().await?))
}

// ============================================================================
// Mapping administration
// ============================================================================

pub async fn list_mappings(
    State(state): State<AppState>,
) -> Result<Json<Vec<SyncMapping>>, AppError> {
    let mut mappings = state.store.list_all().await?;
    mappings.sort_by(|a, b| a.left_id.cmp(&b.left_id));
    Ok(Json(mappings))
}

pub async fn get_mapping(
    State(state): State<AppState>,
    Path(left_id): Path<String>,
) -> Result<Json<SyncMapping>, AppError> {
    let mapping = state
        .store
        .get(&left_id)
        .await?
        .ok_or(AppError::NotFound(format!("No mapping for {}", left_id)))?;
    Ok(Json(mapping))
}

/// Drop a mapping so the next event for either side starts a fresh pair
pub async fn delete_mapping(
    State(state): State<AppState>,
    Path(left_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.store.get(&left_id).await?.is_none() {
        return Err(AppError::NotFound(format!("No mapping for {}", left_id)));
    }
    state.store.delete(&left_id).await?;
    tracing::info!(left_id = %left_id, "Deleted mapping");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Sync(SyncError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            // A rejected credential is a remote problem, not the caller's
            AppError::Sync(SyncError::Auth(_)) => StatusCode::BAD_GATEWAY,
            AppError::Sync(SyncError::TransientIo(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Sync(SyncError::Translation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Sync(SyncError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let (message, kind) = match self {
            AppError::Internal(e) => (e.to_string(), None),
            AppError::NotFound(msg) | AppError::BadRequest(msg) | AppError::Unauthorized(msg) => {
                (msg, None)
            }
            AppError::Sync(e) => (e.to_string(), Some(e.kind())),
        };

        let body = match kind {
            Some(kind) => Json(serde_json::json!({ "error": message, "kind": kind })),
            None => Json(serde_json::json!({ "error": message })),
        };

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        AppError::Sync(err)
    }
}
