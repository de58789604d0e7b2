//! Push driver for document-store webhooks
//!
//! A notification only names the entity that changed, so every delivery
//! re-fetches the current document before handing it to the reconciler.

use super::reconciler::{ChangeEvent, ReconcileReport, Reconciler};
use crate::error::{Result, SyncError};
use crate::notion::{same_id, DocumentApi};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Webhook body as delivered by the document store
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookNotification {
    /// Event kind, e.g. `page.content_updated`
    #[serde(rename = "type", default)]
    pub kind: String,
    pub entity: Option<WebhookEntity>,
    /// Present only on the one-time subscription handshake
    pub verification_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntity {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl WebhookNotification {
    fn is_deletion(&self) -> bool {
        self.kind.ends_with(".deleted")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Subscription handshake acknowledged
    Verification,
    Ignored { reason: String },
    Reconciled(ReconcileReport),
}

impl PushOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        Self::Ignored {
            reason: reason.into(),
        }
    }
}

pub struct PushDriver {
    documents: Arc<dyn DocumentApi>,
    reconciler: Arc<Reconciler>,
    /// Only documents under this parent are synced, when set
    parent_id: Option<String>,
    fetch_timeout: Duration,
}

impl PushDriver {
    pub fn new(
        documents: Arc<dyn DocumentApi>,
        reconciler: Arc<Reconciler>,
        parent_id: Option<String>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            documents,
            reconciler,
            parent_id,
            fetch_timeout,
        }
    }

    /// Handle one webhook delivery
    pub async fn handle(&self, notification: &WebhookNotification) -> Result<PushOutcome> {
        if notification.verification_token.is_some() {
            tracing::info!(
                "Received webhook verification token; copy it from the request log into the subscription settings"
            );
            return Ok(PushOutcome::Verification);
        }

        if notification.is_deletion() {
            tracing::debug!(kind = %notification.kind, "Ignoring deletion notification");
            return Ok(PushOutcome::ignored("deletions are not propagated"));
        }

        let entity = notification.entity.as_ref().ok_or_else(|| {
            SyncError::Translation(format!(
                "notification {} carries no entity",
                notification.kind
            ))
        })?;
        if !entity.kind.is_empty() && entity.kind != "page" {
            return Ok(PushOutcome::ignored(format!(
                "unsupported entity type {}",
                entity.kind
            )));
        }

        self.push_document(&entity.id).await
    }

    /// Fetch a document by id and reconcile its current state
    pub async fn push_document(&self, id: &str) -> Result<PushOutcome> {
        let doc = tokio::time::timeout(self.fetch_timeout, self.documents.fetch_document(id))
            .await
            .unwrap_or_else(|_| {
                Err(SyncError::TransientIo(format!(
                    "fetching document {} timed out after {:?}",
                    id, self.fetch_timeout
                )))
            })?;

        if doc.archived {
            tracing::debug!(document_id = %doc.id, "Ignoring archived document");
            return Ok(PushOutcome::ignored("document is archived"));
        }

        if let Some(parent) = &self.parent_id {
            let in_scope = doc
                .parent_id
                .as_deref()
                .is_some_and(|p| same_id(p, parent));
            if !in_scope {
                tracing::debug!(document_id = %doc.id, "Ignoring document outside the synced parent");
                return Ok(PushOutcome::ignored("document is outside the synced parent"));
            }
        }

        let report = self
            .reconciler
            .reconcile(&ChangeEvent::from_document(doc))
            .await;
        Ok(PushOutcome::Reconciled(report))
    }
}
