//! Reconciler: decides, for one inbound change, whether to propagate it
//!
//! Per event:
//! 1. resolve the mapping by the origin-side id
//! 2. skip if the version marker did not advance (`skipped-unchanged`)
//! 3. skip if the cooldown guard flags an echo (`skipped-cooldown`)
//! 4. translate and write to the other side (update if mapped, else create)
//! 5. record the full mapping
//!
//! A failed write leaves the mapping untouched, so the next delivery of the
//! same document retries from the same state. Nothing is retried inline.
//! All state between invocations lives in the mapping store.
//!
//! Each reconciliation runs on its own task. A caller that stops waiting
//! (dropped webhook connection, aborted poll cycle) cannot interrupt the
//! window between a remote create and the upsert that records it.
//!
//! First-time syncs share one lock. The id a create will produce is unknown
//! until the remote answers, so a poll that already lists that new note can
//! only be told apart from a genuinely new note after the mapping lands.
//! The cost is that an initial import creates one pair at a time whatever
//! the poll concurrency; updates on mapped pairs still run in parallel.

use super::cooldown::{should_suppress, DEFAULT_COOLDOWN};
use super::locks::{KeyGuard, KeyedLocks};
use crate::error::{Result, SyncError};
use crate::keep::{Note, NoteApi};
use crate::mapping::{MappingStore, Origin, SyncMapping, VersionMarker};
use crate::notion::{Document, DocumentApi};
use crate::translate::ChangeTranslator;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Lock key shared by every first-time sync
const CREATE_KEY: &str = "create";

/// Raw state of the changed document, as observed on its own side
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Document(Document),
    Note(Note),
}

/// One inbound change from either side
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub origin: Origin,
    pub document_id: String,
    pub version: VersionMarker,
    pub payload: Payload,
}

impl ChangeEvent {
    pub fn from_document(doc: Document) -> Self {
        Self {
            origin: Origin::Left,
            document_id: doc.id.clone(),
            version: doc.last_edited_time.clone(),
            payload: Payload::Document(doc),
        }
    }

    /// `None` when the note has no usable id
    pub fn from_note(note: Note) -> Option<Self> {
        let id = note.resolvable_id()?.to_string();
        Some(Self {
            origin: Origin::Right,
            document_id: id,
            version: note.update_time.clone().unwrap_or_default(),
            payload: Payload::Note(note),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    AppliedCreated,
    AppliedUpdated,
    SkippedCooldown,
    SkippedUnchanged,
    Failed,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Outcome::AppliedCreated | Outcome::AppliedUpdated)
    }
}

/// Result of one reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub outcome: Outcome,
    /// Id written on the other side, for applied outcomes
    pub applied_id: Option<String>,
    pub error: Option<SyncError>,
}

impl ReconcileReport {
    fn skipped(outcome: Outcome) -> Self {
        Self {
            outcome,
            applied_id: None,
            error: None,
        }
    }

    fn failed(error: SyncError) -> Self {
        Self {
            outcome: Outcome::Failed,
            applied_id: None,
            error: Some(error),
        }
    }
}

/// What the other side reported after a write
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub id: String,
    pub version: VersionMarker,
}

/// One side as a write destination. Translation happens inside, so a
/// `Translation` error means nothing was sent.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    async fn create(&self, payload: &Payload) -> Result<WriteReceipt>;

    async fn update(&self, id: &str, payload: &Payload) -> Result<WriteReceipt>;
}

/// Writes documents into the note store
pub struct NoteTarget {
    api: Arc<dyn NoteApi>,
    translator: Arc<dyn ChangeTranslator>,
}

impl NoteTarget {
    pub fn new(api: Arc<dyn NoteApi>, translator: Arc<dyn ChangeTranslator>) -> Self {
        Self { api, translator }
    }

    fn fields(&self, payload: &Payload) -> Result<crate::keep::NoteFields> {
        match payload {
            Payload::Document(doc) => self.translator.to_right(doc),
            Payload::Note(_) => Err(SyncError::Translation(
                "a note cannot be written back as a note".into(),
            )),
        }
    }

    fn receipt(note: Note) -> Result<WriteReceipt> {
        let id = note
            .resolvable_id()
            .ok_or_else(|| {
                SyncError::Translation("note store returned a note without a name".into())
            })?
            .to_string();
        Ok(WriteReceipt {
            id,
            version: note.update_time.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl SyncTarget for NoteTarget {
    async fn create(&self, payload: &Payload) -> Result<WriteReceipt> {
        let fields = self.fields(payload)?;
        Self::receipt(self.api.create_note(&fields).await?)
    }

    async fn update(&self, id: &str, payload: &Payload) -> Result<WriteReceipt> {
        let fields = self.fields(payload)?;
        Self::receipt(self.api.update_note(id, &fields).await?)
    }
}

/// Writes notes into the document store, creating under `parent_id`
pub struct DocumentTarget {
    api: Arc<dyn DocumentApi>,
    translator: Arc<dyn ChangeTranslator>,
    parent_id: Option<String>,
}

impl DocumentTarget {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        translator: Arc<dyn ChangeTranslator>,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            api,
            translator,
            parent_id,
        }
    }

    fn fields(&self, payload: &Payload) -> Result<crate::notion::DocumentFields> {
        match payload {
            Payload::Note(note) => self.translator.to_left(note),
            Payload::Document(_) => Err(SyncError::Translation(
                "a document cannot be written back as a document".into(),
            )),
        }
    }
}

#[async_trait]
impl SyncTarget for DocumentTarget {
    async fn create(&self, payload: &Payload) -> Result<WriteReceipt> {
        let fields = self.fields(payload)?;
        let parent_id = self.parent_id.as_deref().ok_or_else(|| {
            SyncError::Translation("no parent configured for new documents".into())
        })?;
        let doc = self.api.create_document(parent_id, &fields).await?;
        Ok(WriteReceipt {
            id: doc.id,
            version: doc.last_edited_time,
        })
    }

    async fn update(&self, id: &str, payload: &Payload) -> Result<WriteReceipt> {
        let fields = self.fields(payload)?;
        let doc = self.api.update_document(id, &fields).await?;
        Ok(WriteReceipt {
            id: doc.id,
            version: doc.last_edited_time,
        })
    }
}

/// Tunables for the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub cooldown: Duration,
    /// Bound on every call to a remote or to the store
    pub call_timeout: Duration,
    /// Where documents created from notes are placed
    pub left_parent_id: Option<String>,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            call_timeout: Duration::from_secs(30),
            left_parent_id: None,
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn MappingStore>,
    left: Arc<dyn SyncTarget>,
    right: Arc<dyn SyncTarget>,
    cooldown: Duration,
    call_timeout: Duration,
    locks: KeyedLocks,
}

fn lock_key(side: Origin, id: &str) -> String {
    format!("{}:{}", side, id)
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MappingStore>,
        documents: Arc<dyn DocumentApi>,
        notes: Arc<dyn NoteApi>,
        translator: Arc<dyn ChangeTranslator>,
        settings: ReconcilerSettings,
    ) -> Self {
        let left = Arc::new(DocumentTarget::new(
            documents,
            translator.clone(),
            settings.left_parent_id.clone(),
        ));
        let right = Arc::new(NoteTarget::new(notes, translator));
        Self::with_targets(store, left, right, settings)
    }

    /// Build from explicit write targets
    pub fn with_targets(
        store: Arc<dyn MappingStore>,
        left: Arc<dyn SyncTarget>,
        right: Arc<dyn SyncTarget>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            left,
            right,
            cooldown: settings.cooldown,
            call_timeout: settings.call_timeout,
            locks: KeyedLocks::new(),
        }
    }

    fn target(&self, side: Origin) -> &dyn SyncTarget {
        match side {
            Origin::Left => self.left.as_ref(),
            Origin::Right => self.right.as_ref(),
        }
    }

    /// Reconcile one event. Errors are folded into a `Failed` report.
    ///
    /// Dropping the returned future does not cancel the work; the spawned
    /// task runs to completion and records its mapping.
    pub async fn reconcile(self: &Arc<Self>, event: &ChangeEvent) -> ReconcileReport {
        let this = Arc::clone(self);
        let event = event.clone();
        let task = tokio::spawn(async move { this.reconcile_inline(&event).await });
        match task.await {
            Ok(report) => report,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => ReconcileReport::failed(SyncError::TransientIo(format!(
                "reconcile task stopped: {}",
                e
            ))),
        }
    }

    async fn reconcile_inline(&self, event: &ChangeEvent) -> ReconcileReport {
        match self.try_reconcile(event).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(
                    origin = %event.origin,
                    document_id = %event.document_id,
                    kind = e.kind(),
                    "Reconciliation failed: {}",
                    e
                );
                ReconcileReport::failed(e)
            }
        }
    }

    async fn try_reconcile(&self, event: &ChangeEvent) -> Result<ReconcileReport> {
        let origin = event.origin;
        let other = origin.opposite();
        let (_guards, mapping) = self.lock_and_resolve(event).await?;
        let now = Utc::now();

        if let Some(m) = &mapping {
            if !event.version.is_newer_than(m.synced_version(origin)) {
                tracing::debug!(
                    origin = %origin,
                    document_id = %event.document_id,
                    version = %event.version,
                    "Skipped: version did not advance"
                );
                return Ok(ReconcileReport::skipped(Outcome::SkippedUnchanged));
            }
        }

        if should_suppress(mapping.as_ref(), origin, self.cooldown, now) {
            tracing::debug!(
                origin = %origin,
                document_id = %event.document_id,
                "Skipped: inside cooldown window after our own write"
            );
            return Ok(ReconcileReport::skipped(Outcome::SkippedCooldown));
        }

        let target = self.target(other);
        let (receipt, outcome) = match &mapping {
            Some(m) => {
                let other_id = m.id_on(other).to_string();
                let receipt = self
                    .remote_call("update", target.update(&other_id, &event.payload))
                    .await?;
                // Identifiers are immutable once mapped
                let receipt = WriteReceipt {
                    id: other_id,
                    ..receipt
                };
                (receipt, Outcome::AppliedUpdated)
            }
            None => {
                let receipt = self
                    .remote_call("create", target.create(&event.payload))
                    .await?;
                (receipt, Outcome::AppliedCreated)
            }
        };

        let last_write_timestamp = mapping
            .as_ref()
            .map(|m| m.last_write_timestamp.max(now))
            .unwrap_or(now);
        let (left_id, right_id, left_version, right_version) = match origin {
            Origin::Left => (
                event.document_id.clone(),
                receipt.id.clone(),
                event.version.clone(),
                receipt.version,
            ),
            Origin::Right => (
                receipt.id.clone(),
                event.document_id.clone(),
                receipt.version,
                event.version.clone(),
            ),
        };
        let updated = SyncMapping {
            left_id,
            right_id,
            last_synced_left_version: left_version,
            last_synced_right_version: right_version,
            last_write_origin: origin,
            last_write_timestamp,
        };

        if let Err(e) = self.store_call(self.store.upsert(&updated)).await {
            tracing::error!(
                left_id = %updated.left_id,
                right_id = %updated.right_id,
                "Write to {} succeeded but the mapping could not be recorded: {}",
                other,
                e
            );
            return Err(e);
        }

        tracing::info!(
            origin = %origin,
            left_id = %updated.left_id,
            right_id = %updated.right_id,
            outcome = ?outcome,
            "Applied change"
        );

        Ok(ReconcileReport {
            outcome,
            applied_id: Some(receipt.id),
            error: None,
        })
    }

    /// Take the locks for this event's pair and read its mapping under them.
    ///
    /// Lock order is origin key, then the shared create key or the left key.
    /// Left events never wait on a right key, so the order cannot cycle.
    async fn lock_and_resolve(
        &self,
        event: &ChangeEvent,
    ) -> Result<(Vec<KeyGuard>, Option<SyncMapping>)> {
        let mut guards = vec![
            self.locks
                .lock(lock_key(event.origin, &event.document_id))
                .await,
        ];
        let mut mapping = self.resolve(event).await?;

        if mapping.is_none() {
            // Serialize first syncs, so a poll that already lists a note we
            // are creating waits for its mapping instead of mirroring it back
            let create_guard = self.locks.lock(CREATE_KEY).await;
            mapping = self.resolve(event).await?;
            if mapping.is_none() {
                guards.push(create_guard);
                return Ok((guards, None));
            }
            drop(create_guard);
        }

        if event.origin == Origin::Right {
            if let Some(m) = &mapping {
                let left_key = lock_key(Origin::Left, &m.left_id);
                guards.push(self.locks.lock(left_key).await);
                mapping = self.resolve(event).await?;
            }
        }

        Ok((guards, mapping))
    }

    async fn resolve(&self, event: &ChangeEvent) -> Result<Option<SyncMapping>> {
        match event.origin {
            Origin::Left => self.store_call(self.store.get(&event.document_id)).await,
            Origin::Right => {
                self.store_call(self.store.get_by_right_id(&event.document_id))
                    .await
            }
        }
    }

    async fn remote_call<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(SyncError::TransientIo(format!(
                    "{} timed out after {:?}",
                    what, self.call_timeout
                )))
            })
    }

    async fn store_call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(SyncError::Storage(format!(
                    "mapping store did not answer within {:?}",
                    self.call_timeout
                )))
            })
    }
}
