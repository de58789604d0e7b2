//! Poll driver for the note store
//!
//! Each cycle enumerates every note and feeds the live ones to the
//! reconciler as right-side events. Items are isolated from each other:
//! one failure is recorded and the rest of the batch still runs. The only
//! exception is an authentication failure: no further items are started,
//! the ones already in flight are awaited, and the cycle fails.

use super::reconciler::{ChangeEvent, Outcome, Reconciler};
use crate::error::{Result, SyncError};
use crate::keep::NoteApi;
use crate::mapping::MappingStore;
use chrono::Utc;
use futures::future;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// One failed item in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub id: String,
    pub message: String,
}

/// Aggregate result of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Items that completed without error (applied or skipped)
    pub processed_count: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<ItemError>,
}

impl BatchSummary {
    fn record(&mut self, id: String, outcome: Outcome, error: Option<SyncError>) {
        match outcome {
            Outcome::AppliedCreated => {
                self.processed_count += 1;
                self.created_count += 1;
            }
            Outcome::AppliedUpdated => {
                self.processed_count += 1;
                self.updated_count += 1;
            }
            Outcome::SkippedCooldown | Outcome::SkippedUnchanged => {
                self.processed_count += 1;
                self.skipped_count += 1;
            }
            Outcome::Failed => self.errors.push(ItemError {
                id,
                message: error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown failure".to_string()),
            }),
        }
    }
}

pub struct PollDriver {
    notes: Arc<dyn NoteApi>,
    store: Arc<dyn MappingStore>,
    reconciler: Arc<Reconciler>,
    concurrency: usize,
    list_timeout: Duration,
}

impl PollDriver {
    pub fn new(
        notes: Arc<dyn NoteApi>,
        store: Arc<dyn MappingStore>,
        reconciler: Arc<Reconciler>,
        concurrency: usize,
        list_timeout: Duration,
    ) -> Self {
        Self {
            notes,
            store,
            reconciler,
            concurrency: concurrency.max(1),
            list_timeout,
        }
    }

    /// Run one enumeration cycle.
    ///
    /// Fails only when the note list cannot be fetched or a remote rejects
    /// our credentials; per-item errors land in the summary.
    pub async fn run_cycle(&self) -> Result<BatchSummary> {
        let started_at = Utc::now();

        let notes = tokio::time::timeout(self.list_timeout, self.notes.list_notes())
            .await
            .unwrap_or_else(|_| {
                Err(SyncError::TransientIo(format!(
                    "listing notes timed out after {:?}",
                    self.list_timeout
                )))
            })?;

        let total = notes.len();
        let events: Vec<ChangeEvent> = notes
            .into_iter()
            .filter(|note| !note.trashed)
            .filter_map(ChangeEvent::from_note)
            .collect();
        tracing::debug!(total, live = events.len(), "Polled note store");

        let aborted = AtomicBool::new(false);
        let reconciler = &self.reconciler;
        let mut results = stream::iter(events)
            .take_while(|_| future::ready(!aborted.load(Ordering::SeqCst)))
            .map(|event| async move {
                let report = reconciler.reconcile(&event).await;
                (event.document_id, report)
            })
            .buffer_unordered(self.concurrency);

        let mut summary = BatchSummary::default();
        let mut auth_failure = None;
        while let Some((id, report)) = results.next().await {
            if auth_failure.is_none() {
                if let Some(err @ SyncError::Auth(_)) = &report.error {
                    tracing::error!(note_id = %id, "Aborting poll cycle: {}", err);
                    aborted.store(true, Ordering::SeqCst);
                    auth_failure = Some(err.clone());
                }
            }
            summary.record(id, report.outcome, report.error);
        }

        if let Some(err) = auth_failure {
            tracing::debug!(
                processed = summary.processed_count,
                errors = summary.errors.len(),
                "Drained in-flight items of the aborted cycle"
            );
            return Err(err);
        }

        if let Err(e) = self.store.record_last_polled(started_at).await {
            tracing::warn!("Failed to record last poll time: {}", e);
        }

        Ok(summary)
    }

    /// Run cycles on a fixed interval until `shutdown` changes. A failed
    /// cycle is logged and the loop carries on. A cycle already running when
    /// shutdown arrives is finished first.
    pub fn spawn_loop(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                match self.run_cycle().await {
                    Ok(summary) => tracing::info!(
                        processed = summary.processed_count,
                        created = summary.created_count,
                        updated = summary.updated_count,
                        skipped = summary.skipped_count,
                        errors = summary.errors.len(),
                        "Poll cycle complete"
                    ),
                    Err(e) => tracing::warn!(kind = e.kind(), "Poll cycle failed: {}", e),
                }
            }
            tracing::debug!("Poll loop stopped");
        })
    }
}
