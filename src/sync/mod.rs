//! Sync core: echo suppression, reconciliation and the two drivers

pub mod cooldown;
pub mod locks;
pub mod poll;
pub mod push;
pub mod reconciler;

pub use cooldown::{should_suppress, DEFAULT_COOLDOWN};
pub use poll::{BatchSummary, ItemError, PollDriver};
pub use push::{PushDriver, PushOutcome, WebhookEntity, WebhookNotification};
pub use reconciler::{
    ChangeEvent, DocumentTarget, NoteTarget, Outcome, Payload, ReconcileReport, Reconciler,
    ReconcilerSettings, SyncTarget, WriteReceipt,
};
