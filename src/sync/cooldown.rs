//! Echo suppression after our own writes
//!
//! When a change from side A is applied to side B, the same edit comes back a
//! moment later (webhook redelivery, next poll). Events from the side that
//! originated the last write are suppressed for `cooldown` after it.
//!
//! Known trade-off: a genuine edit made on that side within the window is
//! suppressed too, until the window expires and the next event for the
//! document arrives. Shortening the window trades this for more loop risk.

use crate::mapping::{Origin, SyncMapping};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default cooldown window
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(30_000);

/// Decide whether an incoming change is an echo of our own prior write.
///
/// - no mapping: never suppress (first sync always proceeds)
/// - origin differs from the last write's origin: never suppress
/// - same origin: suppress while `now - last_write_timestamp < cooldown`;
///   exactly `cooldown` elapsed is not suppressed
pub fn should_suppress(
    mapping: Option<&SyncMapping>,
    incoming: Origin,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(mapping) = mapping else {
        return false;
    };
    if mapping.last_write_origin != incoming {
        return false;
    }
    // A clock step backwards reads as zero elapsed: still inside the window
    let elapsed = (now - mapping.last_write_timestamp)
        .to_std()
        .unwrap_or(Duration::ZERO);
    elapsed < cooldown
}
