//! Types for the idempotency ledger.

use chrono::{DateTime, Utc};

/// Stored in place of a channel id when an item was synced on its own.
pub const UNKNOWN_CHANNEL: &str = "unknown";

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    /// Source item id (primary key).
    pub item_id: String,
    /// Channel the item was synced from, if it was part of a channel sync.
    pub channel_id: Option<String>,
    /// When the item was last marked synced.
    pub synced_at: DateTime<Utc>,
}

/// Map an optional channel id to its stored form.
pub(crate) fn channel_to_column(channel_id: Option<&str>) -> &str {
    match channel_id {
        Some(c) if !c.is_empty() => c,
        _ => UNKNOWN_CHANNEL,
    }
}

/// Map a stored channel column back to an optional channel id.
pub(crate) fn channel_from_column(column: String) -> Option<String> {
    if column == UNKNOWN_CHANNEL {
        None
    } else {
        Some(column)
    }
}
