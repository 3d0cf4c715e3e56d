//! Idempotency ledger.
//!
//! A SQLite table keyed by item id records every item whose produced files
//! were all handed to the uploader. The controller consults it before
//! fetching and writes to it only after the last upload succeeded, so a
//! repeated invocation never re-processes an item that already synced.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{Ledger, SqliteLedger};
pub use error::StateError;
pub use types::ItemRecord;
