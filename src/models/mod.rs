//! Data models shared by extraction and reconciliation.

mod listing;

pub use listing::{is_empty_value, HistoryEntry, Listing, MergeDiff, PropertyHash};
