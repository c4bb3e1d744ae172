//! Listing reconciliation.
//!
//! - `listing`: merge a fresh extraction into a stored listing
//! - `sources`: merge extraction results for one listing from several sources

mod listing;
mod sources;

pub use listing::{merge_into_listing, MergePolicy};
pub use sources::{merge_listings, MergedListing, SourceEntry};
