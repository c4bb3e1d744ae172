//! Shared utility functions.
//!
//! - `html`: tag stripping for free-text fields
//! - `url`: URL canonicalization and deduplication keys

mod html;
mod url;

pub use self::html::strip_tags;
pub use self::url::{canonicalize_url, deduplication_key};
