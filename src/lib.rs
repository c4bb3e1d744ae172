//! listingscrape - property listing extraction and reconciliation.
//!
//! Turns raw portal HTML into structured listing data using per-portal
//! declarative mappings, grades the extraction, and reconciles listings
//! gathered from several sources or fetched repeatedly over time.

pub mod config;
pub mod extraction;
pub mod mapping;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod sanitize;
pub mod screening;
pub mod utils;

pub use extraction::{extract_from_html, ExtractionRequest, ExtractionResult};
pub use mapping::{Mapping, MappingRegistry};
pub use merge::{merge_into_listing, merge_listings};
pub use models::{Listing, MergeDiff, PropertyHash};
pub use quality::{assess_quality, assess_quality_weighted, QualityAssessment};
pub use sanitize::sanitize_property_hash;
pub use screening::{screen_url, PortalRegistry, ScreeningResult, Verdict};
pub use utils::{canonicalize_url, deduplication_key};
