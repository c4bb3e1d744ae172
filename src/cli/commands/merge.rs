//! Merge command.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use listingscrape::models::{Listing, MergeDiff, PropertyHash};
use listingscrape::merge_into_listing;

use super::print_json;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeOutput {
    diff: MergeDiff,
    listing: Listing,
}

/// Merge `incoming` into the listing stored at `existing`.
pub fn cmd_merge(existing: &Path, incoming: &Path, write: bool) -> anyhow::Result<()> {
    let mut listing: Listing = read_json(existing)?;
    let properties: PropertyHash = read_json(incoming)?;

    let diff = merge_into_listing(&mut listing, &properties);
    tracing::info!(
        "Merged {} into {}: {} fields changed",
        incoming.display(),
        existing.display(),
        diff.fields_changed.len()
    );

    if write {
        let json = serde_json::to_string_pretty(&listing)?;
        fs::write(existing, json)
            .with_context(|| format!("Failed to write {}", existing.display()))?;
    }

    print_json(&MergeOutput { diff, listing })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}
