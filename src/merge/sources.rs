//! Merge extraction results for one listing gathered from several sources.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::extraction::ExtractionResult;
use crate::models::{is_empty_value, PropertyHash};
use crate::utils::{canonicalize_url, deduplication_key};

/// One extraction result and where it was fetched from.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub source_url: String,
    pub result: ExtractionResult,
}

impl SourceEntry {
    pub fn new(source_url: impl Into<String>, result: ExtractionResult) -> Self {
        Self {
            source_url: source_url.into(),
            result,
        }
    }

    /// Fingerprint, or the source page identity when none was supplied.
    fn group_key(&self) -> String {
        self.result
            .fingerprint
            .clone()
            .unwrap_or_else(|| deduplication_key(&self.source_url))
    }

    fn properties(&self) -> Option<&PropertyHash> {
        if !self.result.success {
            return None;
        }
        self.result.properties.first()
    }
}

/// A listing reconciled from every source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedListing {
    pub fingerprint: String,
    pub properties: PropertyHash,
    /// Canonical URLs of every contributing source, in input order.
    pub sources: Vec<String>,
    /// The source whose properties formed the base.
    pub base_source: String,
}

fn populated_count(properties: &PropertyHash) -> usize {
    properties.values().filter(|v| !is_empty_value(v)).count()
}

/// Group results by fingerprint and merge each group.
///
/// The survivor with the most populated fields is the base (the earliest
/// on ties); the others only fill its empty fields. Failed results and
/// results without properties are ignored, and groups left empty are
/// omitted. Groups appear in order of first appearance.
pub fn merge_listings(entries: &[SourceEntry]) -> Vec<MergedListing> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<(&SourceEntry, &PropertyHash)>> = HashMap::new();
    for entry in entries {
        let Some(properties) = entry.properties() else {
            debug!("Skipping unusable result from {}", entry.source_url);
            continue;
        };
        let key = entry.group_key();
        let group = groups.entry(key.clone()).or_default();
        if group.is_empty() {
            order.push(key);
        }
        group.push((entry, properties));
    }

    order
        .into_iter()
        .filter_map(|key| {
            let members = groups.remove(&key)?;
            merge_group(key, &members)
        })
        .collect()
}

fn merge_group(fingerprint: String, members: &[(&SourceEntry, &PropertyHash)]) -> Option<MergedListing> {
    let mut base_index = 0;
    let mut base_count = populated_count(members.first()?.1);
    for (i, (_, properties)) in members.iter().enumerate().skip(1) {
        let count = populated_count(properties);
        if count > base_count {
            base_index = i;
            base_count = count;
        }
    }

    let (base_entry, base_properties) = members[base_index];
    let mut merged = base_properties.clone();
    for (i, (_, properties)) in members.iter().enumerate() {
        if i == base_index {
            continue;
        }
        for (field, value) in properties.iter() {
            if is_empty_value(value) {
                continue;
            }
            let gap = merged.get(field).map(is_empty_value).unwrap_or(true);
            if gap {
                merged.insert(field.clone(), value.clone());
            }
        }
    }

    let mut sources: Vec<String> = Vec::new();
    for (entry, _) in members {
        let canonical = canonicalize_url(&entry.source_url, true);
        if !sources.contains(&canonical) {
            sources.push(canonical);
        }
    }

    debug!(
        "Merged {} sources for {} (base {} with {} fields)",
        members.len(),
        fingerprint,
        base_entry.source_url,
        base_count
    );
    Some(MergedListing {
        fingerprint,
        properties: merged,
        sources,
        base_source: canonicalize_url(&base_entry.source_url, true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionError;
    use serde_json::{json, Value};

    fn ok(properties: Value, fingerprint: Option<&str>) -> ExtractionResult {
        ExtractionResult {
            success: true,
            properties: vec![properties.as_object().cloned().unwrap()],
            diagnostics: None,
            error_message: None,
            fingerprint: fingerprint.map(str::to_string),
        }
    }

    #[test]
    fn test_richest_result_is_base() {
        let entries = vec![
            SourceEntry::new(
                "https://a.com/1?utm_source=x",
                ok(json!({"title": "Flat", "price_float": 0}), Some("fp1")),
            ),
            SourceEntry::new(
                "https://b.com/1",
                ok(json!({"title": "Nice flat", "city": "Leeds", "price_float": 100.0}), Some("fp1")),
            ),
            SourceEntry::new(
                "https://c.com/1",
                ok(json!({"title": "Other", "postal_code": "LS1", "city": "York"}), Some("fp1")),
            ),
        ];
        let merged = merge_listings(&entries);
        assert_eq!(merged.len(), 1);
        let listing = &merged[0];
        assert_eq!(listing.fingerprint, "fp1");
        assert_eq!(listing.base_source, "https://b.com/1");
        assert_eq!(listing.properties["title"], json!("Nice flat"));
        assert_eq!(listing.properties["city"], json!("Leeds"));
        assert_eq!(listing.properties["postal_code"], json!("LS1"));
        assert_eq!(listing.properties["price_float"], json!(100.0));
        assert_eq!(
            listing.sources,
            vec!["https://a.com/1", "https://b.com/1", "https://c.com/1"]
        );
    }

    #[test]
    fn test_tie_keeps_first() {
        let entries = vec![
            SourceEntry::new("https://a.com/1", ok(json!({"title": "A"}), Some("fp"))),
            SourceEntry::new("https://b.com/1", ok(json!({"title": "B"}), Some("fp"))),
        ];
        let merged = merge_listings(&entries);
        assert_eq!(merged[0].properties["title"], json!("A"));
        assert_eq!(merged[0].base_source, "https://a.com/1");
    }

    #[test]
    fn test_failed_and_empty_results_dropped() {
        let entries = vec![
            SourceEntry::new(
                "https://a.com/1",
                ExtractionResult::failure(&ExtractionError::NoMapping).with_fingerprint("fp"),
            ),
            SourceEntry::new(
                "https://b.com/1",
                ExtractionResult {
                    properties: Vec::new(),
                    ..ok(json!({}), Some("fp"))
                },
            ),
            SourceEntry::new("https://c.com/1", ok(json!({"title": "C"}), Some("other"))),
        ];
        let merged = merge_listings(&entries);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].fingerprint, "other");
        assert_eq!(merged[0].sources, vec!["https://c.com/1"]);
    }

    #[test]
    fn test_missing_fingerprint_groups_by_page() {
        let entries = vec![
            SourceEntry::new("https://a.com/listing/1?ref=x", ok(json!({"title": "A"}), None)),
            SourceEntry::new("https://z.com/2", ok(json!({"title": "Z"}), None)),
            SourceEntry::new("https://A.com/listing/1/", ok(json!({"city": "Leeds"}), None)),
        ];
        let merged = merge_listings(&entries);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].fingerprint, "a.com/listing/1");
        assert_eq!(merged[0].properties["city"], json!("Leeds"));
        assert_eq!(
            merged[0].sources,
            vec!["https://a.com/listing/1"]
        );
        assert_eq!(merged[1].fingerprint, "z.com/2");
    }
}
