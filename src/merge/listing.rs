//! Field-level merge of a fresh extraction into a stored listing.

use std::collections::HashSet;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

use crate::models::{is_empty_value, HistoryEntry, Listing, MergeDiff, PropertyHash};
use crate::utils::canonicalize_url;

/// Identity of the import; set once.
const IMMUTABLE_FIELDS: &[&str] = &["import_url", "import_host_slug"];

/// Listing state that the latest scrape reports authoritatively.
const LATEST_WINS_FIELDS: &[&str] = &[
    "price_string",
    "price_float",
    "price_cents",
    "price_sale_current",
    "price_rental_monthly_current",
    "currency",
    "sold",
    "reserved",
    "for_sale",
    "for_rent",
    "for_rent_long_term",
    "for_rent_short_term",
    "visible",
    "archived",
];

/// How one field reconciles an incoming value with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Filled while empty, never overwritten.
    Immutable,
    /// Filled while empty.
    FillEmpty,
    /// Replaced by a strictly longer text.
    RicherWins,
    /// Replaced by any non-empty incoming value; booleans by any non-null one.
    LatestWins,
    /// Union of images by canonical URL.
    DedupAppend,
    /// Union of strings ignoring case.
    DedupAppendCaseInsensitive,
}

impl MergePolicy {
    pub fn for_field(field: &str) -> Self {
        if IMMUTABLE_FIELDS.contains(&field) {
            MergePolicy::Immutable
        } else if LATEST_WINS_FIELDS.contains(&field) {
            MergePolicy::LatestWins
        } else {
            match field {
                "description" => MergePolicy::RicherWins,
                "image_urls" => MergePolicy::DedupAppend,
                "features" => MergePolicy::DedupAppendCaseInsensitive,
                _ => MergePolicy::FillEmpty,
            }
        }
    }

    /// The value `field` should hold after merging `incoming`, or `None` to
    /// keep `current`.
    fn resolve(&self, current: &Value, incoming: &Value) -> Option<Value> {
        match self {
            MergePolicy::Immutable | MergePolicy::FillEmpty => {
                (is_empty_value(current) && !is_empty_value(incoming)).then(|| incoming.clone())
            }
            MergePolicy::RicherWins => {
                (text_len(incoming) > text_len(current)).then(|| incoming.clone())
            }
            MergePolicy::LatestWins => {
                // `false` is a real state for flags; elsewhere 0 and "" mean not found.
                let present = incoming.is_boolean() || !is_empty_value(incoming);
                present.then(|| incoming.clone())
            }
            MergePolicy::DedupAppend => merge_images(current, incoming),
            MergePolicy::DedupAppendCaseInsensitive => merge_features(current, incoming),
        }
    }
}

fn text_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        _ => 0,
    }
}

/// Merge `incoming` into `existing` in place.
///
/// Appends one `merge` entry to `existing.history`. Callers must not merge
/// into the same listing concurrently; the returned diff is the only record
/// of what changed.
pub fn merge_into_listing(existing: &mut Listing, incoming: &PropertyHash) -> MergeDiff {
    let mut diff = MergeDiff {
        was_existing_listing: existing.has_content(),
        ..Default::default()
    };

    for (field, value) in incoming {
        let current = existing.fields.get(field).cloned().unwrap_or(Value::Null);
        let Some(merged) = MergePolicy::for_field(field).resolve(&current, value) else {
            continue;
        };
        if merged == current {
            continue;
        }

        diff.fields_changed.push(field.clone());
        if is_empty_value(&current) {
            diff.fields_added.push(field.clone());
        } else {
            diff.fields_overwritten.push(field.clone());
        }
        existing.fields.insert(field.clone(), merged);
    }

    let key = history_key(existing);
    existing.history.insert(
        key,
        HistoryEntry {
            action: "merge".to_string(),
            fields_changed: diff.fields_changed.len(),
        },
    );

    debug!(
        "Merged {} fields ({} added, {} overwritten)",
        diff.fields_changed.len(),
        diff.fields_added.len(),
        diff.fields_overwritten.len()
    );
    diff
}

/// A timestamp key not yet present in the listing's history.
fn history_key(listing: &Listing) -> String {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
    if !listing.history.contains_key(&now) {
        return now;
    }
    let mut n = 1;
    loop {
        let key = format!("{}#{}", now, n);
        if !listing.history.contains_key(&key) {
            return key;
        }
        n += 1;
    }
}

fn as_items(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Canonical identity of an image entry, a string or `{"url": ...}`.
fn image_identity(entry: &Value) -> String {
    match entry.as_str().or_else(|| entry.get("url").and_then(|u| u.as_str())) {
        Some(url) => canonicalize_url(url.trim(), true),
        None => entry.to_string(),
    }
}

/// Merge two image lists. A strictly longer incoming list replaces the
/// stored one; otherwise existing order is kept and new incoming images are
/// appended.
fn merge_images(current: &Value, incoming: &Value) -> Option<Value> {
    let existing = as_items(current);
    let fresh = as_items(incoming);
    let retained: &[Value] = if fresh.len() > existing.len() {
        &[]
    } else {
        existing
    };

    let mut seen = HashSet::new();
    let merged: Vec<Value> = retained
        .iter()
        .chain(fresh)
        .filter(|entry| seen.insert(image_identity(entry)))
        .cloned()
        .collect();

    (!merged.is_empty()).then_some(Value::Array(merged))
}

/// Union two feature lists ignoring case, existing entries first.
fn merge_features(current: &Value, incoming: &Value) -> Option<Value> {
    let mut seen = HashSet::new();
    let merged: Vec<Value> = as_items(current)
        .iter()
        .chain(as_items(incoming))
        .filter(|entry| {
            let key = match entry.as_str() {
                Some(s) => s.trim().to_lowercase(),
                None => entry.to_string(),
            };
            seen.insert(key)
        })
        .cloned()
        .collect();

    (!merged.is_empty()).then_some(Value::Array(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hash(value: Value) -> PropertyHash {
        value.as_object().cloned().unwrap()
    }

    fn listing(value: Value) -> Listing {
        Listing::new(hash(value))
    }

    #[test]
    fn test_policy_for_field() {
        assert_eq!(MergePolicy::for_field("import_url"), MergePolicy::Immutable);
        assert_eq!(MergePolicy::for_field("description"), MergePolicy::RicherWins);
        assert_eq!(MergePolicy::for_field("price_float"), MergePolicy::LatestWins);
        assert_eq!(MergePolicy::for_field("image_urls"), MergePolicy::DedupAppend);
        assert_eq!(
            MergePolicy::for_field("features"),
            MergePolicy::DedupAppendCaseInsensitive
        );
        assert_eq!(MergePolicy::for_field("title"), MergePolicy::FillEmpty);
    }

    #[test]
    fn test_fill_empty() {
        let mut existing = listing(json!({"title": "", "city": "Leeds"}));
        let diff = merge_into_listing(&mut existing, &hash(json!({"title": "X", "city": "York"})));
        assert_eq!(existing.get("title"), Some(&json!("X")));
        assert_eq!(existing.get("city"), Some(&json!("Leeds")));
        assert_eq!(diff.fields_added, vec!["title"]);
        assert!(diff.fields_overwritten.is_empty());
        assert!(diff.was_existing_listing);
    }

    #[test]
    fn test_zero_is_filled() {
        let mut existing = listing(json!({"count_bedrooms": 0}));
        let diff = merge_into_listing(&mut existing, &hash(json!({"count_bedrooms": 2})));
        assert_eq!(existing.get("count_bedrooms"), Some(&json!(2)));
        assert_eq!(diff.fields_added, vec!["count_bedrooms"]);
        assert!(!diff.was_existing_listing);
    }

    #[test]
    fn test_richer_wins() {
        let mut existing = listing(json!({"description": "A long and detailed description"}));
        let diff = merge_into_listing(&mut existing, &hash(json!({"description": "Short"})));
        assert_eq!(
            existing.get("description"),
            Some(&json!("A long and detailed description"))
        );
        assert!(!diff.has_changes());

        let diff = merge_into_listing(
            &mut existing,
            &hash(json!({"description": "A long and detailed description, now with garden"})),
        );
        assert_eq!(diff.fields_overwritten, vec!["description"]);
    }

    #[test]
    fn test_immutable_fields() {
        let mut existing = listing(json!({
            "import_url": "https://a.com/1",
            "import_host_slug": "a"
        }));
        let diff = merge_into_listing(
            &mut existing,
            &hash(json!({"import_url": "https://b.com/2", "import_host_slug": "b"})),
        );
        assert_eq!(existing.get("import_url"), Some(&json!("https://a.com/1")));
        assert_eq!(existing.get("import_host_slug"), Some(&json!("a")));
        assert!(!diff.has_changes());

        let mut fresh = listing(json!({}));
        merge_into_listing(&mut fresh, &hash(json!({"import_url": "https://b.com/2"})));
        assert_eq!(fresh.get("import_url"), Some(&json!("https://b.com/2")));
    }

    #[test]
    fn test_latest_wins() {
        let mut existing = listing(json!({"price_float": 100.0, "sold": true, "currency": "EUR"}));
        let diff = merge_into_listing(
            &mut existing,
            &hash(json!({"price_float": 90.0, "sold": false, "currency": null})),
        );
        assert_eq!(existing.get("price_float"), Some(&json!(90.0)));
        assert_eq!(existing.get("sold"), Some(&json!(false)));
        assert_eq!(existing.get("currency"), Some(&json!("EUR")));
        assert_eq!(diff.fields_overwritten, vec!["price_float", "sold"]);
    }

    #[test]
    fn test_latest_wins_ignores_empty_rescrape() {
        let mut existing = listing(json!({
            "price_string": "£450,000",
            "price_float": 450000.0,
            "for_sale": true
        }));
        let diff = merge_into_listing(
            &mut existing,
            &hash(json!({"price_string": "", "price_float": 0.0, "for_sale": false})),
        );
        assert_eq!(existing.get("price_string"), Some(&json!("£450,000")));
        assert_eq!(existing.get("price_float"), Some(&json!(450000.0)));
        assert_eq!(existing.get("for_sale"), Some(&json!(false)));
        assert_eq!(diff.fields_overwritten, vec!["for_sale"]);
    }

    #[test]
    fn test_images_union_existing_first() {
        let mut existing = listing(json!({"image_urls": [
            {"url": "https://a.com/1.jpg"},
            {"url": "https://a.com/2.jpg"}
        ]}));
        merge_into_listing(
            &mut existing,
            &hash(json!({"image_urls": [
                {"url": "http://a.com/2.jpg?utm_source=feed"},
                {"url": "https://a.com/3.jpg"}
            ]})),
        );
        assert_eq!(
            existing.get("image_urls"),
            Some(&json!([
                {"url": "https://a.com/1.jpg"},
                {"url": "https://a.com/2.jpg"},
                {"url": "https://a.com/3.jpg"}
            ]))
        );
    }

    #[test]
    fn test_images_longer_incoming_replaces() {
        let mut existing = listing(json!({"image_urls": [
            {"url": "https://a.com/9.jpg"},
            {"url": "https://a.com/2.jpg"}
        ]}));
        merge_into_listing(
            &mut existing,
            &hash(json!({"image_urls": [
                {"url": "https://a.com/1.jpg"},
                {"url": "https://a.com/2.jpg"},
                {"url": "https://a.com/3.jpg"}
            ]})),
        );
        assert_eq!(
            existing.get("image_urls"),
            Some(&json!([
                {"url": "https://a.com/1.jpg"},
                {"url": "https://a.com/2.jpg"},
                {"url": "https://a.com/3.jpg"}
            ]))
        );
    }

    #[test]
    fn test_images_longer_incoming_dedupes_itself() {
        let mut existing = listing(json!({"image_urls": ["https://a.com/9.jpg"]}));
        merge_into_listing(
            &mut existing,
            &hash(json!({"image_urls": [
                "https://a.com/1.jpg",
                "http://a.com/1.jpg#zoom",
                "https://a.com/2.jpg"
            ]})),
        );
        assert_eq!(
            existing.get("image_urls"),
            Some(&json!(["https://a.com/1.jpg", "https://a.com/2.jpg"]))
        );
    }

    #[test]
    fn test_features_case_insensitive() {
        let mut existing = listing(json!({"features": ["Garden", "Garage"]}));
        let diff = merge_into_listing(
            &mut existing,
            &hash(json!({"features": ["garden", "Pool", "GARAGE"]})),
        );
        assert_eq!(
            existing.get("features"),
            Some(&json!(["Garden", "Garage", "Pool"]))
        );
        assert_eq!(diff.fields_overwritten, vec!["features"]);

        let diff = merge_into_listing(&mut existing, &hash(json!({"features": ["pool"]})));
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_history_entry_per_merge() {
        let mut existing = listing(json!({}));
        merge_into_listing(&mut existing, &hash(json!({"title": "A"})));
        merge_into_listing(&mut existing, &hash(json!({"title": "B"})));
        assert_eq!(existing.history.len(), 2);
        let counts: Vec<usize> = existing.history.values().map(|e| e.fields_changed).collect();
        assert_eq!(counts.iter().sum::<usize>(), 1);
        assert!(existing.history.values().all(|e| e.action == "merge"));
    }
}
