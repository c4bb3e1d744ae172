//! Listing models: the extracted property hash and the stored listing record.
//!
//! A `PropertyHash` is the untyped output of one extraction run. A `Listing`
//! is what the storage layer hands back for reconciliation: the same field
//! map plus an audit history of merges applied to it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized field name to extracted value.
pub type PropertyHash = serde_json::Map<String, Value>;

/// Whether a stored value counts as "not found".
///
/// Zero, `false` and the empty string are treated as empty along with
/// `null` and empty collections. A genuine zero is indistinguishable from
/// a missing value; quality grades and merge decisions depend on that.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Audit entry recorded on a listing for each merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: String,
    pub fields_changed: usize,
}

/// A persisted listing as loaded by the storage layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing fields, flattened alongside `history` when serialized.
    #[serde(flatten)]
    pub fields: PropertyHash,
    /// Merge audit trail keyed by RFC 3339 timestamp.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub history: BTreeMap<String, HistoryEntry>,
}

impl Listing {
    pub fn new(fields: PropertyHash) -> Self {
        Self {
            fields,
            history: BTreeMap::new(),
        }
    }

    /// Get a field value, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether any field holds a non-empty value.
    pub fn has_content(&self) -> bool {
        self.fields.values().any(|v| !is_empty_value(v))
    }
}

/// Effect of one merge into a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeDiff {
    /// Every field whose value changed.
    pub fields_changed: Vec<String>,
    /// Changed fields that were empty before the merge.
    pub fields_added: Vec<String>,
    /// Changed fields that held a value before the merge.
    pub fields_overwritten: Vec<String>,
    pub was_existing_listing: bool,
}

impl MergeDiff {
    pub fn has_changes(&self) -> bool {
        !self.fields_changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!(0)));
        assert!(is_empty_value(&json!(0.0)));
        assert!(is_empty_value(&json!(false)));
        assert!(is_empty_value(&json!([])));
        assert!(!is_empty_value(&json!("x")));
        assert!(!is_empty_value(&json!(3)));
        assert!(!is_empty_value(&json!(true)));
        assert!(!is_empty_value(&json!([{"url": "a"}])));
    }

    #[test]
    fn test_listing_serde_flattens_fields() {
        let listing: Listing = serde_json::from_value(json!({
            "title": "Flat",
            "count_bedrooms": 2
        }))
        .unwrap();
        assert_eq!(listing.get("title"), Some(&json!("Flat")));
        assert!(listing.history.is_empty());

        let out = serde_json::to_value(&listing).unwrap();
        assert_eq!(out, json!({"title": "Flat", "count_bedrooms": 2}));
    }

    #[test]
    fn test_listing_has_content() {
        assert!(!Listing::default().has_content());
        let mut fields = PropertyHash::new();
        fields.insert("title".into(), json!(""));
        assert!(!Listing::new(fields.clone()).has_content());
        fields.insert("price_float".into(), json!(100.0));
        assert!(Listing::new(fields).has_content());
    }
}
