//! Property hash sanitization before a hash is trusted downstream.

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::models::PropertyHash;
use crate::utils::strip_tags;

/// Fields holding free text that may carry markup.
pub const FREE_TEXT_FIELDS: &[&str] = &[
    "title",
    "description",
    "address_string",
    "street_address",
    "city",
    "region",
    "province",
    "postal_code",
    "country",
    "locale_code",
    "property_type",
    "agent_name",
];

/// Strip markup from free text and validate URL-bearing fields in place.
///
/// `main_image_url` becomes `null` when it is not a valid http(s) URL;
/// invalid `image_urls` entries are dropped. String `features` entries are
/// tag-stripped, other entries are left alone.
pub fn sanitize_property_hash(hash: &mut PropertyHash) {
    for field in FREE_TEXT_FIELDS {
        if let Some(Value::String(text)) = hash.get_mut(*field) {
            *text = strip_tags(text);
        }
    }

    if let Some(value) = hash.get_mut("main_image_url") {
        *value = match value.as_str().and_then(safe_http_url) {
            Some(url) => Value::String(url),
            None => {
                if !value.is_null() {
                    debug!("Rejected main_image_url {}", value);
                }
                Value::Null
            }
        };
    }

    if let Some(Value::Array(images)) = hash.get_mut("image_urls") {
        let before = images.len();
        images.retain_mut(sanitize_image_entry);
        if images.len() != before {
            debug!("Dropped {} invalid image_urls entries", before - images.len());
        }
    }

    if let Some(Value::Array(features)) = hash.get_mut("features") {
        for feature in features.iter_mut() {
            if let Value::String(text) = feature {
                *text = strip_tags(text);
            }
        }
    }
}

/// Repair and validate one `image_urls` entry; `false` drops it.
fn sanitize_image_entry(entry: &mut Value) -> bool {
    match entry {
        Value::String(raw) => match safe_http_url(raw) {
            Some(url) => {
                *raw = url;
                true
            }
            None => false,
        },
        Value::Object(map) => {
            let repaired = map.get("url").and_then(|v| v.as_str()).and_then(safe_http_url);
            match repaired {
                Some(url) => {
                    map.insert("url".to_string(), Value::String(url));
                    true
                }
                None => false,
            }
        }
        _ => false,
    }
}

/// The URL with protocol-relative form repaired, if it is http(s).
pub fn safe_http_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let repaired = match raw.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => raw.to_string(),
    };
    let url = Url::parse(&repaired).ok()?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Some(repaired),
        _ => None,
    }
}
