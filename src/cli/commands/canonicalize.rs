//! Canonicalize command.

use serde::Serialize;

use listingscrape::{canonicalize_url, deduplication_key};

use super::print_json;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalForms {
    input: String,
    canonical: String,
    deduplication_key: String,
}

pub fn cmd_canonicalize(url: &str, strip_trailing_slash: bool) -> anyhow::Result<()> {
    print_json(&CanonicalForms {
        input: url.to_string(),
        canonical: canonicalize_url(url, strip_trailing_slash),
        deduplication_key: deduplication_key(url),
    })
}
