//! Mapping listing command.

use serde::Serialize;

use listingscrape::config::Settings;

use super::print_json;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MappingSummary {
    name: String,
    fields: usize,
    expected_extraction_rate: Option<f64>,
}

/// List registered mappings with their field counts.
pub fn cmd_mappings(settings: &Settings) -> anyhow::Result<()> {
    let registry = settings.mapping_registry()?;
    let summaries: Vec<MappingSummary> = registry
        .list_all_mapping_names()
        .into_iter()
        .filter_map(|name| {
            let mapping = registry.find_mapping_by_name(&name)?;
            let keyed: usize = [
                &mapping.default_values,
                &mapping.int_fields,
                &mapping.float_fields,
                &mapping.text_fields,
                &mapping.boolean_fields,
            ]
            .iter()
            .map(|section| section.len())
            .sum();
            Some(MappingSummary {
                fields: keyed + mapping.images.len() + mapping.features.len(),
                expected_extraction_rate: mapping.expected_extraction_rate,
                name,
            })
        })
        .collect();
    print_json(&summaries)
}
