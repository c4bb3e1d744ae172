//! Extract command.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use listingscrape::config::Settings;
use listingscrape::extraction::extract_from_html;
use listingscrape::pipeline::Pipeline;
use listingscrape::ExtractionRequest;

use super::print_json;

/// Extract a listing from a saved page and print it.
pub fn cmd_extract(
    settings: &Settings,
    file: &Path,
    mapping: &str,
    url: &str,
    raw: bool,
) -> anyhow::Result<()> {
    let html = read_html(file, settings.max_html_bytes)?;
    let registry = settings.mapping_registry()?;
    let request = ExtractionRequest::new(&html, url).with_mapping_name(mapping);

    if raw {
        let result = extract_from_html(&request, &registry);
        print_json(&result)?;
        if !result.success {
            anyhow::bail!(
                "{}",
                result.error_message.unwrap_or_else(|| "Extraction failed".to_string())
            );
        }
        return Ok(());
    }

    let pipeline = Pipeline::new(registry)
        .with_importance(settings.importance_table())
        .with_default_expected_rate(settings.default_expected_rate)
        .with_max_html_bytes(settings.max_html_bytes);
    let processed = pipeline
        .process_html(&request)
        .with_context(|| format!("Failed to extract {}", file.display()))?;
    print_json(&processed)
}

/// Read at most `max_bytes` of HTML from a file, or stdin for `-`.
fn read_html(file: &Path, max_bytes: usize) -> anyhow::Result<String> {
    let mut bytes = Vec::new();
    let limit = max_bytes as u64 + 1;
    if file == Path::new("-") {
        std::io::stdin()
            .take(limit)
            .read_to_end(&mut bytes)
            .context("Failed to read HTML from stdin")?;
    } else {
        std::fs::File::open(file)
            .with_context(|| format!("Failed to open {}", file.display()))?
            .take(limit)
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {}", file.display()))?;
    }

    if bytes.len() > max_bytes {
        anyhow::bail!(
            "{} is larger than max_html_bytes ({} bytes)",
            file.display(),
            max_bytes
        );
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
