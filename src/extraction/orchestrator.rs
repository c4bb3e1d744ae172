//! Mapping resolution, section passes and run diagnostics.

use scraper::Html;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::fields::{FieldExtractor, FieldTrace};
use crate::mapping::{Mapping, MappingRegistry, Section};
use crate::models::PropertyHash;
use crate::quality::{assess_quality, ratio, round3, ExpectationStatus, Grade};

/// Mapping configuration errors. These fail the whole extraction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Unknown mapping: {0}")]
    UnknownMapping(String),
    #[error("No mapping or mapping name supplied")]
    NoMapping,
    #[error("HTML is {size} bytes, over the {max} byte limit")]
    HtmlTooLarge { size: usize, max: usize },
}

/// Input to [`extract_from_html`]. An explicit `mapping` takes precedence
/// over `mapping_name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionRequest<'a> {
    pub html: &'a str,
    pub source_url: &'a str,
    pub mapping: Option<&'a Mapping>,
    pub mapping_name: Option<&'a str>,
}

impl<'a> ExtractionRequest<'a> {
    pub fn new(html: &'a str, source_url: &'a str) -> Self {
        Self {
            html,
            source_url,
            ..Default::default()
        }
    }

    pub fn with_mapping_name(mut self, name: &'a str) -> Self {
        self.mapping_name = Some(name);
        self
    }

    pub fn with_mapping(mut self, mapping: &'a Mapping) -> Self {
        self.mapping = Some(mapping);
        self
    }
}

/// Counts and grading for one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDiagnostics {
    pub mapping_name: String,
    pub total_fields: usize,
    pub populated_fields: usize,
    pub empty_field_count: usize,
    pub empty_fields: Vec<String>,
    /// Fields outside `defaultValues`.
    pub extractable_fields: usize,
    pub populated_extractable_fields: usize,
    pub extraction_rate: f64,
    pub quality_grade: Grade,
    pub quality_label: String,
    pub expected_extraction_rate: Option<f64>,
    pub meets_expectation: bool,
    pub expectation_status: ExpectationStatus,
    pub field_traces: Vec<FieldTrace>,
}

impl ExtractionDiagnostics {
    pub fn from_traces(mapping: &Mapping, traces: Vec<FieldTrace>) -> Self {
        let empty_fields: Vec<String> = traces
            .iter()
            .filter(|t| t.is_empty())
            .map(|t| t.field.clone())
            .collect();
        let extractable: Vec<&FieldTrace> = traces
            .iter()
            .filter(|t| t.section.is_extractable())
            .collect();
        let populated_extractable = extractable.iter().filter(|t| !t.is_empty()).count();
        let extraction_rate = ratio(populated_extractable as f64, extractable.len() as f64);
        let quality = assess_quality(extraction_rate, mapping.expected_extraction_rate);

        Self {
            mapping_name: mapping.name.clone(),
            total_fields: traces.len(),
            populated_fields: traces.len() - empty_fields.len(),
            empty_field_count: empty_fields.len(),
            empty_fields,
            extractable_fields: extractable.len(),
            populated_extractable_fields: populated_extractable,
            extraction_rate: round3(extraction_rate),
            quality_grade: quality.grade,
            quality_label: quality.label,
            expected_extraction_rate: quality.expected_rate,
            meets_expectation: quality.meets_expectation,
            expectation_status: quality.expectation_status,
            field_traces: traces,
        }
    }

    /// Traces of fields that count towards the extraction rate.
    pub fn extractable_traces(&self) -> impl Iterator<Item = &FieldTrace> {
        self.field_traces.iter().filter(|t| t.section.is_extractable())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    pub properties: Vec<PropertyHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<ExtractionDiagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Listing identity supplied by the caller, used to group results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl ExtractionResult {
    pub fn failure(error: &ExtractionError) -> Self {
        Self {
            success: false,
            properties: Vec::new(),
            diagnostics: None,
            error_message: Some(error.to_string()),
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }
}

/// Resolve the request's mapping and extract.
///
/// Mapping errors produce `success: false` with no properties; everything
/// after resolution degrades per field and always succeeds.
pub fn extract_from_html(
    request: &ExtractionRequest<'_>,
    registry: &MappingRegistry,
) -> ExtractionResult {
    match resolve_mapping(request, registry) {
        Ok(mapping) => extract_with_mapping(request.html, request.source_url, mapping),
        Err(e) => {
            warn!("Extraction not attempted for {}: {}", request.source_url, e);
            ExtractionResult::failure(&e)
        }
    }
}

pub(crate) fn resolve_mapping<'a>(
    request: &ExtractionRequest<'a>,
    registry: &'a MappingRegistry,
) -> Result<&'a Mapping, ExtractionError> {
    if let Some(mapping) = request.mapping {
        return Ok(mapping);
    }
    let name = request.mapping_name.ok_or(ExtractionError::NoMapping)?;
    registry
        .find_mapping_by_name(name)
        .ok_or_else(|| ExtractionError::UnknownMapping(name.to_string()))
}

/// Run every section of `mapping` over `html`.
pub fn extract_with_mapping(html: &str, source_url: &str, mapping: &Mapping) -> ExtractionResult {
    let (properties, diagnostics) = run_mapping(html, source_url, mapping);
    ExtractionResult {
        success: true,
        properties: vec![properties],
        diagnostics: Some(diagnostics),
        error_message: None,
        fingerprint: None,
    }
}

pub(crate) fn run_mapping(
    html: &str,
    source_url: &str,
    mapping: &Mapping,
) -> (PropertyHash, ExtractionDiagnostics) {
    let base_url = match Url::parse(source_url.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!("Source URL {:?} not usable as base: {}", source_url, e);
            None
        }
    };
    let document = Html::parse_document(html);

    let mut extractor = FieldExtractor::new(&document, base_url.as_ref());
    for section in Section::ORDER {
        extractor.run_section(mapping, section);
    }
    let (properties, traces) = extractor.finish();

    let diagnostics = ExtractionDiagnostics::from_traces(mapping, traces);
    info!(
        "Extracted {}/{} fields from {} with mapping {} (grade {})",
        diagnostics.populated_extractable_fields,
        diagnostics.extractable_fields,
        source_url,
        mapping.name,
        diagnostics.quality_grade
    );
    (properties, diagnostics)
}
