//! Extraction pipeline: extract, sanitize, then grade by field importance.

use serde::Serialize;
use tracing::debug;

use crate::extraction::{
    resolve_mapping, run_mapping, ExtractionDiagnostics, ExtractionError, ExtractionRequest,
};
use crate::mapping::MappingRegistry;
use crate::models::{is_empty_value, PropertyHash};
use crate::quality::{assess_quality_weighted, FieldResult, ImportanceTable, QualityAssessment};
use crate::sanitize::sanitize_property_hash;

/// A sanitized, graded extraction of one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedListing {
    pub source_url: String,
    pub mapping_name: String,
    pub properties: PropertyHash,
    pub quality: QualityAssessment,
    pub diagnostics: ExtractionDiagnostics,
}

/// Runs extraction requests against a fixed mapping registry.
#[derive(Debug, Clone)]
pub struct Pipeline {
    mappings: MappingRegistry,
    importance: ImportanceTable,
    default_expected_rate: Option<f64>,
    max_html_bytes: Option<usize>,
}

impl Pipeline {
    pub fn new(mappings: MappingRegistry) -> Self {
        Self {
            mappings,
            importance: ImportanceTable::default(),
            default_expected_rate: None,
            max_html_bytes: None,
        }
    }

    pub fn with_importance(mut self, importance: ImportanceTable) -> Self {
        self.importance = importance;
        self
    }

    /// Baseline for mappings that do not declare one.
    pub fn with_default_expected_rate(mut self, rate: Option<f64>) -> Self {
        self.default_expected_rate = rate;
        self
    }

    pub fn with_max_html_bytes(mut self, max: usize) -> Self {
        self.max_html_bytes = Some(max);
        self
    }

    pub fn mappings(&self) -> &MappingRegistry {
        &self.mappings
    }

    /// Extract, sanitize and grade one page.
    ///
    /// The weighted grade counts a field as populated only if it survived
    /// sanitization.
    pub fn process_html(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<ProcessedListing, ExtractionError> {
        if let Some(max) = self.max_html_bytes {
            if request.html.len() > max {
                return Err(ExtractionError::HtmlTooLarge {
                    size: request.html.len(),
                    max,
                });
            }
        }

        let mapping = resolve_mapping(request, &self.mappings)?;
        let (mut properties, diagnostics) = run_mapping(request.html, request.source_url, mapping);
        sanitize_property_hash(&mut properties);

        let results: Vec<FieldResult> = diagnostics
            .extractable_traces()
            .map(|trace| {
                let survived = properties
                    .get(&trace.field)
                    .map(|v| !is_empty_value(v))
                    .unwrap_or(false);
                FieldResult::new(trace.field.clone(), !trace.is_empty() && survived)
            })
            .collect();
        let expected = mapping
            .expected_extraction_rate
            .or(self.default_expected_rate);
        let quality = assess_quality_weighted(&results, expected, &self.importance);
        debug!(
            "{} graded {} (weighted {:?}, visibility {:?})",
            request.source_url, quality.grade, quality.weighted_rate, quality.visibility
        );

        Ok(ProcessedListing {
            source_url: request.source_url.to_string(),
            mapping_name: mapping.name.clone(),
            properties,
            quality,
            diagnostics,
        })
    }
}
