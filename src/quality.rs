//! Extraction quality grading.
//!
//! Two entry points share the grade thresholds: [`assess_quality`] grades a
//! flat populated/total rate, [`assess_quality_weighted`] weights each field
//! by importance, caps the grade when a critical field is missing and derives
//! a confidence score and visibility tier.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::extraction::FieldTrace;

/// Gap within which an observed rate meets its expectation.
const EXPECTATION_TOLERANCE: f64 = 0.03;
/// Gap at or below which an observed rate is well below expectation.
const WELL_BELOW_GAP: f64 = -0.15;

const DEFAULT_CRITICAL_FIELDS: &[&str] = &["title", "price_string", "price_float"];
const DEFAULT_IMPORTANT_FIELDS: &[&str] = &[
    "description",
    "count_bedrooms",
    "count_bathrooms",
    "address_string",
    "main_image_url",
    "image_urls",
    "latitude",
    "longitude",
    "postal_code",
    "city",
];

/// Letter grade, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    F,
}

impl Grade {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 0.8 {
            Grade::A
        } else if rate >= 0.5 {
            Grade::B
        } else if rate >= 0.2 {
            Grade::C
        } else {
            Grade::F
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grade::A => "Excellent",
            Grade::B => "Good",
            Grade::C => "Partial",
            Grade::F => "Failed",
        }
    }

    /// Higher is better.
    pub fn rank(&self) -> u8 {
        match self {
            Grade::A => 3,
            Grade::B => 2,
            Grade::C => 1,
            Grade::F => 0,
        }
    }

    fn base_confidence(&self) -> f64 {
        match self {
            Grade::A => 1.0,
            Grade::B => 0.8,
            Grade::C => 0.5,
            Grade::F => 0.1,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityGrade {
    pub grade: Grade,
    pub label: &'static str,
}

pub fn compute_quality_grade(rate: f64) -> QualityGrade {
    let grade = Grade::from_rate(rate);
    QualityGrade {
        grade,
        label: grade.label(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationStatus {
    Above,
    Meets,
    Below,
    WellBelow,
    Unknown,
}

/// Observed rate against a mapping's baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    pub status: ExpectationStatus,
    /// Observed minus expected, rounded to 3 decimals.
    pub gap: Option<f64>,
    pub meets_expectation: bool,
}

pub fn compare_to_expectation(rate: f64, expected: Option<f64>) -> Expectation {
    let Some(expected) = expected else {
        return Expectation {
            status: ExpectationStatus::Unknown,
            gap: None,
            meets_expectation: true,
        };
    };

    // Bands apply at reported precision.
    let gap = round3(rate - expected);
    let status = if gap.abs() <= EXPECTATION_TOLERANCE {
        ExpectationStatus::Meets
    } else if gap > EXPECTATION_TOLERANCE {
        ExpectationStatus::Above
    } else if gap <= WELL_BELOW_GAP {
        ExpectationStatus::WellBelow
    } else {
        ExpectationStatus::Below
    };

    Expectation {
        status,
        gap: Some(gap),
        meets_expectation: gap >= 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldImportance {
    Critical,
    Important,
    Optional,
}

impl FieldImportance {
    pub fn weight(&self) -> u32 {
        match self {
            FieldImportance::Critical => 3,
            FieldImportance::Important => 2,
            FieldImportance::Optional => 1,
        }
    }
}

/// Field name to importance. Fields in neither set are optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportanceTable {
    critical: BTreeSet<String>,
    important: BTreeSet<String>,
}

impl Default for ImportanceTable {
    fn default() -> Self {
        Self {
            critical: DEFAULT_CRITICAL_FIELDS.iter().map(|s| s.to_string()).collect(),
            important: DEFAULT_IMPORTANT_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ImportanceTable {
    /// Default table with either list replaced when the override is non-empty.
    pub fn with_overrides(critical: &[String], important: &[String]) -> Self {
        let mut table = Self::default();
        if !critical.is_empty() {
            table.critical = critical.iter().cloned().collect();
        }
        if !important.is_empty() {
            table.important = important.iter().cloned().collect();
        }
        table
    }

    pub fn importance(&self, field: &str) -> FieldImportance {
        if self.critical.contains(field) {
            FieldImportance::Critical
        } else if self.important.contains(field) {
            FieldImportance::Important
        } else {
            FieldImportance::Optional
        }
    }
}

/// Whether one field was populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldResult {
    pub field: String,
    pub populated: bool,
}

impl FieldResult {
    pub fn new(field: impl Into<String>, populated: bool) -> Self {
        Self {
            field: field.into(),
            populated,
        }
    }
}

impl From<&FieldTrace> for FieldResult {
    fn from(trace: &FieldTrace) -> Self {
        Self::new(trace.field.clone(), !trace.is_empty())
    }
}

/// Where a listing should surface given its quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Published,
    Pending,
    Spam,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAssessment {
    pub grade: Grade,
    pub label: String,
    pub rate: f64,
    pub expected_rate: Option<f64>,
    pub expectation_status: ExpectationStatus,
    pub meets_expectation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weighted_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_fields_missing: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

/// Grade a flat extraction rate. The reported rate is rounded to 3
/// decimals; grading uses it unrounded.
pub fn assess_quality(rate: f64, expected: Option<f64>) -> QualityAssessment {
    let grade = Grade::from_rate(rate);
    let expectation = compare_to_expectation(rate, expected);
    QualityAssessment {
        grade,
        label: grade.label().to_string(),
        rate: round3(rate),
        expected_rate: expected,
        expectation_status: expectation.status,
        meets_expectation: expectation.meets_expectation,
        weighted_rate: None,
        critical_fields_missing: None,
        confidence_score: None,
        visibility: None,
    }
}

/// Grade a field result set by importance weight.
///
/// `rate` is still the flat populated/total ratio; the grade and the
/// expectation comparison use the weighted rate.
pub fn assess_quality_weighted(
    results: &[FieldResult],
    expected: Option<f64>,
    table: &ImportanceTable,
) -> QualityAssessment {
    let mut total_weight = 0u32;
    let mut populated_weight = 0u32;
    let mut critical_missing = Vec::new();
    for result in results {
        let importance = table.importance(&result.field);
        total_weight += importance.weight();
        if result.populated {
            populated_weight += importance.weight();
        } else if importance == FieldImportance::Critical {
            critical_missing.push(result.field.clone());
        }
    }

    let populated = results.iter().filter(|r| r.populated).count();
    let rate = ratio(populated as f64, results.len() as f64);
    let weighted_rate = ratio(populated_weight as f64, total_weight as f64);

    let mut grade = Grade::from_rate(weighted_rate);
    if !critical_missing.is_empty() && matches!(grade, Grade::A | Grade::B) {
        grade = Grade::C;
    }

    let images_populated = results
        .iter()
        .any(|r| r.field == "image_urls" && r.populated);
    let mut confidence = grade.base_confidence() * 0.6;
    if critical_missing.is_empty() {
        confidence += 0.3;
    }
    if images_populated {
        confidence += 0.1;
    }
    let confidence = round3(confidence.min(1.0));

    let visibility = if confidence < 0.4 || grade == Grade::F {
        Visibility::Spam
    } else if confidence < 0.7 || !critical_missing.is_empty() {
        Visibility::Pending
    } else {
        Visibility::Published
    };

    let expectation = compare_to_expectation(weighted_rate, expected);
    QualityAssessment {
        grade,
        label: grade.label().to_string(),
        rate: round3(rate),
        expected_rate: expected,
        expectation_status: expectation.status,
        meets_expectation: expectation.meets_expectation,
        weighted_rate: Some(round3(weighted_rate)),
        critical_fields_missing: Some(critical_missing),
        confidence_score: Some(confidence),
        visibility: Some(visibility),
    }
}

/// `part / whole`, or 0 when `whole` is 0.
pub(crate) fn ratio(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        part / whole
    }
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
