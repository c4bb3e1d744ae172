//! Per-portal extraction mappings.
//!
//! A mapping is a declarative description of how to pull each listing field
//! out of one portal's HTML. Mappings are JSON configuration; this module
//! only parses and holds them.

mod descriptor;
mod registry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use descriptor::{Evaluator, FieldDescriptor, Strategy, StrategyKind};
pub use registry::MappingRegistry;

/// Errors raised while loading mappings.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read mapping file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid mapping JSON in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Duplicate mapping name: {0}")]
    Duplicate(String),
    #[error("Mapping {name} has expectedExtractionRate {rate} outside 0..1")]
    InvalidRate { name: String, rate: f64 },
    #[error("Mapping has an empty name ({0})")]
    EmptyName(String),
}

/// Mapping field groups, in the order the orchestrator processes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    DefaultValues,
    Images,
    Features,
    IntFields,
    FloatFields,
    TextFields,
    BooleanFields,
}

impl Section {
    pub const ORDER: [Section; 7] = [
        Section::DefaultValues,
        Section::Images,
        Section::Features,
        Section::IntFields,
        Section::FloatFields,
        Section::TextFields,
        Section::BooleanFields,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefaultValues => "defaultValues",
            Self::Images => "images",
            Self::Features => "features",
            Self::IntFields => "intFields",
            Self::FloatFields => "floatFields",
            Self::TextFields => "textFields",
            Self::BooleanFields => "booleanFields",
        }
    }

    /// Whether fields in this section count towards the extraction rate.
    pub fn is_extractable(&self) -> bool {
        !matches!(self, Self::DefaultValues)
    }
}

/// Extraction mapping for one portal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub default_values: BTreeMap<String, FieldDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub int_fields: BTreeMap<String, FieldDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub float_fields: BTreeMap<String, FieldDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub text_fields: BTreeMap<String, FieldDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub boolean_fields: BTreeMap<String, FieldDescriptor>,
    /// Baseline extraction rate for grading, `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_extraction_rate: Option<f64>,
}

impl Mapping {
    /// Parse a mapping from JSON text.
    pub fn from_json(json: &str, origin: &str) -> Result<Self, MappingError> {
        let mapping: Mapping = serde_json::from_str(json).map_err(|source| MappingError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        mapping.validate(origin)?;
        Ok(mapping)
    }

    fn validate(&self, origin: &str) -> Result<(), MappingError> {
        if self.name.trim().is_empty() {
            return Err(MappingError::EmptyName(origin.to_string()));
        }
        if let Some(rate) = self.expected_extraction_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(MappingError::InvalidRate {
                    name: self.name.clone(),
                    rate,
                });
            }
        }
        Ok(())
    }

    /// Named fields of a keyed section; empty for list sections.
    pub fn fields(&self, section: Section) -> &BTreeMap<String, FieldDescriptor> {
        static EMPTY: BTreeMap<String, FieldDescriptor> = BTreeMap::new();
        match section {
            Section::DefaultValues => &self.default_values,
            Section::IntFields => &self.int_fields,
            Section::FloatFields => &self.float_fields,
            Section::TextFields => &self.text_fields,
            Section::BooleanFields => &self.boolean_fields,
            Section::Images | Section::Features => &EMPTY,
        }
    }
}
