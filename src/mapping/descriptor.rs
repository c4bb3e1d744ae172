//! Field descriptors: one field's retrieval strategy and post-processing.
//!
//! Descriptors are authored as flat JSON objects where each retrieval
//! strategy is keyed by its own option (`cssLocator`, `scriptJsonVar`, ...).
//! Parsing keeps that shape for compatibility; [`FieldDescriptor::strategies`]
//! turns it into explicit [`Strategy`] values in precedence order.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::extraction::parse_leading_int;

/// Retrieval strategy discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    StaticValue,
    FlightData,
    ScriptJson,
    ScriptRegex,
    UrlPath,
    Css,
}

impl StrategyKind {
    /// Evaluation order. Every configured strategy runs and overwrites the
    /// text produced by the ones before it, so the last configured one wins.
    pub const PRECEDENCE: [StrategyKind; 6] = [
        StrategyKind::StaticValue,
        StrategyKind::FlightData,
        StrategyKind::ScriptJson,
        StrategyKind::ScriptRegex,
        StrategyKind::UrlPath,
        StrategyKind::Css,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StaticValue => "value",
            Self::FlightData => "flightData",
            Self::ScriptJson => "scriptJson",
            Self::ScriptRegex => "scriptRegEx",
            Self::UrlPath => "urlPath",
            Self::Css => "css",
        }
    }
}

/// A configured retrieval strategy borrowed from its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy<'a> {
    StaticValue(&'a str),
    FlightData {
        path: &'a str,
    },
    ScriptJson {
        var: &'a str,
        path: &'a str,
    },
    ScriptRegex {
        pattern: &'a str,
    },
    UrlPath {
        index: &'a str,
    },
    Css {
        locator: &'a str,
        attr: Option<&'a str>,
        count_id: Option<&'a str>,
    },
}

impl Strategy<'_> {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::StaticValue(_) => StrategyKind::StaticValue,
            Strategy::FlightData { .. } => StrategyKind::FlightData,
            Strategy::ScriptJson { .. } => StrategyKind::ScriptJson,
            Strategy::ScriptRegex { .. } => StrategyKind::ScriptRegex,
            Strategy::UrlPath { .. } => StrategyKind::UrlPath,
            Strategy::Css { .. } => StrategyKind::Css,
        }
    }

    /// Human-readable description used in field traces.
    pub fn describe(&self) -> String {
        let kind = self.kind().as_str();
        match self {
            Strategy::StaticValue(v) => format!("{}:{}", kind, v),
            Strategy::FlightData { path } => format!("{}:{}", kind, path),
            Strategy::ScriptJson { var, path } if path.is_empty() => format!("{}:{}", kind, var),
            Strategy::ScriptJson { var, path } => format!("{}:{}.{}", kind, var, path),
            Strategy::ScriptRegex { pattern } => format!("{}:{}", kind, pattern),
            Strategy::UrlPath { index } => format!("{}:{}", kind, index),
            Strategy::Css {
                locator,
                attr,
                count_id,
            } => {
                let mut s = format!("{}:{}", kind, locator);
                if let Some(idx) = count_id {
                    s.push_str(&format!("[{}]", idx));
                }
                if let Some(attr) = attr {
                    s.push('@');
                    s.push_str(attr);
                }
                s
            }
        }
    }
}

/// Named boolean predicate applied to retrieved text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluator {
    Include,
    StartWith,
    EndWith,
    Present,
    ToIGreaterThanZero,
    Equals,
}

impl Evaluator {
    pub const ALL: [Evaluator; 6] = [
        Evaluator::Include,
        Evaluator::StartWith,
        Evaluator::EndWith,
        Evaluator::Present,
        Evaluator::ToIGreaterThanZero,
        Evaluator::Equals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "include?",
            Self::StartWith => "start_with?",
            Self::EndWith => "end_with?",
            Self::Present => "present?",
            Self::ToIGreaterThanZero => "to_i_gt_0",
            Self::Equals => "==",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    /// Apply the predicate. Case folding applies to both operands.
    pub fn evaluate(&self, text: &str, param: &str, case_insensitive: bool) -> bool {
        let (text, param) = if case_insensitive {
            (text.to_lowercase(), param.to_lowercase())
        } else {
            (text.to_string(), param.to_string())
        };
        match self {
            Self::Include => text.contains(&param),
            Self::StartWith => text.starts_with(&param),
            Self::EndWith => text.ends_with(&param),
            Self::Present => !text.trim().is_empty(),
            Self::ToIGreaterThanZero => parse_leading_int(&text) > 0,
            Self::Equals => text == param,
        }
    }
}

/// How to retrieve and clean up one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_attr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_attr: Option<String>,
    /// Index into the matched elements.
    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub css_count_id: Option<String>,
    /// Index into `path.split('/')` of the source URL.
    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub url_path_part: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_data_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_json_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_json_path: Option<String>,
    #[serde(default, rename = "scriptRegEx", skip_serializing_if = "Option::is_none")]
    pub script_regex: Option<String>,
    /// Static value, used as-is unless a later strategy overwrites it.
    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_text_character: Option<String>,
    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub split_text_array_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_string: Option<String>,
    #[serde(default, deserialize_with = "loose_bool")]
    pub strip_punct: bool,
    #[serde(default, deserialize_with = "loose_bool")]
    pub strip_first_char: bool,
    #[serde(default, deserialize_with = "loose_bool")]
    pub case_insensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<String>,
    #[serde(
        default,
        deserialize_with = "loose_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub evaluator_param: Option<String>,
}

impl FieldDescriptor {
    /// A descriptor with only a static value.
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// A descriptor with only a CSS locator.
    pub fn with_css(locator: impl Into<String>) -> Self {
        Self {
            css_locator: Some(locator.into()),
            ..Default::default()
        }
    }

    /// The strategy of the given kind, if this descriptor configures it.
    pub fn strategy(&self, kind: StrategyKind) -> Option<Strategy<'_>> {
        match kind {
            StrategyKind::StaticValue => self.value.as_deref().map(Strategy::StaticValue),
            StrategyKind::FlightData => self
                .flight_data_path
                .as_deref()
                .map(|path| Strategy::FlightData { path }),
            StrategyKind::ScriptJson => self.script_json_var.as_deref().map(|var| {
                Strategy::ScriptJson {
                    var,
                    path: self.script_json_path.as_deref().unwrap_or(""),
                }
            }),
            StrategyKind::ScriptRegex => self
                .script_regex
                .as_deref()
                .map(|pattern| Strategy::ScriptRegex { pattern }),
            StrategyKind::UrlPath => self
                .url_path_part
                .as_deref()
                .map(|index| Strategy::UrlPath { index }),
            StrategyKind::Css => self.css_locator.as_deref().map(|locator| Strategy::Css {
                locator,
                attr: self.css_attr.as_deref().or(self.xml_attr.as_deref()),
                count_id: self.css_count_id.as_deref(),
            }),
        }
    }

    /// All configured strategies in evaluation order.
    pub fn strategies(&self) -> Vec<Strategy<'_>> {
        StrategyKind::PRECEDENCE
            .iter()
            .filter_map(|kind| self.strategy(*kind))
            .collect()
    }

    /// The strategy whose output ends up in the field.
    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        self.strategies().last().map(|s| s.kind())
    }

    /// Describe the configured strategies for traces.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self.strategies().iter().map(|s| s.describe()).collect();
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(" > ")
        }
    }

    pub fn evaluator(&self) -> Option<Evaluator> {
        self.evaluator.as_deref().and_then(Evaluator::from_name)
    }
}

/// Accept a string, number or boolean where a string option is expected.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Accept `true`, `"true"` or a non-zero number as a set flag.
fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    })
}
