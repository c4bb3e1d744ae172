//! Typed extraction passes over one mapping section.

use scraper::Html;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::embedded::ParseCache;
use super::resolver::{retrieve_text, retrieve_values};
use super::{parse_leading_float, parse_leading_int};
use crate::mapping::{FieldDescriptor, Mapping, Section};
use crate::models::{is_empty_value, PropertyHash};

/// Longest raw text kept in a trace.
const MAX_TRACE_TEXT: usize = 200;

/// What one field extraction produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTrace {
    pub field: String,
    pub section: Section,
    /// Strategies that ran, e.g. `css:h1@src`.
    pub strategy: String,
    /// Text before casting, truncated.
    pub raw_text: String,
    pub value: Value,
}

impl FieldTrace {
    fn new(field: &str, section: Section, strategy: String, raw_text: &str, value: Value) -> Self {
        Self {
            field: field.to_string(),
            section,
            strategy,
            raw_text: raw_text.chars().take(MAX_TRACE_TEXT).collect(),
            value,
        }
    }

    /// Empty raw text, or a value of `0`, `false`, `""`, `null` or an empty
    /// collection.
    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty() || is_empty_value(&self.value)
    }
}

/// Runs mapping sections against one parsed document, accumulating a single
/// property hash and one trace per field.
pub struct FieldExtractor<'a> {
    document: &'a Html,
    base_url: Option<&'a Url>,
    cache: ParseCache,
    properties: PropertyHash,
    traces: Vec<FieldTrace>,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(document: &'a Html, base_url: Option<&'a Url>) -> Self {
        Self {
            document,
            base_url,
            cache: ParseCache::new(),
            properties: PropertyHash::new(),
            traces: Vec::new(),
        }
    }

    /// Extract every field of `section`. Later writes to the same key win.
    pub fn run_section(&mut self, mapping: &Mapping, section: Section) {
        match section {
            Section::Images => self.extract_images(&mapping.images),
            Section::Features => self.extract_features(&mapping.features),
            _ => {
                for (field, descriptor) in mapping.fields(section) {
                    self.extract_field(field, descriptor, section);
                }
            }
        }
    }

    /// The property hash and traces collected so far.
    pub fn finish(self) -> (PropertyHash, Vec<FieldTrace>) {
        (self.properties, self.traces)
    }

    fn text(&mut self, descriptor: &FieldDescriptor) -> String {
        retrieve_text(self.document, descriptor, self.base_url, &mut self.cache)
    }

    fn extract_field(&mut self, field: &str, descriptor: &FieldDescriptor, section: Section) {
        let text = self.text(descriptor);
        let value = match section {
            Section::IntFields => json!(parse_leading_int(&text)),
            Section::FloatFields => json!(cast_float(&text, descriptor)),
            Section::BooleanFields => json!(evaluate_boolean(field, &text, descriptor)),
            _ => json!(text),
        };

        debug!(
            "{}.{} via {}: {:?} -> {}",
            section.as_str(),
            field,
            descriptor.describe(),
            text,
            value
        );
        self.traces.push(FieldTrace::new(
            field,
            section,
            descriptor.describe(),
            &text,
            value.clone(),
        ));
        self.properties.insert(field.to_string(), value);
    }

    fn extract_images(&mut self, descriptors: &[FieldDescriptor]) {
        if descriptors.is_empty() {
            return;
        }

        let mut urls: Vec<String> = Vec::new();
        for descriptor in descriptors {
            let values = retrieve_values(self.document, descriptor, self.base_url, &mut self.cache);
            for raw in values {
                let resolved = resolve_image_url(self.base_url, &raw);
                if !urls.contains(&resolved) {
                    urls.push(resolved);
                }
            }
        }

        let main_set = self
            .properties
            .get("main_image_url")
            .map(|v| !is_empty_value(v))
            .unwrap_or(false);
        if !main_set {
            if let Some(first) = urls.first() {
                self.properties
                    .insert("main_image_url".to_string(), json!(first));
            }
        }

        let value = Value::Array(urls.iter().map(|u| json!({ "url": u })).collect());
        debug!("images: {} unique urls", urls.len());
        self.traces.push(FieldTrace::new(
            "image_urls",
            Section::Images,
            describe_all(descriptors),
            &urls.join(" "),
            value.clone(),
        ));
        self.properties.insert("image_urls".to_string(), value);
    }

    fn extract_features(&mut self, descriptors: &[FieldDescriptor]) {
        if descriptors.is_empty() {
            return;
        }

        let mut features: Vec<String> = Vec::new();
        for descriptor in descriptors {
            let values = retrieve_values(self.document, descriptor, self.base_url, &mut self.cache);
            for feature in values {
                let feature = feature.trim();
                if !feature.is_empty() && !features.iter().any(|f| f == feature) {
                    features.push(feature.to_string());
                }
            }
        }

        debug!("features: {} unique", features.len());
        let value = json!(features);
        self.traces.push(FieldTrace::new(
            "features",
            Section::Features,
            describe_all(descriptors),
            &features.join(", "),
            value.clone(),
        ));
        self.properties.insert("features".to_string(), value);
    }
}

fn describe_all(descriptors: &[FieldDescriptor]) -> String {
    descriptors
        .iter()
        .map(|d| d.describe())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Absolute form of an image URL; relative paths are joined to the source.
fn resolve_image_url(base_url: Option<&Url>, raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(url) = Url::parse(raw) {
        return url.to_string();
    }
    base_url
        .and_then(|base| base.join(raw).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Float cast: drop a leading currency symbol, then thousands separators,
/// then parse the leading number.
fn cast_float(text: &str, descriptor: &FieldDescriptor) -> f64 {
    let mut text = text.trim().to_string();
    if descriptor.strip_first_char {
        text = text.chars().skip(1).collect();
    }
    if descriptor.strip_punct {
        text.retain(|c| c != ',' && c != '.');
    }
    parse_leading_float(&text)
}

fn evaluate_boolean(field: &str, text: &str, descriptor: &FieldDescriptor) -> bool {
    let Some(name) = descriptor.evaluator.as_deref() else {
        return false;
    };
    match descriptor.evaluator() {
        Some(evaluator) => evaluator.evaluate(
            text,
            descriptor.evaluator_param.as_deref().unwrap_or(""),
            descriptor.case_insensitive,
        ),
        None => {
            warn!("Unknown evaluator {:?} on boolean field {}", name, field);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const HTML: &str = r#"<html><body>
        <h1>3 Bedroom House</h1>
        <span class="price">£450,000</span>
        <span class="beds">4 beds</span>
        <div class="status">For Sale</div>
        <ul><li class="f">Garden</li><li class="f">Garden</li><li class="f"> </li><li class="f">Parking</li></ul>
        <img class="photo" src="/img/1.jpg"><img class="photo" src="https://cdn.example.com/2.jpg">
        <img class="photo" src="/img/1.jpg">
        </body></html>"#;

    fn run(mapping: &Mapping) -> (PropertyHash, Vec<FieldTrace>) {
        let document = Html::parse_document(HTML);
        let base = Url::parse("https://www.example.com/listing/1").unwrap();
        let mut extractor = FieldExtractor::new(&document, Some(&base));
        for section in Section::ORDER {
            extractor.run_section(mapping, section);
        }
        extractor.finish()
    }

    fn single(section_fields: &[(&str, FieldDescriptor)]) -> BTreeMap<String, FieldDescriptor> {
        section_fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_typed_sections() {
        let mapping = Mapping {
            name: "t".into(),
            text_fields: single(&[("title", FieldDescriptor::with_css("h1"))]),
            int_fields: single(&[("count_bedrooms", FieldDescriptor::with_css(".beds"))]),
            float_fields: single(&[(
                "price_float",
                FieldDescriptor {
                    css_locator: Some(".price".into()),
                    strip_first_char: true,
                    strip_punct: true,
                    ..Default::default()
                },
            )]),
            boolean_fields: single(&[(
                "for_sale",
                FieldDescriptor {
                    css_locator: Some(".status".into()),
                    evaluator: Some("include?".into()),
                    evaluator_param: Some("sale".into()),
                    case_insensitive: true,
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        let (props, traces) = run(&mapping);
        assert_eq!(props["title"], json!("3 Bedroom House"));
        assert_eq!(props["count_bedrooms"], json!(4));
        assert_eq!(props["price_float"], json!(450000.0));
        assert_eq!(props["for_sale"], json!(true));
        assert_eq!(traces.len(), 4);
        assert!(traces.iter().all(|t| !t.is_empty()));
    }

    #[test]
    fn test_boolean_without_or_with_unknown_evaluator() {
        let mapping = Mapping {
            name: "t".into(),
            boolean_fields: single(&[
                ("a", FieldDescriptor::with_css(".status")),
                (
                    "b",
                    FieldDescriptor {
                        css_locator: Some(".status".into()),
                        evaluator: Some("matches?".into()),
                        ..Default::default()
                    },
                ),
            ]),
            ..Default::default()
        };
        let (props, traces) = run(&mapping);
        assert_eq!(props["a"], json!(false));
        assert_eq!(props["b"], json!(false));
        assert!(traces.iter().all(|t| t.is_empty()));
    }

    #[test]
    fn test_images_resolved_and_deduplicated() {
        let mapping = Mapping {
            name: "t".into(),
            images: vec![FieldDescriptor {
                css_locator: Some("img.photo".into()),
                css_attr: Some("src".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (props, traces) = run(&mapping);
        assert_eq!(
            props["image_urls"],
            json!([
                {"url": "https://www.example.com/img/1.jpg"},
                {"url": "https://cdn.example.com/2.jpg"}
            ])
        );
        assert_eq!(props["main_image_url"], json!("https://www.example.com/img/1.jpg"));
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].field, "image_urls");
    }

    #[test]
    fn test_main_image_not_replaced_when_default_set() {
        let mapping = Mapping {
            name: "t".into(),
            default_values: single(&[(
                "main_image_url",
                FieldDescriptor::with_value("https://x.com/cover.jpg"),
            )]),
            images: vec![FieldDescriptor {
                css_locator: Some("img.photo".into()),
                css_attr: Some("src".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (props, _) = run(&mapping);
        assert_eq!(props["main_image_url"], json!("https://x.com/cover.jpg"));
    }

    #[test]
    fn test_features_trimmed_and_unique() {
        let mapping = Mapping {
            name: "t".into(),
            features: vec![FieldDescriptor::with_css("li.f")],
            ..Default::default()
        };
        let (props, _) = run(&mapping);
        assert_eq!(props["features"], json!(["Garden", "Parking"]));
    }

    #[test]
    fn test_cast_float_options() {
        let plain = FieldDescriptor::default();
        assert_eq!(cast_float("1250.50", &plain), 1250.5);
        assert_eq!(cast_float("£450,000", &plain), 0.0);

        let strip_first = FieldDescriptor {
            strip_first_char: true,
            ..Default::default()
        };
        assert_eq!(cast_float(" €99.5", &strip_first), 99.5);

        let strip_punct = FieldDescriptor {
            strip_punct: true,
            ..Default::default()
        };
        assert_eq!(cast_float("1.250.000", &strip_punct), 1250000.0);
    }

    #[test]
    fn test_trace_truncates_raw_text() {
        let long = "x".repeat(500);
        let trace = FieldTrace::new("f", Section::TextFields, "value".into(), &long, json!(long));
        assert_eq!(trace.raw_text.chars().count(), MAX_TRACE_TEXT);
    }

    #[test]
    fn test_zero_counts_as_empty() {
        let trace = FieldTrace::new("n", Section::IntFields, "css".into(), "0", json!(0));
        assert!(trace.is_empty());
    }
}
