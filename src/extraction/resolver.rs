//! Retrieve raw field text from a document using a field descriptor.
//!
//! Every strategy a descriptor configures runs in [`StrategyKind::PRECEDENCE`]
//! order and replaces the text produced so far. Retrieval never fails: bad
//! selectors, indices, patterns and payloads all degrade to "not found".

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::embedded::{extract_path, value_to_text, ParseCache};
use crate::mapping::{FieldDescriptor, Strategy};

/// Retrieve and clean up the text for one descriptor.
pub fn retrieve_text(
    document: &Html,
    descriptor: &FieldDescriptor,
    base_url: Option<&Url>,
    cache: &mut ParseCache,
) -> String {
    let mut text = String::new();
    for strategy in descriptor.strategies() {
        if let Some(retrieved) = apply_strategy(document, &strategy, base_url, cache) {
            text = retrieved;
        }
    }
    clean_up_string(&text, descriptor)
}

/// Retrieve every value a descriptor yields, for list sections.
///
/// CSS selectors produce one value per matched element and JSON strategies
/// expand arrays. Values are cleaned up individually; empty ones are dropped.
pub fn retrieve_values(
    document: &Html,
    descriptor: &FieldDescriptor,
    base_url: Option<&Url>,
    cache: &mut ParseCache,
) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for strategy in descriptor.strategies() {
        if let Some(retrieved) = apply_strategy_list(document, &strategy, base_url, cache) {
            values = retrieved;
        }
    }
    values
        .iter()
        .map(|v| clean_up_string(v, descriptor))
        .filter(|v| !v.is_empty())
        .collect()
}

/// Apply split and strip post-processing, then trim.
///
/// Splitting runs when either split option is set; the character defaults to
/// a space (which splits on whitespace runs) and the index to 0. An index
/// that is not a number or is out of range yields an empty string.
pub fn clean_up_string(text: &str, descriptor: &FieldDescriptor) -> String {
    let mut cleaned = text.to_string();

    if descriptor.split_text_character.is_some() || descriptor.split_text_array_id.is_some() {
        let separator = descriptor
            .split_text_character
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(" ");
        let index = descriptor.split_text_array_id.as_deref().unwrap_or("0");
        cleaned = match index.trim().parse::<usize>() {
            Ok(i) if separator == " " => cleaned.split_whitespace().nth(i).unwrap_or("").to_string(),
            Ok(i) => cleaned.split(separator).nth(i).unwrap_or("").to_string(),
            Err(_) => {
                debug!("Invalid splitTextArrayId {:?}", index);
                String::new()
            }
        };
    }

    if let Some(strip) = descriptor.strip_string.as_deref().filter(|s| !s.is_empty()) {
        cleaned = cleaned.replace(strip, "");
    }

    cleaned.trim().to_string()
}

/// Run one strategy. `None` leaves previously retrieved text in place.
fn apply_strategy(
    document: &Html,
    strategy: &Strategy<'_>,
    base_url: Option<&Url>,
    cache: &mut ParseCache,
) -> Option<String> {
    match *strategy {
        Strategy::StaticValue(value) => Some(value.to_string()),
        Strategy::FlightData { path } => Some(
            cache
                .flight_value(document, path)
                .map(value_to_text)
                .unwrap_or_default(),
        ),
        Strategy::ScriptJson { var, path } => Some(
            cache
                .script_var(document, var)
                .map(|root| value_to_text(extract_path(root, path)))
                .unwrap_or_default(),
        ),
        Strategy::ScriptRegex { pattern } => {
            Some(cache.script_regex(document, pattern).unwrap_or_default())
        }
        Strategy::UrlPath { index } => Some(url_path_segment(base_url, index)),
        Strategy::Css {
            locator,
            attr,
            count_id,
        } => css_text(document, locator, attr, count_id),
    }
}

/// List form of [`apply_strategy`].
fn apply_strategy_list(
    document: &Html,
    strategy: &Strategy<'_>,
    base_url: Option<&Url>,
    cache: &mut ParseCache,
) -> Option<Vec<String>> {
    match *strategy {
        Strategy::FlightData { path } => Some(
            cache
                .flight_value(document, path)
                .map(json_list)
                .unwrap_or_default(),
        ),
        Strategy::ScriptJson { var, path } => Some(
            cache
                .script_var(document, var)
                .map(|root| json_list(extract_path(root, path)))
                .unwrap_or_default(),
        ),
        Strategy::Css {
            locator,
            attr,
            count_id,
        } => {
            if count_id.is_some() {
                return css_text(document, locator, attr, count_id).map(|t| vec![t]);
            }
            let elements = select_all(document, locator);
            Some(
                elements
                    .iter()
                    .map(|el| element_value(el, attr))
                    .collect(),
            )
        }
        _ => apply_strategy(document, strategy, base_url, cache).map(|t| vec![t]),
    }
}

/// Flatten a JSON value into list items.
///
/// Objects contribute their first string among the usual URL and label keys,
/// so both `["a.jpg"]` and `[{"url": "a.jpg"}]` work.
fn json_list(value: &Value) -> Vec<String> {
    const ITEM_KEYS: [&str; 8] = ["url", "src", "href", "srcUrl", "name", "label", "text", "value"];

    let item_text = |item: &Value| -> String {
        match item {
            Value::Object(map) => ITEM_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
                .unwrap_or("")
                .to_string(),
            other => value_to_text(other),
        }
    };

    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(item_text).collect(),
        other => vec![item_text(other)],
    }
}

fn select_all<'a>(document: &'a Html, locator: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(locator) {
        Ok(selector) => document.select(&selector).collect(),
        Err(e) => {
            debug!("Invalid CSS selector {:?}: {:?}", locator, e);
            Vec::new()
        }
    }
}

fn element_value(element: &ElementRef<'_>, attr: Option<&str>) -> String {
    match attr {
        Some(name) => element.value().attr(name).unwrap_or("").to_string(),
        None => element.text().collect(),
    }
}

/// CSS strategy. With `count_id`, an invalid or out-of-range index returns
/// `None` so earlier text survives.
fn css_text(
    document: &Html,
    locator: &str,
    attr: Option<&str>,
    count_id: Option<&str>,
) -> Option<String> {
    let elements = select_all(document, locator);

    if let Some(index) = count_id {
        let chosen = index
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| elements.get(i));
        return match chosen {
            Some(el) => Some(element_value(el, attr)),
            None => {
                debug!(
                    "cssCountId {:?} invalid for {} matches of {:?}",
                    index,
                    elements.len(),
                    locator
                );
                None
            }
        };
    }

    Some(match attr {
        Some(_) => elements
            .first()
            .map(|el| element_value(el, attr))
            .unwrap_or_default(),
        None => elements.iter().map(|el| element_value(el, None)).collect(),
    })
}

/// Segment `index` of the source URL path, split on `/` (segment 0 is the
/// empty string before the leading slash).
fn url_path_segment(base_url: Option<&Url>, index: &str) -> String {
    let Some(url) = base_url else {
        return String::new();
    };
    let Ok(i) = index.trim().parse::<usize>() else {
        debug!("Invalid urlPathPart {:?}", index);
        return String::new();
    };
    url.path()
        .split('/')
        .nth(i)
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .unwrap_or_default()
}
