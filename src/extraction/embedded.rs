//! Embedded JSON payloads in `<script>` tags.
//!
//! Portals ship listing data as script assignments (`window.PAGE_MODEL = {...}`)
//! or as a Next.js payload (`__NEXT_DATA__` and the `self.__next_f` flight
//! stream). None of these are standalone JSON documents, so the object is
//! located by scanning for its matching closing delimiter while honoring
//! quoted strings and escapes.
//!
//! Everything here is parsed at most once per document through [`ParseCache`].

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

/// Prefix of one chunk of the Next.js flight stream.
const FLIGHT_PUSH: &str = "self.__next_f.push(";

/// Row id prefix of a decoded flight stream line, e.g. `1a:`.
static FLIGHT_ROW_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]+:").ok());

/// Maximum nesting walked when searching flight payloads for a path.
const MAX_SEARCH_DEPTH: usize = 32;

/// Return the balanced JSON object or array starting at byte `start`.
///
/// `text[start..]` must begin with `{` or `[`. Returns `None` if the
/// delimiters never balance or a closer does not match its opener.
pub fn find_balanced(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    match bytes.get(start) {
        Some(b'{') | Some(b'[') => {}
        _ => return None,
    }

    let mut stack: Vec<u8> = Vec::new();
    let mut in_string: Option<u8> = None;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == quote {
                in_string = None;
            }
            continue;
        }

        match b {
            b'"' | b'\'' => in_string = Some(b),
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse the first JSON object or array found at or after `from`.
fn first_json_value(text: &str, from: usize) -> Option<Value> {
    let rest = text.get(from..)?;
    let start = from + rest.find(|c| c == '{' || c == '[')?;
    let slice = find_balanced(text, start)?;
    match serde_json::from_str(slice) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Malformed embedded JSON at byte {}: {}", start, e);
            None
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Find `var = {...}` (or `[...]`) in one script and parse the value.
///
/// Matches `VAR = `, `window.VAR = ` and `var VAR = `; occurrences that are
/// part of a longer identifier or a comparison are skipped.
pub fn find_script_var(script: &str, var: &str) -> Option<Value> {
    if var.is_empty() {
        return None;
    }
    let bytes = script.as_bytes();
    let mut search = 0;

    while let Some(rel) = script[search..].find(var) {
        let at = search + rel;
        let after = at + var.len();
        search = after;

        if at > 0 && is_ident_byte(bytes[at - 1]) {
            continue;
        }
        if bytes.get(after).copied().is_some_and(is_ident_byte) {
            continue;
        }

        let mut pos = after;
        while bytes.get(pos).is_some_and(|b| b.is_ascii_whitespace()) {
            pos += 1;
        }
        if bytes.get(pos) != Some(&b'=') || bytes.get(pos + 1) == Some(&b'=') {
            continue;
        }
        pos += 1;
        while bytes.get(pos).is_some_and(|b| b.is_ascii_whitespace()) {
            pos += 1;
        }
        if !matches!(bytes.get(pos), Some(b'{') | Some(b'[')) {
            continue;
        }

        let Some(slice) = find_balanced(script, pos) else {
            debug!("Unbalanced payload for script variable {}", var);
            continue;
        };
        match serde_json::from_str(slice) {
            Ok(value) => return Some(value),
            Err(e) => debug!("Malformed JSON for script variable {}: {}", var, e),
        }
    }

    None
}

/// Decode the flight stream chunks and parse every JSON row they contain.
pub fn parse_flight_payload(scripts: &[String]) -> Vec<Value> {
    let mut payload = String::new();

    for script in scripts {
        let mut search = 0;
        while let Some(rel) = script[search..].find(FLIGHT_PUSH) {
            let open = search + rel + FLIGHT_PUSH.len();
            search = open;
            let Some(chunk) = find_balanced(script, open) else {
                continue;
            };
            search = open + chunk.len();
            // Each chunk is `[kind, "escaped string"]`; only string chunks carry rows.
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(chunk) {
                if let Some(Value::String(s)) = items.get(1) {
                    payload.push_str(s);
                }
            }
        }
    }

    let mut roots = Vec::new();
    for line in payload.lines() {
        let body = match FLIGHT_ROW_ID.as_ref().and_then(|re| re.find(line)) {
            Some(id) => &line[id.end()..],
            None => line,
        };
        if let Some(value) = first_json_value(body, 0) {
            roots.push(value);
        }
    }
    roots
}

/// Extract a value from nested JSON using dot-notation path.
pub fn extract_path<'a>(data: &'a Value, path: &str) -> &'a Value {
    if path.is_empty() {
        return data;
    }

    let mut current = data;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key).unwrap_or(&Value::Null),
            Value::Array(arr) => {
                if let Ok(idx) = key.parse::<usize>() {
                    arr.get(idx).unwrap_or(&Value::Null)
                } else {
                    &Value::Null
                }
            }
            _ => &Value::Null,
        };
    }

    current
}

/// Resolve `path` from any node below `data`, depth-first.
fn find_path_deep<'a>(data: &'a Value, path: &str, depth: usize) -> Option<&'a Value> {
    let hit = extract_path(data, path);
    if !hit.is_null() {
        return Some(hit);
    }
    if depth == 0 {
        return None;
    }
    match data {
        Value::Object(map) => map
            .values()
            .find_map(|v| find_path_deep(v, path, depth - 1)),
        Value::Array(arr) => arr.iter().find_map(|v| find_path_deep(v, path, depth - 1)),
        _ => None,
    }
}

/// Render a JSON value as field text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Per-document cache of script contents and parsed embedded payloads.
///
/// Create one per extraction run and drop it with the document.
#[derive(Debug, Default)]
pub struct ParseCache {
    scripts: Option<Vec<String>>,
    script_text: Option<String>,
    flight_roots: Option<Vec<Value>>,
    script_vars: HashMap<String, Option<Value>>,
    regexes: HashMap<String, Option<fancy_regex::Regex>>,
}

impl ParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text content of every `<script>` element, in document order.
    pub fn scripts(&mut self, document: &Html) -> &[String] {
        self.scripts.get_or_insert_with(|| {
            Selector::parse("script")
                .map(|selector| {
                    document
                        .select(&selector)
                        .map(|el| el.text().collect::<String>())
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Parsed value assigned to a script variable, if any script defines it.
    pub fn script_var(&mut self, document: &Html, var: &str) -> Option<&Value> {
        if !self.script_vars.contains_key(var) {
            let parsed = self
                .scripts(document)
                .iter()
                .find_map(|script| find_script_var(script, var));
            if parsed.is_none() {
                debug!("Script variable {} not found", var);
            }
            self.script_vars.insert(var.to_string(), parsed);
        }
        self.script_vars.get(var).and_then(|v| v.as_ref())
    }

    /// Flight rows followed by any `__NEXT_DATA__` payload.
    pub fn flight_roots(&mut self, document: &Html) -> &[Value] {
        if self.flight_roots.is_none() {
            let mut roots = parse_flight_payload(self.scripts(document));
            if let Ok(selector) = Selector::parse("script#__NEXT_DATA__") {
                for el in document.select(&selector) {
                    let text = el.text().collect::<String>();
                    if let Some(value) = first_json_value(&text, 0) {
                        roots.push(value);
                    }
                }
            }
            debug!("Parsed {} flight data roots", roots.len());
            self.flight_roots = Some(roots);
        }
        self.flight_roots.as_deref().unwrap_or_default()
    }

    /// Resolve a flight data path: first from each root, then anywhere below.
    pub fn flight_value(&mut self, document: &Html, path: &str) -> Option<&Value> {
        let roots = self.flight_roots(document);
        roots
            .iter()
            .map(|root| extract_path(root, path))
            .find(|v| !v.is_null())
            .or_else(|| {
                roots
                    .iter()
                    .find_map(|root| find_path_deep(root, path, MAX_SEARCH_DEPTH))
            })
    }

    /// Match `pattern` against the concatenated script text.
    ///
    /// Returns the first capture group when the pattern has one, otherwise
    /// the whole match. Invalid patterns and runaway backtracking yield `None`.
    pub fn script_regex(&mut self, document: &Html, pattern: &str) -> Option<String> {
        if self.script_text.is_none() {
            let joined = self.scripts(document).join("\n");
            self.script_text = Some(joined);
        }
        if !self.regexes.contains_key(pattern) {
            let compiled = match fancy_regex::Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    debug!("Invalid scriptRegEx {:?}: {}", pattern, e);
                    None
                }
            };
            self.regexes.insert(pattern.to_string(), compiled);
        }

        let regex = self.regexes.get(pattern)?.as_ref()?;
        let text = self.script_text.as_deref()?;
        let captures = regex.captures(text).ok()??;
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_balanced_nested() {
        let s = r#"x = {"a": {"b": [1, 2]}, "c": "}"}; more"#;
        let start = s.find('{').unwrap();
        assert_eq!(
            find_balanced(s, start),
            Some(r#"{"a": {"b": [1, 2]}, "c": "}"}"#)
        );
    }

    #[test]
    fn test_find_balanced_honors_escapes() {
        let s = r#"{"q": "say \"}\" now"} tail"#;
        assert_eq!(find_balanced(s, 0), Some(r#"{"q": "say \"}\" now"}"#));
    }

    #[test]
    fn test_find_balanced_rejects_mismatched_closer() {
        assert_eq!(find_balanced("[42}", 0), None);
        assert_eq!(find_balanced("{\"a\": 1", 0), None);
        assert_eq!(find_balanced("abc", 0), None);
    }

    #[test]
    fn test_find_script_var_forms() {
        let window = r#"window.PAGE_MODEL = {"id": 1};"#;
        assert_eq!(find_script_var(window, "PAGE_MODEL"), Some(json!({"id": 1})));

        let plain = "var DATA=[1,2,3]\nconsole.log(DATA)";
        assert_eq!(find_script_var(plain, "DATA"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_find_script_var_skips_longer_identifiers_and_comparisons() {
        let script = r#"if (MODEL == null) {}; OTHER_MODEL = {"x": 1}; MODEL = {"y": 2};"#;
        assert_eq!(find_script_var(script, "MODEL"), Some(json!({"y": 2})));
    }

    #[test]
    fn test_find_script_var_malformed_json() {
        let script = "window.BROKEN = {id: 1, name: 'x'};";
        assert_eq!(find_script_var(script, "BROKEN"), None);
    }

    #[test]
    fn test_extract_path_nested() {
        let data = json!({"a": {"items": [{"url": "x"}, {"url": "y"}]}});
        assert_eq!(extract_path(&data, "a.items.1.url"), &json!("y"));
        assert_eq!(extract_path(&data, "a.missing.url"), &json!(null));
        assert_eq!(extract_path(&data, ""), &data);
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!(null)), "");
        assert_eq!(value_to_text(&json!("x")), "x");
        assert_eq!(value_to_text(&json!(3)), "3");
        assert_eq!(value_to_text(&json!(51.5)), "51.5");
        assert_eq!(value_to_text(&json!(false)), "false");
        assert_eq!(value_to_text(&json!(["a"])), r#"["a"]"#);
    }

    #[test]
    fn test_parse_flight_payload_rows() {
        let chunk = json!([1, "0:{\"listing\":{\"title\":\"Cottage\"}}\n1:[\"$\",\"div\",null,{\"price\":250000}]\n"])
            .to_string();
        let script = format!("self.__next_f.push({})", chunk);
        let roots = parse_flight_payload(&[script]);
        assert_eq!(roots.len(), 2);
        assert_eq!(extract_path(&roots[0], "listing.title"), &json!("Cottage"));
    }

    #[test]
    fn test_cache_flight_value_searches_nested_nodes() {
        let chunk = json!([1, "1:[\"$\",\"div\",null,{\"listing\":{\"price\":250000}}]\n"]).to_string();
        let html = format!(
            "<html><body><script>self.__next_f.push({})</script></body></html>",
            chunk
        );
        let document = Html::parse_document(&html);
        let mut cache = ParseCache::new();
        assert_eq!(
            cache.flight_value(&document, "listing.price"),
            Some(&json!(250000))
        );
        assert_eq!(cache.flight_value(&document, "listing.missing"), None);
    }

    #[test]
    fn test_cache_reads_next_data() {
        let html = r#"<script id="__NEXT_DATA__" type="application/json">{"props":{"pageProps":{"id":7}}}</script>"#;
        let document = Html::parse_document(html);
        let mut cache = ParseCache::new();
        assert_eq!(
            cache.flight_value(&document, "props.pageProps.id"),
            Some(&json!(7))
        );
    }

    #[test]
    fn test_cache_script_var_and_regex() {
        let html = r#"<script>window.MODEL = {"price": 100};</script>
            <script>var config = { latitude: '40.41', longitude: '-3.70' };</script>"#;
        let document = Html::parse_document(html);
        let mut cache = ParseCache::new();
        assert_eq!(cache.script_var(&document, "MODEL"), Some(&json!({"price": 100})));
        assert_eq!(cache.script_var(&document, "MISSING"), None);
        assert_eq!(
            cache.script_regex(&document, r"latitude:\s*'([-0-9.]+)'"),
            Some("40.41".to_string())
        );
        assert_eq!(
            cache.script_regex(&document, r"longitude"),
            Some("longitude".to_string())
        );
        assert_eq!(cache.script_regex(&document, "(unclosed"), None);
    }
}
