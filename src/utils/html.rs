//! HTML tag stripping for free-text fields.

use scraper::Html;

/// Elements whose text content is never visible.
const INVISIBLE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Remove all markup and return the text content, with runs of whitespace
/// collapsed to single spaces and the ends trimmed.
///
/// Entities are decoded. Malformed markup is parsed leniently, never rejected.
pub fn strip_tags(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return collapse_whitespace(html);
    }

    let fragment = Html::parse_fragment(html);
    let mut text = String::new();
    for node in fragment.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .map(|name| INVISIBLE_ELEMENTS.contains(&name))
            .unwrap_or(false);
        if !hidden {
            text.push_str(chunk);
        }
    }
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags_basic() {
        assert_eq!(strip_tags("hello"), "hello");
        assert_eq!(strip_tags("  <b>bold</b> text "), "bold text");
        assert_eq!(strip_tags("<p>a <em>nested <i>deep</i></em></p>"), "a nested deep");
        assert_eq!(strip_tags("line<br/>break"), "linebreak");
    }

    #[test]
    fn test_strip_tags_entities_and_scripts() {
        assert_eq!(strip_tags("Fish &amp; Chips"), "Fish & Chips");
        assert_eq!(strip_tags("safe<script>alert(1)</script>"), "safe");
        assert_eq!(strip_tags("<style>p{}</style>Text"), "Text");
    }

    #[test]
    fn test_strip_tags_collapses_whitespace() {
        assert_eq!(strip_tags("<p>a</p>\n\n<p>b</p>"), "a b");
        assert_eq!(strip_tags("<li>Garden</li>\n\t<li>Garage</li>"), "Garden Garage");
        assert_eq!(strip_tags("two\n  lines"), "two lines");
    }

    #[test]
    fn test_strip_tags_malformed() {
        assert_eq!(strip_tags("<div><span>open"), "open");
        assert_eq!(strip_tags("a < b"), "a < b");
        assert_eq!(strip_tags("<"), "<");
        assert_eq!(strip_tags(""), "");
    }
}
