//! URL canonicalization and listing deduplication keys.

use url::Url;

/// Query parameters that only carry campaign or click attribution.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "gclsrc", "dclid", "msclkid", "yclid", "igshid", // ad click ids
    "mc_cid", "mc_eid", // Mailchimp
    "_ga", "_gl", // Google Analytics
    "ref", "referrer", "source", "channel", "campaign", "affiliate",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Normalize a listing URL.
///
/// Forces `https`, lowercases the host, drops tracking parameters and the
/// fragment, and with `strip_trailing_slash` removes trailing slashes from
/// non-root paths. Other query parameters keep their order and encoding.
/// Input that does not parse as an http(s) URL is returned unchanged.
pub fn canonicalize_url(raw: &str, strip_trailing_slash: bool) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return raw.to_string();
    }

    if url.scheme() == "http" && url.set_scheme("https").is_err() {
        return raw.to_string();
    }
    if url.port() == Some(443) {
        let _ = url.set_port(None);
    }
    url.set_fragment(None);

    let kept: Vec<String> = url
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("");
            let key = urlencoding::decode(key)
                .map(|k| k.into_owned())
                .unwrap_or_else(|_| key.to_string());
            !is_tracking_param(&key)
        })
        .map(str::to_string)
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&kept.join("&")));
    }

    if strip_trailing_slash {
        let trimmed = url.path().trim_end_matches('/').to_string();
        url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }

    url.to_string()
}

/// Identity of a listing page: lowercase host plus path, without query,
/// fragment or trailing slash.
///
/// Coarser than [`canonicalize_url`]; tracking and campaign variants of the
/// same page share a key. Unparseable input yields the trimmed input.
pub fn deduplication_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    let Some(host) = url.host_str() else {
        return trimmed.to_string();
    };

    let path = url.path().trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };
    format!("{}{}", host.to_lowercase(), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_strips_tracking_and_fragment() {
        assert_eq!(
            canonicalize_url(
                "http://WWW.Example.com/Listing/42/?utm_source=x&id=7&fbclid=abc&sort=asc#photos",
                true
            ),
            "https://www.example.com/Listing/42?id=7&sort=asc"
        );
        assert_eq!(
            canonicalize_url("https://example.com/a?UTM_Medium=mail&ref=home", true),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_canonicalize_trailing_slash_option() {
        assert_eq!(
            canonicalize_url("https://example.com/a/b//", true),
            "https://example.com/a/b"
        );
        assert_eq!(
            canonicalize_url("https://example.com/a/b/", false),
            "https://example.com/a/b/"
        );
        assert_eq!(canonicalize_url("https://example.com", true), "https://example.com/");
        assert_eq!(canonicalize_url("https://example.com/", true), "https://example.com/");
    }

    #[test]
    fn test_canonicalize_unparseable_unchanged() {
        assert_eq!(canonicalize_url("not a url", true), "not a url");
        assert_eq!(canonicalize_url("", true), "");
        assert_eq!(canonicalize_url("mailto:a@b.com", true), "mailto:a@b.com");
        assert_eq!(canonicalize_url("/relative/path", true), "/relative/path");
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let inputs = [
            "http://Example.com/x/?utm_campaign=1&b=2&a=1#top",
            "https://example.com:443/x//",
            "https://example.com/search?q=flat%20london&&page=2",
            "http://example.com:8080/p?ref=a",
            "https://example.com/?channel=x",
            "garbage",
        ];
        for input in inputs {
            for strip in [true, false] {
                let once = canonicalize_url(input, strip);
                assert_eq!(canonicalize_url(&once, strip), once, "{}", input);
            }
        }
    }

    #[test]
    fn test_canonicalize_keeps_port_and_encoding() {
        assert_eq!(
            canonicalize_url("http://example.com:8080/p?q=a%20b&ref=x", true),
            "https://example.com:8080/p?q=a%20b"
        );
    }

    #[test]
    fn test_deduplication_key() {
        assert_eq!(
            deduplication_key("https://WWW.Rightmove.co.uk/properties/1/?utm_source=x#map"),
            "www.rightmove.co.uk/properties/1"
        );
        assert_eq!(deduplication_key("http://example.com"), "example.com/");
        assert_eq!(deduplication_key("  not a url "), "not a url");
    }

    #[test]
    fn test_deduplication_key_ignores_query_variants() {
        let base = "https://example.com/listing/99";
        let variants = [
            "https://example.com/listing/99?utm_medium=email",
            "https://example.com/listing/99/?ref=home&page=3",
            "http://EXAMPLE.com/listing/99#gallery",
        ];
        for variant in variants {
            assert_eq!(deduplication_key(variant), deduplication_key(base));
        }
    }
}
