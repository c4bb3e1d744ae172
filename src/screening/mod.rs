//! URL screening: decide whether a URL is worth fetching and extracting.

mod domains;
mod portals;

use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::Serialize;
use tracing::debug;
use url::Url;

pub use domains::{is_blocked_domain, is_known_real_estate};
pub use portals::{Portal, PortalError, PortalRegistry, SupportTier};

/// Outcome of screening one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// A registered portal's listing page.
    Allowed,
    /// A registered portal that needs a rendering browser.
    ManualOnly,
    /// A registered portal's search or index page.
    SearchResults,
    /// Possibly a listing on a site without a mapping.
    UnknownRealEstate,
    NotRealEstate,
    Invalid,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allowed => "allowed",
            Verdict::ManualOnly => "manual_only",
            Verdict::SearchResults => "search_results",
            Verdict::UnknownRealEstate => "unknown_real_estate",
            Verdict::NotRealEstate => "not_real_estate",
            Verdict::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningResult {
    pub verdict: Verdict,
    pub hostname: String,
    /// The parsed URL, when the input parsed.
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_tier: Option<SupportTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraper_name: Option<String>,
}

impl ScreeningResult {
    fn new(verdict: Verdict, hostname: &str, url: Option<&Url>) -> Self {
        Self {
            verdict,
            hostname: hostname.to_string(),
            url: url.map(|u| u.to_string()),
            portal_tier: None,
            scraper_name: None,
        }
    }
}

/// Search and index page shapes shared by most portals.
static GENERIC_SEARCH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // search/results path segments, in the languages of supported markets
        r"(?i)/(search|results|buscar|busqueda|resultados|recherche|suche|ricerca|zoeken)(?:[/.?]|$)",
        // free-text query parameters
        r"(?i)[?&](q|query|keywords|search|searchtext|searchLocation)=",
        // paginated indexes
        r"(?i)[?&](page|pagina|pn)=\d+",
        r"(?i)/(?:page|pagina)-?\d+/?$",
        // map and area browse views, except when a listing id follows
        r"(?i)/(map|mapa|carte)/(?!.*\d{6,})",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

fn is_generic_search_page(path_and_query: &str) -> bool {
    GENERIC_SEARCH_PATTERNS
        .iter()
        .any(|re| re.is_match(path_and_query).unwrap_or(false))
}

/// Classify a URL before extraction. Pure and infallible.
pub fn screen_url(raw: &str, portals: &PortalRegistry) -> ScreeningResult {
    let raw = raw.trim();
    if raw.is_empty() {
        return ScreeningResult::new(Verdict::Invalid, "", None);
    }
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            debug!("Screening {:?}: unparseable ({})", raw, e);
            return ScreeningResult::new(Verdict::Invalid, "", None);
        }
    };
    let hostname = url.host_str().unwrap_or("").to_ascii_lowercase();
    if !matches!(url.scheme(), "http" | "https") || hostname.is_empty() {
        return ScreeningResult::new(Verdict::Invalid, &hostname, Some(&url));
    }

    let result = if let Some(portal) = portals.find_portal_by_host(&hostname) {
        let path_and_query = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let verdict = if is_generic_search_page(&path_and_query)
            || portal.is_search_page(&path_and_query)
        {
            Verdict::SearchResults
        } else if portal.manual_only {
            Verdict::ManualOnly
        } else {
            Verdict::Allowed
        };
        ScreeningResult {
            portal_tier: Some(portal.support_tier),
            scraper_name: Some(portal.scraper_name.clone()),
            ..ScreeningResult::new(verdict, &hostname, Some(&url))
        }
    } else if is_blocked_domain(&hostname) {
        ScreeningResult::new(Verdict::NotRealEstate, &hostname, Some(&url))
    } else {
        if !is_known_real_estate(&hostname) {
            debug!("Screening {}: unrecognised host, giving benefit of the doubt", hostname);
        }
        ScreeningResult::new(Verdict::UnknownRealEstate, &hostname, Some(&url))
    };

    debug!("Screened {} as {}", raw, result.verdict.as_str());
    result
}
