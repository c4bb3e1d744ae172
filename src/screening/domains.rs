//! Hand-maintained host lists used when a URL has no registered portal.

/// Hosts that never serve property listings.
const BLOCKED_DOMAINS: &[&str] = &[
    // search
    "google.com", "google.co.uk", "google.es", "google.ie", "bing.com", "duckduckgo.com",
    "yahoo.com", "baidu.com", "yandex.ru", "ask.com",
    // social
    "facebook.com", "instagram.com", "twitter.com", "x.com", "linkedin.com", "tiktok.com",
    "pinterest.com", "reddit.com", "snapchat.com", "threads.net", "t.me", "whatsapp.com",
    // video and streaming
    "youtube.com", "youtu.be", "vimeo.com", "twitch.tv", "netflix.com", "dailymotion.com",
    "spotify.com",
    // news and reference
    "bbc.co.uk", "bbc.com", "cnn.com", "nytimes.com", "theguardian.com", "elpais.com",
    "irishtimes.com", "wikipedia.org", "medium.com",
    // shopping
    "amazon.com", "amazon.co.uk", "amazon.es", "ebay.com", "ebay.co.uk", "aliexpress.com",
    "etsy.com", "walmart.com",
    // tools and hosting
    "github.com", "gitlab.com", "stackoverflow.com", "dropbox.com", "docs.google.com",
    "drive.google.com", "maps.google.com", "bit.ly", "tinyurl.com",
    // adult
    "pornhub.com", "xvideos.com", "xnxx.com", "onlyfans.com",
];

/// Real-estate sites with no scraper mapping yet.
const KNOWN_REAL_ESTATE_DOMAINS: &[&str] = &[
    "zillow.com", "trulia.com", "redfin.com", "realtor.com", "homes.com", "apartments.com",
    "zoopla.co.uk", "onthemarket.com", "primelocation.com", "openrent.co.uk", "spareroom.co.uk",
    "myhome.ie", "habitaclia.com", "yaencontre.com", "milanuncios.com", "kyero.com",
    "seloger.com", "leboncoin.fr", "pap.fr", "immowelt.de", "immobilienscout24.de",
    "immobiliare.it", "casa.it", "funda.nl", "imovirtual.com", "realestate.com.au",
    "domain.com.au", "realtor.ca", "propertyfinder.ae", "bayut.com",
];

fn in_list(list: &[&str], host: &str) -> bool {
    list.iter().any(|d| d.eq_ignore_ascii_case(host))
}

/// Whether the full or `www.`-stripped host is blocklisted.
pub fn is_blocked_domain(host: &str) -> bool {
    in_list(BLOCKED_DOMAINS, host) || in_list(BLOCKED_DOMAINS, super::portals::bare_host(host))
}

/// Whether the host, or a parent domain of it, is a known real-estate site.
pub fn is_known_real_estate(host: &str) -> bool {
    let mut candidate = super::portals::bare_host(host);
    loop {
        if in_list(KNOWN_REAL_ESTATE_DOMAINS, candidate) {
            return true;
        }
        match candidate.split_once('.') {
            Some((_, parent)) if parent.contains('.') => candidate = parent,
            _ => return false,
        }
    }
}
