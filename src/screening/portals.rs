//! Portal registry: which hosts have a scraper mapping and how to treat them.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const BUNDLED_PORTALS: &str = include_str!("../../config/portals.json");

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Failed to read portal table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid portal table JSON in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid search pattern {pattern:?} for portal {portal}: {source}")]
    Pattern {
        portal: String,
        pattern: String,
        #[source]
        source: Box<fancy_regex::Error>,
    },
    #[error("Host {host} is registered by both {first} and {second}")]
    DuplicateHost {
        host: String,
        first: String,
        second: String,
    },
}

/// How well a portal's mapping is maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportTier {
    Full,
    Partial,
    Experimental,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortalTable {
    portals: Vec<PortalConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortalConfig {
    name: String,
    hosts: Vec<String>,
    scraper_name: String,
    support_tier: SupportTier,
    #[serde(default)]
    expected_extraction_rate: Option<f64>,
    #[serde(default)]
    manual_only: bool,
    #[serde(default)]
    search_patterns: Vec<String>,
}

/// A supported portal.
#[derive(Debug, Clone)]
pub struct Portal {
    pub name: String,
    /// Hosts without a leading `www.`.
    pub hosts: Vec<String>,
    pub scraper_name: String,
    pub support_tier: SupportTier,
    pub expected_extraction_rate: Option<f64>,
    /// Pages need a rendering browser; extraction from fetched HTML fails.
    pub manual_only: bool,
    search_patterns: Vec<Regex>,
}

impl Portal {
    fn from_config(config: PortalConfig) -> Result<Self, PortalError> {
        let search_patterns = config
            .search_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| PortalError::Pattern {
                    portal: config.name.clone(),
                    pattern: pattern.clone(),
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            hosts: config.hosts.iter().map(|h| bare_host(h).to_string()).collect(),
            name: config.name,
            scraper_name: config.scraper_name,
            support_tier: config.support_tier,
            expected_extraction_rate: config.expected_extraction_rate,
            manual_only: config.manual_only,
            search_patterns,
        })
    }

    /// Whether `path_and_query` matches one of this portal's search page
    /// patterns. Patterns that exceed the backtracking limit do not match.
    pub fn is_search_page(&self, path_and_query: &str) -> bool {
        self.search_patterns
            .iter()
            .any(|re| re.is_match(path_and_query).unwrap_or(false))
    }
}

/// Registered portals indexed by host.
#[derive(Debug, Clone, Default)]
pub struct PortalRegistry {
    portals: Vec<Portal>,
    by_host: HashMap<String, usize>,
}

impl PortalRegistry {
    /// Registry of the bundled portal table.
    pub fn builtin() -> Result<Self, PortalError> {
        Self::from_json(BUNDLED_PORTALS, "bundled portals.json")
    }

    /// Parse a portal table: `{"portals": [...]}`.
    pub fn from_json(json: &str, origin: &str) -> Result<Self, PortalError> {
        let table: PortalTable = serde_json::from_str(json).map_err(|source| PortalError::Parse {
            origin: origin.to_string(),
            source,
        })?;

        let mut registry = Self::default();
        for config in table.portals {
            registry.insert(Portal::from_config(config)?)?;
        }
        debug!("Loaded {} portals from {}", registry.portals.len(), origin);
        Ok(registry)
    }

    /// Load a replacement portal table from disk.
    pub fn load_file(path: &Path) -> Result<Self, PortalError> {
        let origin = path.display().to_string();
        let json = fs::read_to_string(path).map_err(|source| PortalError::Io {
            path: origin.clone(),
            source,
        })?;
        let registry = Self::from_json(&json, &origin)?;
        info!("Loaded {} portals from {}", registry.len(), origin);
        Ok(registry)
    }

    fn insert(&mut self, portal: Portal) -> Result<(), PortalError> {
        let index = self.portals.len();
        for host in &portal.hosts {
            if let Some(&existing) = self.by_host.get(host) {
                return Err(PortalError::DuplicateHost {
                    host: host.clone(),
                    first: self.portals[existing].name.clone(),
                    second: portal.name.clone(),
                });
            }
            self.by_host.insert(host.clone(), index);
        }
        self.portals.push(portal);
        Ok(())
    }

    /// Find the portal serving `hostname`.
    ///
    /// Matches the host as given, without `www.`, and then each parent
    /// domain, so `m.rightmove.co.uk` resolves to `rightmove.co.uk`.
    pub fn find_portal_by_host(&self, hostname: &str) -> Option<&Portal> {
        let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
        let mut candidate = bare_host(&host);
        loop {
            if let Some(&index) = self.by_host.get(candidate) {
                return self.portals.get(index);
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return None,
            }
        }
    }

    pub fn portals(&self) -> &[Portal] {
        &self.portals
    }

    pub fn len(&self) -> usize {
        self.portals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portals.is_empty()
    }
}

/// Host without a leading `www.`.
pub(crate) fn bare_host(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_portals() {
        let registry = PortalRegistry::builtin().unwrap();
        assert!(!registry.is_empty());

        let rightmove = registry.find_portal_by_host("www.rightmove.co.uk").unwrap();
        assert_eq!(rightmove.scraper_name, "rightmove");
        assert_eq!(rightmove.support_tier, SupportTier::Full);
        assert!(!rightmove.manual_only);

        let idealista = registry.find_portal_by_host("IDEALISTA.COM").unwrap();
        assert!(idealista.manual_only);
    }

    #[test]
    fn test_find_portal_by_subdomain() {
        let registry = PortalRegistry::builtin().unwrap();
        assert_eq!(
            registry.find_portal_by_host("m.rightmove.co.uk").map(|p| p.name.as_str()),
            Some("Rightmove")
        );
        assert!(registry.find_portal_by_host("co.uk").is_none());
        assert!(registry.find_portal_by_host("notrightmove.co.uk").is_none());
        assert!(registry.find_portal_by_host("").is_none());
    }

    #[test]
    fn test_search_patterns() {
        let registry = PortalRegistry::builtin().unwrap();
        let rightmove = registry.find_portal_by_host("rightmove.co.uk").unwrap();
        assert!(rightmove.is_search_page("/property-for-sale/find.html?locationIdentifier=REGION%5E87490"));
        assert!(!rightmove.is_search_page("/properties/168908774"));

        let daft = registry.find_portal_by_host("daft.ie").unwrap();
        assert!(daft.is_search_page("/property-for-sale/dublin"));
        assert!(!daft.is_search_page("/for-sale/house-main-street/5123456"));
        assert!(!daft.is_search_page("/property-for-sale/dublin/house/5123456"));

        let pisos = registry.find_portal_by_host("pisos.com").unwrap();
        assert!(pisos.is_search_page("/venta/pisos-madrid/"));
        assert!(!pisos.is_search_page("/venta/piso-centro-48123456_100500/"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let json = r#"{"portals": [{"name": "X", "hosts": ["x.com"], "scraperName": "x",
            "supportTier": "full", "searchPatterns": ["(unclosed"]}]}"#;
        let err = PortalRegistry::from_json(json, "test").unwrap_err();
        assert!(matches!(err, PortalError::Pattern { .. }));
    }

    #[test]
    fn test_duplicate_host_rejected() {
        let json = r#"{"portals": [
            {"name": "A", "hosts": ["x.com"], "scraperName": "a", "supportTier": "full"},
            {"name": "B", "hosts": ["www.x.com"], "scraperName": "b", "supportTier": "partial"}
        ]}"#;
        let err = PortalRegistry::from_json(json, "test").unwrap_err();
        assert!(matches!(err, PortalError::DuplicateHost { ref host, .. } if host == "x.com"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portals.json");
        fs::write(
            &path,
            r#"{"portals": [{"name": "Local", "hosts": ["homes.local.test"], "scraperName": "local", "supportTier": "experimental"}]}"#,
        )
        .unwrap();
        let registry = PortalRegistry::load_file(&path).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.find_portal_by_host("homes.local.test").is_some());
        assert!(registry.find_portal_by_host("rightmove.co.uk").is_none());

        assert!(matches!(
            PortalRegistry::load_file(&dir.path().join("missing.json")),
            Err(PortalError::Io { .. })
        ));
    }
}
