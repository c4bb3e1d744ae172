//! Configuration: a config file overlaid with environment overrides.
//!
//! `Config` is the file as written; `Settings` is what the binary runs with,
//! with relative paths resolved against the config file's directory. Config
//! files are discovered with `prefer` in its standard locations
//! (`listingscrape.toml`, `.json`, `.yaml`, ...).

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::mapping::MappingRegistry;
use crate::quality::ImportanceTable;
use crate::screening::PortalRegistry;

/// Name `prefer` discovers config files under.
pub const CONFIG_NAME: &str = "listingscrape";

/// Default cap on HTML accepted for extraction (5 MiB).
pub const DEFAULT_MAX_HTML_BYTES: usize = 5 * 1024 * 1024;

/// Config file contents. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of extra mapping JSON files, loaded over the bundled ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mappings_dir: Option<String>,
    /// Portal table replacing the bundled one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portals_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_html_bytes: Option<usize>,
    /// Baseline rate for mappings without `expectedExtractionRate`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_expected_rate: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub critical_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub important_fields: Vec<String>,

    /// Where this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover a config file with `prefer` and load it.
    ///
    /// Returns `Ok(None)` when no config file exists in any standard location.
    pub async fn discover() -> anyhow::Result<Option<Self>> {
        let Ok(found) = prefer::load(CONFIG_NAME).await else {
            tracing::debug!("No {} config file discovered", CONFIG_NAME);
            return Ok(None);
        };
        match found.source_path() {
            Some(path) => Ok(Some(Self::load_from_path(path).await?)),
            None => Ok(None),
        }
    }

    /// Load a config file. The format follows the extension: TOML, YAML,
    /// or JSON for anything else.
    pub async fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?,
            _ => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config {}", path.display()))?,
        };
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory that relative paths in this config are resolved from.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mappings_dir: Option<PathBuf>,
    pub portals_file: Option<PathBuf>,
    pub max_html_bytes: usize,
    pub default_expected_rate: Option<f64>,
    pub critical_fields: Vec<String>,
    pub important_fields: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mappings_dir: None,
            portals_file: None,
            max_html_bytes: DEFAULT_MAX_HTML_BYTES,
            default_expected_rate: None,
            critical_fields: Vec::new(),
            important_fields: Vec::new(),
        }
    }
}

impl Settings {
    /// Bundled mappings plus any in `mappings_dir`.
    pub fn mapping_registry(&self) -> anyhow::Result<MappingRegistry> {
        let mut registry = MappingRegistry::builtin().context("Bundled mappings are invalid")?;
        if let Some(dir) = &self.mappings_dir {
            registry
                .load_dir(dir)
                .with_context(|| format!("Failed to load mappings from {}", dir.display()))?;
        }
        Ok(registry)
    }

    /// The configured portal table, or the bundled one.
    pub fn portal_registry(&self) -> anyhow::Result<PortalRegistry> {
        match &self.portals_file {
            Some(path) => PortalRegistry::load_file(path)
                .with_context(|| format!("Failed to load portal table {}", path.display())),
            None => PortalRegistry::builtin().context("Bundled portal table is invalid"),
        }
    }

    pub fn importance_table(&self) -> ImportanceTable {
        ImportanceTable::with_overrides(&self.critical_fields, &self.important_fields)
    }

    fn apply_config(&mut self, config: &Config, base_dir: &Path) {
        if let Some(dir) = &config.mappings_dir {
            self.mappings_dir = Some(resolve_path(base_dir, dir));
        }
        if let Some(file) = &config.portals_file {
            self.portals_file = Some(resolve_path(base_dir, file));
        }
        if let Some(max) = config.max_html_bytes {
            self.max_html_bytes = max;
        }
        if config.default_expected_rate.is_some() {
            self.default_expected_rate = config.default_expected_rate;
        }
        if !config.critical_fields.is_empty() {
            self.critical_fields = config.critical_fields.clone();
        }
        if !config.important_fields.is_empty() {
            self.important_fields = config.important_fields.clone();
        }
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Some(dir) = env_var("LISTINGSCRAPE_MAPPINGS_DIR") {
            tracing::debug!("Using LISTINGSCRAPE_MAPPINGS_DIR from environment: {}", dir);
            self.mappings_dir = Some(resolve_path(&current_dir(), &dir));
        }
        if let Some(file) = env_var("LISTINGSCRAPE_PORTALS_FILE") {
            tracing::debug!("Using LISTINGSCRAPE_PORTALS_FILE from environment: {}", file);
            self.portals_file = Some(resolve_path(&current_dir(), &file));
        }
        if let Some(max) = env_var("LISTINGSCRAPE_MAX_HTML_BYTES") {
            self.max_html_bytes = max
                .parse()
                .with_context(|| format!("LISTINGSCRAPE_MAX_HTML_BYTES is not a size: {}", max))?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(rate) = self.default_expected_rate {
            anyhow::ensure!(
                (0.0..=1.0).contains(&rate),
                "default_expected_rate {} is outside 0..1",
                rate
            );
        }
        anyhow::ensure!(self.max_html_bytes > 0, "max_html_bytes must be positive");
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Resolve a configured path.
/// - Paths starting with ~ are expanded
/// - Absolute paths are returned as-is
/// - Relative paths are resolved against `base_dir`
fn resolve_path(base_dir: &Path, path_str: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path_str);
    let path = Path::new(expanded.as_ref());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Options for [`load_settings`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file; must exist.
    pub config: Option<PathBuf>,
}

/// Resolve settings from the config file and environment.
///
/// The file is `options.config`, else `LISTINGSCRAPE_CONFIG`, else whatever
/// `prefer` discovers for `listingscrape`. Environment overrides take
/// precedence over the file.
pub async fn load_settings(options: &LoadOptions) -> anyhow::Result<Settings> {
    let explicit = options
        .config
        .clone()
        .or_else(|| env_var("LISTINGSCRAPE_CONFIG").map(PathBuf::from));

    let config = match explicit {
        Some(path) => Some(Config::load_from_path(&path).await?),
        None => Config::discover().await?,
    };

    let mut settings = Settings::default();
    if let Some(config) = &config {
        let base_dir = config
            .base_dir()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(current_dir);
        settings.apply_config(config, &base_dir);
        tracing::debug!("Loaded config from {:?}", config.source_path);
    }
    settings.apply_env()?;
    settings.validate()?;
    Ok(settings)
}
