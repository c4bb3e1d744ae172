//! Mapping registry: the read-only set of mappings loaded at startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::{Mapping, MappingError};

/// Mappings bundled with the crate, as `(file name, JSON)`.
const BUNDLED_MAPPINGS: &[(&str, &str)] = &[
    ("rightmove.json", include_str!("../../mappings/rightmove.json")),
    ("idealista.json", include_str!("../../mappings/idealista.json")),
    ("pisos.json", include_str!("../../mappings/pisos.json")),
    ("daft.json", include_str!("../../mappings/daft.json")),
];

/// Registry of mappings keyed by unique name.
///
/// Populated once and then only read; share it behind an `Arc` if several
/// threads extract concurrently.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    mappings: BTreeMap<String, Mapping>,
}

impl MappingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the bundled portal mappings.
    pub fn builtin() -> Result<Self, MappingError> {
        let mut registry = Self::new();
        for (file, json) in BUNDLED_MAPPINGS {
            registry.insert(Mapping::from_json(json, file)?)?;
        }
        debug!("Loaded {} bundled mappings", registry.len());
        Ok(registry)
    }

    /// Add a mapping. Names must be unique.
    pub fn insert(&mut self, mapping: Mapping) -> Result<(), MappingError> {
        if self.mappings.contains_key(&mapping.name) {
            return Err(MappingError::Duplicate(mapping.name));
        }
        self.mappings.insert(mapping.name.clone(), mapping);
        Ok(())
    }

    /// Load every `*.json` file in a directory into the registry.
    ///
    /// Returns the number of mappings added. A directory mapping replaces a
    /// registered one of the same name; two files in the directory sharing a
    /// name are an error. Any unreadable or invalid file fails the whole load
    /// and leaves the registry untouched.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, MappingError> {
        let entries = fs::read_dir(dir).map_err(|source| MappingError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut staged: BTreeMap<String, Mapping> = BTreeMap::new();
        for path in paths {
            let origin = path.display().to_string();
            let json = fs::read_to_string(&path).map_err(|source| MappingError::Io {
                path: origin.clone(),
                source,
            })?;
            let mapping = Mapping::from_json(&json, &origin)?;
            if staged.contains_key(&mapping.name) {
                return Err(MappingError::Duplicate(mapping.name));
            }
            staged.insert(mapping.name.clone(), mapping);
        }

        let added = staged.len();
        for (name, mapping) in staged {
            if self.mappings.insert(name.clone(), mapping).is_some() {
                warn!("Mapping {} from {} replaces a registered mapping", name, dir.display());
            }
        }

        info!("Loaded {} mappings from {}", added, dir.display());
        Ok(added)
    }

    pub fn find_mapping_by_name(&self, name: &str) -> Option<&Mapping> {
        self.mappings.get(name)
    }

    /// Sorted mapping names.
    pub fn list_all_mapping_names(&self) -> Vec<String> {
        self.mappings.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
