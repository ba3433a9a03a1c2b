//! Adapter metadata registry
//!
//! Every adapter describes itself with an [`AdapterMetadata`]. The metadata
//! is registered once per item type while the application bootstraps, then
//! frozen into a read-only [`MetadataRegistry`] used for capability
//! discovery (the CLI `types` command, link validation, tests).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Broad resource category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterCategory {
    Compute,
    Storage,
    Network,
    Security,
    Configuration,
    Observability,
    Other,
}

/// Query methods an adapter answers, with human readable descriptions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedQueryMethods {
    pub get: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub get_description: String,
    pub list: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub list_description: String,
    pub search: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub search_description: String,
}

/// Static description of an adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterMetadata {
    #[serde(rename = "type")]
    pub item_type: String,
    pub descriptive_name: String,
    pub category: AdapterCategory,
    pub supported_query_methods: SupportedQueryMethods,
    /// Item types this adapter may link to
    #[serde(default)]
    pub potential_links: Vec<String>,
}

impl AdapterMetadata {
    pub fn new(item_type: &str, descriptive_name: &str, category: AdapterCategory) -> Self {
        Self {
            item_type: item_type.to_string(),
            descriptive_name: descriptive_name.to_string(),
            category,
            supported_query_methods: SupportedQueryMethods::default(),
            potential_links: Vec::new(),
        }
    }

    pub fn get(mut self, description: &str) -> Self {
        self.supported_query_methods.get = true;
        self.supported_query_methods.get_description = description.to_string();
        self
    }

    pub fn list(mut self, description: &str) -> Self {
        self.supported_query_methods.list = true;
        self.supported_query_methods.list_description = description.to_string();
        self
    }

    pub fn search(mut self, description: &str) -> Self {
        self.supported_query_methods.search = true;
        self.supported_query_methods.search_description = description.to_string();
        self
    }

    pub fn links(mut self, item_types: &[&str]) -> Self {
        self.potential_links = item_types.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("adapter metadata for type {0:?} registered twice")]
    Duplicate(String),

    #[error("adapter metadata has an empty type")]
    EmptyType,
}

/// Collects metadata during bootstrap
#[derive(Debug, Default)]
pub struct MetadataRegistryBuilder {
    entries: BTreeMap<String, AdapterMetadata>,
}

impl MetadataRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one adapter type. A second registration for the same type is
    /// a bootstrap bug and is rejected.
    pub fn register(&mut self, metadata: AdapterMetadata) -> Result<(), RegistryError> {
        if metadata.item_type.is_empty() {
            return Err(RegistryError::EmptyType);
        }
        if self.entries.contains_key(&metadata.item_type) {
            return Err(RegistryError::Duplicate(metadata.item_type));
        }
        tracing::debug!("Registered adapter metadata for {}", metadata.item_type);
        self.entries.insert(metadata.item_type.clone(), metadata);
        Ok(())
    }

    pub fn build(self) -> MetadataRegistry {
        MetadataRegistry {
            entries: Arc::new(self.entries),
        }
    }
}

/// Frozen, cheaply cloneable metadata registry
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entries: Arc<BTreeMap<String, AdapterMetadata>>,
}

impl MetadataRegistry {
    pub fn builder() -> MetadataRegistryBuilder {
        MetadataRegistryBuilder::new()
    }

    pub fn get(&self, item_type: &str) -> Option<&AdapterMetadata> {
        self.entries.get(item_type)
    }

    /// All registered metadata, sorted by type
    pub fn all(&self) -> impl Iterator<Item = &AdapterMetadata> {
        self.entries.values()
    }

    pub fn types(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Link targets named in `potential_links` that no registered adapter
    /// serves. These links resolve to nothing when walked.
    pub fn unresolved_links(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .flat_map(|m| m.potential_links.iter())
            .filter(|target| !self.entries.contains_key(*target))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(item_type: &str) -> AdapterMetadata {
        AdapterMetadata::new(item_type, "Thing", AdapterCategory::Compute)
            .get("Get a thing by name")
            .list("List all things")
    }

    #[test]
    fn test_builder_methods_set_flags() {
        let m = meta("thing").links(&["other"]);
        assert!(m.supported_query_methods.get);
        assert!(m.supported_query_methods.list);
        assert!(!m.supported_query_methods.search);
        assert_eq!(m.potential_links, vec!["other".to_string()]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut builder = MetadataRegistry::builder();
        builder.register(meta("thing")).unwrap();
        assert_eq!(
            builder.register(meta("thing")),
            Err(RegistryError::Duplicate("thing".into()))
        );
        assert_eq!(builder.register(meta("")), Err(RegistryError::EmptyType));
    }

    #[test]
    fn test_registry_lookup_and_order() {
        let mut builder = MetadataRegistry::builder();
        builder.register(meta("zeta")).unwrap();
        builder.register(meta("alpha").links(&["zeta", "ghost"])).unwrap();
        let registry = builder.build();

        assert_eq!(registry.types(), vec!["alpha", "zeta"]);
        assert_eq!(registry.get("zeta").unwrap().descriptive_name, "Thing");
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.unresolved_links().into_iter().collect::<Vec<_>>(), vec!["ghost"]);

        let clone = registry.clone();
        assert_eq!(clone.len(), 2);
    }
}
