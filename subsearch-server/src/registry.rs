//! The collection registry: a validated, immutable snapshot of field
//! descriptors loaded at startup. Swaps replace the snapshot pointer
//! between submissions; descriptors are never mutated in place.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use log::info;

use subsearch_types::{CollectionDescriptor, Error, FieldDescriptor, FieldType, Result, PUBLIC_COLLECTION};

use crate::schema::reserved;

/// One consistent view of the registry. Everything an `index_one` call
/// observes comes from a single snapshot.
#[derive(Debug, Clone)]
pub struct PropertyRegistry {
    collections: BTreeMap<String, CollectionDescriptor>,
    global: BTreeMap<String, FieldDescriptor>,
}

impl PropertyRegistry {
    /// Build and validate a registry from its collection descriptors.
    /// Validation failures are fatal at startup.
    pub fn new(collections: Vec<CollectionDescriptor>) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        let mut global = BTreeMap::new();

        for collection in collections {
            for descriptor in &collection.fields {
                validate_descriptor(descriptor)?;
                global.entry(descriptor.name.clone()).or_insert_with(|| descriptor.clone());
            }
            by_name.insert(collection.name.clone(), collection);
        }

        let registry = Self {
            collections: by_name,
            global,
        };

        if registry.collections.get(PUBLIC_COLLECTION).is_none() {
            return Err(Error::InvalidConfig(format!(
                "registry does not declare the '{}' collection",
                PUBLIC_COLLECTION
            )));
        }
        if registry.property(reserved::COLLECTION_FACET).is_none() {
            return Err(Error::InvalidConfig(format!(
                "registry does not declare the '{}' facet",
                reserved::COLLECTION_FACET
            )));
        }
        Ok(registry)
    }

    /// Load from the registry JSON file: an array of collection descriptors
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let collections: Vec<CollectionDescriptor> = serde_json::from_str(&raw)?;
        let registry = Self::new(collections)?;
        info!(
            "loaded registry: {} collections, {} properties",
            registry.collections.len(),
            registry.global.len()
        );
        Ok(registry)
    }

    /// Descriptors applied to every submission
    pub fn public_properties(&self) -> &[FieldDescriptor] {
        self.collections
            .get(PUBLIC_COLLECTION)
            .map(|c| c.fields.as_slice())
            .unwrap_or(&[])
    }

    /// Descriptors specific to one collection, empty when unknown
    pub fn collection_properties(&self, name: &str) -> &[FieldDescriptor] {
        self.collections
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, c)| c.fields.as_slice())
            .unwrap_or(&[])
    }

    pub fn property(&self, name: &str) -> Option<&FieldDescriptor> {
        self.global.get(name)
    }

    /// Every known descriptor, keyed by field name
    pub fn global_property_registry(&self) -> &BTreeMap<String, FieldDescriptor> {
        &self.global
    }

    /// Field names a query may reference. Facet dimensions are reachable
    /// through drill-downs, not field clauses.
    pub fn searchable_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .global
            .values()
            .filter(|d| d.field_type != FieldType::Facet)
            .map(|d| d.name.clone())
            .collect();
        fields.push(reserved::FILE_ATT_KEY_VALUE.to_string());
        fields
    }

    /// Fields eligible for synonym/ontology expansion
    pub fn expandable_fields(&self) -> Vec<String> {
        self.global
            .values()
            .filter(|d| d.expandable)
            .map(|d| d.name.clone())
            .collect()
    }

    /// The collection plus its transitive subcollections, the collection
    /// itself first. Unknown names resolve to just themselves.
    pub fn collection_with_children(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if out.iter().any(|seen: &String| seen.eq_ignore_ascii_case(&current)) {
                continue;
            }
            if let Some((_, c)) = self.collections.iter().find(|(k, _)| k.eq_ignore_ascii_case(&current)) {
                stack.extend(c.subcollections.iter().cloned());
            }
            out.push(current);
        }
        out
    }
}

fn validate_descriptor(descriptor: &FieldDescriptor) -> Result<()> {
    if descriptor.name.trim().is_empty() {
        return Err(Error::InvalidConfig("descriptor with a blank name".into()));
    }
    if descriptor.field_type == FieldType::Facet && descriptor.facet_kind.is_none() {
        return Err(Error::InvalidConfig(format!(
            "facet property '{}' does not declare its facet kind",
            descriptor.name
        )));
    }
    if let Some(pattern) = &descriptor.match_pattern {
        let compiled = regex::Regex::new(pattern)
            .map_err(|e| Error::InvalidConfig(format!("bad match pattern on '{}': {}", descriptor.name, e)))?;
        if compiled.captures_len() != 2 {
            return Err(Error::InvalidConfig(format!(
                "match pattern on '{}' must have exactly one capture group",
                descriptor.name
            )));
        }
    }
    Ok(())
}

/// Shared snapshot holder. Readers clone the `Arc`; swaps are
/// pointer-atomic and take effect only between submissions.
pub struct RegistryHandle {
    inner: RwLock<Arc<PropertyRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: PropertyRegistry) -> Self {
        Self {
            inner: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn snapshot(&self) -> Arc<PropertyRegistry> {
        self.inner.read().expect("registry lock poisoned").clone()
    }

    pub fn swap(&self, registry: PropertyRegistry) {
        *self.inner.write().expect("registry lock poisoned") = Arc::new(registry);
    }
}
