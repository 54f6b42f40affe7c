//! Key Schema Registry
//!
//! Declares the typed namespace of every persisted key. The registry is
//! append-only: a key, once declared, keeps its type for the life of the
//! registry, and undeclared paths are rejected by every store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::entry::{self, ENTRY_FIELDS};
use crate::error::{DeployError, Result};
use crate::schema::{self, DataType, SchemaKey, SEPARATOR};

/// The key schema registry
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    /// Declared keys in insertion order
    keys: Vec<SchemaKey>,
    /// Path -> type lookup
    index: HashMap<String, DataType>,
    /// Scalar keys allowed without a parent container
    top_level_leaves: HashSet<String>,
}

impl KeyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit a scalar key without a separator (e.g. "owner")
    pub fn with_top_level_leaf(mut self, name: impl Into<String>) -> Self {
        self.top_level_leaves.insert(name.into());
        self
    }

    /// Freeze the registry for sharing between stores
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Register a key
    ///
    /// Registering a Container path that is already a Container is a no-op.
    /// Any other re-registration is a schema violation.
    pub fn register_key(&mut self, path: &str, data_type: DataType) -> Result<()> {
        schema::validate_path(path)?;

        if let Some(existing) = self.index.get(path) {
            if existing.is_container() && data_type.is_container() {
                return Ok(());
            }
            return Err(DeployError::violation(
                path,
                format!("already registered as {}", existing),
            ));
        }

        // No registered ancestor may be a leaf
        let mut prefix = path;
        while let Some(parent) = schema::parent_path(prefix) {
            if let Some(parent_type) = self.index.get(parent) {
                if !parent_type.is_container() {
                    return Err(DeployError::violation(
                        path,
                        format!("ancestor '{}' is a {} leaf", parent, parent_type),
                    ));
                }
            }
            prefix = parent;
        }

        if !data_type.is_container() {
            match schema::parent_path(path) {
                Some(parent) => {
                    if self.index.get(parent) != Some(&DataType::Container) {
                        return Err(DeployError::violation(
                            path,
                            format!("parent '{}' is not a registered container", parent),
                        ));
                    }
                }
                None => {
                    if !self.top_level_leaves.contains(path) {
                        return Err(DeployError::violation(
                            path,
                            "leaf keys need a parent container",
                        ));
                    }
                }
            }

            let descendant_prefix = format!("{}{}", path, SEPARATOR);
            if self.keys.iter().any(|k| k.path.starts_with(&descendant_prefix)) {
                return Err(DeployError::violation(
                    path,
                    "leaf would shadow registered descendants",
                ));
            }
        }

        debug!(path, %data_type, "registered key");
        self.index.insert(path.to_string(), data_type);
        self.keys.push(SchemaKey::new(path, data_type));
        Ok(())
    }

    /// Register a Container key
    pub fn register_container(&mut self, path: &str) -> Result<()> {
        self.register_key(path, DataType::Container)
    }

    /// Declare the record of a deployed or referenced unit under `contracts.<key>`
    pub fn register_entry(&mut self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(DeployError::KeyRequired);
        }
        let base = entry::entry_path(key);
        self.register_container(&base)?;
        for (field, data_type) in ENTRY_FIELDS {
            let path = schema::join(&base, field);
            if self.index.get(&path) == Some(data_type) {
                continue;
            }
            self.register_key(&path, *data_type)?;
        }
        Ok(())
    }

    /// Declare a proxy entry together with its nested implementation entry
    pub fn register_proxy_entry(&mut self, key: &str) -> Result<()> {
        self.register_entry(key)?;
        self.register_entry(&entry::implementation_key(key))
    }

    /// Type of a registered key
    pub fn key_type(&self, path: &str) -> Result<DataType> {
        self.index
            .get(path)
            .copied()
            .ok_or_else(|| DeployError::UnknownKey(path.to_string()))
    }

    /// Check that a key is registered with the expected type
    pub fn validate(&self, path: &str, expected: DataType) -> Result<()> {
        let registered = self.key_type(path)?;
        if registered != expected {
            return Err(DeployError::TypeMismatch {
                path: path.to_string(),
                registered,
                requested: expected,
            });
        }
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Declared paths in insertion order
    pub fn list_keys(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.path.as_str()).collect()
    }

    /// Declared keys with their types, in insertion order
    pub fn keys(&self) -> &[SchemaKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = KeyRegistry::new();
        registry.register_container("contracts.token").unwrap();
        registry
            .register_key("contracts.token.symbol", DataType::String)
            .unwrap();

        assert_eq!(
            registry.key_type("contracts.token.symbol").unwrap(),
            DataType::String
        );
        assert!(registry.validate("contracts.token.symbol", DataType::String).is_ok());
        assert!(matches!(
            registry.validate("contracts.token.symbol", DataType::Uint),
            Err(DeployError::TypeMismatch { .. })
        ));
        assert!(matches!(
            registry.key_type("contracts.token.name"),
            Err(DeployError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_leaf_needs_container_parent() {
        let mut registry = KeyRegistry::new();
        let result = registry.register_key("params.fee", DataType::Uint);
        assert!(matches!(result, Err(DeployError::SchemaViolation { .. })));

        registry.register_key("params", DataType::Container).unwrap();
        registry.register_key("params.fee", DataType::Uint).unwrap();

        // Parent must be a container, not a leaf
        let result = registry.register_key("params.fee.bps", DataType::Uint);
        assert!(matches!(result, Err(DeployError::SchemaViolation { .. })));
    }

    #[test]
    fn test_top_level_leaf_exceptions() {
        let mut registry = KeyRegistry::new().with_top_level_leaf("owner");
        registry.register_key("owner", DataType::Address).unwrap();
        assert!(matches!(
            registry.register_key("treasury", DataType::Address),
            Err(DeployError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn test_container_registration_is_idempotent() {
        let mut registry = KeyRegistry::new();
        registry.register_container("contracts.pegged.minter").unwrap();
        registry.register_container("contracts.pegged.minter").unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_leaf_reregistration_is_rejected() {
        let mut registry = KeyRegistry::new();
        registry.register_container("params").unwrap();
        registry.register_key("params.fee", DataType::Uint).unwrap();
        assert!(registry.register_key("params.fee", DataType::Uint).is_err());
        assert!(registry.register_key("params.fee", DataType::Int).is_err());
        assert!(registry.register_container("params.fee").is_err());
    }

    #[test]
    fn test_leaf_cannot_shadow_descendants() {
        let mut registry = KeyRegistry::new().with_top_level_leaf("tokens");
        registry.register_container("tokens.usd").unwrap();
        assert!(registry.register_key("tokens", DataType::String).is_err());
    }

    #[test]
    fn test_list_keys_keeps_insertion_order() {
        let mut registry = KeyRegistry::new();
        registry.register_container("z").unwrap();
        registry.register_container("a").unwrap();
        registry.register_key("a.b", DataType::Bool).unwrap();
        assert_eq!(registry.list_keys(), vec!["z", "a", "a.b"]);
    }

    #[test]
    fn test_register_entry_declares_fields() {
        let mut registry = KeyRegistry::new();
        registry.register_proxy_entry("vault").unwrap();

        assert!(registry.contains("contracts.vault"));
        assert_eq!(
            registry.key_type("contracts.vault.address").unwrap(),
            DataType::Address
        );
        assert_eq!(
            registry.key_type("contracts.vault.implementation.address").unwrap(),
            DataType::Address
        );
        // Declaring the same entry twice is harmless
        registry.register_entry("vault").unwrap();
        assert!(matches!(
            registry.register_entry(""),
            Err(DeployError::KeyRequired)
        ));
    }
}
