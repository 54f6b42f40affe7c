//! Typed data store over registered keys
//!
//! Values live in memory; a [`StoreBackend`] decides whether they are also
//! persisted. Every accessor checks the key against the shared
//! [`KeyRegistry`] before touching the value map.

pub mod backend;
pub mod document;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::address::Address;
use crate::error::{DeployError, Result};
use crate::registry::KeyRegistry;
use crate::value::{StoreValue, Value};

pub use backend::{BackendKind, JsonFileBackend, MemoryBackend, StoreBackend};
pub use document::{DeploymentDocument, PendingOwnership, RunRecord, SCHEMA_VERSION};

/// Typed key/value store gated by a key registry
#[derive(Debug, Clone)]
pub struct DataStore {
    registry: Arc<KeyRegistry>,
    values: HashMap<String, Value>,
    /// Written keys in first-write order
    keys: Vec<String>,
}

impl DataStore {
    /// Create an empty store over a registry
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self {
            registry,
            values: HashMap::new(),
            keys: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    /// Write a value; the key must be registered with the value's type
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<()> {
        self.registry.validate(path, value.data_type())?;
        debug!(path, data_type = %value.data_type(), "store write");
        if self.values.insert(path.to_string(), value).is_none() {
            self.keys.push(path.to_string());
        }
        Ok(())
    }

    /// Read a raw value
    pub fn get_value(&self, path: &str) -> Result<&Value> {
        self.registry.key_type(path)?;
        self.values
            .get(path)
            .ok_or_else(|| DeployError::KeyNotSet(path.to_string()))
    }

    pub fn set<T: StoreValue>(&mut self, path: &str, value: T) -> Result<()> {
        self.set_value(path, value.into_value())
    }

    pub fn get<T: StoreValue>(&self, path: &str) -> Result<T> {
        self.registry.validate(path, T::DATA_TYPE)?;
        let value = self
            .values
            .get(path)
            .ok_or_else(|| DeployError::KeyNotSet(path.to_string()))?;
        T::from_value(value).ok_or_else(|| DeployError::TypeMismatch {
            path: path.to_string(),
            registered: value.data_type(),
            requested: T::DATA_TYPE,
        })
    }

    /// True once the key has been written
    pub fn has(&self, path: &str) -> bool {
        self.values.contains_key(path)
    }

    /// Written keys in first-write order (not the declared schema)
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    // =========================================================================
    // Scalar accessors
    // =========================================================================

    pub fn set_address(&mut self, path: &str, value: Address) -> Result<()> {
        self.set(path, value)
    }

    pub fn get_address(&self, path: &str) -> Result<Address> {
        self.get(path)
    }

    pub fn set_string(&mut self, path: &str, value: impl Into<String>) -> Result<()> {
        self.set(path, value.into())
    }

    pub fn get_string(&self, path: &str) -> Result<String> {
        self.get(path)
    }

    pub fn set_uint(&mut self, path: &str, value: u128) -> Result<()> {
        self.set(path, value)
    }

    pub fn get_uint(&self, path: &str) -> Result<u128> {
        self.get(path)
    }

    pub fn set_int(&mut self, path: &str, value: i128) -> Result<()> {
        self.set(path, value)
    }

    pub fn get_int(&self, path: &str) -> Result<i128> {
        self.get(path)
    }

    pub fn set_bool(&mut self, path: &str, value: bool) -> Result<()> {
        self.set(path, value)
    }

    pub fn get_bool(&self, path: &str) -> Result<bool> {
        self.get(path)
    }

    // =========================================================================
    // Array accessors
    // =========================================================================

    pub fn set_address_array(&mut self, path: &str, value: Vec<Address>) -> Result<()> {
        self.set(path, value)
    }

    pub fn get_address_array(&self, path: &str) -> Result<Vec<Address>> {
        self.get(path)
    }

    pub fn set_string_array(&mut self, path: &str, value: Vec<String>) -> Result<()> {
        self.set(path, value)
    }

    pub fn get_string_array(&self, path: &str) -> Result<Vec<String>> {
        self.get(path)
    }

    pub fn set_uint_array(&mut self, path: &str, value: Vec<u128>) -> Result<()> {
        self.set(path, value)
    }

    pub fn get_uint_array(&self, path: &str) -> Result<Vec<u128>> {
        self.get(path)
    }

    pub fn set_int_array(&mut self, path: &str, value: Vec<i128>) -> Result<()> {
        self.set(path, value)
    }

    pub fn get_int_array(&self, path: &str) -> Result<Vec<i128>> {
        self.get(path)
    }

    pub fn set_bool_array(&mut self, path: &str, value: Vec<bool>) -> Result<()> {
        self.set(path, value)
    }

    pub fn get_bool_array(&self, path: &str) -> Result<Vec<bool>> {
        self.get(path)
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Nested JSON tree mirroring the key hierarchy
    pub fn to_tree(&self) -> Map<String, Json> {
        let entries = self
            .keys
            .iter()
            .filter_map(|path| self.values.get(path).map(|value| (path.as_str(), value)));
        document::build_tree(entries)
    }

    /// Rebuild a store from a tree produced by [`DataStore::to_tree`]
    pub fn from_tree(registry: Arc<KeyRegistry>, tree: &Map<String, Json>) -> Result<Self> {
        let mut store = Self::new(registry);
        let mut leaves = Vec::new();
        document::flatten_tree(&store.registry, None, tree, &mut leaves)?;
        for (path, value) in leaves {
            store.set_value(&path, value)?;
        }
        Ok(store)
    }
}
