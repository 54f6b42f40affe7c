//! Persisted deployment document
//!
//! ## Layout
//!
//! ```text
//! {
//!   "schemaVersion": 1,
//!   "network": "...",
//!   "systemSaltString": "...",
//!   "updatedAt": "...",
//!   "runs": [ { "sequence": 0, ... }, ... ],      append-only run history
//!   "pendingOwnership": [ { "address", "label" } ],
//!   "contracts": { "<key>": { "address", "category", ... } },
//!   "<any registered path>": ...
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::address::Address;
use crate::error::{DeployError, Result};
use crate::registry::KeyRegistry;
use crate::schema::{self, SEPARATOR};
use crate::value::Value;

/// Current document format version
pub const SCHEMA_VERSION: u32 = 1;

/// One start-to-finish execution against the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Position in the run history, starting at 0
    pub sequence: u32,
    pub deployer: Address,
    pub start_timestamp: u64,
    pub start_block: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_block: Option<u64>,
    /// Wall-clock time the run was opened
    pub started_at: DateTime<Utc>,
    /// Entry keys registered during this run
    #[serde(default)]
    pub registered: Vec<String>,
}

impl RunRecord {
    pub fn is_finished(&self) -> bool {
        self.finish_block.is_some()
    }
}

/// A unit queued for ownership handoff to the final owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOwnership {
    pub address: Address,
    pub label: String,
}

/// The persisted record of one (network, system salt) deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDocument {
    pub schema_version: u32,
    pub network: String,
    pub system_salt_string: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub runs: Vec<RunRecord>,
    #[serde(default)]
    pub pending_ownership: Vec<PendingOwnership>,
    /// Store tree: every registered path that has been written
    #[serde(flatten)]
    pub data: Map<String, Json>,
}

impl DeploymentDocument {
    pub fn new(network: impl Into<String>, system_salt: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            network: network.into(),
            system_salt_string: system_salt.into(),
            updated_at: Utc::now(),
            runs: Vec::new(),
            pending_ownership: Vec::new(),
            data: Map::new(),
        }
    }

    /// Validate the document
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(DeployError::InvalidDocument(format!(
                "unsupported schemaVersion {}",
                self.schema_version
            )));
        }
        for (i, run) in self.runs.iter().enumerate() {
            if run.sequence as usize != i {
                return Err(DeployError::InvalidDocument(format!(
                    "run {} carries sequence {}",
                    i, run.sequence
                )));
            }
        }
        Ok(())
    }

    /// The most recent run, if any
    pub fn latest_run(&self) -> Option<&RunRecord> {
        self.runs.last()
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let document: Self = serde_json::from_str(content)?;
        document.validate()?;
        Ok(document)
    }
}

/// Nest `(path, value)` pairs into objects split on the separator
pub(crate) fn build_tree<'a>(entries: impl Iterator<Item = (&'a str, &'a Value)>) -> Map<String, Json> {
    let mut root = Map::new();
    for (path, value) in entries {
        let mut segments: Vec<&str> = path.split(SEPARATOR).collect();
        let leaf = segments.pop().unwrap_or(path);
        let mut node = &mut root;
        for segment in segments {
            let child = node
                .entry(segment.to_string())
                .or_insert_with(|| Json::Object(Map::new()));
            if !child.is_object() {
                *child = Json::Object(Map::new());
            }
            node = match child {
                Json::Object(map) => map,
                _ => unreachable!("child was just made an object"),
            };
        }
        node.insert(leaf.to_string(), value.to_json());
    }
    root
}

/// Walk a tree back into typed `(path, value)` pairs using registered types
pub(crate) fn flatten_tree(
    registry: &KeyRegistry,
    prefix: Option<&str>,
    tree: &Map<String, Json>,
    out: &mut Vec<(String, Value)>,
) -> Result<()> {
    for (name, json) in tree {
        let path = match prefix {
            Some(prefix) => schema::join(prefix, name),
            None => name.clone(),
        };
        match json {
            Json::Object(children) => {
                if let Ok(data_type) = registry.key_type(&path) {
                    if !data_type.is_container() {
                        return Err(DeployError::InvalidDocument(format!(
                            "'{}' is a {} but holds an object",
                            path, data_type
                        )));
                    }
                }
                flatten_tree(registry, Some(&path), children, out)?;
            }
            leaf => {
                let data_type = registry.key_type(&path)?;
                out.push((path.clone(), Value::from_json(&path, data_type, leaf)?));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;

    #[test]
    fn test_document_new() {
        let document = DeploymentDocument::new("local", "bao");
        assert_eq!(document.schema_version, 1);
        assert!(document.runs.is_empty());
        assert!(document.validate().is_ok());
    }

    #[test]
    fn test_invalid_version() {
        let mut document = DeploymentDocument::new("local", "bao");
        document.schema_version = 2;
        assert!(document.validate().is_err());
    }

    #[test]
    fn test_flattened_data_roundtrip() {
        let mut document = DeploymentDocument::new("local", "bao");
        document
            .data
            .insert("params".to_string(), serde_json::json!({ "fee": "30" }));
        let text = serde_json::to_string(&document).unwrap();
        assert!(text.contains("\"schemaVersion\":1"));
        assert!(text.contains("\"params\":{\"fee\":\"30\"}"));

        let back = DeploymentDocument::from_json_str(&text).unwrap();
        assert_eq!(back.data["params"]["fee"], serde_json::json!("30"));
        assert_eq!(back.network, "local");
    }

    #[test]
    fn test_flatten_rejects_unknown_paths() {
        let mut registry = KeyRegistry::new();
        registry.register_container("params").unwrap();
        registry.register_key("params.fee", DataType::Uint).unwrap();

        let tree: Map<String, Json> =
            serde_json::from_value(serde_json::json!({ "params": { "other": "1" } })).unwrap();
        let mut out = Vec::new();
        let result = flatten_tree(&registry, None, &tree, &mut out);
        assert!(matches!(result, Err(DeployError::UnknownKey(_))));
    }

    #[test]
    fn test_flatten_rejects_object_at_leaf() {
        let mut registry = KeyRegistry::new();
        registry.register_container("params").unwrap();
        registry.register_key("params.fee", DataType::Uint).unwrap();

        let tree: Map<String, Json> =
            serde_json::from_value(serde_json::json!({ "params": { "fee": {} } })).unwrap();
        let mut out = Vec::new();
        assert!(flatten_tree(&registry, None, &tree, &mut out).is_err());
    }
}
