//! Key schema types and path rules

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{DeployError, Result};

/// Separator between path segments
pub const SEPARATOR: char = '.';

/// Top-level document fields owned by the session, never available as keys
pub const RESERVED_ROOTS: &[&str] = &[
    "schemaVersion",
    "network",
    "systemSaltString",
    "updatedAt",
    "runs",
    "pendingOwnership",
];

/// Type of a registered key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Namespace node; serialized as a nested object
    Container,
    String,
    Uint,
    Int,
    Bool,
    Address,
    StringArray,
    UintArray,
    IntArray,
    BoolArray,
    AddressArray,
}

impl DataType {
    pub fn is_container(&self) -> bool {
        matches!(self, DataType::Container)
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            DataType::StringArray
                | DataType::UintArray
                | DataType::IntArray
                | DataType::BoolArray
                | DataType::AddressArray
        )
    }

    /// Element type of an array type
    pub fn element(&self) -> Option<DataType> {
        match self {
            DataType::StringArray => Some(DataType::String),
            DataType::UintArray => Some(DataType::Uint),
            DataType::IntArray => Some(DataType::Int),
            DataType::BoolArray => Some(DataType::Bool),
            DataType::AddressArray => Some(DataType::Address),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Container => "container",
            DataType::String => "string",
            DataType::Uint => "uint",
            DataType::Int => "int",
            DataType::Bool => "bool",
            DataType::Address => "address",
            DataType::StringArray => "string[]",
            DataType::UintArray => "uint[]",
            DataType::IntArray => "int[]",
            DataType::BoolArray => "bool[]",
            DataType::AddressArray => "address[]",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared key: path plus type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaKey {
    pub path: String,
    pub data_type: DataType,
}

impl SchemaKey {
    pub fn new(path: impl Into<String>, data_type: DataType) -> Self {
        Self {
            path: path.into(),
            data_type,
        }
    }

    /// Parent path, or None for a top-level key
    pub fn parent(&self) -> Option<&str> {
        parent_path(&self.path)
    }

    /// Final path segment
    pub fn name(&self) -> &str {
        self.path
            .rsplit_once(SEPARATOR)
            .map(|(_, name)| name)
            .unwrap_or(&self.path)
    }

    pub fn is_top_level(&self) -> bool {
        !self.path.contains(SEPARATOR)
    }
}

pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once(SEPARATOR).map(|(parent, _)| parent)
}

/// Join path segments with the separator
pub fn join(parent: &str, child: &str) -> String {
    format!("{}{}{}", parent, SEPARATOR, child)
}

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("valid segment pattern"))
}

/// Check the lexical shape of a path
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(DeployError::violation(path, "path must not be empty"));
    }
    if path.starts_with(SEPARATOR) {
        return Err(DeployError::violation(path, "leading separator"));
    }
    if path.ends_with(SEPARATOR) {
        return Err(DeployError::violation(path, "trailing separator"));
    }
    for segment in path.split(SEPARATOR) {
        if segment.is_empty() {
            return Err(DeployError::violation(path, "consecutive separators"));
        }
        if !segment_pattern().is_match(segment) {
            return Err(DeployError::violation(
                path,
                format!("segment '{}' contains characters outside [A-Za-z0-9_-]", segment),
            ));
        }
    }
    let root = path.split(SEPARATOR).next().unwrap_or(path);
    if RESERVED_ROOTS.contains(&root) {
        return Err(DeployError::violation(
            path,
            format!("'{}' is a reserved document field", root),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert!(validate_path("contracts").is_ok());
        assert!(validate_path("contracts.token.symbol").is_ok());
        assert!(validate_path("params.fee_bps").is_ok());
        assert!(validate_path("pegged-usd.minter").is_ok());
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["", ".a", "a.", "a..b", "a b", "a.b$", "runs", "runs.x", "network"] {
            let err = validate_path(path).unwrap_err();
            assert!(
                matches!(err, DeployError::SchemaViolation { .. }),
                "{} should be a violation",
                path
            );
        }
    }

    #[test]
    fn test_key_parts() {
        let key = SchemaKey::new("contracts.token.symbol", DataType::String);
        assert_eq!(key.parent(), Some("contracts.token"));
        assert_eq!(key.name(), "symbol");
        assert!(!key.is_top_level());
        assert!(SchemaKey::new("owner", DataType::Address).is_top_level());
    }

    #[test]
    fn test_array_elements() {
        assert_eq!(DataType::UintArray.element(), Some(DataType::Uint));
        assert!(DataType::AddressArray.is_array());
        assert!(!DataType::Address.is_array());
        assert_eq!(DataType::Container.element(), None);
    }
}
