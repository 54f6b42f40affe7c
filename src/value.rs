//! Tagged store values and their JSON encoding
//!
//! The tag, not the JSON shape, decides how a value is written and read.
//! Integers are 128-bit and always written as decimal strings so that the
//! domain extremes survive any JSON reader; plain JSON numbers are accepted
//! on read.

use serde_json::Value as Json;

use crate::address::Address;
use crate::error::{DeployError, Result};
use crate::schema::DataType;

/// A typed leaf value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Uint(u128),
    Int(i128),
    Bool(bool),
    Address(Address),
    StringArray(Vec<String>),
    UintArray(Vec<u128>),
    IntArray(Vec<i128>),
    BoolArray(Vec<bool>),
    AddressArray(Vec<Address>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::Uint(_) => DataType::Uint,
            Value::Int(_) => DataType::Int,
            Value::Bool(_) => DataType::Bool,
            Value::Address(_) => DataType::Address,
            Value::StringArray(_) => DataType::StringArray,
            Value::UintArray(_) => DataType::UintArray,
            Value::IntArray(_) => DataType::IntArray,
            Value::BoolArray(_) => DataType::BoolArray,
            Value::AddressArray(_) => DataType::AddressArray,
        }
    }

    /// Encode as a JSON document field
    pub fn to_json(&self) -> Json {
        match self {
            Value::String(s) => Json::String(s.clone()),
            Value::Uint(n) => Json::String(n.to_string()),
            Value::Int(n) => Json::String(n.to_string()),
            Value::Bool(b) => Json::Bool(*b),
            Value::Address(a) => Json::String(a.to_hex()),
            Value::StringArray(v) => Json::Array(v.iter().cloned().map(Json::String).collect()),
            Value::UintArray(v) => Json::Array(v.iter().map(|n| Json::String(n.to_string())).collect()),
            Value::IntArray(v) => Json::Array(v.iter().map(|n| Json::String(n.to_string())).collect()),
            Value::BoolArray(v) => Json::Array(v.iter().copied().map(Json::Bool).collect()),
            Value::AddressArray(v) => Json::Array(v.iter().map(|a| Json::String(a.to_hex())).collect()),
        }
    }

    /// Decode a JSON document field as the registered type at `path`
    pub fn from_json(path: &str, data_type: DataType, json: &Json) -> Result<Value> {
        let value = match data_type {
            DataType::Container => {
                return Err(DeployError::InvalidDocument(format!(
                    "'{}' is a container but holds a scalar",
                    path
                )))
            }
            DataType::String => Value::String(decode_string(path, json)?),
            DataType::Uint => Value::Uint(decode_uint(path, json)?),
            DataType::Int => Value::Int(decode_int(path, json)?),
            DataType::Bool => Value::Bool(decode_bool(path, json)?),
            DataType::Address => Value::Address(decode_address(path, json)?),
            DataType::StringArray => Value::StringArray(decode_array(path, json, decode_string)?),
            DataType::UintArray => Value::UintArray(decode_array(path, json, decode_uint)?),
            DataType::IntArray => Value::IntArray(decode_array(path, json, decode_int)?),
            DataType::BoolArray => Value::BoolArray(decode_array(path, json, decode_bool)?),
            DataType::AddressArray => Value::AddressArray(decode_array(path, json, decode_address)?),
        };
        Ok(value)
    }
}

fn shape_error(path: &str, expected: &str, json: &Json) -> DeployError {
    DeployError::InvalidDocument(format!("'{}' expected {}, found {}", path, expected, json))
}

fn decode_string(path: &str, json: &Json) -> Result<String> {
    json.as_str()
        .map(str::to_string)
        .ok_or_else(|| shape_error(path, "a string", json))
}

fn decode_uint(path: &str, json: &Json) -> Result<u128> {
    match json {
        Json::String(s) => s.parse().map_err(|_| shape_error(path, "an unsigned integer", json)),
        Json::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| shape_error(path, "an unsigned integer", json)),
        _ => Err(shape_error(path, "an unsigned integer", json)),
    }
}

fn decode_int(path: &str, json: &Json) -> Result<i128> {
    match json {
        Json::String(s) => s.parse().map_err(|_| shape_error(path, "a signed integer", json)),
        Json::Number(n) => n
            .as_i64()
            .map(i128::from)
            .ok_or_else(|| shape_error(path, "a signed integer", json)),
        _ => Err(shape_error(path, "a signed integer", json)),
    }
}

fn decode_bool(path: &str, json: &Json) -> Result<bool> {
    json.as_bool().ok_or_else(|| shape_error(path, "a bool", json))
}

fn decode_address(path: &str, json: &Json) -> Result<Address> {
    let s = json.as_str().ok_or_else(|| shape_error(path, "an address", json))?;
    s.parse().map_err(|_| shape_error(path, "an address", json))
}

fn decode_array<T>(
    path: &str,
    json: &Json,
    decode: fn(&str, &Json) -> Result<T>,
) -> Result<Vec<T>> {
    let items = json.as_array().ok_or_else(|| shape_error(path, "a list", json))?;
    items.iter().map(|item| decode(path, item)).collect()
}

/// Rust types that map onto exactly one registered data type
pub trait StoreValue: Sized {
    const DATA_TYPE: DataType;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

impl StoreValue for String {
    const DATA_TYPE: DataType = DataType::String;

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl StoreValue for u128 {
    const DATA_TYPE: DataType = DataType::Uint;

    fn into_value(self) -> Value {
        Value::Uint(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uint(n) => Some(*n),
            _ => None,
        }
    }
}

impl StoreValue for i128 {
    const DATA_TYPE: DataType = DataType::Int;

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl StoreValue for bool {
    const DATA_TYPE: DataType = DataType::Bool;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl StoreValue for Address {
    const DATA_TYPE: DataType = DataType::Address;

    fn into_value(self) -> Value {
        Value::Address(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Address(a) => Some(*a),
            _ => None,
        }
    }
}

impl StoreValue for Vec<String> {
    const DATA_TYPE: DataType = DataType::StringArray;

    fn into_value(self) -> Value {
        Value::StringArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::StringArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl StoreValue for Vec<u128> {
    const DATA_TYPE: DataType = DataType::UintArray;

    fn into_value(self) -> Value {
        Value::UintArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::UintArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl StoreValue for Vec<i128> {
    const DATA_TYPE: DataType = DataType::IntArray;

    fn into_value(self) -> Value {
        Value::IntArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::IntArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl StoreValue for Vec<bool> {
    const DATA_TYPE: DataType = DataType::BoolArray;

    fn into_value(self) -> Value {
        Value::BoolArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::BoolArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl StoreValue for Vec<Address> {
    const DATA_TYPE: DataType = DataType::AddressArray;

    fn into_value(self) -> Value {
        Value::AddressArray(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::AddressArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}
