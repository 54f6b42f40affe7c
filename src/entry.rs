//! Entry records for deployed and referenced units
//!
//! Every entry lives under `contracts.<key>` and is made of the leaves in
//! [`ENTRY_FIELDS`]. A proxy's implementation is a nested entry at
//! `<key>.implementation`.

use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::error::{DeployError, Result};
use crate::hash::Hash32;
use crate::ledger::OwnershipModel;
use crate::schema::{self, DataType};
use crate::store::DataStore;
use crate::value::Value;

/// Container all entries are declared under
pub const ENTRIES_ROOT: &str = "contracts";

/// Leaves declared for every entry
pub const ENTRY_FIELDS: &[(&str, DataType)] = &[
    ("address", DataType::Address),
    ("contractType", DataType::String),
    ("category", DataType::String),
    ("blockNumber", DataType::Uint),
    ("timestamp", DataType::Uint),
    ("deployer", DataType::Address),
    ("factory", DataType::Address),
    ("owner", DataType::Address),
    ("value", DataType::Uint),
    ("salt", DataType::String),
    ("saltString", DataType::String),
    ("ownershipModel", DataType::String),
    ("implementationKey", DataType::String),
];

/// Store path of an entry
pub fn entry_path(key: &str) -> String {
    schema::join(ENTRIES_ROOT, key)
}

/// Store path of one entry field
pub fn field_path(key: &str, field: &str) -> String {
    schema::join(&entry_path(key), field)
}

/// Key of the implementation entry nested in a proxy entry
pub fn implementation_key(proxy_key: &str) -> String {
    schema::join(proxy_key, "implementation")
}

/// Persisted category of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Existing,
    Contract,
    Library,
    Proxy,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Existing => "existing",
            Category::Contract => "contract",
            Category::Library => "library",
            Category::Proxy => "proxy",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "existing" => Ok(Category::Existing),
            "contract" => Ok(Category::Contract),
            "library" => Ok(Category::Library),
            "proxy" => Ok(Category::Proxy),
            other => Err(DeployError::InvalidDocument(format!(
                "unknown entry category '{}'",
                other
            ))),
        }
    }
}

/// Where a deterministically placed unit came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Placement protocol address
    pub factory: Address,
    pub salt: Hash32,
    pub salt_string: String,
    /// Value forwarded at creation
    pub value: u128,
}

/// Entry variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Pre-existing unit referenced by address
    Existing,
    Component,
    Library,
    Implementation { ownership: OwnershipModel },
    /// Component placed through the placement protocol
    Deterministic,
    Proxy { implementation_key: String },
}

impl EntryKind {
    pub fn category(&self) -> Category {
        match self {
            EntryKind::Existing => Category::Existing,
            EntryKind::Library => Category::Library,
            EntryKind::Proxy { .. } => Category::Proxy,
            EntryKind::Component | EntryKind::Implementation { .. } | EntryKind::Deterministic => {
                Category::Contract
            }
        }
    }
}

/// A resolved entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub kind: EntryKind,
    pub address: Address,
    pub contract_type: Option<String>,
    pub block_number: Option<u64>,
    pub timestamp: Option<u64>,
    pub deployer: Option<Address>,
    pub owner: Option<Address>,
    pub placement: Option<Placement>,
}

impl Entry {
    pub fn new(key: impl Into<String>, kind: EntryKind, address: Address) -> Self {
        Self {
            key: key.into(),
            kind,
            address,
            contract_type: None,
            block_number: None,
            timestamp: None,
            deployer: None,
            owner: None,
            placement: None,
        }
    }

    pub fn with_contract_type(mut self, contract_type: impl Into<String>) -> Self {
        self.contract_type = Some(contract_type.into());
        self
    }

    /// Stamp creation block, timestamp and deployer
    pub fn created(mut self, block_number: u64, timestamp: u64, deployer: Address) -> Self {
        self.block_number = Some(block_number);
        self.timestamp = Some(timestamp);
        self.deployer = Some(deployer);
        self
    }

    pub fn with_owner(mut self, owner: Address) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    fn fields(&self) -> Vec<(String, Value)> {
        let path = |field: &str| field_path(&self.key, field);
        let mut fields = vec![
            (path("address"), Value::Address(self.address)),
            (path("category"), Value::String(self.category().as_str().to_string())),
        ];
        if let Some(contract_type) = &self.contract_type {
            fields.push((path("contractType"), Value::String(contract_type.clone())));
        }
        if let Some(block) = self.block_number {
            fields.push((path("blockNumber"), Value::Uint(block as u128)));
        }
        if let Some(timestamp) = self.timestamp {
            fields.push((path("timestamp"), Value::Uint(timestamp as u128)));
        }
        if let Some(deployer) = self.deployer {
            fields.push((path("deployer"), Value::Address(deployer)));
        }
        if let Some(owner) = self.owner {
            fields.push((path("owner"), Value::Address(owner)));
        }
        if let Some(placement) = &self.placement {
            fields.push((path("factory"), Value::Address(placement.factory)));
            fields.push((path("salt"), Value::String(placement.salt.to_hex())));
            fields.push((path("saltString"), Value::String(placement.salt_string.clone())));
            fields.push((path("value"), Value::Uint(placement.value)));
        }
        match &self.kind {
            EntryKind::Implementation { ownership } => {
                fields.push((path("ownershipModel"), Value::String(ownership.tag().to_string())));
            }
            EntryKind::Proxy { implementation_key } => {
                fields.push((path("implementationKey"), Value::String(implementation_key.clone())));
            }
            _ => {}
        }
        fields
    }

    /// Write every field, or nothing if any field is undeclared
    pub fn write(&self, store: &mut DataStore) -> Result<()> {
        let fields = self.fields();
        for (path, value) in &fields {
            store.registry().validate(path, value.data_type())?;
        }
        for (path, value) in fields {
            store.set_value(&path, value)?;
        }
        Ok(())
    }

    /// Reconstruct an entry from the store
    pub fn read(store: &DataStore, key: &str) -> Result<Entry> {
        let address = store.get_address(&field_path(key, "address"))?;
        let optional = |field: &str| field_path(key, field);
        let string = |field: &str| -> Option<String> { store.get_string(&optional(field)).ok() };
        let uint = |field: &str| -> Option<u128> { store.get_uint(&optional(field)).ok() };
        let address_field = |field: &str| -> Option<Address> { store.get_address(&optional(field)).ok() };
        let narrow = |field: &str| -> Result<Option<u64>> {
            uint(field)
                .map(|n| {
                    u64::try_from(n).map_err(|_| {
                        DeployError::InvalidDocument(format!("{} = {} does not fit in 64 bits", optional(field), n))
                    })
                })
                .transpose()
        };

        let category: Category = string("category")
            .ok_or_else(|| DeployError::KeyNotSet(optional("category")))?
            .parse()?;

        let placement = match (address_field("factory"), string("salt"), string("saltString")) {
            (Some(factory), Some(salt), Some(salt_string)) => Some(Placement {
                factory,
                salt: salt.parse()?,
                salt_string,
                value: uint("value").unwrap_or(0),
            }),
            _ => None,
        };

        let kind = match category {
            Category::Existing => EntryKind::Existing,
            Category::Library => EntryKind::Library,
            Category::Proxy => EntryKind::Proxy {
                implementation_key: string("implementationKey")
                    .unwrap_or_else(|| implementation_key(key)),
            },
            Category::Contract => match string("ownershipModel") {
                Some(tag) => EntryKind::Implementation {
                    ownership: OwnershipModel::from_tag(&tag).ok_or_else(|| {
                        DeployError::InvalidDocument(format!("unknown ownership model '{}'", tag))
                    })?,
                },
                None if placement.is_some() => EntryKind::Deterministic,
                None => EntryKind::Component,
            },
        };

        Ok(Entry {
            key: key.to_string(),
            kind,
            address,
            contract_type: string("contractType"),
            block_number: narrow("blockNumber")?,
            timestamp: narrow("timestamp")?,
            deployer: address_field("deployer"),
            owner: address_field("owner"),
            placement,
        })
    }
}
