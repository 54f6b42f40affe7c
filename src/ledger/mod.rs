//! Execution ledger interface
//!
//! The ledger is the shared, globally ordered machine units are deployed
//! onto. Each call either completes fully or has no effect. Compound
//! operations that must be all-or-nothing take a [`Ledger::snapshot`] first
//! and [`Ledger::revert_to`] it on failure.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;
use crate::error::Result;
use crate::hash::Hash32;

pub use memory::MemoryLedger;

/// Contract type recorded for the bootstrap proxy
pub const BOOTSTRAP_PROXY_TYPE: &str = "BootstrapProxy";

/// How ownership of a unit changes hands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OwnershipModel {
    /// Not ownable
    #[default]
    None,
    /// One transfer call hands over ownership
    SingleStep,
    /// The first transfer call proposes, a second identical call confirms
    TwoStep,
}

impl OwnershipModel {
    pub fn tag(&self) -> &'static str {
        match self {
            OwnershipModel::None => "none",
            OwnershipModel::SingleStep => "single-step",
            OwnershipModel::TwoStep => "two-step",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "none" => Some(OwnershipModel::None),
            "single-step" => Some(OwnershipModel::SingleStep),
            "two-step" => Some(OwnershipModel::TwoStep),
            _ => None,
        }
    }

    /// Transfer calls needed to hand over ownership
    pub fn transfer_calls(&self) -> usize {
        match self {
            OwnershipModel::None => 0,
            OwnershipModel::SingleStep => 1,
            OwnershipModel::TwoStep => 2,
        }
    }
}

impl fmt::Display for OwnershipModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Creation payload of a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub contract_type: String,
    /// Opaque creation code
    pub code: Vec<u8>,
    pub ownership: OwnershipModel,
    /// Whether creation (or initialization, for implementations) accepts value
    pub payable: bool,
    /// Owner fixed at creation, if any
    pub constructor_owner: Option<Address>,
    /// True for the bootstrap upgradeable proxy
    pub proxy: bool,
}

impl Artifact {
    pub fn new(contract_type: impl Into<String>, code: impl Into<Vec<u8>>) -> Self {
        Self {
            contract_type: contract_type.into(),
            code: code.into(),
            ownership: OwnershipModel::None,
            payable: false,
            constructor_owner: None,
            proxy: false,
        }
    }

    pub fn with_ownership(mut self, ownership: OwnershipModel) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn payable(mut self) -> Self {
        self.payable = true;
        self
    }

    pub fn with_constructor_owner(mut self, owner: Address) -> Self {
        self.constructor_owner = Some(owner);
        self
    }

    /// Minimal upgradeable proxy, deployable before its logic is chosen.
    ///
    /// The owner may upgrade it to the real implementation exactly once with
    /// an initializer.
    pub fn bootstrap_proxy(owner: Address) -> Self {
        Self {
            contract_type: BOOTSTRAP_PROXY_TYPE.to_string(),
            code: BOOTSTRAP_PROXY_TYPE.as_bytes().to_vec(),
            ownership: OwnershipModel::SingleStep,
            payable: false,
            constructor_owner: Some(owner),
            proxy: true,
        }
    }

    /// Canonical byte encoding; the payload hash is taken over this
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() + 96);
        out.extend_from_slice(&(self.contract_type.len() as u64).to_be_bytes());
        out.extend_from_slice(self.contract_type.as_bytes());
        out.extend_from_slice(&(self.code.len() as u64).to_be_bytes());
        out.extend_from_slice(&self.code);
        out.push(match self.ownership {
            OwnershipModel::None => 0,
            OwnershipModel::SingleStep => 1,
            OwnershipModel::TwoStep => 2,
        });
        out.push(self.payable as u8);
        match self.constructor_owner {
            Some(owner) => {
                out.push(1);
                out.extend_from_slice(owner.as_bytes());
            }
            None => out.push(0),
        }
        out.push(self.proxy as u8);
        out
    }

    pub fn payload_hash(&self) -> Hash32 {
        Hash32::digest(&self.encode())
    }
}

/// One-time initializer run when a proxy is pointed at its implementation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitCall {
    /// Owner the initializer installs on the proxy
    pub owner: Address,
    pub data: Vec<u8>,
}

impl InitCall {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            data: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }
}

/// Sender and attached value of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub address: Address,
    pub value: u128,
}

impl Caller {
    pub fn new(address: Address) -> Self {
        Self { address, value: 0 }
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

/// Placement primitive: address for (context, salt).
///
/// Identical (context, salt) always yields the same address, whatever the
/// payload or submission order.
pub fn placement_address(context: &Address, salt: &Hash32) -> Address {
    let digest = Hash32::builder()
        .byte(0xff)
        .address(context)
        .hash(salt)
        .finish();
    Address::from_hash(&digest)
}

/// Address of a direct creation from `sender` at `nonce`
pub fn creation_address(sender: &Address, nonce: u64) -> Address {
    let digest = Hash32::builder().address(sender).u64(nonce).finish();
    Address::from_hash(&digest)
}

/// The execution ledger consumed by registrars and the placement protocol
pub trait Ledger {
    type Snapshot;

    fn block_number(&self) -> u64;

    fn timestamp(&self) -> u64;

    fn balance_of(&self, address: &Address) -> u128;

    /// Creation payload of the unit at `address`, if one is deployed
    fn code_at(&self, address: &Address) -> Option<&Artifact>;

    fn has_code(&self, address: &Address) -> bool {
        self.code_at(address).is_some()
    }

    /// Create a unit at an address derived from the caller and its nonce
    fn create(&mut self, caller: Caller, artifact: &Artifact) -> Result<Address>;

    /// Create a unit at [`placement_address`]; an occupied address reverts
    fn create_deterministic(
        &mut self,
        caller: Caller,
        context: &Address,
        salt: &Hash32,
        artifact: &Artifact,
    ) -> Result<Address>;

    /// Point a bootstrap proxy at its implementation, running the initializer
    /// with the attached value
    fn upgrade_to_and_call(
        &mut self,
        caller: Caller,
        proxy: &Address,
        implementation: &Address,
        init: Option<&InitCall>,
    ) -> Result<()>;

    fn implementation_of(&self, proxy: &Address) -> Option<Address>;

    fn owner_of(&self, unit: &Address) -> Option<Address>;

    fn pending_owner_of(&self, unit: &Address) -> Option<Address>;

    /// Effective ownership model; proxies follow their implementation
    fn ownership_model(&self, unit: &Address) -> OwnershipModel;

    /// The standard transfer entry point
    fn transfer_ownership(&mut self, caller: Caller, unit: &Address, new_owner: &Address) -> Result<()>;

    fn snapshot(&self) -> Self::Snapshot;

    fn revert_to(&mut self, snapshot: Self::Snapshot);
}
