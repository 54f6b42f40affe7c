//! Deterministic Placement Protocol
//!
//! Places units at addresses that depend only on the protocol's own address
//! and a salt. Placement is front-running resistant: the operator first
//! commits to `H(operator ‖ value ‖ salt ‖ H(payload))` and only then reveals
//! the payload, so nobody watching the commit can claim the address with a
//! different payload.
//!
//! Each commitment hash moves through `Absent -> Committed -> Absent`; it is
//! removed by a successful reveal or an explicit clear and never expires.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::address::Address;
use crate::error::{DeployError, Result};
use crate::hash::Hash32;
use crate::ledger::{placement_address, Artifact, Caller, Ledger};

/// Administrative roles guarding the protocol
pub trait PermissionProvider {
    /// Administrative owner
    fn owner(&self) -> Address;

    /// The configured operator, if any
    fn operator(&self) -> Option<Address>;

    fn is_authorized_operator(&self, caller: &Address) -> bool {
        self.operator() == Some(*caller)
    }

    /// Set or clear the operator; owner only
    fn set_operator(&mut self, caller: &Address, operator: Option<Address>) -> Result<()>;
}

/// Owner plus a single operator slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSlot {
    owner: Address,
    operator: Option<Address>,
}

impl OperatorSlot {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            operator: None,
        }
    }
}

impl PermissionProvider for OperatorSlot {
    fn owner(&self) -> Address {
        self.owner
    }

    fn operator(&self) -> Option<Address> {
        self.operator
    }

    fn set_operator(&mut self, caller: &Address, operator: Option<Address>) -> Result<()> {
        if *caller != self.owner {
            return Err(DeployError::NotOwner { caller: *caller });
        }
        self.operator = operator;
        Ok(())
    }
}

/// The placement protocol deployed at `address`
#[derive(Debug, Clone)]
pub struct PlacementProtocol<P = OperatorSlot> {
    address: Address,
    permissions: P,
    /// Pending commitments and the ledger timestamp they were made at
    commitments: BTreeMap<Hash32, u64>,
}

impl PlacementProtocol<OperatorSlot> {
    pub fn new(address: Address, owner: Address) -> Self {
        Self::with_permissions(address, OperatorSlot::new(owner))
    }
}

impl<P: PermissionProvider> PlacementProtocol<P> {
    pub fn with_permissions(address: Address, permissions: P) -> Self {
        Self {
            address,
            permissions,
            commitments: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.permissions.owner()
    }

    pub fn operator(&self) -> Option<Address> {
        self.permissions.operator()
    }

    pub fn set_operator(&mut self, caller: &Address, operator: Option<Address>) -> Result<()> {
        self.permissions.set_operator(caller, operator)?;
        info!(protocol = %self.address, operator = ?operator, "placement operator changed");
        Ok(())
    }

    /// Address a payload placed with `salt` will land at
    pub fn predict_address(&self, salt: &Hash32) -> Address {
        placement_address(&self.address, salt)
    }

    fn require_operator(&self, caller: &Address) -> Result<()> {
        if self.permissions.operator().is_none() {
            return Err(DeployError::OperatorRequired);
        }
        if !self.permissions.is_authorized_operator(caller) {
            return Err(DeployError::UnauthorizedOperator { caller: *caller });
        }
        Ok(())
    }

    /// Record a commitment at the current ledger timestamp
    pub fn commit<L: Ledger>(&mut self, ledger: &L, caller: &Address, hash: Hash32) -> Result<()> {
        self.require_operator(caller)?;
        if hash.is_zero() {
            return Err(DeployError::CommitmentMismatch);
        }
        if self.commitments.contains_key(&hash) {
            return Err(DeployError::CommitmentAlreadyExists(hash.to_hex()));
        }
        self.commitments.insert(hash, ledger.timestamp());
        debug!(%hash, "commitment recorded");
        Ok(())
    }

    /// Deploy a previously committed payload at [`Self::predict_address`].
    ///
    /// The commitment is consumed only when the deployment succeeds.
    pub fn reveal<L: Ledger>(
        &mut self,
        ledger: &mut L,
        caller: Caller,
        payload: &Artifact,
        salt: &Hash32,
        value: u128,
    ) -> Result<Address> {
        self.require_operator(&caller.address)?;
        check_value(caller, value)?;

        let hash = commitment_hash(&caller.address, value, salt, payload);
        if !self.commitments.contains_key(&hash) {
            return Err(DeployError::UnknownCommitment(hash.to_hex()));
        }

        let address = ledger.create_deterministic(caller, &self.address, salt, payload)?;
        self.commitments.remove(&hash);
        debug!(%address, %salt, contract_type = %payload.contract_type, "commitment revealed");
        Ok(address)
    }

    /// Owner-only placement that skips commit-reveal.
    ///
    /// Gives up front-running resistance.
    pub fn owner_deploy_unprotected<L: Ledger>(
        &mut self,
        ledger: &mut L,
        caller: Caller,
        payload: &Artifact,
        salt: &Hash32,
        value: u128,
    ) -> Result<Address> {
        if caller.address != self.permissions.owner() {
            return Err(DeployError::NotOwner {
                caller: caller.address,
            });
        }
        check_value(caller, value)?;
        let address = ledger.create_deterministic(caller, &self.address, salt, payload)?;
        info!(%address, %salt, "unprotected owner placement");
        Ok(address)
    }

    /// Drop a pending commitment; operator or owner
    pub fn clear_commitment(&mut self, caller: &Address, hash: &Hash32) -> Result<()> {
        if *caller != self.permissions.owner() && !self.permissions.is_authorized_operator(caller) {
            return Err(DeployError::UnauthorizedOperator { caller: *caller });
        }
        if self.commitments.remove(hash).is_none() {
            return Err(DeployError::UnknownCommitment(hash.to_hex()));
        }
        debug!(%hash, "commitment cleared");
        Ok(())
    }

    pub fn is_committed(&self, hash: &Hash32) -> bool {
        self.commitments.contains_key(hash)
    }

    /// Timestamp of a pending commitment, or 0
    pub fn committed_at(&self, hash: &Hash32) -> u64 {
        self.commitments.get(hash).copied().unwrap_or(0)
    }

    pub fn pending_commitments(&self) -> usize {
        self.commitments.len()
    }
}

/// Commitment binding the operator, the forwarded value, the salt and the payload
pub fn commitment_hash(operator: &Address, value: u128, salt: &Hash32, payload: &Artifact) -> Hash32 {
    Hash32::builder()
        .address(operator)
        .u128(value)
        .hash(salt)
        .hash(&payload.payload_hash())
        .finish()
}

fn check_value(caller: Caller, value: u128) -> Result<()> {
    if caller.value != value {
        return Err(DeployError::ValueMismatch {
            expected: value,
            actual: caller.value,
        });
    }
    Ok(())
}
