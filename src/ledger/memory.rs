//! In-memory ledger
//!
//! Auto-mines one block per successful transaction. Every method validates
//! before it mutates, so a revert leaves no trace.

use std::collections::HashMap;

use tracing::debug;

use crate::address::Address;
use crate::error::{DeployError, Result};
use crate::hash::Hash32;

use super::{creation_address, placement_address, Artifact, Caller, InitCall, Ledger, OwnershipModel};

const DEFAULT_BLOCK_TIME: u64 = 12;
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct Unit {
    artifact: Artifact,
    owner: Option<Address>,
    pending_owner: Option<Address>,
    implementation: Option<Address>,
    initialized: bool,
}

/// Complete ledger state; also the snapshot type
#[derive(Debug, Clone)]
pub struct LedgerState {
    block: u64,
    timestamp: u64,
    balances: HashMap<Address, u128>,
    nonces: HashMap<Address, u64>,
    units: HashMap<Address, Unit>,
}

/// A single-process ledger for tests and dry runs
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    state: LedgerState,
    block_time: u64,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: LedgerState {
                block: 1,
                timestamp: GENESIS_TIMESTAMP,
                balances: HashMap::new(),
                nonces: HashMap::new(),
                units: HashMap::new(),
            },
            block_time: DEFAULT_BLOCK_TIME,
        }
    }

    pub fn with_block_time(mut self, seconds: u64) -> Self {
        self.block_time = seconds;
        self
    }

    /// Faucet: credit an account without a transaction
    pub fn fund(&mut self, address: &Address, amount: u128) -> Result<()> {
        let balance = credited(self.balance_of(address), amount, address)?;
        self.state.balances.insert(*address, balance);
        Ok(())
    }

    /// Move the clock forward without mining
    pub fn advance(&mut self, seconds: u64) {
        self.state.timestamp += seconds;
    }

    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.state.nonces.get(address).copied().unwrap_or(0)
    }

    fn mine(&mut self) {
        self.state.block += 1;
        self.state.timestamp += self.block_time;
    }

    fn check_funds(&self, caller: &Caller) -> Result<()> {
        let balance = self.balance_of(&caller.address);
        if balance < caller.value {
            return Err(DeployError::Reverted(format!(
                "insufficient balance: {} has {}, needs {}",
                caller.address, balance, caller.value
            )));
        }
        Ok(())
    }

    /// Callers run `check_funds` first; only the credit side can fail
    fn move_value(&mut self, from: &Address, to: &Address, value: u128) -> Result<()> {
        if value == 0 || from == to {
            return Ok(());
        }
        let credit = credited(self.balance_of(to), value, to)?;
        let debit = self.balance_of(from) - value;
        self.state.balances.insert(*from, debit);
        self.state.balances.insert(*to, credit);
        Ok(())
    }

    fn install(&mut self, caller: Caller, address: Address, artifact: &Artifact) -> Result<()> {
        if self.state.units.contains_key(&address) {
            return Err(DeployError::Reverted(format!(
                "address {} is already occupied",
                address
            )));
        }
        if caller.value > 0 && !artifact.payable {
            return Err(DeployError::Reverted(format!(
                "{} creation does not accept value",
                artifact.contract_type
            )));
        }
        self.check_funds(&caller)?;

        let owner = match (artifact.constructor_owner, artifact.ownership) {
            (Some(owner), _) => Some(owner),
            (None, OwnershipModel::None) => None,
            (None, _) => Some(caller.address),
        };
        self.move_value(&caller.address, &address, caller.value)?;
        self.state.units.insert(
            address,
            Unit {
                artifact: artifact.clone(),
                owner,
                pending_owner: None,
                implementation: None,
                initialized: false,
            },
        );
        debug!(%address, contract_type = %artifact.contract_type, block = self.state.block, "unit created");
        self.mine();
        Ok(())
    }

    fn unit(&self, address: &Address) -> Result<&Unit> {
        self.state
            .units
            .get(address)
            .ok_or_else(|| DeployError::Reverted(format!("no code at {}", address)))
    }
}

fn credited(balance: u128, amount: u128, account: &Address) -> Result<u128> {
    balance
        .checked_add(amount)
        .ok_or_else(|| DeployError::Reverted(format!("balance overflow at {}", account)))
}

impl Ledger for MemoryLedger {
    type Snapshot = LedgerState;

    fn block_number(&self) -> u64 {
        self.state.block
    }

    fn timestamp(&self) -> u64 {
        self.state.timestamp
    }

    fn balance_of(&self, address: &Address) -> u128 {
        self.state.balances.get(address).copied().unwrap_or(0)
    }

    fn code_at(&self, address: &Address) -> Option<&Artifact> {
        self.state.units.get(address).map(|unit| &unit.artifact)
    }

    fn create(&mut self, caller: Caller, artifact: &Artifact) -> Result<Address> {
        let nonce = self.nonce_of(&caller.address);
        let address = creation_address(&caller.address, nonce);
        self.install(caller, address, artifact)?;
        self.state.nonces.insert(caller.address, nonce + 1);
        Ok(address)
    }

    fn create_deterministic(
        &mut self,
        caller: Caller,
        context: &Address,
        salt: &Hash32,
        artifact: &Artifact,
    ) -> Result<Address> {
        let address = placement_address(context, salt);
        self.install(caller, address, artifact)?;
        Ok(address)
    }

    fn upgrade_to_and_call(
        &mut self,
        caller: Caller,
        proxy: &Address,
        implementation: &Address,
        init: Option<&InitCall>,
    ) -> Result<()> {
        let unit = self.unit(proxy)?;
        if !unit.artifact.proxy {
            return Err(DeployError::Reverted(format!("{} is not an upgradeable proxy", proxy)));
        }
        if unit.owner != Some(caller.address) {
            return Err(DeployError::Reverted(format!(
                "{} is not the owner of proxy {}",
                caller.address, proxy
            )));
        }
        if init.is_some() && unit.initialized {
            return Err(DeployError::Reverted(format!("proxy {} is already initialized", proxy)));
        }
        let target = self.unit(implementation)?;
        if caller.value > 0 {
            if init.is_none() {
                return Err(DeployError::Reverted("value sent without an initializer".to_string()));
            }
            if !target.artifact.payable {
                return Err(DeployError::Reverted(format!(
                    "{} initializer does not accept value",
                    target.artifact.contract_type
                )));
            }
        }
        self.check_funds(&caller)?;

        self.move_value(&caller.address, proxy, caller.value)?;
        if let Some(unit) = self.state.units.get_mut(proxy) {
            unit.implementation = Some(*implementation);
            if let Some(init) = init {
                unit.initialized = true;
                unit.owner = Some(init.owner);
                unit.pending_owner = None;
            }
        }
        debug!(%proxy, %implementation, "proxy upgraded");
        self.mine();
        Ok(())
    }

    fn implementation_of(&self, proxy: &Address) -> Option<Address> {
        self.state.units.get(proxy).and_then(|unit| unit.implementation)
    }

    fn owner_of(&self, unit: &Address) -> Option<Address> {
        self.state.units.get(unit).and_then(|unit| unit.owner)
    }

    fn pending_owner_of(&self, unit: &Address) -> Option<Address> {
        self.state.units.get(unit).and_then(|unit| unit.pending_owner)
    }

    fn ownership_model(&self, unit: &Address) -> OwnershipModel {
        let Some(unit) = self.state.units.get(unit) else {
            return OwnershipModel::None;
        };
        match unit.implementation.and_then(|i| self.state.units.get(&i)) {
            Some(implementation) => implementation.artifact.ownership,
            None => unit.artifact.ownership,
        }
    }

    fn transfer_ownership(&mut self, caller: Caller, unit: &Address, new_owner: &Address) -> Result<()> {
        let model = self.ownership_model(unit);
        let current = self.unit(unit)?;
        if model == OwnershipModel::None {
            return Err(DeployError::Reverted(format!("{} is not ownable", unit)));
        }
        if current.owner != Some(caller.address) {
            return Err(DeployError::Reverted(format!(
                "{} is not the owner of {}",
                caller.address, unit
            )));
        }
        if new_owner.is_zero() {
            return Err(DeployError::Reverted("new owner is the zero address".to_string()));
        }
        let confirms = current.pending_owner == Some(*new_owner);

        if let Some(target) = self.state.units.get_mut(unit) {
            match model {
                OwnershipModel::TwoStep if !confirms => {
                    target.pending_owner = Some(*new_owner);
                }
                _ => {
                    target.owner = Some(*new_owner);
                    target.pending_owner = None;
                }
            }
        }
        self.mine();
        Ok(())
    }

    fn snapshot(&self) -> LedgerState {
        self.state.clone()
    }

    fn revert_to(&mut self, snapshot: LedgerState) {
        self.state = snapshot;
    }
}
