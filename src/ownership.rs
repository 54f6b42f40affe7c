//! Pending ownership queue
//!
//! Units are deployed owned by the deployer and queued here; at the end of a
//! session every queued unit is handed to the final owner in one batch.

use tracing::{debug, info, warn};

use crate::address::Address;
use crate::error::{DeployError, Result};
use crate::ledger::{Caller, Ledger, OwnershipModel};
use crate::store::PendingOwnership;

/// Queued ownership handoffs, at most one per address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipQueue {
    entries: Vec<PendingOwnership>,
}

impl OwnershipQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a queue persisted with a document
    pub fn from_pending(pending: Vec<PendingOwnership>) -> Self {
        let mut queue = Self::new();
        for item in pending {
            queue.enqueue(item.address, item.label);
        }
        queue
    }

    /// Queue a unit; returns false if the address is already queued
    pub fn enqueue(&mut self, address: Address, label: impl Into<String>) -> bool {
        if self.contains(&address) {
            return false;
        }
        let label = label.into();
        debug!(%address, label = %label, "queued for ownership transfer");
        self.entries.push(PendingOwnership { address, label });
        true
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.iter().any(|item| item.address == *address)
    }

    pub fn entries(&self) -> &[PendingOwnership] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<PendingOwnership> {
        self.entries.clone()
    }

    /// Hand every queued unit from `operator` to `new_owner`.
    ///
    /// Units already owned by `new_owner` are skipped. Two-step units get the
    /// transfer call twice (propose, confirm). The queue is cleared only when
    /// every unit succeeded; the caller is responsible for reverting the
    /// ledger on error. Returns the units that changed hands.
    pub fn transfer_all<L: Ledger>(
        &mut self,
        ledger: &mut L,
        operator: Address,
        new_owner: Address,
    ) -> Result<Vec<PendingOwnership>> {
        let mut transferred = Vec::new();
        for item in &self.entries {
            if ledger.owner_of(&item.address) == Some(new_owner) {
                warn!(address = %item.address, label = %item.label, "already owned by final owner, skipping");
                continue;
            }
            let model = ledger.ownership_model(&item.address);
            if model == OwnershipModel::None {
                return Err(DeployError::Reverted(format!(
                    "{} ({}) is not ownable",
                    item.label, item.address
                )));
            }
            for _ in 0..model.transfer_calls() {
                if ledger.owner_of(&item.address) == Some(new_owner) {
                    break;
                }
                ledger.transfer_ownership(Caller::new(operator), &item.address, &new_owner)?;
            }
            if ledger.owner_of(&item.address) != Some(new_owner) {
                return Err(DeployError::Reverted(format!(
                    "ownership of {} did not reach {}",
                    item.label, new_owner
                )));
            }
            info!(address = %item.address, label = %item.label, model = %model, "ownership transferred");
            transferred.push(item.clone());
        }
        self.entries.clear();
        Ok(transferred)
    }
}
