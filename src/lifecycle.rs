//! Idempotent proxy deployment and ownership finalization

use tracing::{info, warn};

use crate::address::Address;
use crate::entry::{self, Placement};
use crate::error::{DeployError, Result};
use crate::ledger::{InitCall, Ledger};
use crate::registrar::Registrar;

impl<'a, L: Ledger> Registrar<'a, L> {
    /// Deploy the proxy for `id` unless it already exists.
    ///
    /// - recorded at the predicted address: returned unchanged, never
    ///   upgraded or re-initialized
    /// - on the ledger but missing from the record (a crash between deploy
    ///   and save): recorded from ledger state
    /// - otherwise deployed through [`Registrar::register_proxy`]
    pub fn deploy_proxy_idempotent(&mut self, id: &str, implementation: Address, init: &InitCall) -> Result<Address> {
        let (salt, salt_string) = self.salt_for(id);
        let predicted = self.factory.predict_address(&salt);

        if self.has(id) {
            let recorded = self.address_of(id)?;
            if recorded == predicted {
                warn!(id, proxy = %predicted, "proxy already deployed, skipping");
                return Ok(recorded);
            }
            return Err(DeployError::KeyAlreadyUsed {
                key: id.to_string(),
                existing: recorded,
            });
        }

        let recoverable = self.ledger.code_at(&predicted).map(|code| code.proxy).unwrap_or(false);
        if !recoverable {
            return self.register_proxy(id, implementation, init, 0);
        }

        let live_implementation = self.ledger.implementation_of(&predicted).ok_or_else(|| {
            DeployError::DeploymentFailed {
                key: id.to_string(),
                reason: format!("proxy {} was never upgraded", predicted),
            }
        })?;
        let artifact = self
            .ledger
            .code_at(&live_implementation)
            .cloned()
            .ok_or_else(|| DeployError::DeploymentFailed {
                key: id.to_string(),
                reason: format!("no implementation at {}", live_implementation),
            })?;
        let value = self.ledger.balance_of(&predicted);

        self.atomically(|r| {
            let placement = Placement {
                factory: r.factory.address(),
                salt,
                salt_string,
                value,
            };
            r.record_proxy(id, predicted, live_implementation, &artifact, placement)?;
            warn!(id, proxy = %predicted, "proxy found on ledger but not in record, recovered");
            Ok(predicted)
        })
    }

    /// Queue a unit for handoff to the final owner; returns false if already queued
    pub fn register_for_ownership_transfer(&mut self, address: Address, label: &str) -> bool {
        self.ownership.enqueue(address, label)
    }

    /// Hand every queued unit to the final owner.
    ///
    /// Runs as one batch: any failure reverts every transfer and keeps the
    /// queue. Entries whose key matches a queued label get their `owner`
    /// recorded. Returns the number of units transferred.
    pub fn transfer_all_ownerships(&mut self) -> Result<usize> {
        if self.ownership.is_empty() {
            return Ok(0);
        }
        self.atomically(|r| {
            let deployer = r.context.deployer;
            let owner = r.context.owner;
            let transferred = r.ownership.transfer_all(&mut *r.ledger, deployer, owner)?;

            for item in &transferred {
                let owner_path = entry::field_path(&item.label, "owner");
                let resolves_here = r.address_of(&item.label).ok() == Some(item.address);
                if resolves_here && r.store.registry().contains(&owner_path) {
                    r.store.set_address(&owner_path, owner)?;
                }
            }
            info!(count = transferred.len(), %owner, "ownership finalized");
            Ok(transferred.len())
        })
    }
}
