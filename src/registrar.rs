//! Entry Registrar
//!
//! Deploys or references units and records them as entries. Each key
//! resolves at most once. Every compound operation is all-or-nothing: the
//! ledger, the placement protocol, the store and the ownership queue are
//! checkpointed first and restored on any error.
//!
//! | Kind | Placement | Recorded |
//! |------|-----------|----------|
//! | existing | caller-supplied | address |
//! | component / library | direct creation | deployer, block |
//! | implementation | direct creation | deployer, block, ownership model |
//! | deterministic | placement protocol | factory, salt, value |
//! | proxy | placement protocol, wraps an implementation | factory, salt, value, implementation entry |

use tracing::{debug, info, warn};

use crate::address::Address;
use crate::entry::{self, Entry, EntryKind, Placement};
use crate::error::{DeployError, Result};
use crate::hash::{derive_salt, Hash32};
use crate::ledger::{Artifact, Caller, InitCall, Ledger, OwnershipModel};
use crate::ownership::OwnershipQueue;
use crate::placement::{commitment_hash, PlacementProtocol};
use crate::store::DataStore;

/// Directly created, non-upgradeable kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectKind {
    Component,
    Library,
}

/// Identities a registrar acts with
#[derive(Debug, Clone)]
pub struct RegistrarContext {
    /// Sends every transaction and operates the placement protocol
    pub deployer: Address,
    /// Receives ownership at finalization
    pub owner: Address,
    /// Namespace for entry salts (the system salt string)
    pub salt_prefix: String,
}

/// Registers entries against a store, a ledger and a placement protocol
pub struct Registrar<'a, L: Ledger> {
    pub(crate) store: &'a mut DataStore,
    pub(crate) ledger: &'a mut L,
    pub(crate) factory: &'a mut PlacementProtocol,
    pub(crate) ownership: &'a mut OwnershipQueue,
    pub(crate) context: &'a RegistrarContext,
}

impl<'a, L: Ledger> Registrar<'a, L> {
    pub fn new(
        store: &'a mut DataStore,
        ledger: &'a mut L,
        factory: &'a mut PlacementProtocol,
        ownership: &'a mut OwnershipQueue,
        context: &'a RegistrarContext,
    ) -> Self {
        Self {
            store,
            ledger,
            factory,
            ownership,
            context,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Address of a resolved entry; never defaults
    pub fn address_of(&self, key: &str) -> Result<Address> {
        if key.is_empty() {
            return Err(DeployError::KeyRequired);
        }
        self.store.get_address(&entry::field_path(key, "address"))
    }

    pub fn has(&self, key: &str) -> bool {
        !key.is_empty() && self.store.has(&entry::field_path(key, "address"))
    }

    pub fn entry(&self, key: &str) -> Result<Entry> {
        Entry::read(self.store, key)
    }

    /// Every resolved entry, in registration order
    pub fn entries(&self) -> Result<Vec<Entry>> {
        resolved_keys(self.store)
            .iter()
            .map(|key| Entry::read(self.store, key))
            .collect()
    }

    /// Salt and salt string for a key
    pub fn salt_for(&self, key: &str) -> (Hash32, String) {
        derive_salt(&self.context.salt_prefix, key)
    }

    /// Address a deterministic entry for `key` lands at
    pub fn predict_address(&self, key: &str) -> Address {
        self.factory.predict_address(&self.salt_for(key).0)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Reference a unit that already exists
    pub fn register_existing(&mut self, key: &str, address: Address) -> Result<Address> {
        if let Some(existing) = self.resolve(key, Some(address))? {
            return Ok(existing);
        }
        self.atomically(|r| {
            Entry::new(key, EntryKind::Existing, address).write(r.store)?;
            info!(key, %address, "registered existing unit");
            Ok(address)
        })
    }

    /// Create a component or library directly
    pub fn register_direct(&mut self, key: &str, artifact: &Artifact, kind: DirectKind) -> Result<Address> {
        self.resolve(key, None)?;
        let kind = match kind {
            DirectKind::Component => EntryKind::Component,
            DirectKind::Library => EntryKind::Library,
        };
        self.create_direct(key, artifact, kind)
    }

    /// Create the logic unit a proxy will point at
    pub fn register_implementation(&mut self, key: &str, artifact: &Artifact) -> Result<Address> {
        self.resolve(key, None)?;
        let kind = EntryKind::Implementation {
            ownership: artifact.ownership,
        };
        self.create_direct(key, artifact, kind)
    }

    /// Place a component through commit-reveal, forwarding `value`
    pub fn register_deterministic(&mut self, key: &str, artifact: &Artifact, value: u128) -> Result<Address> {
        let (salt, salt_string) = self.salt_for(key);
        let predicted = self.factory.predict_address(&salt);
        if let Some(existing) = self.resolve(key, Some(predicted))? {
            return Ok(existing);
        }

        self.atomically(|r| {
            let address = r.place(key, artifact, &salt, value)?;
            let mut entry = Entry::new(key, EntryKind::Deterministic, address)
                .with_contract_type(&artifact.contract_type)
                .created(r.ledger.block_number(), r.ledger.timestamp(), r.context.deployer)
                .with_placement(Placement {
                    factory: r.factory.address(),
                    salt,
                    salt_string,
                    value,
                });
            if value > 0 {
                if let Some(owner) = r.ledger.owner_of(&address) {
                    entry = entry.with_owner(owner);
                }
            }
            entry.write(r.store)?;
            info!(key, %address, value, "registered deterministic unit");
            Ok(address)
        })
    }

    /// Place a bootstrap proxy for `key`, upgrade it to `implementation`
    /// with the one-time initializer and fund it with `value`.
    ///
    /// An ownable proxy must end up owned by the deployer (queued for
    /// finalization) or by the final owner; any other owner fails the
    /// registration with [`DeployError::DeploymentFailed`].
    pub fn register_proxy(
        &mut self,
        key: &str,
        implementation: Address,
        init: &InitCall,
        value: u128,
    ) -> Result<Address> {
        let (salt, salt_string) = self.salt_for(key);
        let predicted = self.factory.predict_address(&salt);
        if let Some(existing) = self.resolve(key, Some(predicted))? {
            return Ok(existing);
        }
        let implementation_artifact = self
            .ledger
            .code_at(&implementation)
            .cloned()
            .ok_or_else(|| DeployError::DeploymentFailed {
                key: key.to_string(),
                reason: format!("no implementation at {}", implementation),
            })?;

        self.atomically(|r| {
            let deployer = r.context.deployer;
            let bootstrap = Artifact::bootstrap_proxy(deployer);
            let proxy = r.place(key, &bootstrap, &salt, 0)?;

            r.ledger
                .upgrade_to_and_call(Caller::new(deployer).with_value(value), &proxy, &implementation, Some(init))
                .map_err(deployment_failed(key))?;

            let actual = r.ledger.balance_of(&proxy);
            if actual != value {
                return Err(DeployError::ValueMismatch {
                    expected: value,
                    actual,
                });
            }

            r.record_proxy(
                key,
                proxy,
                implementation,
                &implementation_artifact,
                Placement {
                    factory: r.factory.address(),
                    salt,
                    salt_string,
                    value,
                },
            )?;
            info!(key, %proxy, %implementation, value, "registered proxy");
            Ok(proxy)
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Check that `key` is free.
    ///
    /// Returns the existing address when `key` already resolves to `identity`.
    fn resolve(&self, key: &str, identity: Option<Address>) -> Result<Option<Address>> {
        if key.is_empty() {
            return Err(DeployError::KeyRequired);
        }
        let path = entry::field_path(key, "address");
        if !self.store.has(&path) {
            return Ok(None);
        }
        let existing = self.store.get_address(&path)?;
        if identity == Some(existing) {
            warn!(key, %existing, "already registered, skipping");
            return Ok(Some(existing));
        }
        Err(DeployError::KeyAlreadyUsed {
            key: key.to_string(),
            existing,
        })
    }

    fn create_direct(&mut self, key: &str, artifact: &Artifact, kind: EntryKind) -> Result<Address> {
        self.atomically(|r| {
            let deployer = r.context.deployer;
            let address = r
                .ledger
                .create(Caller::new(deployer), artifact)
                .map_err(deployment_failed(key))?;
            Entry::new(key, kind, address)
                .with_contract_type(&artifact.contract_type)
                .created(r.ledger.block_number(), r.ledger.timestamp(), deployer)
                .write(r.store)?;
            info!(key, %address, contract_type = %artifact.contract_type, "registered unit");
            Ok(address)
        })
    }

    /// Commit then reveal `artifact` at the address for `salt`
    fn place(&mut self, key: &str, artifact: &Artifact, salt: &Hash32, value: u128) -> Result<Address> {
        let operator = self.context.deployer;
        let hash = commitment_hash(&operator, value, salt, artifact);
        self.factory.commit(&*self.ledger, &operator, hash)?;
        self.factory
            .reveal(&mut *self.ledger, Caller::new(operator).with_value(value), artifact, salt, value)
            .map_err(deployment_failed(key))
    }

    /// Write a proxy entry and its nested implementation entry
    pub(crate) fn record_proxy(
        &mut self,
        key: &str,
        proxy: Address,
        implementation: Address,
        implementation_artifact: &Artifact,
        placement: Placement,
    ) -> Result<()> {
        let implementation_key = entry::implementation_key(key);
        Entry::new(
            key,
            EntryKind::Proxy {
                implementation_key: implementation_key.clone(),
            },
            proxy,
        )
        .with_contract_type(&implementation_artifact.contract_type)
        .created(self.ledger.block_number(), self.ledger.timestamp(), self.context.deployer)
        .with_placement(placement)
        .write(self.store)?;

        Entry::new(
            &implementation_key,
            EntryKind::Implementation {
                ownership: implementation_artifact.ownership,
            },
            implementation,
        )
        .with_contract_type(&implementation_artifact.contract_type)
        .write(self.store)?;

        if self.ledger.ownership_model(&proxy) == OwnershipModel::None {
            return Ok(());
        }
        match self.ledger.owner_of(&proxy) {
            Some(owner) if owner == self.context.deployer => {
                self.ownership.enqueue(proxy, key);
            }
            // Already handed off, nothing to finalize
            Some(owner) if owner == self.context.owner => {}
            other => {
                let owner = other.map_or_else(|| "nobody".to_string(), |o| o.to_string());
                return Err(DeployError::DeploymentFailed {
                    key: key.to_string(),
                    reason: format!(
                        "proxy {} is owned by {}, neither the deployer nor the final owner",
                        proxy, owner
                    ),
                });
            }
        }
        Ok(())
    }

    /// Run `op`, restoring every component if it fails
    pub(crate) fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let ledger = self.ledger.snapshot();
        let factory = self.factory.clone();
        let store = self.store.clone();
        let ownership = self.ownership.clone();
        match op(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!(error = %e, "rolling back");
                self.ledger.revert_to(ledger);
                *self.factory = factory;
                *self.store = store;
                *self.ownership = ownership;
                Err(e)
            }
        }
    }
}

/// Keys of resolved entries in first-write order
pub(crate) fn resolved_keys(store: &DataStore) -> Vec<String> {
    let prefix = format!("{}.", entry::ENTRIES_ROOT);
    store
        .keys()
        .iter()
        .filter_map(|path| path.strip_prefix(&prefix)?.strip_suffix(".address"))
        .map(str::to_string)
        .collect()
}

/// Wrap ledger reverts as a failed deployment of `key`
pub(crate) fn deployment_failed(key: &str) -> impl Fn(DeployError) -> DeployError + '_ {
    move |e| match e {
        DeployError::Reverted(reason) => DeployError::DeploymentFailed {
            key: key.to_string(),
            reason,
        },
        other => other,
    }
}
