//! Deployment Session Manager
//!
//! A session owns the store, the ledger handle, the placement protocol and
//! the ownership queue for one (network, system salt) pair, and appends one
//! [`RunRecord`] per start or resume.
//!
//! ```text
//! NotStarted --start--> Active --finish--> Finished
//!                         ^                    |
//!                         +---start / resume---+
//! ```
//!
//! Resuming is always allowed, including from a run that never finished.
//!
//! A mutation that succeeded stays in effect even when the autosave after it
//! fails; the failure is logged and the next save or [`DeploymentSession::persist`]
//! writes it out.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::config::DeployConfig;
use crate::entry::{self, Entry};
use crate::error::{DeployError, Result};
use crate::ledger::{Artifact, InitCall, Ledger};
use crate::ownership::OwnershipQueue;
use crate::placement::PlacementProtocol;
use crate::registrar::{DirectKind, Registrar, RegistrarContext};
use crate::registry::KeyRegistry;
use crate::store::{DataStore, DeploymentDocument, JsonFileBackend, MemoryBackend, PendingOwnership, RunRecord, StoreBackend};
use crate::value::StoreValue;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Active,
    Finished,
}

/// Identities and persistence policy of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub deployer: Address,
    /// Final owner every queued unit is handed to
    pub owner: Address,
    /// Persist after every mutating call
    pub autosave: bool,
}

impl SessionOptions {
    pub fn new(deployer: Address, owner: Address) -> Self {
        Self {
            deployer,
            owner,
            autosave: true,
        }
    }

    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }
}

/// A resumable deployment session
#[derive(Debug)]
pub struct DeploymentSession<L: Ledger> {
    registry: Arc<KeyRegistry>,
    store: DataStore,
    ledger: L,
    factory: PlacementProtocol,
    ownership: OwnershipQueue,
    backend: Box<dyn StoreBackend>,
    options: SessionOptions,
    context: RegistrarContext,
    state: SessionState,
    network: Option<String>,
    runs: Vec<RunRecord>,
}

impl<L: Ledger> DeploymentSession<L> {
    /// Create a session that keeps its document in memory
    pub fn new(registry: Arc<KeyRegistry>, ledger: L, factory: PlacementProtocol, options: SessionOptions) -> Self {
        let context = RegistrarContext {
            deployer: options.deployer,
            owner: options.owner,
            salt_prefix: String::new(),
        };
        Self {
            store: DataStore::new(registry.clone()),
            registry,
            ledger,
            factory,
            ownership: OwnershipQueue::new(),
            backend: Box::new(MemoryBackend::new()),
            options,
            context,
            state: SessionState::NotStarted,
            network: None,
            runs: Vec::new(),
        }
    }

    /// Create a session with the backend and autosave policy from `config`
    pub fn from_config(
        registry: Arc<KeyRegistry>,
        ledger: L,
        factory: PlacementProtocol,
        deployer: Address,
        owner: Address,
        config: &DeployConfig,
    ) -> Self {
        let options = SessionOptions::new(deployer, owner).with_autosave(config.session.autosave);
        Self::new(registry, ledger, factory, options).with_backend(config.backend())
    }

    pub fn with_backend(mut self, backend: Box<dyn StoreBackend>) -> Self {
        self.backend = backend;
        self
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a run.
    ///
    /// With `resume_from`, the document there is loaded and the new run is
    /// appended to its history; otherwise the session starts empty at run 0.
    pub fn start(&mut self, network: &str, system_salt: &str, resume_from: Option<&Path>) -> Result<()> {
        if self.state == SessionState::Active {
            return Err(DeployError::SessionAlreadyActive {
                network: self.network.clone().unwrap_or_default(),
                salt: self.context.salt_prefix.clone(),
            });
        }

        match resume_from {
            Some(path) => {
                let document = load_document(path)?;
                if document.network != network || document.system_salt_string != system_salt {
                    return Err(DeployError::InvalidDocument(format!(
                        "{} records {}/{}, not {}/{}",
                        path.display(),
                        document.network,
                        document.system_salt_string,
                        network,
                        system_salt
                    )));
                }
                self.restore(document)?;
            }
            None => {
                self.store = DataStore::new(self.registry.clone());
                self.ownership = OwnershipQueue::new();
                self.runs.clear();
            }
        }

        self.network = Some(network.to_string());
        self.context.salt_prefix = system_salt.to_string();
        self.runs.push(RunRecord {
            sequence: self.runs.len() as u32,
            deployer: self.options.deployer,
            start_timestamp: self.ledger.timestamp(),
            start_block: self.ledger.block_number(),
            finish_timestamp: None,
            finish_block: None,
            started_at: Utc::now(),
            registered: Vec::new(),
        });
        self.state = SessionState::Active;
        info!(
            network,
            system_salt,
            run = self.runs.len() - 1,
            resumed = resume_from.is_some(),
            "session started"
        );
        self.autosave()
    }

    /// Continue the deployment recorded at `path`
    pub fn resume(&mut self, path: &Path) -> Result<()> {
        let document = load_document(path)?;
        self.start(&document.network, &document.system_salt_string, Some(path))
    }

    /// Finalize ownership, close the run and persist.
    ///
    /// Returns the number of ownership transfers; a second call returns 0.
    pub fn finish(&mut self) -> Result<usize> {
        match self.state {
            SessionState::Finished => return Ok(0),
            SessionState::NotStarted => return Err(DeployError::SessionNotActive),
            SessionState::Active => {}
        }

        let transferred = self.registrar().transfer_all_ownerships()?;
        let (timestamp, block) = (self.ledger.timestamp(), self.ledger.block_number());
        if let Some(run) = self.runs.last_mut() {
            run.finish_timestamp = Some(timestamp);
            run.finish_block = Some(block);
        }
        self.state = SessionState::Finished;
        self.persist()?;
        info!(transferred, block, "session finished");
        Ok(transferred)
    }

    fn restore(&mut self, document: DeploymentDocument) -> Result<()> {
        self.store = DataStore::from_tree(self.registry.clone(), &document.data)?;
        self.ownership = OwnershipQueue::from_pending(document.pending_ownership);
        self.runs = document.runs;
        debug!(keys = self.store.len(), runs = self.runs.len(), "document restored");
        Ok(())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register_existing(&mut self, key: &str, address: Address) -> Result<Address> {
        self.registering(key, |r| r.register_existing(key, address))
    }

    pub fn register_direct(&mut self, key: &str, artifact: &Artifact, kind: DirectKind) -> Result<Address> {
        self.registering(key, |r| r.register_direct(key, artifact, kind))
    }

    pub fn register_implementation(&mut self, key: &str, artifact: &Artifact) -> Result<Address> {
        self.registering(key, |r| r.register_implementation(key, artifact))
    }

    pub fn register_deterministic(&mut self, key: &str, artifact: &Artifact, value: u128) -> Result<Address> {
        self.registering(key, |r| r.register_deterministic(key, artifact, value))
    }

    pub fn register_proxy(&mut self, key: &str, implementation: Address, init: &InitCall, value: u128) -> Result<Address> {
        self.registering(key, |r| r.register_proxy(key, implementation, init, value))
    }

    pub fn deploy_proxy_idempotent(&mut self, id: &str, implementation: Address, init: &InitCall) -> Result<Address> {
        self.registering(id, |r| r.deploy_proxy_idempotent(id, implementation, init))
    }

    pub fn register_for_ownership_transfer(&mut self, address: Address, label: &str) -> Result<bool> {
        self.require_active()?;
        let queued = self.registrar().register_for_ownership_transfer(address, label);
        if queued {
            self.autosave_after(label);
        }
        Ok(queued)
    }

    /// Write a registered parameter.
    ///
    /// Entry fields are out of reach: they are written only by registration.
    pub fn set<T: StoreValue>(&mut self, path: &str, value: T) -> Result<()> {
        self.require_active()?;
        let under_entries = path
            .strip_prefix(entry::ENTRIES_ROOT)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'));
        if under_entries {
            return Err(DeployError::violation(path, "entries are written only by registration"));
        }
        self.store.set(path, value)?;
        self.autosave_after(path);
        Ok(())
    }

    fn registering(
        &mut self,
        key: &str,
        op: impl FnOnce(&mut Registrar<'_, L>) -> Result<Address>,
    ) -> Result<Address> {
        self.require_active()?;
        let known = self.has(key);
        let address = op(&mut self.registrar())?;
        if !known {
            if let Some(run) = self.runs.last_mut() {
                run.registered.push(key.to_string());
            }
            self.autosave_after(key);
        }
        Ok(address)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn has(&self, key: &str) -> bool {
        !key.is_empty() && self.store.has(&entry::field_path(key, "address"))
    }

    pub fn address_of(&self, key: &str) -> Result<Address> {
        if key.is_empty() {
            return Err(DeployError::KeyRequired);
        }
        self.store.get_address(&entry::field_path(key, "address"))
    }

    pub fn entry(&self, key: &str) -> Result<Entry> {
        Entry::read(&self.store, key)
    }

    pub fn entries(&self) -> Result<Vec<Entry>> {
        crate::registrar::resolved_keys(&self.store)
            .iter()
            .map(|key| Entry::read(&self.store, key))
            .collect()
    }

    pub fn get<T: StoreValue>(&self, path: &str) -> Result<T> {
        self.store.get(path)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn pending_ownership(&self) -> &[PendingOwnership] {
        self.ownership.entries()
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn factory(&self) -> &PlacementProtocol {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut PlacementProtocol {
        &mut self.factory
    }

    /// Give back the ledger and placement protocol
    pub fn into_parts(self) -> (L, PlacementProtocol) {
        (self.ledger, self.factory)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Snapshot of the current record
    pub fn document(&self) -> DeploymentDocument {
        let mut document = DeploymentDocument::new(
            self.network.clone().unwrap_or_default(),
            self.context.salt_prefix.clone(),
        );
        document.runs = self.runs.clone();
        document.pending_ownership = self.ownership.to_vec();
        document.data = self.store.to_tree();
        document
    }

    /// Save through the backend
    pub fn persist(&mut self) -> Result<()> {
        let document = self.document();
        self.backend.save(&document)
    }

    fn autosave(&mut self) -> Result<()> {
        if self.options.autosave && self.backend.kind().is_persistent() {
            self.persist()?;
        }
        Ok(())
    }

    /// Autosave after a mutation that already took effect
    fn autosave_after(&mut self, what: &str) {
        if let Err(e) = self.autosave() {
            warn!(what, error = %e, "autosave failed, change kept in memory");
        }
    }

    fn require_active(&self) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(DeployError::SessionNotActive);
        }
        Ok(())
    }

    fn registrar(&mut self) -> Registrar<'_, L> {
        Registrar::new(
            &mut self.store,
            &mut self.ledger,
            &mut self.factory,
            &mut self.ownership,
            &self.context,
        )
    }
}

fn load_document(path: &Path) -> Result<DeploymentDocument> {
    JsonFileBackend::read(path)?.ok_or_else(|| DeployError::ResumeTargetNotFound(path.display().to_string()))
}
