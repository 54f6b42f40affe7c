//! End-to-end deployment tests
//!
//! Sessions, registrars and the placement protocol exercised together
//! against the in-memory ledger and the JSON backend.

use std::sync::Arc;

use deploy_ledger::{
    commitment_hash, derive_salt, Address, Artifact, Caller, DataStore, DataType, DeployError,
    DeploymentSession, DirectKind, Hash32, InitCall, JsonFileBackend, KeyRegistry, Ledger,
    MemoryLedger, OwnershipModel, PlacementProtocol, SessionOptions,
};
use tempfile::tempdir;

fn deployer() -> Address {
    Address::from_label("deployer")
}

fn final_owner() -> Address {
    Address::from_label("multisig")
}

fn registry() -> Arc<KeyRegistry> {
    let mut registry = KeyRegistry::new();
    registry.register_entry("a").unwrap();
    registry.register_entry("minter").unwrap();
    registry.register_entry("vaultImpl").unwrap();
    registry.register_proxy_entry("vault").unwrap();
    registry.register_proxy_entry("pegged.usd").unwrap();
    registry.register_container("params").unwrap();
    registry.register_key("params.fee", DataType::Uint).unwrap();
    registry.register_key("params.guardians", DataType::AddressArray).unwrap();
    registry.into_shared()
}

fn factory() -> PlacementProtocol {
    let mut factory = PlacementProtocol::new(Address::from_label("factory"), deployer());
    factory.set_operator(&deployer(), Some(deployer())).unwrap();
    factory
}

fn funded_ledger() -> MemoryLedger {
    let mut ledger = MemoryLedger::new();
    ledger.fund(&deployer(), 1_000_000).unwrap();
    ledger
}

fn options() -> SessionOptions {
    SessionOptions::new(deployer(), final_owner())
}

fn vault_impl() -> Artifact {
    Artifact::new("Vault", b"vault-v1".to_vec()).with_ownership(OwnershipModel::TwoStep)
}

// =============================================================================
// Store round trip
// =============================================================================

#[test]
fn test_store_round_trip_through_json() {
    let mut registry = KeyRegistry::new();
    registry.register_container("contracts.token").unwrap();
    registry
        .register_key("contracts.token.symbol", DataType::String)
        .unwrap();
    let registry = registry.into_shared();

    let mut store = DataStore::new(registry.clone());
    store.set_string("contracts.token.symbol", "BAO").unwrap();

    let text = serde_json::to_string(&store.to_tree()).unwrap();
    let tree: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text).unwrap();
    let fresh = DataStore::from_tree(registry, &tree).unwrap();
    assert_eq!(fresh.get_string("contracts.token.symbol").unwrap(), "BAO");
}

#[test]
fn test_integer_extremes_survive() {
    let mut registry = KeyRegistry::new();
    registry.register_container("limits").unwrap();
    registry.register_key("limits.max", DataType::Uint).unwrap();
    registry.register_key("limits.min", DataType::Int).unwrap();
    let registry = registry.into_shared();

    let mut store = DataStore::new(registry.clone());
    store.set_uint("limits.max", u128::MAX).unwrap();
    store.set_int("limits.min", i128::MIN).unwrap();

    let text = serde_json::to_string(&store.to_tree()).unwrap();
    let tree = serde_json::from_str(&text).unwrap();
    let fresh = DataStore::from_tree(registry, &tree).unwrap();
    assert_eq!(fresh.get_uint("limits.max").unwrap(), u128::MAX);
    assert_eq!(fresh.get_int("limits.min").unwrap(), i128::MIN);
}

// =============================================================================
// Placement protocol
// =============================================================================

#[test]
fn test_commit_then_reveal_lands_at_prediction() {
    let operator = Address::from_label("operator");
    let mut protocol = PlacementProtocol::new(Address::from_label("factory"), deployer());
    protocol.set_operator(&deployer(), Some(operator)).unwrap();
    let mut ledger = MemoryLedger::new();

    let payload = Artifact::new("Minter", vec![1, 2]);
    let (salt, _) = derive_salt("bao", "minter");
    let hash = commitment_hash(&operator, 0, &salt, &payload);

    protocol.commit(&ledger, &operator, hash).unwrap();
    let address = protocol
        .reveal(&mut ledger, Caller::new(operator), &payload, &salt, 0)
        .unwrap();
    assert_eq!(address, protocol.predict_address(&salt));
    assert!(!protocol.is_committed(&hash));
}

#[test]
fn test_same_salt_same_address_across_ledgers() {
    let mut first = factory();
    let mut second = factory();
    let (salt, _) = derive_salt("bao", "minter");
    let payload = Artifact::new("Minter", vec![]);

    let mut ledger_a = MemoryLedger::new();
    let mut ledger_b = MemoryLedger::new();
    // Different histories before placement
    ledger_b
        .create(Caller::new(deployer()), &Artifact::new("Noise", vec![]))
        .unwrap();

    let a = first
        .owner_deploy_unprotected(&mut ledger_a, Caller::new(deployer()), &payload, &salt, 0)
        .unwrap();
    let b = second
        .owner_deploy_unprotected(&mut ledger_b, Caller::new(deployer()), &payload, &salt, 0)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_commitment_binds_value() {
    let mut protocol = factory();
    let mut ledger = funded_ledger();
    let payload = Artifact::new("Vault", vec![]).payable();
    let salt = Hash32::of_str("bao/vault");
    protocol
        .commit(&ledger, &deployer(), commitment_hash(&deployer(), 1, &salt, &payload))
        .unwrap();

    let result = protocol.reveal(&mut ledger, Caller::new(deployer()).with_value(2), &payload, &salt, 2);
    assert!(matches!(result, Err(DeployError::UnknownCommitment(_))));
}

// =============================================================================
// Sessions
// =============================================================================

#[test]
fn test_rejected_value_leaves_no_entry() {
    let mut session = DeploymentSession::new(registry(), funded_ledger(), factory(), options());
    session.start("local", "bao", None).unwrap();

    // Initializer of a non-payable implementation rejects value
    let implementation = session.register_implementation("vaultImpl", &vault_impl()).unwrap();
    let result = session.register_proxy("vault", implementation, &InitCall::new(deployer()), 5);
    assert!(matches!(result, Err(DeployError::DeploymentFailed { .. })));
    assert!(!session.has("vault"));
    assert!(session.pending_ownership().is_empty());
    assert_eq!(session.factory().pending_commitments(), 0);
}

#[test]
fn test_resume_in_fresh_process() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("local").join("bao.json");

    let mut first = DeploymentSession::new(registry(), funded_ledger(), factory(), options())
        .with_backend(Box::new(JsonFileBackend::new(&path)));
    first.start("local", "bao", None).unwrap();
    let original = first
        .register_direct("a", &Artifact::new("A", vec![1]), DirectKind::Component)
        .unwrap();
    first.finish().unwrap();
    let (ledger, factory) = first.into_parts();

    // Nothing but the document and the ledger carry over
    let mut second = DeploymentSession::new(registry(), ledger, factory, options())
        .with_backend(Box::new(JsonFileBackend::new(&path)));
    second.start("local", "bao", Some(&path)).unwrap();
    assert!(second.has("a"));
    assert_eq!(second.address_of("a").unwrap(), original);
    assert_eq!(second.runs().len(), 2);
    assert!(second.runs()[0].is_finished());
    assert_eq!(second.runs()[0].registered, vec!["a".to_string()]);
}

#[test]
fn test_full_deployment_and_finalization() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mainnet").join("bao.json");
    let mut session = DeploymentSession::new(registry(), funded_ledger(), factory(), options())
        .with_backend(Box::new(JsonFileBackend::new(&path)));
    session.start("mainnet", "bao", None).unwrap();

    session.set("params.fee", 30u128).unwrap();
    session
        .set("params.guardians", vec![Address::from_label("g1"), Address::from_label("g2")])
        .unwrap();
    let minter = session
        .register_deterministic("minter", &Artifact::new("Minter", vec![7]), 0)
        .unwrap();
    let implementation = session
        .register_implementation("vaultImpl", &vault_impl().payable())
        .unwrap();
    let vault = session
        .deploy_proxy_idempotent("vault", implementation, &InitCall::new(deployer()))
        .unwrap();
    let usd = session
        .register_proxy("pegged.usd", implementation, &InitCall::new(deployer()), 10)
        .unwrap();

    assert_ne!(minter, vault);
    assert_eq!(session.ledger().balance_of(&usd), 10);
    assert_eq!(session.pending_ownership().len(), 2);

    assert_eq!(session.finish().unwrap(), 2);
    assert_eq!(session.ledger().owner_of(&vault), Some(final_owner()));
    assert_eq!(session.ledger().owner_of(&usd), Some(final_owner()));
    assert_eq!(session.entry("vault").unwrap().owner, Some(final_owner()));

    let document = JsonFileBackend::read(&path).unwrap().unwrap();
    assert_eq!(document.schema_version, 1);
    assert!(document.pending_ownership.is_empty());
    assert_eq!(document.data["params"]["fee"], serde_json::json!("30"));
    assert_eq!(
        document.data["contracts"]["pegged"]["usd"]["category"],
        serde_json::json!("proxy")
    );
    assert_eq!(
        document.data["contracts"]["vault"]["implementation"]["address"],
        serde_json::json!(implementation.to_hex())
    );
    assert_eq!(
        document.data["contracts"]["vault"]["saltString"],
        serde_json::json!("bao/vault")
    );
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bao.json");

    let mut first = DeploymentSession::new(registry(), funded_ledger(), factory(), options())
        .with_backend(Box::new(JsonFileBackend::new(&path)));
    first.start("local", "bao", None).unwrap();
    let implementation = first.register_implementation("vaultImpl", &vault_impl()).unwrap();
    let vault = first
        .deploy_proxy_idempotent("vault", implementation, &InitCall::new(deployer()))
        .unwrap();
    first.finish().unwrap();
    let (ledger, factory) = first.into_parts();
    let block = ledger.block_number();

    let mut second = DeploymentSession::new(registry(), ledger, factory, options())
        .with_backend(Box::new(JsonFileBackend::new(&path)));
    second.resume(&path).unwrap();
    let again = second
        .deploy_proxy_idempotent("vault", implementation, &InitCall::new(deployer()))
        .unwrap();
    assert_eq!(again, vault);
    assert_eq!(second.ledger().block_number(), block);
    assert!(second.runs()[1].registered.is_empty());
    // Ownership already finalized: nothing to do
    assert_eq!(second.finish().unwrap(), 0);
}

#[test]
fn test_unfinished_run_keeps_pending_ownership() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bao.json");

    let mut first = DeploymentSession::new(registry(), funded_ledger(), factory(), options())
        .with_backend(Box::new(JsonFileBackend::new(&path)));
    first.start("local", "bao", None).unwrap();
    let implementation = first.register_implementation("vaultImpl", &vault_impl()).unwrap();
    let vault = first
        .register_proxy("vault", implementation, &InitCall::new(deployer()), 0)
        .unwrap();
    // Crash: no finish
    let (ledger, factory) = first.into_parts();

    let mut second = DeploymentSession::new(registry(), ledger, factory, options())
        .with_backend(Box::new(JsonFileBackend::new(&path)));
    second.resume(&path).unwrap();
    assert_eq!(second.pending_ownership().len(), 1);
    assert_eq!(second.finish().unwrap(), 1);
    assert_eq!(second.ledger().owner_of(&vault), Some(final_owner()));
}

#[test]
fn test_key_is_single_use() {
    let mut session = DeploymentSession::new(registry(), funded_ledger(), factory(), options());
    session.start("local", "bao", None).unwrap();
    session
        .register_direct("a", &Artifact::new("A", vec![]), DirectKind::Component)
        .unwrap();
    let result = session.register_existing("a", Address::from_label("elsewhere"));
    assert!(matches!(result, Err(DeployError::KeyAlreadyUsed { .. })));
    assert!(matches!(
        session.register_direct("", &Artifact::new("A", vec![]), DirectKind::Component),
        Err(DeployError::KeyRequired)
    ));
}

#[test]
fn test_undeclared_entry_is_rejected_without_side_effects() {
    let mut session = DeploymentSession::new(registry(), funded_ledger(), factory(), options());
    session.start("local", "bao", None).unwrap();
    let block = session.ledger().block_number();
    let result = session.register_direct("undeclared", &Artifact::new("A", vec![]), DirectKind::Component);
    assert!(matches!(result, Err(DeployError::UnknownKey(_))));
    assert_eq!(session.ledger().block_number(), block);
}
