//! Property tests for key paths, store serialization and placement.

use deploy_ledger::schema::validate_path;
use deploy_ledger::{
    commitment_hash, Address, Artifact, Caller, DataStore, DataType, DeployError, Hash32,
    KeyRegistry, Ledger, MemoryLedger, PlacementProtocol,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// A lexically valid path segment that is not a reserved root.
fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z][A-Za-z0-9_-]{0,8}".prop_filter("reserved root", |s| {
        !["network", "runs", "updatedAt", "schemaVersion", "systemSaltString", "pendingOwnership"]
            .contains(&s.as_str())
    })
}

fn arb_path() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..5).prop_map(|segments| segments.join("."))
}

fn numbers_registry() -> std::sync::Arc<KeyRegistry> {
    let mut registry = KeyRegistry::new();
    registry.register_container("values").unwrap();
    registry.register_key("values.uint", DataType::Uint).unwrap();
    registry.register_key("values.int", DataType::Int).unwrap();
    registry.register_key("values.text", DataType::String).unwrap();
    registry.register_key("values.flags", DataType::BoolArray).unwrap();
    registry.register_key("values.amounts", DataType::UintArray).unwrap();
    registry.into_shared()
}

fn mixed_registry() -> std::sync::Arc<KeyRegistry> {
    let mut registry = KeyRegistry::new();
    registry.register_container("mixed").unwrap();
    registry.register_key("mixed.admin", DataType::Address).unwrap();
    registry.register_key("mixed.enabled", DataType::Bool).unwrap();
    registry.register_key("mixed.deltas", DataType::IntArray).unwrap();
    registry.register_key("mixed.names", DataType::StringArray).unwrap();
    registry.register_key("mixed.guardians", DataType::AddressArray).unwrap();
    registry.into_shared()
}

fn arb_address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::new)
}

fn through_json(store: &DataStore) -> DataStore {
    let text = serde_json::to_string(&store.to_tree()).unwrap();
    let tree = serde_json::from_str(&text).unwrap();
    DataStore::from_tree(store.registry().clone(), &tree).unwrap()
}

// ---------------------------------------------------------------------------
// Fixed cases
// ---------------------------------------------------------------------------

#[test]
fn test_quotes_and_backslashes_survive_json() {
    let mut store = DataStore::new(numbers_registry());
    let text = r#"say "hi" \ C:\path\ "\""#;
    store.set_string("values.text", text).unwrap();
    assert_eq!(through_json(&store).get_string("values.text").unwrap(), text);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn valid_paths_are_accepted(path in arb_path()) {
        prop_assert!(validate_path(&path).is_ok());
    }

    #[test]
    fn doubled_separators_are_rejected(left in arb_path(), right in arb_path()) {
        let path = format!("{}..{}", left, right);
        let rejected = matches!(validate_path(&path), Err(DeployError::SchemaViolation { .. }));
        prop_assert!(rejected);
    }

    #[test]
    fn leaves_need_a_container(segment in arb_segment()) {
        let mut registry = KeyRegistry::new();
        let rejected = matches!(
            registry.register_key(&segment, DataType::Uint),
            Err(DeployError::SchemaViolation { .. })
        );
        prop_assert!(rejected);
        prop_assert!(!registry.contains(&segment));
    }

    #[test]
    fn edge_separators_are_rejected(path in arb_path()) {
        let leading_dot = format!(".{}", path);
        let trailing_dot = format!("{}.", path);
        prop_assert!(validate_path(&leading_dot).is_err());
        prop_assert!(validate_path(&trailing_dot).is_err());
    }

    #[test]
    fn store_values_survive_json(
        uint in any::<u128>(),
        int in any::<i128>(),
        text in ".{0,24}",
        flags in prop::collection::vec(any::<bool>(), 0..6),
        amounts in prop::collection::vec(any::<u128>(), 0..6),
    ) {
        let mut store = DataStore::new(numbers_registry());
        store.set_uint("values.uint", uint).unwrap();
        store.set_int("values.int", int).unwrap();
        store.set_string("values.text", text.clone()).unwrap();
        store.set_bool_array("values.flags", flags.clone()).unwrap();
        store.set_uint_array("values.amounts", amounts.clone()).unwrap();

        let back = through_json(&store);

        prop_assert_eq!(back.get_uint("values.uint").unwrap(), uint);
        prop_assert_eq!(back.get_int("values.int").unwrap(), int);
        prop_assert_eq!(back.get_string("values.text").unwrap(), text);
        prop_assert_eq!(back.get_bool_array("values.flags").unwrap(), flags);
        prop_assert_eq!(back.get_uint_array("values.amounts").unwrap(), amounts);
    }

    #[test]
    fn remaining_types_survive_json(
        admin in arb_address(),
        enabled in any::<bool>(),
        deltas in prop::collection::vec(any::<i128>(), 0..6),
        names in prop::collection::vec(".{0,12}", 0..4),
        guardians in prop::collection::vec(arb_address(), 1..5),
    ) {
        let mut store = DataStore::new(mixed_registry());
        store.set_address("mixed.admin", admin).unwrap();
        store.set_bool("mixed.enabled", enabled).unwrap();
        store.set_int_array("mixed.deltas", deltas.clone()).unwrap();
        store.set_string_array("mixed.names", names.clone()).unwrap();
        store.set_address_array("mixed.guardians", guardians.clone()).unwrap();

        let back = through_json(&store);
        prop_assert_eq!(back.get_address("mixed.admin").unwrap(), admin);
        prop_assert_eq!(back.get_bool("mixed.enabled").unwrap(), enabled);
        prop_assert_eq!(back.get_int_array("mixed.deltas").unwrap(), deltas);
        prop_assert_eq!(back.get_string_array("mixed.names").unwrap(), names);
        prop_assert_eq!(back.get_address_array("mixed.guardians").unwrap(), guardians);
    }

    #[test]
    fn reveal_with_wrong_salt_deploys_nothing(key in arb_segment(), other in arb_segment()) {
        prop_assume!(key != other);
        let deployer = Address::from_label("deployer");
        let mut protocol = PlacementProtocol::new(Address::from_label("factory"), deployer);
        protocol.set_operator(&deployer, Some(deployer)).unwrap();
        let mut ledger = MemoryLedger::new();

        let salt = Hash32::of_str(&format!("bao/{}", key));
        let wrong = Hash32::of_str(&format!("bao/{}", other));
        let payload = Artifact::new(key.clone(), key.into_bytes());
        let hash = commitment_hash(&deployer, 0, &salt, &payload);
        protocol.commit(&ledger, &deployer, hash).unwrap();

        let block = ledger.block_number();
        let result = protocol.reveal(&mut ledger, Caller::new(deployer), &payload, &wrong, 0);
        let unknown = matches!(result, Err(DeployError::UnknownCommitment(_)));
        prop_assert!(unknown);
        prop_assert_eq!(ledger.block_number(), block);
        prop_assert!(!ledger.has_code(&protocol.predict_address(&wrong)));
        prop_assert!(!ledger.has_code(&protocol.predict_address(&salt)));
        prop_assert!(protocol.is_committed(&hash));
    }

    #[test]
    fn prediction_ignores_payload_and_history(key in arb_segment(), noise in 0usize..4) {
        let deployer = Address::from_label("deployer");
        let mut protocol = PlacementProtocol::new(Address::from_label("factory"), deployer);
        let salt = Hash32::of_str(&format!("bao/{}", key));
        let predicted = protocol.predict_address(&salt);

        let mut ledger = MemoryLedger::new();
        for i in 0..noise {
            ledger
                .create(Caller::new(deployer), &Artifact::new(format!("Noise{}", i), vec![]))
                .unwrap();
        }
        let placed = protocol
            .owner_deploy_unprotected(
                &mut ledger,
                Caller::new(deployer),
                &Artifact::new(key.clone(), key.into_bytes()),
                &salt,
                0,
            )
            .unwrap();
        prop_assert_eq!(placed, predicted);
    }

    #[test]
    fn commitment_changes_with_any_input(value in any::<u128>(), other in any::<u128>()) {
        prop_assume!(value != other);
        let operator = Address::from_label("operator");
        let salt = Hash32::of_str("bao/x");
        let payload = Artifact::new("X", vec![]);
        prop_assert_ne!(
            commitment_hash(&operator, value, &salt, &payload),
            commitment_hash(&operator, other, &salt, &payload)
        );
        prop_assert_ne!(
            commitment_hash(&operator, value, &salt, &payload),
            commitment_hash(&Address::from_label("other"), value, &salt, &payload)
        );
    }
}
