//! # Root Entity
//!
//! The fixed progenitor entity every arena is seeded from. Its field values
//! are constants, so its canonical bytes, addresses and genesis chain head
//! are identical across machines and across independent implementations.
//! That makes it the built-in conformance fixture: if [`install_root`]
//! succeeds, canonical serialization and address computation agree with the
//! reference values below.

use crate::store::EntityStore;
use crate::types::{CoordinateVector, EntityId, EntityType, Stat7Error, Timestamp};
use serde_json::{Value, json};

/// Id of the root entity.
pub const ROOT_ID: &str = "stat7:luca";

/// Entity type of the root entity.
pub const ROOT_TYPE: &str = "root";

/// Realm branch of the root entity.
pub const ROOT_REALM: &str = "primordial";

/// Semantic hash of the root essence.
pub const ROOT_SEMANTIC_HASH: &str =
    "da4e48f1c540380565d4119fd36b35462bf1281b1ffde7ef93e226bd23c22d6f";

/// Identity-core address of the root entity.
pub const ROOT_ADDRESS: &str =
    "d45206877db6f4c8e87280b0b45af33f77d602d02534531e787fc72774319f96";

/// Address of the root's initial manifestation state.
pub const ROOT_STATE_HASH: &str =
    "18da9452bb16fc781d7b39b60141581762254205cb2ddecabc8a1a7f47078158";

/// Chain head after the root's genesis event.
pub const ROOT_CHAIN_HASH: &str =
    "d5a1903192120dfa5500ed3ea825a8a42224c858b18c408a2c85f587f071f292";

/// Structured URI of the root's initial manifestation.
pub const ROOT_URI: &str = "stat7://primordial/0/4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945/stable?r=0.5&v=0.0&d=0.0";

/// The root essence hashed into [`ROOT_SEMANTIC_HASH`].
#[must_use]
pub fn root_essence() -> Value {
    json!({
        "designation": "last universal common ancestor",
        "origin": "genesis",
    })
}

/// The root's initial coordinates: lineage zero, no neighbors, neutral
/// resonance, at rest.
#[must_use]
pub fn root_coordinates() -> CoordinateVector {
    CoordinateVector {
        realm: ROOT_REALM.to_string(),
        lineage: 0,
        adjacency: Vec::new(),
        horizon: "stable".to_string(),
        resonance: 0.5,
        velocity: 0.0,
        density: 0.0,
    }
}

/// Install the root entity into an arena and verify the derived address
/// against the reference value.
///
/// # Errors
///
/// Propagates genesis errors, and returns `InvalidValue` if the derived
/// address disagrees with [`ROOT_ADDRESS`], which indicates a broken
/// canonical serializer or hash pipeline rather than bad input.
pub fn install_root(store: &mut EntityStore) -> Result<String, Stat7Error> {
    let address = store.genesis(
        EntityId::new(ROOT_ID),
        EntityType::new(ROOT_TYPE),
        &root_essence(),
        root_coordinates(),
        json!({}),
        Vec::new(),
        Timestamp::epoch(),
    )?;
    if address != ROOT_ADDRESS {
        return Err(Stat7Error::InvalidValue {
            context: "root".to_string(),
            reason: format!("derived address {address} does not match {ROOT_ADDRESS}"),
        });
    }
    Ok(address)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::address::compute_address;
    use crate::chain::GENESIS_PRIOR_HASH;

    #[test]
    fn semantic_hash_matches_reference() {
        assert_eq!(
            compute_address(&root_essence()).unwrap(),
            ROOT_SEMANTIC_HASH
        );
    }

    #[test]
    fn install_verifies_identity_address() {
        let mut store = EntityStore::new();
        let address = install_root(&mut store).expect("install");
        assert_eq!(address, ROOT_ADDRESS);
    }

    #[test]
    fn genesis_manifestation_matches_reference() {
        let mut store = EntityStore::new();
        install_root(&mut store).expect("install");

        let root = store.lookup(&EntityId::new(ROOT_ID)).expect("root");
        let m = root.current_manifestation().expect("manifestation");
        assert_eq!(m.address, ROOT_STATE_HASH);
        assert_eq!(m.chain_hash, ROOT_CHAIN_HASH);
        assert_eq!(m.events.len(), 1);
        assert_eq!(m.events[0].prior_hash, GENESIS_PRIOR_HASH);
        assert_eq!(m.events[0].new_hash, ROOT_STATE_HASH);
    }

    #[test]
    fn root_uri_matches_reference() {
        let mut store = EntityStore::new();
        install_root(&mut store).expect("install");
        assert_eq!(store.uri(&EntityId::new(ROOT_ID)).expect("uri"), ROOT_URI);
    }

    #[test]
    fn install_twice_rejected() {
        let mut store = EntityStore::new();
        install_root(&mut store).expect("install");
        let err = install_root(&mut store).unwrap_err();
        assert!(matches!(err, Stat7Error::DuplicateEntity(_)));
    }

    #[test]
    fn replay_of_fresh_root_is_valid() {
        let mut store = EntityStore::new();
        install_root(&mut store).expect("install");
        let report = store.replay_validate(&EntityId::new(ROOT_ID)).expect("replay");
        assert!(report.is_valid());
    }
}
