//! # Address Computation
//!
//! Hashes canonical bytes into fixed-length addresses and formats the
//! structured `stat7://` URI that exposes routing dimensions.
//!
//! Guarantee: two logically equal entities, regardless of field order or
//! platform, produce byte-identical canonical output and therefore identical
//! addresses. The fixed root entity in [`crate::root`] is the conformance
//! fixture for this guarantee.

use crate::canonical::{canonical_bytes, canonical_f64};
use crate::types::{AdjacencyLink, CoordinateVector, IdentityCore, Manifestation, Stat7Error};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// URI scheme for manifestation addresses.
pub const URI_SCHEME: &str = "stat7";

/// Length of a hex-encoded address.
pub const ADDRESS_LEN: usize = 64;

/// Characters that carry structure inside a `stat7://` URI.
const URI_RESERVED: [char; 6] = ['/', '?', '&', '#', '%', '='];

/// Reject values that would make a formatted URI segment ambiguous.
///
/// Realm and horizon values are interpolated into the URI path verbatim, so
/// they may not be empty or contain reserved, whitespace or control
/// characters. Enforced at genesis and at vocabulary registration, never at
/// format time.
///
/// # Errors
///
/// Returns `Stat7Error::InvalidValue` naming the offending character.
pub fn validate_uri_segment(context: &str, value: &str) -> Result<(), Stat7Error> {
    if value.is_empty() {
        return Err(Stat7Error::InvalidValue {
            context: context.to_string(),
            reason: "empty URI segment".to_string(),
        });
    }
    if let Some(c) = value
        .chars()
        .find(|c| URI_RESERVED.contains(c) || c.is_whitespace() || c.is_control())
    {
        return Err(Stat7Error::InvalidValue {
            context: context.to_string(),
            reason: format!("reserved character `{}` in `{value}`", c.escape_default()),
        });
    }
    Ok(())
}

/// SHA-256 over raw bytes, lowercase hex.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash a value tree's canonical bytes.
///
/// # Errors
///
/// Propagates `InvalidValue` from canonical serialization.
pub fn compute_address(value: &Value) -> Result<String, Stat7Error> {
    Ok(hash_bytes(&canonical_bytes(value)?))
}

/// Address of an identity core.
///
/// The core's own `canonical_hash` field is excluded from the hashed bytes;
/// see [`IdentityCore::to_value`].
pub fn identity_address(core: &IdentityCore) -> Result<String, Stat7Error> {
    compute_address(&core.to_value())
}

/// Current address of a manifestation's state.
///
/// Covers coordinates, links and free-form state; the event log and chain
/// hash are audit data, not state.
pub fn manifestation_address(manifestation: &Manifestation) -> Result<String, Stat7Error> {
    compute_address(&manifestation.state_value())
}

/// Hash of the canonicalized, sorted adjacency array.
///
/// Lets two manifestations be compared for "same neighbor set" without
/// comparing full arrays.
pub fn adjacency_hash(adjacency: &[AdjacencyLink]) -> Result<String, Stat7Error> {
    let mut members: Vec<&AdjacencyLink> = adjacency.iter().collect();
    members.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    let value = Value::Array(members.iter().map(|link| link.to_value()).collect());
    compute_address(&value)
}

/// Format the structured URI for a coordinate vector:
/// `stat7://{realm}/{lineage}/{adjacency_hash}/{horizon}?r=..&v=..&d=..`
///
/// Numeric dimensions use canonical float form, so the URI is itself
/// deterministic.
pub fn manifestation_uri(coords: &CoordinateVector) -> Result<String, Stat7Error> {
    let adjacency = adjacency_hash(&coords.adjacency)?;
    Ok(format!(
        "{scheme}://{realm}/{lineage}/{adjacency}/{horizon}?r={r}&v={v}&d={d}",
        scheme = URI_SCHEME,
        realm = coords.realm,
        lineage = coords.lineage,
        adjacency = adjacency,
        horizon = coords.horizon,
        r = canonical_f64(coords.resonance)?,
        v = canonical_f64(coords.velocity)?,
        d = canonical_f64(coords.density)?,
    ))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::EntityId;
    use serde_json::json;

    fn coords(adjacency: Vec<AdjacencyLink>) -> CoordinateVector {
        CoordinateVector {
            realm: "trade".to_string(),
            lineage: 2,
            adjacency,
            horizon: "stable".to_string(),
            resonance: 0.75,
            velocity: 0.25,
            density: 0.5,
        }
    }

    #[test]
    fn address_is_fixed_length_hex() {
        let addr = compute_address(&json!({"a": 1})).unwrap();
        assert_eq!(addr.len(), ADDRESS_LEN);
        assert!(addr.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn field_order_does_not_change_address() {
        let a = compute_address(&json!({"x": 1, "y": [true, null]})).unwrap();
        let b = compute_address(&json!({"y": [true, null], "x": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn adjacency_hash_ignores_stored_order() {
        let forward = vec![
            AdjacencyLink::new(EntityId::new("alpha")),
            AdjacencyLink::new(EntityId::new("beta")),
        ];
        let reversed = vec![
            AdjacencyLink::new(EntityId::new("beta")),
            AdjacencyLink::new(EntityId::new("alpha")),
        ];
        assert_eq!(
            adjacency_hash(&forward).unwrap(),
            adjacency_hash(&reversed).unwrap()
        );
    }

    #[test]
    fn adjacency_hash_sees_deprecation() {
        let live = vec![AdjacencyLink::new(EntityId::new("alpha"))];
        let deprecated = vec![AdjacencyLink {
            id: EntityId::new("alpha"),
            deprecated: true,
        }];
        assert_ne!(
            adjacency_hash(&live).unwrap(),
            adjacency_hash(&deprecated).unwrap()
        );
    }

    #[test]
    fn uri_segments_reject_reserved_characters() {
        for bad in ["tra/de", "tra?de", "a&b", "a#b", "a=b", "a b", "", "a\nb"] {
            assert!(validate_uri_segment("realm", bad).is_err(), "accepted {bad:?}");
        }
        assert!(validate_uri_segment("realm", "trade").is_ok());
        assert!(validate_uri_segment("horizon", "stable").is_ok());
    }

    #[test]
    fn uri_shape() {
        let uri = manifestation_uri(&coords(vec![])).unwrap();
        assert!(uri.starts_with("stat7://trade/2/"));
        assert!(uri.ends_with("/stable?r=0.75&v=0.25&d=0.5"));
    }

    #[test]
    fn uri_same_neighbor_set_same_segment() {
        let a = manifestation_uri(&coords(vec![
            AdjacencyLink::new(EntityId::new("n1")),
            AdjacencyLink::new(EntityId::new("n2")),
        ]))
        .unwrap();
        let b = manifestation_uri(&coords(vec![
            AdjacencyLink::new(EntityId::new("n2")),
            AdjacencyLink::new(EntityId::new("n1")),
        ]))
        .unwrap();
        assert_eq!(a, b);
    }
}
