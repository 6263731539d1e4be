//! # Core Type Definitions
//!
//! This module contains all core types for the STAT7 deterministic entity store:
//! - Identifiers (`EntityId`, `EntityType`)
//! - The seven-axis coordinate vector (`Axis`, `CoordinateVector`, `AdjacencyLink`)
//! - Entity structure (`IdentityCore`, `Manifestation`, `Entity`)
//! - Mutation events (`Event`, `MutationKind`)
//! - Millisecond-precision UTC timestamps (`Timestamp`)
//! - Error types (`Stat7Error`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Implement `Ord` where they participate in `BTreeMap`/`BTreeSet` ordering
//! - Canonicalize through [`crate::canonical`] before any hash or comparison
//! - Never carry NaN/Infinity; numeric axes are normalized on entry

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for an entity.
///
/// Assigned once at genesis and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    /// Create a new entity id from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entity-type tag, fixed at genesis.
///
/// Entity types select per-type policy overrides in the
/// [`crate::policy::PolicyEngine`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityType(pub String);

impl EntityType {
    /// Create a new entity type from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// AXES
// =============================================================================

/// The seven named coordinate axes.
///
/// Each axis is permanently assigned one mutability policy; see
/// [`Axis::global_policy`](crate::policy) for the assignment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Domain/category. Immutable post-creation.
    Realm,
    /// Generation distance from the root entity. Immutable post-creation.
    Lineage,
    /// Set of related entity ids. Append-only, monotonic.
    Adjacency,
    /// Lifecycle stage from a bounded per-branch vocabulary.
    Horizon,
    /// Normalized charge/alignment value.
    Resonance,
    /// Rate-of-change value.
    Velocity,
    /// Compression/distance value.
    Density,
}

impl Axis {
    /// All seven axes, in declaration order.
    pub const ALL: [Axis; 7] = [
        Axis::Realm,
        Axis::Lineage,
        Axis::Adjacency,
        Axis::Horizon,
        Axis::Resonance,
        Axis::Velocity,
        Axis::Density,
    ];

    /// Get the axis name as used in canonical serialization and URIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Axis::Realm => "realm",
            Axis::Lineage => "lineage",
            Axis::Adjacency => "adjacency",
            Axis::Horizon => "horizon",
            Axis::Resonance => "resonance",
            Axis::Velocity => "velocity",
            Axis::Density => "density",
        }
    }

    /// Whether the axis holds a normalized numeric value.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Axis::Resonance | Axis::Velocity | Axis::Density)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = Stat7Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "realm" => Ok(Axis::Realm),
            "lineage" => Ok(Axis::Lineage),
            "adjacency" => Ok(Axis::Adjacency),
            "horizon" => Ok(Axis::Horizon),
            "resonance" => Ok(Axis::Resonance),
            "velocity" => Ok(Axis::Velocity),
            "density" => Ok(Axis::Density),
            other => Err(Stat7Error::InvalidValue {
                context: "axis".to_string(),
                reason: format!("unknown axis `{other}`"),
            }),
        }
    }
}

// =============================================================================
// TIMESTAMP
// =============================================================================

/// UTC timestamp with exactly millisecond precision.
///
/// This is the only timestamp representation in the store. Construction
/// truncates to milliseconds; parsing rejects anything that is not the
/// canonical `YYYY-MM-DDTHH:MM:SS.mmmZ` form, so equal logical instants
/// always serialize identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The canonical wire format: ISO-8601 UTC, exactly three fractional digits.
    pub const FORMAT: &'static str = "%Y-%m-%dT%H:%M:%S%.3fZ";

    /// Create a timestamp from a `DateTime<Utc>`, truncating to milliseconds.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let millis = dt.timestamp_millis();
        match DateTime::from_timestamp_millis(millis) {
            Some(truncated) => Self(truncated),
            // Unreachable for any DateTime that round-trips through millis.
            None => Self(dt),
        }
    }

    /// The Unix epoch (`1970-01-01T00:00:00.000Z`).
    #[must_use]
    pub fn epoch() -> Self {
        Self(DateTime::UNIX_EPOCH)
    }

    /// Parse a canonical millisecond-precision UTC timestamp.
    ///
    /// # Errors
    ///
    /// Returns `Stat7Error::InvalidValue` if the string is not in the exact
    /// canonical form, including when fractional precision is missing or
    /// exceeds three digits.
    pub fn parse(s: &str) -> Result<Self, Stat7Error> {
        let naive = NaiveDateTime::parse_from_str(s, Self::FORMAT).map_err(|e| {
            Stat7Error::InvalidValue {
                context: "timestamp".to_string(),
                reason: format!("`{s}`: {e}"),
            }
        })?;
        let ts = Self(naive.and_utc());
        // Round-trip check rejects sub-millisecond digits and non-canonical
        // spellings that chrono would otherwise accept.
        if ts.to_string() != s {
            return Err(Stat7Error::InvalidValue {
                context: "timestamp".to_string(),
                reason: format!("`{s}` is not canonical millisecond-precision UTC"),
            });
        }
        Ok(ts)
    }

    /// Get the underlying `DateTime<Utc>`.
    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// COORDINATE VECTOR
// =============================================================================

/// One member of the adjacency axis.
///
/// Members are never removed or reordered; deprecation is a flag, not a
/// deletion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdjacencyLink {
    /// The related entity id.
    pub id: EntityId,
    /// Marks the member as deprecated without removing it.
    pub deprecated: bool,
}

impl AdjacencyLink {
    /// Create a non-deprecated adjacency member.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            deprecated: false,
        }
    }

    /// Canonical value form: `{"deprecated":..,"id":..}`.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "deprecated": self.deprecated,
            "id": self.id.as_str(),
        })
    }
}

/// A free-form relationship link carried by a manifestation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipLink {
    /// The entity being linked to.
    pub target: EntityId,
    /// Relationship kind tag.
    pub kind: String,
}

impl RelationshipLink {
    /// Create a new relationship link.
    #[must_use]
    pub fn new(target: EntityId, kind: impl Into<String>) -> Self {
        Self {
            target,
            kind: kind.into(),
        }
    }

    /// Canonical value form.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "target": self.target.as_str(),
        })
    }
}

/// The seven-axis coordinate vector of a manifestation.
///
/// Numeric axes are expected to be normalized through
/// [`crate::canonical::normalize_numeric`] before storage; the store's write
/// paths enforce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateVector {
    /// Domain/category (immutable).
    pub realm: String,
    /// Generation distance from the root entity (immutable).
    pub lineage: u32,
    /// Related entity ids (append-only, monotonic).
    pub adjacency: Vec<AdjacencyLink>,
    /// Lifecycle stage (bounded per-branch vocabulary).
    pub horizon: String,
    /// Normalized charge/alignment value.
    pub resonance: f64,
    /// Rate-of-change value.
    pub velocity: f64,
    /// Compression/distance value.
    pub density: f64,
}

impl CoordinateVector {
    /// Ids of non-deprecated adjacency members, in deterministic order.
    #[must_use]
    pub fn active_adjacency(&self) -> BTreeSet<&str> {
        self.adjacency
            .iter()
            .filter(|link| !link.deprecated)
            .map(|link| link.id.as_str())
            .collect()
    }

    /// Canonical value form of the full vector.
    ///
    /// The adjacency array is emitted in stored order here; the canonical
    /// serializer sorts it by member id during byte encoding.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "realm": self.realm,
            "lineage": self.lineage,
            "adjacency": self.adjacency.iter().map(AdjacencyLink::to_value).collect::<Vec<_>>(),
            "horizon": self.horizon,
            "resonance": self.resonance,
            "velocity": self.velocity,
            "density": self.density,
        })
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// The kind of a mutation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Entity creation. Exactly one per manifestation, always first.
    Genesis,
    /// A policy-checked change to one coordinate axis.
    Mutate(Axis),
    /// Horizon transition to the terminal stage; the entity is never deleted.
    Decommission,
}

impl MutationKind {
    /// Canonical string form: `genesis`, `mutate:<axis>`, `decommission`.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            MutationKind::Genesis => "genesis".to_string(),
            MutationKind::Mutate(axis) => format!("mutate:{}", axis.as_str()),
            MutationKind::Decommission => "decommission".to_string(),
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for MutationKind {
    type Err = Stat7Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "genesis" => Ok(MutationKind::Genesis),
            "decommission" => Ok(MutationKind::Decommission),
            other => match other.strip_prefix("mutate:") {
                Some(axis) => Ok(MutationKind::Mutate(axis.parse()?)),
                None => Err(Stat7Error::InvalidValue {
                    context: "mutation kind".to_string(),
                    reason: format!("unknown kind `{other}`"),
                }),
            },
        }
    }
}

impl Serialize for MutationKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MutationKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One mutation record in the append-only event log.
///
/// Events are never edited or deleted; the rolling chain hash over the
/// sequence is the tamper-evidence mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique, deterministically derived event id.
    pub event_id: String,
    /// When the mutation was committed.
    pub timestamp: Timestamp,
    /// What changed.
    pub kind: MutationKind,
    /// Hash of the manifestation state before the mutation.
    pub prior_hash: String,
    /// Hash of the manifestation state after the mutation.
    pub new_hash: String,
}

impl Event {
    /// Canonical value form; every field participates, nothing is derived.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "event_id": self.event_id,
            "timestamp": self.timestamp.to_string(),
            "kind": self.kind.canonical(),
            "prior_hash": self.prior_hash,
            "new_hash": self.new_hash,
        })
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// The identity core: created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityCore {
    /// Unique entity id.
    pub id: EntityId,
    /// Entity-type tag.
    pub entity_type: EntityType,
    /// Creation timestamp (UTC, millisecond precision).
    pub created_at: Timestamp,
    /// Hash of the entity's essential meaning.
    pub semantic_hash: String,
    /// Hash of the identity core itself (derived; excluded from its own
    /// canonical bytes).
    pub canonical_hash: String,
}

impl IdentityCore {
    /// Canonical value form, excluding the self-referential `canonical_hash`.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id.as_str(),
            "entity_type": self.entity_type.as_str(),
            "created_at": self.created_at.to_string(),
            "semantic_hash": self.semantic_hash,
        })
    }
}

/// A mutable manifestation of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifestation {
    /// The seven-axis coordinate vector.
    pub coordinates: CoordinateVector,
    /// Free-form state.
    pub state: serde_json::Value,
    /// Relationship links, in semantic order.
    pub links: Vec<RelationshipLink>,
    /// Ordered, append-only event log.
    pub events: Vec<Event>,
    /// Rolling hash over the event log (derived).
    pub chain_hash: String,
    /// Current content address of the manifestation state (derived).
    pub address: String,
}

impl Manifestation {
    /// Canonical value form of the manifestation *state*.
    ///
    /// Covers coordinates, links and free-form state only. The event log,
    /// chain hash and address are derived audit data and are excluded, which
    /// is what keeps event `new_hash` fields non-circular.
    #[must_use]
    pub fn state_value(&self) -> serde_json::Value {
        serde_json::json!({
            "coordinates": self.coordinates.to_value(),
            "links": self.links.iter().map(RelationshipLink::to_value).collect::<Vec<_>>(),
            "state": self.state,
        })
    }
}

/// The addressable unit: one immutable identity core plus one or more
/// mutable manifestations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// The immutable identity core.
    pub identity_core: IdentityCore,
    /// Manifestations, oldest first. Mutations apply to the newest.
    pub manifestations: Vec<Manifestation>,
}

impl Entity {
    /// The manifestation mutations currently apply to.
    #[must_use]
    pub fn current_manifestation(&self) -> Option<&Manifestation> {
        self.manifestations.last()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the STAT7 core.
///
/// - No silent failures: every rejection surfaces to the caller
/// - All rejections are local; stored state is untouched on error
#[derive(Debug, Error)]
pub enum Stat7Error {
    /// NaN/Infinity, malformed timestamp, or otherwise unserializable input.
    /// Rejected at serialization time, never stored.
    #[error("invalid value for {context}: {reason}")]
    InvalidValue {
        /// What was being validated.
        context: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A mutation touched an axis marked `Immutable`.
    #[error("axis `{axis}` is immutable; attempted value: {attempted}")]
    ImmutablePolicyViolation {
        /// The immutable axis.
        axis: Axis,
        /// The attempted value, for violation context.
        attempted: String,
    },

    /// An append-only axis was asked to remove, reorder or replace members.
    #[error("monotonicity violation on `{axis}`: {reason}")]
    MonotonicityViolation {
        /// The append-only axis.
        axis: Axis,
        /// Why the change is not monotonic.
        reason: String,
    },

    /// A bounded-dynamic value is not in the branch's allowed vocabulary.
    #[error("value `{value}` is not in the `{branch}` vocabulary for axis `{axis}`")]
    VocabularyViolation {
        /// The bounded axis.
        axis: Axis,
        /// The rejected value.
        value: String,
        /// The branch whose vocabulary applies.
        branch: String,
    },

    /// An entity-type override tried to loosen the global policy.
    #[error("override for entity type `{entity_type}` rejected: {reason}")]
    PolicyOverrideRejected {
        /// The entity type whose override was rejected.
        entity_type: EntityType,
        /// Why the override would loosen policy.
        reason: String,
    },

    /// Two distinct logical entities produced the same address. Fatal:
    /// ingestion of the second entity halts pending manual resolution.
    #[error("address collision at {address}: `{existing}` vs incoming `{incoming}`")]
    AddressCollision {
        /// The colliding address.
        address: String,
        /// The entity already stored at that address.
        existing: EntityId,
        /// The entity whose ingestion was halted.
        incoming: EntityId,
    },

    /// An entity with this id already exists in the arena.
    #[error("entity already exists: {0}")]
    DuplicateEntity(EntityId),

    /// The requested entity is not in the arena.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_epoch_is_canonical() {
        assert_eq!(Timestamp::epoch().to_string(), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn timestamp_parse_roundtrip() {
        let ts = Timestamp::parse("2024-03-01T12:30:45.123Z").expect("parse");
        assert_eq!(ts.to_string(), "2024-03-01T12:30:45.123Z");
    }

    #[test]
    fn timestamp_rejects_missing_precision() {
        assert!(Timestamp::parse("2024-03-01T12:30:45Z").is_err());
        assert!(Timestamp::parse("2024-03-01T12:30:45.1Z").is_err());
        assert!(Timestamp::parse("2024-03-01T12:30:45.123456Z").is_err());
    }

    #[test]
    fn timestamp_truncates_to_millis() {
        let dt = DateTime::parse_from_rfc3339("2024-03-01T12:30:45.123456789Z")
            .expect("rfc3339")
            .with_timezone(&Utc);
        let ts = Timestamp::from_datetime(dt);
        assert_eq!(ts.to_string(), "2024-03-01T12:30:45.123Z");
    }

    #[test]
    fn axis_string_roundtrip() {
        for axis in Axis::ALL {
            let parsed: Axis = axis.as_str().parse().expect("parse");
            assert_eq!(parsed, axis);
        }
    }

    #[test]
    fn mutation_kind_string_roundtrip() {
        let kinds = [
            MutationKind::Genesis,
            MutationKind::Mutate(Axis::Resonance),
            MutationKind::Decommission,
        ];
        for kind in kinds {
            let parsed: MutationKind = kind.canonical().parse().expect("parse");
            assert_eq!(parsed, kind);
        }
        assert!("mutate:unknown".parse::<MutationKind>().is_err());
    }

    #[test]
    fn active_adjacency_skips_deprecated() {
        let coords = CoordinateVector {
            realm: "test".to_string(),
            lineage: 1,
            adjacency: vec![
                AdjacencyLink::new(EntityId::new("a")),
                AdjacencyLink {
                    id: EntityId::new("b"),
                    deprecated: true,
                },
            ],
            horizon: "stable".to_string(),
            resonance: 0.5,
            velocity: 0.0,
            density: 0.0,
        };
        let active = coords.active_adjacency();
        assert!(active.contains("a"));
        assert!(!active.contains("b"));
    }
}
