//! # stat7-core
//!
//! The deterministic entity store for STAT7 - THE SUBSTRATE.
//!
//! This crate implements a content-addressable store of entities positioned
//! in a seven-dimensional coordinate space. Every entity splits into an
//! immutable identity core and mutable manifestations; every address is a
//! SHA-256 digest of canonical bytes, and every mutation is recorded in a
//! hash-chained event log.
//!
//! ## Determinism Constraints
//!
//! The CORE:
//! - Serializes canonically: equal logical values always produce
//!   byte-identical output, on every platform
//! - Derives all addresses and event ids from content, never from clocks or
//!   randomness
//! - Enforces per-axis mutability before any write; rejections leave state
//!   untouched
//! - Never deletes audit data; decommissioning is a lifecycle transition
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod address;
pub mod canonical;
pub mod chain;
pub mod entangle;
pub mod policy;
pub mod root;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AdjacencyLink, Axis, CoordinateVector, Entity, EntityId, EntityType, Event, IdentityCore,
    Manifestation, MutationKind, RelationshipLink, Stat7Error, Timestamp,
};

// =============================================================================
// RE-EXPORTS: Canonical Form & Addressing
// =============================================================================

pub use address::{
    ADDRESS_LEN, URI_SCHEME, adjacency_hash, compute_address, identity_address,
    manifestation_address, manifestation_uri,
};
pub use canonical::{FLOAT_PRECISION, canonical_bytes, canonical_f64, canonical_string};
pub use chain::{ChainStatus, GENESIS_PRIOR_HASH, ReplayReport, replay_validate};

// =============================================================================
// RE-EXPORTS: Policy & Entanglement
// =============================================================================

pub use entangle::{
    ComponentBreakdown, ComponentWeights, DEFAULT_THRESHOLD, EntanglementConfig,
    EntanglementReport, detect_entangled, score,
};
pub use policy::{AxisPolicy, DEFAULT_HORIZON_VOCABULARY, PolicyEngine, TypeOverride};

// =============================================================================
// RE-EXPORTS: Store & Root
// =============================================================================

pub use root::{ROOT_ADDRESS, ROOT_ID, install_root};
pub use store::{EntityStore, MutationOutcome, MutationRequest};
