//! # Entity Arena
//!
//! Storage is an arena of entities indexed by identity-core address, each
//! owning its own immutable event sequence. There is no shared mutable
//! structure with ambient write access: mutation enters only through
//! [`EntityStore::mutate`], which serializes writes per entity by taking
//! `&mut self`.
//!
//! Replay validation and entanglement queries are read-only and may run
//! concurrently with each other through shared references. Different
//! entities may be mutated fully in parallel by sharding arenas; this core
//! never blocks on external I/O.

use crate::address::{
    identity_address, manifestation_address, manifestation_uri, validate_uri_segment,
};
use crate::canonical::normalize_numeric;
use crate::chain::{self, GENESIS_PRIOR_HASH, ReplayReport};
use crate::entangle::{self, EntanglementConfig, EntanglementReport};
use crate::policy::PolicyEngine;
use crate::types::{
    Axis, CoordinateVector, Entity, EntityId, EntityType, Event, IdentityCore, Manifestation,
    MutationKind, RelationshipLink, Stat7Error, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// =============================================================================
// EXCHANGE SHAPES
// =============================================================================

/// A mutation request as exchanged with collaborating systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    /// The entity to mutate.
    pub entity_id: EntityId,
    /// The axis being changed.
    pub axis: Axis,
    /// The proposed value; interpretation is per-axis.
    pub proposed_value: Value,
    /// The caller's claim of the entity's type; must match the stored core.
    pub entity_type: EntityType,
}

/// The committed result of an accepted mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationOutcome {
    /// The mutated entity.
    pub entity_id: EntityId,
    /// What was recorded in the event log.
    pub kind: MutationKind,
    /// The manifestation's recomputed address.
    pub address: String,
    /// The new chain head.
    pub chain_hash: String,
    /// The committed manifestation state.
    pub manifestation: Manifestation,
}

// =============================================================================
// STORE
// =============================================================================

/// The deterministic entity arena.
#[derive(Debug, Default)]
pub struct EntityStore {
    policy: PolicyEngine,
    entanglement: EntanglementConfig,
    /// Entities keyed by identity-core address (stable for the entity's
    /// lifetime, unlike manifestation addresses).
    entities: BTreeMap<String, Entity>,
    /// Secondary index: entity id to identity-core address.
    ids: BTreeMap<EntityId, String>,
}

impl EntityStore {
    /// Create an empty arena with default policy and calibration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an arena with explicit policy and entanglement calibration.
    #[must_use]
    pub fn with_config(policy: PolicyEngine, entanglement: EntanglementConfig) -> Self {
        Self {
            policy,
            entanglement,
            entities: BTreeMap::new(),
            ids: BTreeMap::new(),
        }
    }

    /// The mutability policy engine.
    #[must_use]
    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Mutable access to the policy engine, for registering branches and
    /// type overrides.
    pub fn policy_mut(&mut self) -> &mut PolicyEngine {
        &mut self.policy
    }

    /// The entanglement calibration in effect.
    #[must_use]
    pub fn entanglement_config(&self) -> &EntanglementConfig {
        &self.entanglement
    }

    /// Mutable access to the entanglement calibration.
    pub fn entanglement_config_mut(&mut self) -> &mut EntanglementConfig {
        &mut self.entanglement
    }

    /// Number of entities in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate entities in deterministic (address) order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    // -------------------------------------------------------------------------
    // GENESIS
    // -------------------------------------------------------------------------

    /// Create an entity: identity core, first manifestation, genesis event.
    ///
    /// Returns the identity-core address, the entity's stable arena key.
    /// Initial relationship links participate in the manifestation state
    /// hash like coordinates and free-form state do.
    ///
    /// # Errors
    ///
    /// - `InvalidValue` for non-finite numeric axes, duplicate adjacency
    ///   members, duplicate relationship links, or a realm that is not a
    ///   legal URI segment
    /// - `VocabularyViolation` if the horizon is not a valid stage for the
    ///   realm
    /// - `DuplicateEntity` if the id is already present
    /// - `AddressCollision` if a distinct entity already owns the address;
    ///   fatal for the incoming entity, the arena is untouched
    pub fn genesis(
        &mut self,
        id: EntityId,
        entity_type: EntityType,
        essence: &Value,
        coordinates: CoordinateVector,
        state: Value,
        links: Vec<RelationshipLink>,
        created_at: Timestamp,
    ) -> Result<String, Stat7Error> {
        if self.ids.contains_key(&id) {
            return Err(Stat7Error::DuplicateEntity(id));
        }
        validate_uri_segment("realm", &coordinates.realm)?;
        let coordinates = Self::normalize_coordinates(coordinates)?;
        Self::validate_links(&links)?;
        let vocabulary = self
            .policy
            .effective_vocabulary(&coordinates.realm, &entity_type);
        if !vocabulary.iter().any(|s| s == &coordinates.horizon) {
            return Err(Stat7Error::VocabularyViolation {
                axis: Axis::Horizon,
                value: coordinates.horizon,
                branch: coordinates.realm,
            });
        }

        let semantic_hash = crate::address::compute_address(essence)?;
        let mut core = IdentityCore {
            id: id.clone(),
            entity_type,
            created_at,
            semantic_hash,
            canonical_hash: String::new(),
        };
        core.canonical_hash = identity_address(&core)?;
        let address = core.canonical_hash.clone();

        if let Some(existing) = self.entities.get(&address) {
            return Err(Stat7Error::AddressCollision {
                address,
                existing: existing.identity_core.id.clone(),
                incoming: id,
            });
        }

        let mut manifestation = Manifestation {
            coordinates,
            state,
            links,
            events: Vec::new(),
            chain_hash: String::new(),
            address: String::new(),
        };
        let state_hash = manifestation_address(&manifestation)?;
        let event = Event {
            event_id: Self::event_id(&id, 0, &state_hash),
            timestamp: created_at,
            kind: MutationKind::Genesis,
            prior_hash: GENESIS_PRIOR_HASH.to_string(),
            new_hash: state_hash.clone(),
        };
        chain::append_event(&mut manifestation, event)?;
        manifestation.address = state_hash;

        debug!(entity = %id, %address, "genesis committed");
        self.ids.insert(id, address.clone());
        self.entities.insert(
            address.clone(),
            Entity {
                identity_core: core,
                manifestations: vec![manifestation],
            },
        );
        Ok(address)
    }

    // -------------------------------------------------------------------------
    // LOOKUP
    // -------------------------------------------------------------------------

    /// Look up an entity by id.
    #[must_use]
    pub fn lookup(&self, id: &EntityId) -> Option<&Entity> {
        self.ids.get(id).and_then(|addr| self.entities.get(addr))
    }

    /// Look up an entity by identity-core address.
    #[must_use]
    pub fn lookup_address(&self, address: &str) -> Option<&Entity> {
        self.entities.get(address)
    }

    /// The current manifestation address of an entity.
    pub fn current_address(&self, id: &EntityId) -> Result<String, Stat7Error> {
        let manifestation = self.current_manifestation(id)?;
        Ok(manifestation.address.clone())
    }

    /// The structured URI of an entity's current manifestation.
    pub fn uri(&self, id: &EntityId) -> Result<String, Stat7Error> {
        let manifestation = self.current_manifestation(id)?;
        manifestation_uri(&manifestation.coordinates)
    }

    // -------------------------------------------------------------------------
    // MUTATION
    // -------------------------------------------------------------------------

    /// Apply a policy-checked mutation to an entity's current manifestation.
    ///
    /// On acceptance the event chain is extended and the manifestation
    /// address recomputed. On rejection the stored state is untouched and
    /// the violation is surfaced, never swallowed.
    pub fn mutate(
        &mut self,
        request: &MutationRequest,
        at: Timestamp,
    ) -> Result<MutationOutcome, Stat7Error> {
        let entity = self
            .lookup(&request.entity_id)
            .ok_or_else(|| Stat7Error::EntityNotFound(request.entity_id.clone()))?;
        if entity.identity_core.entity_type != request.entity_type {
            return Err(Stat7Error::InvalidValue {
                context: "entity_type".to_string(),
                reason: format!(
                    "request says `{}` but `{}` is a `{}`",
                    request.entity_type, request.entity_id, entity.identity_core.entity_type
                ),
            });
        }
        let current = entity
            .current_manifestation()
            .ok_or_else(|| Stat7Error::InvalidValue {
                context: "entity".to_string(),
                reason: format!("`{}` has no manifestation", request.entity_id),
            })?;
        let next = self.policy.validate_mutation(
            current,
            request.axis,
            &request.proposed_value,
            &entity.identity_core.entity_type,
        )?;
        self.commit(
            request.entity_id.clone(),
            next,
            MutationKind::Mutate(request.axis),
            at,
        )
    }

    /// Decommission an entity: a horizon transition to the branch's terminal
    /// stage, recorded as its own event kind. The entity and its audit trail
    /// remain in the arena; nothing is physically deleted.
    pub fn decommission(
        &mut self,
        id: &EntityId,
        at: Timestamp,
    ) -> Result<MutationOutcome, Stat7Error> {
        let entity = self
            .lookup(id)
            .ok_or_else(|| Stat7Error::EntityNotFound(id.clone()))?;
        let current = entity
            .current_manifestation()
            .ok_or_else(|| Stat7Error::InvalidValue {
                context: "entity".to_string(),
                reason: format!("`{id}` has no manifestation"),
            })?;
        let terminal = self
            .policy
            .terminal_stage(&current.coordinates.realm)
            .ok_or_else(|| Stat7Error::InvalidValue {
                context: "horizon".to_string(),
                reason: format!("branch `{}` has no terminal stage", current.coordinates.realm),
            })?;
        if current.coordinates.horizon == terminal {
            return Err(Stat7Error::InvalidValue {
                context: "horizon".to_string(),
                reason: format!("`{id}` is already decommissioned"),
            });
        }
        let next = self.policy.validate_mutation(
            current,
            Axis::Horizon,
            &Value::String(terminal),
            &entity.identity_core.entity_type,
        )?;
        self.commit(id.clone(), next, MutationKind::Decommission, at)
    }

    /// Shared commit path: hash the accepted state, append the event, swap
    /// the manifestation in. Everything fallible happens before the swap, so
    /// rejections leave the arena untouched.
    fn commit(
        &mut self,
        entity_id: EntityId,
        mut next: Manifestation,
        kind: MutationKind,
        at: Timestamp,
    ) -> Result<MutationOutcome, Stat7Error> {
        let address = self
            .ids
            .get(&entity_id)
            .cloned()
            .ok_or_else(|| Stat7Error::EntityNotFound(entity_id.clone()))?;
        let prior_hash = next
            .events
            .last()
            .map(|event| event.new_hash.clone())
            .unwrap_or_else(|| GENESIS_PRIOR_HASH.to_string());
        let new_hash = manifestation_address(&next)?;
        let seq = next.events.len() as u64;
        let event = Event {
            event_id: Self::event_id(&entity_id, seq, &new_hash),
            timestamp: at,
            kind,
            prior_hash,
            new_hash: new_hash.clone(),
        };
        chain::append_event(&mut next, event)?;
        next.address = new_hash.clone();

        let entity = self
            .entities
            .get_mut(&address)
            .ok_or_else(|| Stat7Error::EntityNotFound(entity_id.clone()))?;
        match entity.manifestations.last_mut() {
            Some(slot) => *slot = next.clone(),
            None => entity.manifestations.push(next.clone()),
        }
        debug!(entity = %entity_id, kind = %kind, address = %new_hash, "mutation committed");
        Ok(MutationOutcome {
            entity_id,
            kind,
            address: new_hash,
            chain_hash: next.chain_hash.clone(),
            manifestation: next,
        })
    }

    // -------------------------------------------------------------------------
    // AUDIT & ENTANGLEMENT
    // -------------------------------------------------------------------------

    /// Replay an entity's event log from scratch and compare chain heads.
    ///
    /// Read-only; suitable for periodic auditing independent of writes.
    pub fn replay_validate(&self, id: &EntityId) -> Result<ReplayReport, Stat7Error> {
        let manifestation = self.current_manifestation(id)?;
        chain::replay_validate(manifestation)
    }

    /// Score two stored entities for entanglement.
    pub fn entanglement(
        &self,
        a: &EntityId,
        b: &EntityId,
    ) -> Result<EntanglementReport, Stat7Error> {
        let ma = self.current_manifestation(a)?;
        let mb = self.current_manifestation(b)?;
        Ok(entangle::score(
            &self.entanglement,
            &ma.coordinates,
            &mb.coordinates,
        ))
    }

    /// Pairwise entanglement detection over the whole arena, with
    /// realm/lineage pruning. Returns entangled id pairs in deterministic
    /// order.
    #[must_use]
    pub fn detect_entangled(&self) -> Vec<(EntityId, EntityId, EntanglementReport)> {
        let mut ids: Vec<&EntityId> = Vec::with_capacity(self.entities.len());
        let mut coordinates: Vec<CoordinateVector> = Vec::with_capacity(self.entities.len());
        for entity in self.entities.values() {
            if let Some(m) = entity.current_manifestation() {
                ids.push(&entity.identity_core.id);
                coordinates.push(m.coordinates.clone());
            }
        }
        entangle::detect_entangled(&self.entanglement, &coordinates)
            .into_iter()
            .map(|(i, j, report)| (ids[i].clone(), ids[j].clone(), report))
            .collect()
    }

    // -------------------------------------------------------------------------
    // INTERNALS
    // -------------------------------------------------------------------------

    fn current_manifestation(&self, id: &EntityId) -> Result<&Manifestation, Stat7Error> {
        self.lookup(id)
            .ok_or_else(|| Stat7Error::EntityNotFound(id.clone()))?
            .current_manifestation()
            .ok_or_else(|| Stat7Error::InvalidValue {
                context: "entity".to_string(),
                reason: format!("`{id}` has no manifestation"),
            })
    }

    fn normalize_coordinates(
        mut coordinates: CoordinateVector,
    ) -> Result<CoordinateVector, Stat7Error> {
        coordinates.resonance = normalize_numeric(coordinates.resonance)?;
        coordinates.velocity = normalize_numeric(coordinates.velocity)?;
        coordinates.density = normalize_numeric(coordinates.density)?;
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for link in &coordinates.adjacency {
            if !seen.insert(link.id.as_str()) {
                return Err(Stat7Error::InvalidValue {
                    context: "adjacency".to_string(),
                    reason: format!("duplicate member `{}`", link.id),
                });
            }
        }
        Ok(coordinates)
    }

    /// Duplicate (target, kind) pairs carry no information and would make
    /// logically equal link sets hash differently.
    fn validate_links(links: &[RelationshipLink]) -> Result<(), Stat7Error> {
        let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
        for link in links {
            if !seen.insert((link.target.as_str(), link.kind.as_str())) {
                return Err(Stat7Error::InvalidValue {
                    context: "links".to_string(),
                    reason: format!("duplicate link `{}` -> `{}`", link.kind, link.target),
                });
            }
        }
        Ok(())
    }

    /// Deterministic event id: `sha256("{entity_id}/{seq}/{new_hash}")`.
    /// Globally unique without randomness, so identical histories replay
    /// bit-identically.
    fn event_id(entity_id: &EntityId, seq: u64, new_hash: &str) -> String {
        let preimage = format!("{entity_id}/{seq}/{new_hash}");
        hex::encode(Sha256::digest(preimage.as_bytes()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
