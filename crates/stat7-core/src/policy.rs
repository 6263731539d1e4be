//! # Mutability Policy Engine
//!
//! Per-axis mutability as a small closed set of tagged variants dispatched
//! through a single validation entry point, rather than scattered
//! conditional logic per entity type.
//!
//! Entity types may supply overrides, but an override may only narrow the
//! axis's behavior; it can never turn `Immutable` into mutable. Narrowing
//! is structural: frozen axes are unioned in, vocabularies are intersected
//! with the branch vocabulary, adjacency caps only bound appends.
//!
//! On acceptance, [`PolicyEngine::validate_mutation`] returns the new
//! manifestation state to be committed by the chain appender. On rejection,
//! stored state is untouched and the violation is logged with full context.

use crate::address::validate_uri_segment;
use crate::canonical::normalize_numeric;
use crate::types::{AdjacencyLink, Axis, EntityId, EntityType, Manifestation, Stat7Error};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

// =============================================================================
// POLICIES
// =============================================================================

/// The four mutability policies. Each axis is permanently assigned one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisPolicy {
    /// Never changes after creation.
    Immutable,
    /// Members may be appended or deprecation-flagged, never removed or
    /// reordered.
    AppendOnlyMonotonic,
    /// Value must come from a fixed vocabulary for the entity's branch.
    BoundedDynamic,
    /// Any normalized finite numeric value.
    FreeDynamic,
}

impl Axis {
    /// The global policy assignment. Overrides may narrow this, never loosen.
    #[must_use]
    pub const fn global_policy(self) -> AxisPolicy {
        match self {
            Axis::Realm | Axis::Lineage => AxisPolicy::Immutable,
            Axis::Adjacency => AxisPolicy::AppendOnlyMonotonic,
            Axis::Horizon => AxisPolicy::BoundedDynamic,
            Axis::Resonance | Axis::Velocity | Axis::Density => AxisPolicy::FreeDynamic,
        }
    }
}

/// Default ordered horizon vocabulary, shared by branches without their own.
///
/// The last stage is terminal: decommissioning transitions to it.
pub const DEFAULT_HORIZON_VOCABULARY: [&str; 5] =
    ["nascent", "emergent", "stable", "waning", "archived"];

// =============================================================================
// TYPE OVERRIDES
// =============================================================================

/// Per-entity-type policy narrowing.
#[derive(Debug, Clone, Default)]
pub struct TypeOverride {
    /// Additional axes forced to `Immutable` for this type.
    pub frozen_axes: BTreeSet<Axis>,
    /// Cap on adjacency size (counts all members, deprecated included).
    pub max_adjacency: Option<usize>,
    /// Restriction of the horizon vocabulary; applied as an intersection
    /// with the branch vocabulary.
    pub horizon_vocabulary: Option<Vec<String>>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Validates proposed mutations against per-axis rules with entity-type
/// overrides.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    branch_vocabularies: BTreeMap<String, Vec<String>>,
    overrides: BTreeMap<EntityType, TypeOverride>,
}

impl PolicyEngine {
    /// Create an engine with the default vocabulary and no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a branch's ordered horizon vocabulary.
    ///
    /// # Errors
    ///
    /// Rejects empty vocabularies; a branch with no valid stage would make
    /// every horizon mutation unrepresentable. Stages must also be legal URI
    /// segments, since the horizon is interpolated into manifestation URIs.
    pub fn register_branch_vocabulary(
        &mut self,
        branch: impl Into<String>,
        vocabulary: Vec<String>,
    ) -> Result<(), Stat7Error> {
        if vocabulary.is_empty() {
            return Err(Stat7Error::InvalidValue {
                context: "branch vocabulary".to_string(),
                reason: "vocabulary must not be empty".to_string(),
            });
        }
        for stage in &vocabulary {
            validate_uri_segment("branch vocabulary stage", stage)?;
        }
        self.branch_vocabularies.insert(branch.into(), vocabulary);
        Ok(())
    }

    /// The ordered horizon vocabulary for a branch, falling back to the
    /// default.
    #[must_use]
    pub fn branch_vocabulary(&self, branch: &str) -> Vec<String> {
        self.branch_vocabularies.get(branch).cloned().unwrap_or_else(|| {
            DEFAULT_HORIZON_VOCABULARY
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        })
    }

    /// The terminal lifecycle stage for a branch (last vocabulary entry).
    #[must_use]
    pub fn terminal_stage(&self, branch: &str) -> Option<String> {
        self.branch_vocabulary(branch).last().cloned()
    }

    /// Register a narrowing override for an entity type.
    ///
    /// # Errors
    ///
    /// Rejects overrides that would loosen policy: an empty restricted
    /// vocabulary, or vocabulary entries unknown to every branch (which
    /// would smuggle new stages in).
    pub fn register_override(
        &mut self,
        entity_type: EntityType,
        override_spec: TypeOverride,
    ) -> Result<(), Stat7Error> {
        if let Some(vocab) = &override_spec.horizon_vocabulary {
            if vocab.is_empty() {
                return Err(Stat7Error::PolicyOverrideRejected {
                    entity_type,
                    reason: "restricted vocabulary must not be empty".to_string(),
                });
            }
            let known: BTreeSet<&str> = DEFAULT_HORIZON_VOCABULARY
                .iter()
                .copied()
                .chain(
                    self.branch_vocabularies
                        .values()
                        .flat_map(|v| v.iter().map(String::as_str)),
                )
                .collect();
            for stage in vocab {
                if !known.contains(stage.as_str()) {
                    return Err(Stat7Error::PolicyOverrideRejected {
                        entity_type,
                        reason: format!("stage `{stage}` is not in any branch vocabulary"),
                    });
                }
            }
        }
        self.overrides.insert(entity_type, override_spec);
        Ok(())
    }

    /// The policy in effect for an axis under an entity type.
    #[must_use]
    pub fn effective_policy(&self, axis: Axis, entity_type: &EntityType) -> AxisPolicy {
        if let Some(ov) = self.overrides.get(entity_type) {
            if ov.frozen_axes.contains(&axis) {
                return AxisPolicy::Immutable;
            }
        }
        axis.global_policy()
    }

    /// The horizon vocabulary in effect for a branch under an entity type.
    #[must_use]
    pub fn effective_vocabulary(&self, branch: &str, entity_type: &EntityType) -> Vec<String> {
        let base = self.branch_vocabulary(branch);
        match self
            .overrides
            .get(entity_type)
            .and_then(|ov| ov.horizon_vocabulary.as_ref())
        {
            // Intersection preserves branch order and cannot add stages.
            Some(restricted) => base
                .into_iter()
                .filter(|stage| restricted.contains(stage))
                .collect(),
            None => base,
        }
    }

    /// Validate a proposed mutation against the axis's effective policy.
    ///
    /// Returns the new manifestation state on acceptance. The caller's
    /// stored state is never touched here; commit happens in the store via
    /// the chain appender.
    ///
    /// # Errors
    ///
    /// `ImmutablePolicyViolation`, `MonotonicityViolation`,
    /// `VocabularyViolation` or `InvalidValue`, each carrying full context.
    pub fn validate_mutation(
        &self,
        current: &Manifestation,
        axis: Axis,
        proposed: &Value,
        entity_type: &EntityType,
    ) -> Result<Manifestation, Stat7Error> {
        let policy = self.effective_policy(axis, entity_type);
        let outcome = match policy {
            AxisPolicy::Immutable => Err(Stat7Error::ImmutablePolicyViolation {
                axis,
                attempted: proposed.to_string(),
            }),
            AxisPolicy::AppendOnlyMonotonic => {
                self.validate_adjacency(current, axis, proposed, entity_type)
            }
            AxisPolicy::BoundedDynamic => {
                self.validate_bounded(current, axis, proposed, entity_type)
            }
            AxisPolicy::FreeDynamic => Self::validate_numeric(current, axis, proposed),
        };
        if let Err(violation) = &outcome {
            warn!(
                axis = %axis,
                attempted = %proposed,
                policy = ?policy,
                entity_type = %entity_type,
                %violation,
                "mutation rejected"
            );
        }
        outcome
    }

    // -------------------------------------------------------------------------
    // Per-policy validators
    // -------------------------------------------------------------------------

    fn validate_adjacency(
        &self,
        current: &Manifestation,
        axis: Axis,
        proposed: &Value,
        entity_type: &EntityType,
    ) -> Result<Manifestation, Stat7Error> {
        let obj = proposed
            .as_object()
            .ok_or_else(|| Stat7Error::MonotonicityViolation {
                axis,
                reason: "adjacency accepts only append/deprecate operations, \
                         not replacement"
                    .to_string(),
            })?;
        let op = obj.get("op").and_then(Value::as_str).ok_or_else(|| {
            Stat7Error::InvalidValue {
                context: "adjacency operation".to_string(),
                reason: "missing `op` field".to_string(),
            }
        })?;
        let id = obj.get("id").and_then(Value::as_str).ok_or_else(|| {
            Stat7Error::InvalidValue {
                context: "adjacency operation".to_string(),
                reason: "missing `id` field".to_string(),
            }
        })?;

        let mut next = current.clone();
        match op {
            "append" => {
                if next
                    .coordinates
                    .adjacency
                    .iter()
                    .any(|link| link.id.as_str() == id)
                {
                    return Err(Stat7Error::MonotonicityViolation {
                        axis,
                        reason: format!("member `{id}` already present"),
                    });
                }
                if let Some(cap) = self
                    .overrides
                    .get(entity_type)
                    .and_then(|ov| ov.max_adjacency)
                {
                    if next.coordinates.adjacency.len() >= cap {
                        return Err(Stat7Error::MonotonicityViolation {
                            axis,
                            reason: format!(
                                "adjacency cap {cap} reached for entity type `{entity_type}`"
                            ),
                        });
                    }
                }
                next.coordinates
                    .adjacency
                    .push(AdjacencyLink::new(EntityId::new(id)));
                Ok(next)
            }
            "deprecate" => {
                let link = next
                    .coordinates
                    .adjacency
                    .iter_mut()
                    .find(|link| link.id.as_str() == id)
                    .ok_or_else(|| Stat7Error::MonotonicityViolation {
                        axis,
                        reason: format!("cannot deprecate unknown member `{id}`"),
                    })?;
                link.deprecated = true;
                Ok(next)
            }
            other => Err(Stat7Error::InvalidValue {
                context: "adjacency operation".to_string(),
                reason: format!("unknown op `{other}`"),
            }),
        }
    }

    fn validate_bounded(
        &self,
        current: &Manifestation,
        axis: Axis,
        proposed: &Value,
        entity_type: &EntityType,
    ) -> Result<Manifestation, Stat7Error> {
        let stage = proposed
            .as_str()
            .ok_or_else(|| Stat7Error::InvalidValue {
                context: axis.as_str().to_string(),
                reason: "bounded axes take a string stage".to_string(),
            })?;
        let branch = current.coordinates.realm.clone();
        let vocabulary = self.effective_vocabulary(&branch, entity_type);
        if !vocabulary.iter().any(|allowed| allowed == stage) {
            return Err(Stat7Error::VocabularyViolation {
                axis,
                value: stage.to_string(),
                branch,
            });
        }
        let mut next = current.clone();
        next.coordinates.horizon = stage.to_string();
        Ok(next)
    }

    fn validate_numeric(
        current: &Manifestation,
        axis: Axis,
        proposed: &Value,
    ) -> Result<Manifestation, Stat7Error> {
        let raw = proposed
            .as_f64()
            .ok_or_else(|| Stat7Error::InvalidValue {
                context: axis.as_str().to_string(),
                reason: "numeric axes take a finite number".to_string(),
            })?;
        let normalized = normalize_numeric(raw)?;
        let mut next = current.clone();
        match axis {
            Axis::Resonance => next.coordinates.resonance = normalized,
            Axis::Velocity => next.coordinates.velocity = normalized,
            Axis::Density => next.coordinates.density = normalized,
            // Non-numeric axes never dispatch here.
            other => {
                return Err(Stat7Error::InvalidValue {
                    context: other.as_str().to_string(),
                    reason: "axis is not numeric".to_string(),
                });
            }
        }
        Ok(next)
    }
}

// =============================================================================
// TESTS
// =============================================================================
