//! # Entanglement Detection
//!
//! Detects non-obvious associations between entities from weighted
//! coordinate similarity. Pure functions with no stored state: symmetric,
//! deterministic, and every component independently bounded to [0, 1], so
//! the weighted sum is always bounded.
//!
//! The reference weights and threshold were empirically calibrated, not
//! derived analytically; they live in [`EntanglementConfig`] as configurable
//! constants and should be recalibrated against a labeled set before being
//! trusted on very different coordinate distributions.

use crate::types::CoordinateVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::policy::DEFAULT_HORIZON_VOCABULARY;

/// Reference decision threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Affinity granted to distinct-but-related realms.
pub const DEFAULT_RELATED_REALM_AFFINITY: f64 = 0.5;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Weights of the five score components. Reference calibration sums to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeights {
    /// Similarity of resonance values.
    pub polarity_resonance: f64,
    /// Realm match / relatedness.
    pub realm_affinity: f64,
    /// Jaccard overlap of adjacency sets.
    pub adjacency_overlap: f64,
    /// Inverse distance between horizon stages.
    pub horizon_proximity: f64,
    /// Inverse distance between lineage generations.
    pub lineage_affinity: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            polarity_resonance: 0.50,
            realm_affinity: 0.15,
            adjacency_overlap: 0.20,
            horizon_proximity: 0.10,
            lineage_affinity: 0.05,
        }
    }
}

/// Calibration for the detector: threshold, weights, realm relatedness and
/// the ordered horizon vocabulary used for stage distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntanglementConfig {
    /// Decision threshold: `entangled = score >= threshold`.
    pub threshold: f64,
    /// Component weights.
    pub weights: ComponentWeights,
    /// Unordered pairs of realms considered related. Stored with the pair
    /// lexicographically ordered, so lookups are symmetric.
    pub related_realms: BTreeSet<(String, String)>,
    /// Affinity granted to a related (but not equal) realm pair.
    pub related_realm_affinity: f64,
    /// Ordered stages for horizon distance.
    pub horizon_vocabulary: Vec<String>,
}

impl Default for EntanglementConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            weights: ComponentWeights::default(),
            related_realms: BTreeSet::new(),
            related_realm_affinity: DEFAULT_RELATED_REALM_AFFINITY,
            horizon_vocabulary: DEFAULT_HORIZON_VOCABULARY
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl EntanglementConfig {
    /// Declare two realms related. Order-insensitive.
    pub fn relate_realms(&mut self, a: impl Into<String>, b: impl Into<String>) {
        let (a, b) = (a.into(), b.into());
        let pair = if a <= b { (a, b) } else { (b, a) };
        self.related_realms.insert(pair);
    }

    fn realms_related(&self, a: &str, b: &str) -> bool {
        let pair = if a <= b { (a, b) } else { (b, a) };
        self.related_realms
            .contains(&(pair.0.to_string(), pair.1.to_string()))
    }

    fn stage_index(&self, stage: &str) -> Option<usize> {
        self.horizon_vocabulary.iter().position(|s| s == stage)
    }
}

// =============================================================================
// COMPONENTS
// =============================================================================

/// Similarity of two resonance values; 1.0 as they converge.
#[must_use]
pub fn polarity_resonance(a: f64, b: f64) -> f64 {
    (1.0 - (a - b).abs()).clamp(0.0, 1.0)
}

/// 1.0 for equal realms, the configured affinity for related realms,
/// 0.0 otherwise.
#[must_use]
pub fn realm_affinity(config: &EntanglementConfig, a: &str, b: &str) -> f64 {
    if a == b {
        1.0
    } else if config.realms_related(a, b) {
        config.related_realm_affinity.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Jaccard overlap of the two active (non-deprecated) adjacency sets.
///
/// Two empty sets share no neighbors; the overlap is 0.0, not 1.0.
#[must_use]
pub fn adjacency_overlap(a: &CoordinateVector, b: &CoordinateVector) -> f64 {
    let set_a = a.active_adjacency();
    let set_b = b.active_adjacency();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}

/// Inverse distance between horizon stages on the ordered vocabulary.
///
/// Stages outside the vocabulary contribute 0.0.
#[must_use]
pub fn horizon_proximity(config: &EntanglementConfig, a: &str, b: &str) -> f64 {
    match (config.stage_index(a), config.stage_index(b)) {
        (Some(ia), Some(ib)) => {
            let distance = ia.abs_diff(ib);
            1.0 / (1.0 + distance as f64)
        }
        _ => 0.0,
    }
}

/// Inverse distance between lineage generation numbers.
#[must_use]
pub fn lineage_affinity(a: u32, b: u32) -> f64 {
    1.0 / (1.0 + f64::from(a.abs_diff(b)))
}

// =============================================================================
// SCORING
// =============================================================================

/// Per-component values of one scored pair, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentBreakdown {
    /// Resonance similarity.
    pub polarity_resonance: f64,
    /// Realm match / relatedness.
    pub realm_affinity: f64,
    /// Adjacency Jaccard overlap.
    pub adjacency_overlap: f64,
    /// Horizon stage proximity.
    pub horizon_proximity: f64,
    /// Lineage generation proximity.
    pub lineage_affinity: f64,
}

/// Score, decision, and the component breakdown behind them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntanglementReport {
    /// Weighted sum in [0, 1].
    pub score: f64,
    /// `score >= threshold`.
    pub entangled: bool,
    /// The five component values.
    pub components: ComponentBreakdown,
}

/// Score a pair of coordinate vectors.
///
/// Symmetric (`score(a, b) == score(b, a)`) and deterministic for identical
/// inputs.
#[must_use]
pub fn score(
    config: &EntanglementConfig,
    a: &CoordinateVector,
    b: &CoordinateVector,
) -> EntanglementReport {
    let components = ComponentBreakdown {
        polarity_resonance: polarity_resonance(a.resonance, b.resonance),
        realm_affinity: realm_affinity(config, &a.realm, &b.realm),
        adjacency_overlap: adjacency_overlap(a, b),
        horizon_proximity: horizon_proximity(config, &a.horizon, &b.horizon),
        lineage_affinity: lineage_affinity(a.lineage, b.lineage),
    };
    let w = &config.weights;
    let total = w.polarity_resonance * components.polarity_resonance
        + w.realm_affinity * components.realm_affinity
        + w.adjacency_overlap * components.adjacency_overlap
        + w.horizon_proximity * components.horizon_proximity
        + w.lineage_affinity * components.lineage_affinity;
    EntanglementReport {
        score: total,
        entangled: total >= config.threshold,
        components,
    }
}

/// Cheap upper bound on the pair's score from realm and lineage alone.
///
/// Assumes the three remaining components are at their maximum, so a bound
/// below the threshold proves the full score cannot reach it.
#[must_use]
pub fn score_upper_bound(
    config: &EntanglementConfig,
    a: &CoordinateVector,
    b: &CoordinateVector,
) -> f64 {
    let w = &config.weights;
    w.polarity_resonance
        + w.adjacency_overlap
        + w.horizon_proximity
        + w.realm_affinity * realm_affinity(config, &a.realm, &b.realm)
        + w.lineage_affinity * lineage_affinity(a.lineage, b.lineage)
}

/// Batch detection over candidate vectors: O(n²) pairwise comparison with
/// realm/lineage pruning before any full score is computed.
///
/// Returns entangled `(i, j, report)` index pairs with `i < j`. No shared
/// mutable state; callers may chunk the candidate slice and merge results.
#[must_use]
pub fn detect_entangled(
    config: &EntanglementConfig,
    candidates: &[CoordinateVector],
) -> Vec<(usize, usize, EntanglementReport)> {
    let mut found = Vec::new();
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let (a, b) = (&candidates[i], &candidates[j]);
            if score_upper_bound(config, a, b) < config.threshold {
                continue;
            }
            let report = score(config, a, b);
            if report.entangled {
                found.push((i, j, report));
            }
        }
    }
    found
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{AdjacencyLink, EntityId};

    fn vector(
        realm: &str,
        lineage: u32,
        adjacency: &[&str],
        horizon: &str,
        resonance: f64,
    ) -> CoordinateVector {
        CoordinateVector {
            realm: realm.to_string(),
            lineage,
            adjacency: adjacency
                .iter()
                .map(|id| AdjacencyLink::new(EntityId::new(*id)))
                .collect(),
            horizon: horizon.to_string(),
            resonance,
            velocity: 0.0,
            density: 0.0,
        }
    }

    #[test]
    fn close_pair_is_entangled() {
        // Identical realm, resonance 0.90 vs 0.92, 80% adjacency overlap.
        let config = EntanglementConfig::default();
        let a = vector("trade", 2, &["n1", "n2", "n3", "n4"], "stable", 0.90);
        let b = vector("trade", 2, &["n1", "n2", "n3", "n4", "n5"], "stable", 0.92);

        let report = score(&config, &a, &b);
        assert!(report.score > DEFAULT_THRESHOLD, "score {}", report.score);
        assert!(report.entangled);
        assert!((report.components.adjacency_overlap - 0.8).abs() < 1e-12);
    }

    #[test]
    fn distant_pair_is_not_entangled() {
        let config = EntanglementConfig::default();
        let a = vector("trade", 0, &["n1"], "nascent", 0.1);
        let b = vector("myth", 5, &["m1"], "archived", 0.9);

        let report = score(&config, &a, &b);
        assert!(report.score < 0.30, "score {}", report.score);
        assert!(!report.entangled);
    }

    #[test]
    fn score_is_symmetric() {
        let mut config = EntanglementConfig::default();
        config.relate_realms("trade", "craft");
        let a = vector("trade", 1, &["x", "y"], "emergent", 0.4);
        let b = vector("craft", 3, &["y", "z"], "waning", 0.7);

        let ab = score(&config, &a, &b);
        let ba = score(&config, &b, &a);
        assert_eq!(ab.score.to_bits(), ba.score.to_bits());
        assert_eq!(ab.entangled, ba.entangled);
    }

    #[test]
    fn realm_affinity_levels() {
        let mut config = EntanglementConfig::default();
        config.relate_realms("trade", "craft");

        assert_eq!(realm_affinity(&config, "trade", "trade"), 1.0);
        assert_eq!(
            realm_affinity(&config, "craft", "trade"),
            DEFAULT_RELATED_REALM_AFFINITY
        );
        assert_eq!(realm_affinity(&config, "trade", "myth"), 0.0);
    }

    #[test]
    fn adjacency_overlap_excludes_deprecated() {
        let mut a = vector("trade", 1, &["n1", "n2"], "stable", 0.5);
        let b = vector("trade", 1, &["n1", "n2"], "stable", 0.5);
        assert_eq!(adjacency_overlap(&a, &b), 1.0);

        a.adjacency[1].deprecated = true;
        assert_eq!(adjacency_overlap(&a, &b), 0.5);
    }

    #[test]
    fn empty_adjacency_overlap_is_zero() {
        let a = vector("trade", 1, &[], "stable", 0.5);
        let b = vector("trade", 1, &[], "stable", 0.5);
        assert_eq!(adjacency_overlap(&a, &b), 0.0);
    }

    #[test]
    fn horizon_proximity_uses_stage_distance() {
        let config = EntanglementConfig::default();
        assert_eq!(horizon_proximity(&config, "stable", "stable"), 1.0);
        assert_eq!(horizon_proximity(&config, "nascent", "emergent"), 0.5);
        assert_eq!(horizon_proximity(&config, "stable", "unknown"), 0.0);
    }

    #[test]
    fn lineage_affinity_decays() {
        assert_eq!(lineage_affinity(4, 4), 1.0);
        assert_eq!(lineage_affinity(4, 5), 0.5);
        assert_eq!(lineage_affinity(0, 9), 0.1);
    }

    #[test]
    fn upper_bound_never_below_score() {
        let config = EntanglementConfig::default();
        let a = vector("trade", 2, &["n1", "n2"], "stable", 0.9);
        let b = vector("myth", 4, &["n1"], "waning", 0.8);

        let bound = score_upper_bound(&config, &a, &b);
        let full = score(&config, &a, &b).score;
        assert!(bound >= full, "bound {bound} < score {full}");
    }

    #[test]
    fn batch_detection_finds_close_pairs_only() {
        let config = EntanglementConfig::default();
        let candidates = vec![
            vector("trade", 2, &["n1", "n2", "n3", "n4"], "stable", 0.90),
            vector("trade", 2, &["n1", "n2", "n3", "n4", "n5"], "stable", 0.92),
            vector("myth", 9, &[], "archived", 0.05),
        ];

        let found = detect_entangled(&config, &candidates);
        assert_eq!(found.len(), 1);
        let (i, j, report) = &found[0];
        assert_eq!((*i, *j), (0, 1));
        assert!(report.entangled);
    }

    #[test]
    fn pruning_skips_unrelated_realms() {
        // With default weights, an unrelated realm caps the score at 0.8 +
        // a small lineage term, which the bound proves is below threshold.
        let config = EntanglementConfig::default();
        let a = vector("trade", 0, &[], "stable", 0.5);
        let b = vector("myth", 3, &[], "stable", 0.5);
        assert!(score_upper_bound(&config, &a, &b) < config.threshold);
    }
}
