//! # Chain Integrity
//!
//! The rolling hash over each manifestation's ordered event log:
//!
//! ```text
//! H[0] = sha256(canonical(event_0))
//! H[n] = sha256(hex(H[n-1]) || canonical(event_n))
//! ```
//!
//! [`append_event`] is the only way new events enter the log.
//! [`replay_validate`] recomputes the chain from scratch and compares it to
//! the stored head; any retroactive edit, deletion or reordering of events
//! changes the recomputed hash deterministically. There is no partial-tamper
//! case.

use crate::address::hash_bytes;
use crate::canonical::canonical_bytes;
use crate::types::{Event, Manifestation, Stat7Error};
use serde::{Deserialize, Serialize};

/// Prior-state hash carried by a genesis event: 64 zero digits.
pub const GENESIS_PRIOR_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash of a single event's canonical bytes.
pub fn event_hash(event: &Event) -> Result<String, Stat7Error> {
    Ok(hash_bytes(&canonical_bytes(&event.to_value())?))
}

/// Compute the next rolling hash from the previous head and a new event.
///
/// `prev` is `None` only for the first event of a log.
pub fn next_chain_hash(prev: Option<&str>, event: &Event) -> Result<String, Stat7Error> {
    let event_bytes = canonical_bytes(&event.to_value())?;
    match prev {
        None => Ok(hash_bytes(&event_bytes)),
        Some(head) => {
            let mut preimage = Vec::with_capacity(head.len() + event_bytes.len());
            preimage.extend_from_slice(head.as_bytes());
            preimage.extend_from_slice(&event_bytes);
            Ok(hash_bytes(&preimage))
        }
    }
}

/// Append an event to a manifestation's log and advance the chain head.
///
/// This is the single write path for the event log. Returns the new head.
pub fn append_event(
    manifestation: &mut Manifestation,
    event: Event,
) -> Result<&str, Stat7Error> {
    let prev = if manifestation.events.is_empty() {
        None
    } else {
        Some(manifestation.chain_hash.as_str())
    };
    let next = next_chain_hash(prev, &event)?;
    manifestation.events.push(event);
    manifestation.chain_hash = next;
    Ok(&manifestation.chain_hash)
}

// =============================================================================
// REPLAY VALIDATION
// =============================================================================

/// Outcome of a replay validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainStatus {
    /// The stored head matches the recomputed chain.
    Valid,
    /// The stored head does not match; the log was edited, reordered or
    /// truncated after the fact. A reportable integrity alarm, never
    /// auto-corrected.
    Tampered,
}

/// Result of replaying a manifestation's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Valid or Tampered; nothing in between.
    pub status: ChainStatus,
    /// The chain head recomputed from the stored event sequence.
    pub recomputed_hash: String,
    /// The chain head currently stored.
    pub stored_hash: String,
}

impl ReplayReport {
    /// Whether the chain replayed cleanly.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == ChainStatus::Valid
    }
}

/// Recompute the chain from the stored event sequence and compare it to the
/// stored head.
///
/// Read-only and side-effect-free; suitable for periodic auditing
/// independent of the write path.
pub fn replay_validate(manifestation: &Manifestation) -> Result<ReplayReport, Stat7Error> {
    let mut recomputed: Option<String> = None;
    for event in &manifestation.events {
        recomputed = Some(next_chain_hash(recomputed.as_deref(), event)?);
    }
    let recomputed_hash = recomputed.unwrap_or_default();
    let status = if recomputed_hash == manifestation.chain_hash {
        ChainStatus::Valid
    } else {
        ChainStatus::Tampered
    };
    Ok(ReplayReport {
        status,
        recomputed_hash,
        stored_hash: manifestation.chain_hash.clone(),
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{Axis, CoordinateVector, MutationKind, Timestamp};

    fn empty_manifestation() -> Manifestation {
        Manifestation {
            coordinates: CoordinateVector {
                realm: "test".to_string(),
                lineage: 1,
                adjacency: vec![],
                horizon: "stable".to_string(),
                resonance: 0.5,
                velocity: 0.0,
                density: 0.0,
            },
            state: serde_json::json!({}),
            links: vec![],
            events: vec![],
            chain_hash: String::new(),
            address: String::new(),
        }
    }

    fn event(n: u64, kind: MutationKind) -> Event {
        Event {
            event_id: format!("evt-{n}"),
            timestamp: Timestamp::epoch(),
            kind,
            prior_hash: format!("{n:064}"),
            new_hash: format!("{:064}", n + 1),
        }
    }

    #[test]
    fn append_then_replay_is_valid() {
        let mut m = empty_manifestation();
        append_event(&mut m, event(0, MutationKind::Genesis)).unwrap();
        append_event(&mut m, event(1, MutationKind::Mutate(Axis::Resonance))).unwrap();
        append_event(&mut m, event(2, MutationKind::Mutate(Axis::Velocity))).unwrap();

        let report = replay_validate(&m).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.recomputed_hash, report.stored_hash);
    }

    #[test]
    fn edited_event_detected() {
        let mut m = empty_manifestation();
        append_event(&mut m, event(0, MutationKind::Genesis)).unwrap();
        append_event(&mut m, event(1, MutationKind::Mutate(Axis::Resonance))).unwrap();

        m.events[1].new_hash = format!("{:064}", 99);

        let report = replay_validate(&m).unwrap();
        assert_eq!(report.status, ChainStatus::Tampered);
    }

    #[test]
    fn reordered_events_detected() {
        let mut m = empty_manifestation();
        append_event(&mut m, event(0, MutationKind::Genesis)).unwrap();
        append_event(&mut m, event(1, MutationKind::Mutate(Axis::Resonance))).unwrap();

        m.events.swap(0, 1);

        let report = replay_validate(&m).unwrap();
        assert_eq!(report.status, ChainStatus::Tampered);
    }

    #[test]
    fn deleted_event_detected() {
        let mut m = empty_manifestation();
        append_event(&mut m, event(0, MutationKind::Genesis)).unwrap();
        append_event(&mut m, event(1, MutationKind::Mutate(Axis::Resonance))).unwrap();

        m.events.remove(0);

        let report = replay_validate(&m).unwrap();
        assert_eq!(report.status, ChainStatus::Tampered);
    }

    #[test]
    fn edited_timestamp_detected() {
        let mut m = empty_manifestation();
        append_event(&mut m, event(0, MutationKind::Genesis)).unwrap();

        m.events[0].timestamp =
            Timestamp::parse("2024-01-01T00:00:00.001Z").expect("parse");

        let report = replay_validate(&m).unwrap();
        assert_eq!(report.status, ChainStatus::Tampered);
    }

    #[test]
    fn chain_is_order_sensitive() {
        let e0 = event(0, MutationKind::Genesis);
        let e1 = event(1, MutationKind::Mutate(Axis::Density));

        let h0 = next_chain_hash(None, &e0).unwrap();
        let h01 = next_chain_hash(Some(&h0), &e1).unwrap();

        let g0 = next_chain_hash(None, &e1).unwrap();
        let g01 = next_chain_hash(Some(&g0), &e0).unwrap();

        assert_ne!(h01, g01);
    }

    #[test]
    fn event_hash_deterministic() {
        let e = event(3, MutationKind::Decommission);
        assert_eq!(event_hash(&e).unwrap(), event_hash(&e).unwrap());
    }
}
