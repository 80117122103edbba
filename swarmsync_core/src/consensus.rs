//! The "TRUST" Engine - Pluggable Consensus Gate
//!
//! A single-method capability deciding whether a proposed update may enter
//! system state. The tracker only ever talks to the trait, so a real
//! quorum/voting protocol can replace the default without touching it.

use std::collections::BTreeMap;

use crate::model::{AgentState, MetricValue, VoteKey};

/// Admission predicate consulted when an update requires consensus.
///
/// Implementations must be thread-safe; the tracker calls the gate inside
/// its critical section, so `approve` should not block.
pub trait ConsensusGate: Send + Sync {
    fn approve(&self, agent_id: &str, candidate: &AgentState) -> bool;
}

/// Default gate: every update is approved.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ConsensusGate for AcceptAll {
    fn approve(&self, _agent_id: &str, _candidate: &AgentState) -> bool {
        true
    }
}

/// Approves only reports at or above a confidence floor.
#[derive(Debug, Clone, Copy)]
pub struct MinConfidenceGate {
    pub min_confidence: f64,
}

impl MinConfidenceGate {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }
}

impl ConsensusGate for MinConfidenceGate {
    fn approve(&self, _agent_id: &str, candidate: &AgentState) -> bool {
        candidate.confidence >= self.min_confidence
    }
}

impl<F> ConsensusGate for F
where
    F: Fn(&str, &AgentState) -> bool + Send + Sync,
{
    fn approve(&self, agent_id: &str, candidate: &AgentState) -> bool {
        self(agent_id, candidate)
    }
}

// ============================================================================
// CONSENSUS VALUES
// ============================================================================

/// Exact-value majority vote per metric key.
///
/// A metric gets a consensus value when its most frequent value is held by
/// at least `threshold` of *all* known agents (agents lacking the key count
/// as not agreeing). Ties between equally frequent values go to the value
/// first seen in agent order.
pub fn consensus_values<'a>(
    agents: impl IntoIterator<Item = &'a AgentState>,
    threshold: f64,
) -> BTreeMap<String, MetricValue> {
    // metric -> ordered tallies of (value, count)
    let mut tallies: BTreeMap<&str, Vec<(VoteKey, &MetricValue, usize)>> = BTreeMap::new();
    let mut total_agents = 0usize;

    for agent in agents {
        total_agents += 1;
        for (key, value) in &agent.metrics {
            let vote = value.vote_key();
            let entries = tallies.entry(key.as_str()).or_default();
            match entries.iter_mut().find(|(k, _, _)| *k == vote) {
                Some(entry) => entry.2 += 1,
                None => entries.push((vote, value, 1)),
            }
        }
    }

    let mut agreed = BTreeMap::new();
    if total_agents == 0 {
        return agreed;
    }

    for (metric, entries) in tallies {
        let mut best: Option<(&MetricValue, usize)> = None;
        for (_, value, count) in &entries {
            if best.map_or(true, |(_, c)| *count > c) {
                best = Some((*value, *count));
            }
        }
        if let Some((value, count)) = best {
            if count as f64 / total_agents as f64 >= threshold {
                agreed.insert(metric.to_string(), value.clone());
            }
        }
    }

    agreed
}
