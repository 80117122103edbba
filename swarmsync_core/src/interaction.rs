//! Pairwise interaction graph between agents.
//!
//! Stored as a dense keyed map of maps (agent -> agent -> strength) instead
//! of agents pointing at each other. Both directions are always written.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::AgentState;

/// Symmetric agent -> agent -> strength map, strengths in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionGraph {
    edges: BTreeMap<String, BTreeMap<String, f64>>,
}

impl InteractionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full graph for a set of agents.
    ///
    /// `max_spread` is the largest pairwise distance observed so far; it
    /// normalizes the proximity factor.
    pub fn from_agents(agents: &BTreeMap<String, AgentState>, max_spread: f64) -> Self {
        let mut graph = Self::new();
        let states: Vec<&AgentState> = agents.values().collect();
        for (i, a) in states.iter().enumerate() {
            graph.edges.entry(a.agent_id.clone()).or_default();
            for b in &states[i + 1..] {
                graph.set(&a.agent_id, &b.agent_id, interaction_strength(a, b, max_spread));
            }
        }
        graph
    }

    /// Write a strength in both directions.
    pub fn set(&mut self, a: &str, b: &str, strength: f64) {
        let strength = strength.clamp(0.0, 1.0);
        self.edges
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string(), strength);
        self.edges
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string(), strength);
    }

    pub fn strength(&self, a: &str, b: &str) -> Option<f64> {
        self.edges.get(a)?.get(b).copied()
    }

    /// Agents present in the graph.
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn agent_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Unordered pairs `(a, b, strength)` with `a < b`.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.edges.iter().flat_map(|(a, row)| {
            row.iter()
                .filter(move |(b, _)| a.as_str() < b.as_str())
                .map(move |(b, s)| (a.as_str(), b.as_str(), *s))
        })
    }

    /// Connected components of the graph thresholded at `threshold`.
    ///
    /// Edges with strength >= threshold are kept; components are found by
    /// depth-first traversal. Isolated agents form singleton components.
    pub fn components(&self, threshold: f64) -> Vec<BTreeSet<String>> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut components = Vec::new();

        for start in self.edges.keys() {
            if seen.contains(start.as_str()) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut stack = vec![start.as_str()];
            seen.insert(start.as_str());

            while let Some(node) = stack.pop() {
                component.insert(node.to_string());
                let Some(row) = self.edges.get(node) else {
                    continue;
                };
                for (next, strength) in row {
                    if *strength >= threshold && seen.insert(next.as_str()) {
                        stack.push(next.as_str());
                    }
                }
            }
            components.push(component);
        }

        components
    }

    /// Mean strength of the edges at or above `threshold` inside `members`.
    pub fn mean_strength_within(&self, members: &BTreeSet<String>, threshold: f64) -> Option<f64> {
        let strengths: Vec<f64> = self
            .pairs()
            .filter(|(a, b, s)| *s >= threshold && members.contains(*a) && members.contains(*b))
            .map(|(_, _, s)| s)
            .collect();
        crate::stats::mean(&strengths)
    }
}

/// Interaction strength between two agents.
///
/// Average of whichever factors have data:
/// - spatial proximity `1 - min(distance / max_spread, 1)` (both positioned)
/// - metric similarity over shared numeric keys
/// - status equality (always available)
pub fn interaction_strength(a: &AgentState, b: &AgentState, max_spread: f64) -> f64 {
    let mut factors = Vec::with_capacity(3);

    if let (Some(pa), Some(pb)) = (a.position, b.position) {
        let distance = (pa - pb).norm();
        let proximity = if max_spread > f64::EPSILON {
            1.0 - (distance / max_spread).min(1.0)
        } else {
            1.0
        };
        factors.push(proximity);
    }

    let similarities: Vec<f64> = a
        .numeric_metrics()
        .filter_map(|(key, va)| {
            let vb = b.metrics.get(key)?.as_number()?;
            let scale = va.abs().max(vb.abs());
            if scale < f64::EPSILON {
                return Some(1.0);
            }
            Some(1.0 - ((va - vb).abs() / scale).min(1.0))
        })
        .filter(|s| s.is_finite())
        .collect();
    if let Some(similarity) = crate::stats::mean(&similarities) {
        factors.push(similarity);
    }

    factors.push(if a.status == b.status { 1.0 } else { 0.0 });

    crate::stats::mean(&factors).unwrap_or(0.0).clamp(0.0, 1.0)
}
