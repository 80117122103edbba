//! The "TRACKING" Engine - System State Tracker
//!
//! Owns everything the engine knows about the swarm:
//! - per-agent report history (bounded)
//! - the temporal event buffer (sliding window)
//! - the interaction graph
//! - the current `SystemState` snapshot
//!
//! Every update runs the same pipeline inside one critical section:
//! 1. Temporal validation (monotonicity, window, arrival density)
//! 2. Consensus gate (optional per call)
//! 3. History + event buffer append, window purge
//! 4. Interaction graph + snapshot recompute, then publish
//!
//! The snapshot is published as an `Arc` swap, so readers never observe a
//! half-built state and never wait on validation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::debug;

use crate::consensus::{self, AcceptAll, ConsensusGate};
use crate::error::SyncError;
use crate::interaction::InteractionGraph;
use crate::model::{
    AgentState, AgentStatus, GlobalMetrics, PatternKind, PatternSummary, SpatialSpread, SystemState,
};
use crate::temporal::{TemporalConfig, TemporalValidator};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the StateTracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Temporal window and density-gate settings
    pub temporal: TemporalConfig,

    /// Fraction of known agents that must agree on a value (default: 0.67)
    pub consensus_threshold: f64,

    /// Reports kept per agent (default: 100)
    pub max_history_per_agent: usize,

    /// Trailing snapshots kept for inspection (default: 10)
    pub snapshot_history: usize,

    /// Grid cell edge used by the inline spatial grouping summary (default: 1.0)
    pub pattern_cell_size: f64,

    /// Pair strength reported by the inline coupling summary (default: 0.8)
    pub strong_coupling_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            temporal: TemporalConfig::default(),
            consensus_threshold: 0.67,
            max_history_per_agent: 100,
            snapshot_history: 10,
            pattern_cell_size: 1.0,
            strong_coupling_threshold: 0.8,
        }
    }
}

impl TrackerConfig {
    pub fn temporal_window(&self) -> f64 {
        self.temporal.temporal_window
    }
}

// ============================================================================
// EVENTS & STATISTICS
// ============================================================================

/// One accepted report inside the temporal window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalEvent {
    pub timestamp: f64,
    pub agent_id: String,
    pub state: AgentState,
}

/// Admission counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub accepted: u64,
    pub rejected_temporal: u64,
    pub rejected_consensus: u64,
}

// ============================================================================
// STATE TRACKER
// ============================================================================

/// Mutable tracker state, only touched under the tracker mutex.
struct TrackerInner {
    validator: TemporalValidator,

    histories: HashMap<String, VecDeque<AgentState>>,

    /// Accepted events within the window (arrival order)
    events: VecDeque<TemporalEvent>,

    /// Latest accepted report per agent
    latest: BTreeMap<String, AgentState>,

    /// Largest pairwise distance ever observed (proximity normalizer)
    max_spread: f64,

    /// Latest accepted timestamp across all agents
    clock: f64,

    recent: VecDeque<Arc<SystemState>>,

    stats: TrackerStats,
}

/// Thread-safe owner of the system-wide view.
pub struct StateTracker {
    config: TrackerConfig,

    gate: Arc<dyn ConsensusGate>,

    inner: Mutex<TrackerInner>,

    snapshot: RwLock<Arc<SystemState>>,
}

impl StateTracker {
    /// Create a tracker with the default (accept-all) consensus gate.
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_gate(config, Arc::new(AcceptAll))
    }

    pub fn with_defaults() -> Self {
        Self::new(TrackerConfig::default())
    }

    /// Create a tracker with a custom consensus gate.
    pub fn with_gate(config: TrackerConfig, gate: Arc<dyn ConsensusGate>) -> Self {
        let inner = TrackerInner {
            validator: TemporalValidator::new(config.temporal.clone()),
            histories: HashMap::new(),
            events: VecDeque::new(),
            latest: BTreeMap::new(),
            max_spread: 0.0,
            clock: f64::NEG_INFINITY,
            recent: VecDeque::new(),
            stats: TrackerStats::default(),
        };

        Self {
            config,
            gate,
            inner: Mutex::new(inner),
            snapshot: RwLock::new(Arc::new(SystemState::default())),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn lock_inner(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // UPDATE PIPELINE
    // ========================================================================

    /// Submit a report; `true` if it was admitted into system state.
    pub fn update_agent_state(&self, agent_id: &str, state: AgentState, require_consensus: bool) -> bool {
        match self.try_update_agent_state(agent_id, state, require_consensus) {
            Ok(_) => true,
            Err(err) => {
                debug!("update rejected: {}", err);
                false
            }
        }
    }

    /// Submit a report and get the new snapshot, or the reason it was refused.
    ///
    /// A refused update leaves the tracker untouched.
    pub fn try_update_agent_state(
        &self,
        agent_id: &str,
        mut state: AgentState,
        require_consensus: bool,
    ) -> Result<Arc<SystemState>, SyncError> {
        let mut inner = self.lock_inner();

        // Stage 1: temporal plausibility
        if let Err(reason) = inner.validator.validate(agent_id, &state) {
            inner.stats.rejected_temporal += 1;
            return Err(SyncError::TemporalInconsistency {
                agent_id: agent_id.to_string(),
                reason,
            });
        }

        // Stage 2: consensus gate
        if require_consensus && !self.gate.approve(agent_id, &state) {
            inner.stats.rejected_consensus += 1;
            return Err(SyncError::ConsensusRejected {
                agent_id: agent_id.to_string(),
            });
        }

        // The key the report was submitted under is authoritative
        if state.agent_id != agent_id {
            debug!("re-keying report from {} under {}", state.agent_id, agent_id);
            state.agent_id = agent_id.to_string();
        }

        // Stage 3: history + event buffer
        inner.validator.commit(agent_id, state.timestamp);
        inner.clock = inner.clock.max(state.timestamp);
        inner.stats.accepted += 1;

        let history = inner.histories.entry(agent_id.to_string()).or_default();
        if history.len() >= self.config.max_history_per_agent.max(1) {
            history.pop_front();
        }
        history.push_back(state.clone());

        inner.events.push_back(TemporalEvent {
            timestamp: state.timestamp,
            agent_id: agent_id.to_string(),
            state: state.clone(),
        });
        let horizon = inner.clock - self.config.temporal_window();
        inner.events.retain(|e| e.timestamp >= horizon);

        inner.latest.insert(agent_id.to_string(), state);

        // Stage 4: graph + snapshot
        inner.max_spread = inner.max_spread.max(max_pairwise_distance(&inner.latest));
        let snapshot = Arc::new(self.build_snapshot(&inner));

        if inner.recent.len() >= self.config.snapshot_history.max(1) {
            inner.recent.pop_front();
        }
        inner.recent.push_back(Arc::clone(&snapshot));

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);

        Ok(snapshot)
    }

    /// Recompute the full system view from the tracker's current contents.
    fn build_snapshot(&self, inner: &TrackerInner) -> SystemState {
        let agents = inner.latest.clone();
        let interactions = InteractionGraph::from_agents(&agents, inner.max_spread);

        let total_agents = agents.len();
        let active_agents = agents
            .values()
            .filter(|a| a.status == AgentStatus::Active)
            .count();
        let confidences: Vec<f64> = agents.values().map(|a| a.confidence).collect();
        let window = self.config.temporal_window();
        let update_rate = if window > 0.0 {
            inner.events.len() as f64 / window
        } else {
            0.0
        };

        let global_metrics = GlobalMetrics {
            total_agents,
            active_agents,
            mean_confidence: crate::stats::mean(&confidences).unwrap_or(0.0),
            update_rate,
            spatial_spread: spatial_spread(&agents),
        };

        let consensus_values =
            consensus::consensus_values(agents.values(), self.config.consensus_threshold);

        let emergent_patterns = self.summarize_patterns(&agents, &interactions);

        SystemState {
            timestamp: inner.clock,
            agents,
            global_metrics,
            consensus_values,
            emergent_patterns,
            interactions,
        }
    }

    /// Cheap inline summaries, computed in the same pass as the snapshot.
    fn summarize_patterns(
        &self,
        agents: &BTreeMap<String, AgentState>,
        interactions: &InteractionGraph,
    ) -> Vec<PatternSummary> {
        let mut patterns = Vec::new();

        // Spatial grouping: agents sharing a grid cell
        let cell = self.config.pattern_cell_size;
        if cell > 0.0 {
            let mut cells: BTreeMap<(i64, i64, i64), Vec<String>> = BTreeMap::new();
            let mut positioned = 0usize;
            for agent in agents.values() {
                if let Some(p) = agent.position {
                    positioned += 1;
                    let key = (
                        (p.x / cell).floor() as i64,
                        (p.y / cell).floor() as i64,
                        (p.z / cell).floor() as i64,
                    );
                    cells.entry(key).or_default().push(agent.agent_id.clone());
                }
            }
            let groups: Vec<Vec<String>> = cells.into_values().filter(|g| g.len() >= 2).collect();
            if !groups.is_empty() {
                let members: Vec<String> = groups.iter().flatten().cloned().collect();
                patterns.push(PatternSummary {
                    kind: PatternKind::SpatialGrouping,
                    description: format!("{} spatial clusters observed", groups.len()),
                    strength: members.len() as f64 / positioned as f64,
                    agents: members,
                });
            }
        }

        // Status alignment: a non-active status held by at least half the swarm
        if agents.len() >= 2 {
            for status in [AgentStatus::Idle, AgentStatus::Error] {
                let holders: Vec<String> = agents
                    .values()
                    .filter(|a| a.status == status)
                    .map(|a| a.agent_id.clone())
                    .collect();
                if holders.len() * 2 >= agents.len() {
                    patterns.push(PatternSummary {
                        kind: PatternKind::StatusAlignment,
                        description: format!(
                            "{} of {} agents report {}",
                            holders.len(),
                            agents.len(),
                            status.as_str()
                        ),
                        strength: holders.len() as f64 / agents.len() as f64,
                        agents: holders,
                    });
                }
            }
        }

        // Strong coupling: pairs above threshold
        let threshold = self.config.strong_coupling_threshold;
        let strong: Vec<(&str, &str, f64)> =
            interactions.pairs().filter(|(_, _, s)| *s >= threshold).collect();
        if !strong.is_empty() {
            let mut members: Vec<String> = strong
                .iter()
                .flat_map(|(a, b, _)| [a.to_string(), b.to_string()])
                .collect();
            members.sort();
            members.dedup();
            let strengths: Vec<f64> = strong.iter().map(|(_, _, s)| *s).collect();
            patterns.push(PatternSummary {
                kind: PatternKind::StrongCoupling,
                description: format!("{} strongly coupled pairs", strong.len()),
                strength: crate::stats::mean(&strengths).unwrap_or(0.0),
                agents: members,
            });
        }

        patterns
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// The latest fully built snapshot.
    pub fn current_state(&self) -> Arc<SystemState> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Trailing snapshots, oldest first.
    pub fn recent_states(&self) -> Vec<Arc<SystemState>> {
        self.lock_inner().recent.iter().cloned().collect()
    }

    /// Accepted reports of one agent, oldest first.
    pub fn agent_history(&self, agent_id: &str) -> Vec<AgentState> {
        self.lock_inner()
            .histories
            .get(agent_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Latest accepted report of one agent.
    pub fn latest_state(&self, agent_id: &str) -> Option<AgentState> {
        self.current_state().agents.get(agent_id).cloned()
    }

    /// Events currently inside the temporal window.
    pub fn events(&self) -> Vec<TemporalEvent> {
        self.lock_inner().events.iter().cloned().collect()
    }

    pub fn event_count(&self) -> usize {
        self.lock_inner().events.len()
    }

    pub fn interaction_graph(&self) -> InteractionGraph {
        self.current_state().interactions.clone()
    }

    pub fn known_agents(&self) -> Vec<String> {
        self.current_state().agents.keys().cloned().collect()
    }

    pub fn stats(&self) -> TrackerStats {
        self.lock_inner().stats
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn max_pairwise_distance(agents: &BTreeMap<String, AgentState>) -> f64 {
    let positions: Vec<_> = agents.values().filter_map(|a| a.position).collect();
    let mut max = 0.0f64;
    for (i, a) in positions.iter().enumerate() {
        for b in &positions[i + 1..] {
            max = max.max((a - b).norm());
        }
    }
    max
}

fn spatial_spread(agents: &BTreeMap<String, AgentState>) -> Option<SpatialSpread> {
    let positions: Vec<_> = agents.values().filter_map(|a| a.position).collect();
    if positions.is_empty() {
        return None;
    }
    let n = positions.len() as f64;
    let centroid = positions.iter().sum::<nalgebra::Vector3<f64>>() / n;
    let variance = positions
        .iter()
        .map(|p| (p - centroid).component_mul(&(p - centroid)))
        .sum::<nalgebra::Vector3<f64>>()
        / n;
    Some(SpatialSpread {
        centroid,
        std: variance.map(f64::sqrt),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricValue;
    use crate::temporal::TemporalViolation;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn tracker_with_window(window: f64) -> StateTracker {
        StateTracker::new(TrackerConfig {
            temporal: TemporalConfig {
                temporal_window: window,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_tracker_creation() {
        let tracker = StateTracker::with_defaults();
        assert!(tracker.known_agents().is_empty());
        assert_eq!(tracker.current_state().global_metrics.total_agents, 0);
    }

    #[test]
    fn test_monotonic_updates_admitted() {
        let tracker = StateTracker::with_defaults();
        for t in [0.0, 1.0, 2.0, 3.0] {
            assert!(tracker.update_agent_state("a", AgentState::new("a", t), true));
        }
        assert_eq!(tracker.agent_history("a").len(), 4);
        assert_eq!(tracker.current_state().timestamp, 3.0);
    }

    #[test]
    fn test_backward_update_rejected_without_mutation() {
        let tracker = StateTracker::with_defaults();
        assert!(tracker.update_agent_state("a", AgentState::new("a", 2.0), true));
        let before = tracker.current_state();

        let err = tracker
            .try_update_agent_state("a", AgentState::new("a", 1.0), true)
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::TemporalInconsistency {
                reason: TemporalViolation::Backward { .. },
                ..
            }
        ));
        assert!(Arc::ptr_eq(&before, &tracker.current_state()));
        assert_eq!(tracker.agent_history("a").len(), 1);
        assert_eq!(tracker.stats().rejected_temporal, 1);
    }

    #[test]
    fn test_non_finite_timestamp_cannot_unlock_backward_reports() {
        let tracker = StateTracker::with_defaults();
        assert!(tracker.update_agent_state("a", AgentState::new("a", 10.0), true));

        let err = tracker
            .try_update_agent_state("a", AgentState::new("a", f64::NAN), true)
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::TemporalInconsistency {
                reason: TemporalViolation::NonFinite { .. },
                ..
            }
        ));
        assert!(!tracker.update_agent_state("a", AgentState::new("a", f64::INFINITY), true));
        assert!(!tracker.update_agent_state("a", AgentState::new("a", 1.0), true));

        let history: Vec<f64> = tracker.agent_history("a").iter().map(|s| s.timestamp).collect();
        assert_eq!(history, vec![10.0]);
        assert_eq!(tracker.current_state().timestamp, 10.0);
        assert_eq!(tracker.event_count(), 1);
        assert_eq!(tracker.stats().rejected_temporal, 3);
    }

    #[test]
    fn test_window_exceeded_rejected() {
        let tracker = tracker_with_window(5.0);
        assert!(tracker.update_agent_state("a", AgentState::new("a", 0.0), true));
        assert!(!tracker.update_agent_state("a", AgentState::new("a", 5.5), true));
        assert!(tracker.update_agent_state("a", AgentState::new("a", 4.0), true));
    }

    #[test]
    fn test_gate_rejection_leaves_tracker_unchanged() {
        let gate = |_: &str, s: &AgentState| s.confidence > 0.5;
        let tracker = StateTracker::with_gate(TrackerConfig::default(), Arc::new(gate));

        let shaky = AgentState::new("a", 0.0).with_confidence(0.2);
        assert!(!tracker.update_agent_state("a", shaky.clone(), true));
        assert!(tracker.known_agents().is_empty());
        assert_eq!(tracker.event_count(), 0);
        assert_eq!(tracker.stats().rejected_consensus, 1);

        // Same report without requiring consensus is admitted
        assert!(tracker.update_agent_state("a", shaky, false));
        assert_eq!(tracker.known_agents(), vec!["a".to_string()]);
    }

    #[test]
    fn test_consensus_values_quorum() {
        let tracker = StateTracker::with_defaults();
        for i in 0..10 {
            let tier = if i < 7 { "senior" } else { "junior" };
            let id = format!("agent-{}", i);
            tracker.update_agent_state(&id, AgentState::new(id.clone(), 0.0).with_metric("tier", tier), true);
        }
        let state = tracker.current_state();
        assert_eq!(state.consensus_values.get("tier"), Some(&MetricValue::from("senior")));
    }

    #[test]
    fn test_consensus_values_absent_below_threshold() {
        let tracker = StateTracker::with_defaults();
        for i in 0..10 {
            let tier = if i < 6 { "senior" } else { "junior" };
            let id = format!("agent-{}", i);
            tracker.update_agent_state(&id, AgentState::new(id.clone(), 0.0).with_metric("tier", tier), true);
        }
        assert!(!tracker.current_state().consensus_values.contains_key("tier"));
    }

    #[test]
    fn test_event_buffer_purged_by_window() {
        let tracker = tracker_with_window(10.0);
        tracker.update_agent_state("a", AgentState::new("a", 0.0), true);
        tracker.update_agent_state("b", AgentState::new("b", 5.0), true);
        assert_eq!(tracker.event_count(), 2);

        tracker.update_agent_state("b", AgentState::new("b", 12.0), true);
        let events = tracker.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.timestamp >= 2.0));

        // 2 events / 10s window
        assert_relative_eq!(tracker.current_state().global_metrics.update_rate, 0.2);
    }

    #[test]
    fn test_global_metrics() {
        let tracker = StateTracker::with_defaults();
        tracker.update_agent_state(
            "a",
            AgentState::new("a", 0.0).with_position(Vector3::new(0.0, 0.0, 0.0)).with_confidence(0.5),
            true,
        );
        tracker.update_agent_state(
            "b",
            AgentState::new("b", 0.0)
                .with_position(Vector3::new(2.0, 0.0, 0.0))
                .with_status(AgentStatus::Idle),
            true,
        );
        tracker.update_agent_state("c", AgentState::new("c", 0.0), true);

        let metrics = tracker.current_state().global_metrics.clone();
        assert_eq!(metrics.total_agents, 3);
        assert_eq!(metrics.active_agents, 2);
        assert_relative_eq!(metrics.mean_confidence, 2.5 / 3.0);

        let spread = metrics.spatial_spread.unwrap();
        assert_relative_eq!(spread.centroid.x, 1.0);
        assert_relative_eq!(spread.std.x, 1.0);
        assert_relative_eq!(spread.std.y, 0.0);
    }

    #[test]
    fn test_no_spread_without_positions() {
        let tracker = StateTracker::with_defaults();
        tracker.update_agent_state("a", AgentState::new("a", 0.0), true);
        assert!(tracker.current_state().global_metrics.spatial_spread.is_none());
    }

    #[test]
    fn test_interaction_graph_updated() {
        let tracker = StateTracker::with_defaults();
        tracker.update_agent_state(
            "a",
            AgentState::new("a", 0.0).with_position(Vector3::new(0.0, 0.0, 0.0)),
            true,
        );
        tracker.update_agent_state(
            "b",
            AgentState::new("b", 0.0).with_position(Vector3::new(4.0, 0.0, 0.0)),
            true,
        );
        tracker.update_agent_state(
            "c",
            AgentState::new("c", 0.0).with_position(Vector3::new(1.0, 0.0, 0.0)),
            true,
        );

        let graph = tracker.interaction_graph();
        assert_eq!(graph.agent_count(), 3);
        // max spread 4: a-c proximity 0.75, status equal -> 0.875
        assert_relative_eq!(graph.strength("a", "c").unwrap(), 0.875);
        assert_relative_eq!(graph.strength("c", "a").unwrap(), 0.875);
        // a-b at the max spread: proximity 0 -> 0.5
        assert_relative_eq!(graph.strength("a", "b").unwrap(), 0.5);
    }

    #[test]
    fn test_inline_patterns() {
        let tracker = StateTracker::with_defaults();
        for (id, x) in [("a", 0.1), ("b", 0.4), ("c", 9.0)] {
            tracker.update_agent_state(
                id,
                AgentState::new(id, 0.0)
                    .with_position(Vector3::new(x, 0.2, 0.2))
                    .with_status(AgentStatus::Error),
                true,
            );
        }
        let patterns = &tracker.current_state().emergent_patterns;

        let spatial = patterns
            .iter()
            .find(|p| p.kind == PatternKind::SpatialGrouping)
            .unwrap();
        assert_eq!(spatial.description, "1 spatial clusters observed");
        assert_eq!(spatial.agents, vec!["a", "b"]);

        assert!(patterns.iter().any(|p| p.kind == PatternKind::StatusAlignment));
        assert!(patterns.iter().any(|p| p.kind == PatternKind::StrongCoupling));
    }

    #[test]
    fn test_history_and_snapshots_bounded() {
        let tracker = StateTracker::new(TrackerConfig {
            max_history_per_agent: 3,
            snapshot_history: 2,
            ..Default::default()
        });
        for t in 0..6 {
            tracker.update_agent_state("a", AgentState::new("a", t as f64), true);
        }
        let history = tracker.agent_history("a");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].timestamp, 3.0);
        assert_eq!(tracker.recent_states().len(), 2);
    }

    #[test]
    fn test_report_rekeyed_under_submitted_id() {
        let tracker = StateTracker::with_defaults();
        tracker.update_agent_state("real", AgentState::new("alias", 0.0), true);
        assert_eq!(tracker.latest_state("real").unwrap().agent_id, "real");
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let tracker = Arc::new(StateTracker::with_defaults());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let id = format!("agent-{}", i);
                    for t in 0..25 {
                        let state = AgentState::new(id.clone(), t as f64).with_metric("load", i as f64);
                        assert!(tracker.update_agent_state(&id, state, true));
                        // Every observed snapshot is internally consistent
                        let snap = tracker.current_state();
                        assert_eq!(snap.global_metrics.total_agents, snap.agents.len());
                        assert_eq!(snap.interactions.agent_count(), snap.agents.len());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = tracker.current_state();
        assert_eq!(state.agents.len(), 8);
        assert_eq!(state.interactions.pairs().count(), 28);
        assert_eq!(tracker.stats().accepted, 200);
    }
}
