//! The "EMERGENCE" Engine - Cross-Agent Pattern Detection
//!
//! Mines a sliding buffer of system snapshots for patterns no single agent
//! reports on its own. Four independent passes run on every call:
//!
//! | Pass        | Emits                                         |
//! |-------------|-----------------------------------------------|
//! | spatial     | `spatial_clustering`                          |
//! | temporal    | `periodic_updates`, `synchronized_updates`    |
//! | interaction | `strong_interaction_group`                    |
//! | metric      | `metric_clustering`, `metric_convergence`     |
//!
//! Results are unioned, filtered by confidence, deduplicated by
//! `(type, agents)` and only reported at onset: a signature that was
//! already active in the previous call stays silent until it dissolves.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::model::{BehaviorType, EmergentBehavior, SystemState};
use crate::stats;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the EmergentDetector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Snapshot buffer span in seconds (default: 60.0)
    pub temporal_window: f64,

    /// Smallest group worth reporting (default: 3)
    pub min_agents: usize,

    /// Behaviors below this are dropped (default: 0.7)
    pub min_confidence: f64,

    /// Edge strength kept when thresholding the interaction graph (default: 0.7)
    pub interaction_threshold: f64,

    /// DBSCAN neighbourhood radius in standardized units (default: 0.5)
    pub cluster_eps: f64,

    /// DBSCAN core size for the 1-D metric pass (default: 2)
    pub metric_min_points: usize,

    /// Interval relative std below which an agent is periodic (default: 0.1)
    pub periodic_rsd: f64,

    /// Mean offset in seconds below which two agents are phase-linked (default: 0.1)
    pub sync_offset: f64,

    /// Value relative std below which a metric has converged (default: 0.1)
    pub convergence_rsd: f64,

    /// Cumulative behaviors kept (default: 1000)
    pub max_history: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            temporal_window: 60.0,
            min_agents: 3,
            min_confidence: 0.7,
            interaction_threshold: 0.7,
            cluster_eps: 0.5,
            metric_min_points: 2,
            periodic_rsd: 0.1,
            sync_offset: 0.1,
            convergence_rsd: 0.1,
            max_history: 1000,
        }
    }
}

const SPATIAL_CONFIDENCE: f64 = 0.8;
const PERIODIC_CONFIDENCE: f64 = 0.9;
const SYNC_CONFIDENCE: f64 = 0.85;
const METRIC_CLUSTER_CONFIDENCE: f64 = 0.75;
const CONVERGENCE_CONFIDENCE: f64 = 0.9;

type Signature = (BehaviorType, Vec<String>);

// ============================================================================
// DETECTOR
// ============================================================================

/// Stateful pattern detector fed one snapshot at a time.
pub struct EmergentDetector {
    config: DetectorConfig,

    /// Submitted snapshots within the window, oldest first
    buffer: VecDeque<SystemState>,

    /// Everything ever emitted (bounded)
    history: VecDeque<EmergentBehavior>,

    /// Per-type id counters
    counters: BTreeMap<BehaviorType, u64>,

    /// Signatures seen in the previous call
    active: HashSet<Signature>,

    failed_passes: u64,

    total_emitted: u64,
}

impl EmergentDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            buffer: VecDeque::new(),
            history: VecDeque::new(),
            counters: BTreeMap::new(),
            active: HashSet::new(),
            failed_passes: 0,
            total_emitted: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DetectorConfig::default())
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Cumulative emitted behaviors, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &EmergentBehavior> {
        self.history.iter()
    }

    pub fn buffered_states(&self) -> usize {
        self.buffer.len()
    }

    /// Number of passes that failed and had their results dropped.
    pub fn failed_passes(&self) -> u64 {
        self.failed_passes
    }

    pub fn total_emitted(&self) -> u64 {
        self.total_emitted
    }

    /// Buffer a snapshot and return the behaviors that newly appeared.
    pub fn analyze_state(&mut self, state: &SystemState) -> Vec<EmergentBehavior> {
        self.buffer_state(state);

        let passes = [
            ("spatial", self.detect_spatial(state)),
            ("temporal", self.detect_temporal(state.timestamp)),
            ("interaction", self.detect_interaction(state)),
            ("metric", self.detect_metric(state)),
        ];

        let mut candidates = Vec::new();
        for (pass, result) in passes {
            match result {
                Ok(found) => candidates.extend(found),
                Err(err) => {
                    warn!("Dropping {} pass results: {}", pass, err);
                    self.failed_passes += 1;
                }
            }
        }

        // Confidence filter, best first
        candidates.retain(|b| b.confidence >= self.config.min_confidence);
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        // Dedup within the call
        let mut seen: HashSet<Signature> = HashSet::new();
        candidates.retain(|b| seen.insert(b.signature()));

        // Onset only: suppress what was already active last call
        let previous = std::mem::replace(&mut self.active, seen);
        let mut emitted = Vec::new();
        for mut behavior in candidates {
            if previous.contains(&behavior.signature()) {
                debug!("Suppressing ongoing {} {:?}", behavior.behavior_type, behavior.agents_involved);
                continue;
            }

            let counter = self.counters.entry(behavior.behavior_type).or_insert(0);
            *counter += 1;
            behavior.behavior_id = format!("{}_{}", behavior.behavior_type.id_prefix(), counter);

            info!(
                "Detected {} ({:.2}): {}",
                behavior.behavior_id, behavior.confidence, behavior.description
            );

            if self.history.len() >= self.config.max_history.max(1) {
                self.history.pop_front();
            }
            self.history.push_back(behavior.clone());
            emitted.push(behavior);
        }

        self.total_emitted += emitted.len() as u64;
        emitted
    }

    fn buffer_state(&mut self, state: &SystemState) {
        match self.buffer.back_mut() {
            // Same instant: no new data, refresh in place
            Some(last) if last.timestamp == state.timestamp => *last = state.clone(),
            _ => self.buffer.push_back(state.clone()),
        }

        let newest = self
            .buffer
            .iter()
            .map(|s| s.timestamp)
            .fold(f64::NEG_INFINITY, f64::max);
        let horizon = newest - self.config.temporal_window;
        self.buffer.retain(|s| s.timestamp >= horizon);
    }

    // ========================================================================
    // PASS 1: SPATIAL
    // ========================================================================

    fn detect_spatial(&self, state: &SystemState) -> Result<Vec<EmergentBehavior>, SyncError> {
        let positioned: Vec<(&String, nalgebra::Vector3<f64>)> = state
            .agents
            .iter()
            .filter_map(|(id, agent)| agent.position.map(|p| (id, p)))
            .collect();

        if positioned.len() < self.config.min_agents {
            return Ok(Vec::new());
        }
        if let Some((id, _)) = positioned.iter().find(|(_, p)| !p.iter().all(|v| v.is_finite())) {
            return Err(SyncError::detection("spatial", format!("non-finite position for {}", id)));
        }

        let points: Vec<DVector<f64>> = positioned
            .iter()
            .map(|(_, p)| DVector::from_column_slice(p.as_slice()))
            .collect();
        let labels = stats::dbscan(
            &stats::standardize(&points),
            self.config.cluster_eps,
            self.config.min_agents,
        );

        let mut found = Vec::new();
        for members in stats::cluster_members(&labels) {
            if members.len() < self.config.min_agents {
                continue;
            }

            let axis = |k: usize| -> Vec<f64> { members.iter().map(|&i| positioned[i].1[k]).collect() };
            let (xs, ys, zs) = (axis(0), axis(1), axis(2));
            let centroid = [
                stats::mean(&xs).unwrap_or(0.0),
                stats::mean(&ys).unwrap_or(0.0),
                stats::mean(&zs).unwrap_or(0.0),
            ];

            let agents = members.iter().map(|&i| positioned[i].0.clone());
            let behavior = EmergentBehavior::new(
                BehaviorType::SpatialClustering,
                format!(
                    "{} agents clustered around ({:.2}, {:.2}, {:.2})",
                    members.len(),
                    centroid[0],
                    centroid[1],
                    centroid[2]
                ),
                SPATIAL_CONFIDENCE,
                agents,
                state.timestamp,
            )
            .with_metric("centroid_x", centroid[0])
            .with_metric("centroid_y", centroid[1])
            .with_metric("centroid_z", centroid[2])
            .with_metric("spread_x", stats::std_dev(&xs).unwrap_or(0.0))
            .with_metric("spread_y", stats::std_dev(&ys).unwrap_or(0.0))
            .with_metric("spread_z", stats::std_dev(&zs).unwrap_or(0.0))
            .with_metric("size", members.len() as f64);

            found.push(behavior);
        }

        Ok(found)
    }

    // ========================================================================
    // PASS 2: TEMPORAL
    // ========================================================================

    fn detect_temporal(&self, now: f64) -> Result<Vec<EmergentBehavior>, SyncError> {
        if self.buffer.len() < 3 {
            return Ok(Vec::new());
        }

        // Distinct observed report times per agent
        let mut timelines: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for snapshot in &self.buffer {
            for (id, agent) in &snapshot.agents {
                if !agent.timestamp.is_finite() {
                    return Err(SyncError::detection("temporal", format!("non-finite timestamp for {}", id)));
                }
                timelines.entry(id.as_str()).or_default().push(agent.timestamp);
            }
        }
        for times in timelines.values_mut() {
            times.sort_by(f64::total_cmp);
            times.dedup();
        }

        let mut found = Vec::new();

        // Periodic agents
        for (id, times) in &timelines {
            let intervals: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
            if intervals.len() < 2 {
                continue;
            }
            let Some(rsd) = stats::relative_std(&intervals) else {
                continue;
            };
            if rsd < self.config.periodic_rsd {
                let period = stats::mean(&intervals).unwrap_or(0.0);
                let std = stats::std_dev(&intervals).unwrap_or(0.0);
                found.push(
                    EmergentBehavior::new(
                        BehaviorType::PeriodicUpdates,
                        format!("{} reports every {:.3}s", id, period),
                        PERIODIC_CONFIDENCE,
                        [id.to_string()],
                        now,
                    )
                    .with_metric("period", period)
                    .with_metric("period_std", std),
                );
            }
        }

        // Phase-linked groups
        let ids: Vec<&str> = timelines.keys().copied().collect();
        let mut groups = DisjointSet::new(ids.len());
        let mut links: Vec<(usize, usize, f64)> = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let offset = phase_offset(&timelines[ids[i]], &timelines[ids[j]]);
                if offset < self.config.sync_offset {
                    groups.union(i, j);
                    links.push((i, j, offset));
                }
            }
        }

        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..ids.len() {
            members.entry(groups.find(i)).or_default().push(i);
        }

        for (root, group) in members {
            if group.len() < self.config.min_agents {
                continue;
            }
            let offsets: Vec<f64> = links
                .iter()
                .filter(|(i, _, _)| groups.find(*i) == root)
                .map(|(_, _, o)| *o)
                .collect();
            let mean_phase = stats::mean(&offsets).unwrap_or(0.0);
            found.push(
                EmergentBehavior::new(
                    BehaviorType::SynchronizedUpdates,
                    format!("{} agents update within {:.0}ms of each other", group.len(), mean_phase * 1000.0),
                    SYNC_CONFIDENCE,
                    group.iter().map(|&i| ids[i].to_string()),
                    now,
                )
                .with_metric("mean_phase_difference", mean_phase)
                .with_metric("group_size", group.len() as f64),
            );
        }

        Ok(found)
    }

    // ========================================================================
    // PASS 3: INTERACTION
    // ========================================================================

    fn detect_interaction(&self, state: &SystemState) -> Result<Vec<EmergentBehavior>, SyncError> {
        let graph = &state.interactions;
        if graph.agent_count() < self.config.min_agents {
            return Ok(Vec::new());
        }
        if let Some((a, b, _)) = graph.pairs().find(|(_, _, s)| !s.is_finite()) {
            return Err(SyncError::detection("interaction", format!("non-finite strength {}-{}", a, b)));
        }

        let threshold = self.config.interaction_threshold;
        let mut found = Vec::new();
        for component in graph.components(threshold) {
            if component.len() < self.config.min_agents {
                continue;
            }
            let strength = graph.mean_strength_within(&component, threshold).unwrap_or(0.0);
            let size = component.len();
            found.push(
                EmergentBehavior::new(
                    BehaviorType::StrongInteractionGroup,
                    format!("{} agents strongly interacting (mean strength {:.2})", size, strength),
                    strength,
                    component,
                    state.timestamp,
                )
                .with_metric("group_size", size as f64)
                .with_metric("mean_strength", strength),
            );
        }

        Ok(found)
    }

    // ========================================================================
    // PASS 4: METRIC
    // ========================================================================

    fn detect_metric(&self, state: &SystemState) -> Result<Vec<EmergentBehavior>, SyncError> {
        let mut by_key: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
        for (id, agent) in &state.agents {
            for (key, value) in agent.numeric_metrics() {
                by_key.entry(key).or_default().push((id.as_str(), value));
            }
        }

        let mut found = Vec::new();
        for (key, samples) in by_key {
            if samples.len() < self.config.min_agents {
                continue;
            }
            if let Some((id, _)) = samples.iter().find(|(_, v)| !v.is_finite()) {
                return Err(SyncError::detection("metric", format!("non-finite '{}' from {}", key, id)));
            }
            let values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();

            // Divergence into distinct groups
            if values.len() >= 5 {
                let points: Vec<DVector<f64>> =
                    values.iter().map(|v| DVector::from_element(1, *v)).collect();
                let labels = stats::dbscan(
                    &stats::standardize(&points),
                    self.config.cluster_eps,
                    self.config.metric_min_points,
                );
                let clusters = stats::cluster_members(&labels);
                if clusters.len() >= 2 {
                    let groups: Vec<Vec<&str>> = clusters
                        .iter()
                        .map(|c| c.iter().map(|&i| samples[i].0).collect())
                        .collect();
                    let agents: BTreeSet<String> =
                        groups.iter().flatten().map(|id| id.to_string()).collect();
                    let noise = labels.iter().filter(|l| l.is_none()).count();
                    found.push(
                        EmergentBehavior::new(
                            BehaviorType::MetricClustering,
                            format!("Metric '{}' splits into {} groups", key, clusters.len()),
                            METRIC_CLUSTER_CONFIDENCE,
                            agents,
                            state.timestamp,
                        )
                        .with_metric("num_clusters", clusters.len() as f64)
                        .with_metric("noise_points", noise as f64)
                        .with_context("metric", json!(key))
                        .with_context("clusters", json!(groups)),
                    );
                }
            }

            // Convergence on a common value
            if let Some(rsd) = stats::relative_std(&values) {
                if rsd < self.config.convergence_rsd {
                    let mean = stats::mean(&values).unwrap_or(0.0);
                    found.push(
                        EmergentBehavior::new(
                            BehaviorType::MetricConvergence,
                            format!("Metric '{}' converged around {:.3}", key, mean),
                            CONVERGENCE_CONFIDENCE,
                            samples.iter().map(|(id, _)| id.to_string()),
                            state.timestamp,
                        )
                        .with_metric("mean", mean)
                        .with_metric("std", stats::std_dev(&values).unwrap_or(0.0))
                        .with_metric("relative_std", rsd)
                        .with_context("metric", json!(key)),
                    );
                }
            }
        }

        Ok(found)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Symmetric mean minimal offset between two report timelines.
fn phase_offset(a: &[f64], b: &[f64]) -> f64 {
    let directed = |from: &[f64], to: &[f64]| -> f64 {
        let minima: Vec<f64> = from
            .iter()
            .map(|t| to.iter().map(|u| (t - u).abs()).fold(f64::INFINITY, f64::min))
            .collect();
        stats::mean(&minima).unwrap_or(f64::INFINITY)
    };
    (directed(a, b) + directed(b, a)) / 2.0
}

/// Union-find over agent indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = ra.min(rb);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
