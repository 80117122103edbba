//! Shared data model: agent reports, system snapshots, detected behaviors.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::interaction::InteractionGraph;

// ============================================================================
// METRIC VALUES
// ============================================================================

/// A single agent-reported metric.
///
/// Agents report arbitrary keys; values are either numeric or free text.
/// Statistical passes only look at [`MetricValue::Number`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric view of the value, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Text(_) => None,
        }
    }

    /// Key used for exact-value voting.
    ///
    /// Numbers compare by bit pattern (with `-0.0` folded into `0.0`) so that
    /// two agents only agree when they report the very same value.
    pub(crate) fn vote_key(&self) -> VoteKey {
        match self {
            MetricValue::Number(v) => {
                let v = if *v == 0.0 { 0.0 } else { *v };
                VoteKey::Number(v.to_bits())
            }
            MetricValue::Text(s) => VoteKey::Text(s.clone()),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum VoteKey {
    Number(u64),
    Text(String),
}

// ============================================================================
// AGENT STATE
// ============================================================================

/// Reported condition of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    #[default]
    Idle,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Idle => "idle",
            AgentStatus::Error => "error",
        }
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(AgentStatus::Active),
            "idle" => Ok(AgentStatus::Idle),
            "error" => Ok(AgentStatus::Error),
            other => Err(format!("Unknown agent status: {}", other)),
        }
    }
}

/// One agent's report at a point in time.
///
/// Built once per reporting cycle by whoever submits it; the tracker keeps
/// its own copy after acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Stable agent identity
    pub agent_id: String,

    /// Monotonic clock value in seconds
    pub timestamp: f64,

    /// Optional position in a shared cartesian frame
    pub position: Option<Vector3<f64>>,

    pub status: AgentStatus,

    /// Agent-defined metrics
    pub metrics: BTreeMap<String, MetricValue>,

    /// Self-reported confidence [0.0 - 1.0]
    pub confidence: f64,
}

impl AgentState {
    /// Create an active, fully confident report with no position or metrics.
    pub fn new(agent_id: impl Into<String>, timestamp: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp,
            position: None,
            status: AgentStatus::Active,
            metrics: BTreeMap::new(),
            confidence: 1.0,
        }
    }

    pub fn with_position(mut self, position: Vector3<f64>) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    pub fn with_metrics(mut self, metrics: BTreeMap<String, MetricValue>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set confidence, clamped to [0, 1]. NaN becomes 0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        self
    }

    /// Iterate the numeric metrics only.
    pub fn numeric_metrics(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metrics
            .iter()
            .filter_map(|(k, v)| v.as_number().map(|n| (k.as_str(), n)))
    }
}

// ============================================================================
// SYSTEM STATE
// ============================================================================

/// Centroid and per-axis standard deviation of reported positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialSpread {
    pub centroid: Vector3<f64>,
    pub std: Vector3<f64>,
}

/// Aggregate figures recomputed with every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_agents: usize,
    pub active_agents: usize,
    pub mean_confidence: f64,
    /// Accepted events per second over the temporal window
    pub update_rate: f64,
    pub spatial_spread: Option<SpatialSpread>,
}

/// Kind of inline pattern summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    SpatialGrouping,
    StatusAlignment,
    StrongCoupling,
}

/// Cheap same-pass pattern summary attached to a snapshot.
///
/// Much lighter than [`EmergentBehavior`]: no history, no dedup, no ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub kind: PatternKind,
    pub description: String,
    pub agents: Vec<String>,
    pub strength: f64,
}

/// Consistent system-wide view after the latest accepted update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    /// Latest accepted timestamp across all agents
    pub timestamp: f64,

    /// Latest accepted report per agent
    pub agents: BTreeMap<String, AgentState>,

    pub global_metrics: GlobalMetrics,

    /// Metric -> agreed value, only for metrics at quorum
    pub consensus_values: BTreeMap<String, MetricValue>,

    pub emergent_patterns: Vec<PatternSummary>,

    /// Pairwise interaction strengths at snapshot time
    pub interactions: InteractionGraph,
}

// ============================================================================
// EMERGENT BEHAVIOR
// ============================================================================

/// Category of a detected cross-agent pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorType {
    SpatialClustering,
    PeriodicUpdates,
    SynchronizedUpdates,
    StrongInteractionGroup,
    MetricClustering,
    MetricConvergence,
}

impl BehaviorType {
    pub fn all() -> [BehaviorType; 6] {
        [
            BehaviorType::SpatialClustering,
            BehaviorType::PeriodicUpdates,
            BehaviorType::SynchronizedUpdates,
            BehaviorType::StrongInteractionGroup,
            BehaviorType::MetricClustering,
            BehaviorType::MetricConvergence,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorType::SpatialClustering => "spatial_clustering",
            BehaviorType::PeriodicUpdates => "periodic_updates",
            BehaviorType::SynchronizedUpdates => "synchronized_updates",
            BehaviorType::StrongInteractionGroup => "strong_interaction_group",
            BehaviorType::MetricClustering => "metric_clustering",
            BehaviorType::MetricConvergence => "metric_convergence",
        }
    }

    /// Prefix of generated behavior ids (`spatial_3`, `sync_1`, ...).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            BehaviorType::SpatialClustering => "spatial",
            BehaviorType::PeriodicUpdates => "periodic",
            BehaviorType::SynchronizedUpdates => "sync",
            BehaviorType::StrongInteractionGroup => "interaction",
            BehaviorType::MetricClustering => "metric_cluster",
            BehaviorType::MetricConvergence => "convergence",
        }
    }
}

impl std::fmt::Display for BehaviorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cross-agent pattern inferred from aggregate history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergentBehavior {
    /// `<prefix>_<n>`, monotonic per type; empty until the detector emits it
    pub behavior_id: String,

    pub behavior_type: BehaviorType,

    pub description: String,

    /// Confidence score [0.0 - 1.0]
    pub confidence: f64,

    /// Sorted, non-empty
    pub agents_involved: BTreeSet<String>,

    pub timestamp: f64,

    /// Type-specific numeric payload
    pub metrics: BTreeMap<String, f64>,

    /// Free-form supporting data
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl EmergentBehavior {
    pub(crate) fn new(
        behavior_type: BehaviorType,
        description: impl Into<String>,
        confidence: f64,
        agents: impl IntoIterator<Item = String>,
        timestamp: f64,
    ) -> Self {
        Self {
            behavior_id: String::new(),
            behavior_type,
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            agents_involved: agents.into_iter().collect(),
            timestamp,
            metrics: BTreeMap::new(),
            context: serde_json::Map::new(),
        }
    }

    pub(crate) fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub(crate) fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    /// Dedup key: type plus the sorted set of involved agents.
    pub fn signature(&self) -> (BehaviorType, Vec<String>) {
        (self.behavior_type, self.agents_involved.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("Active".parse::<AgentStatus>().unwrap(), AgentStatus::Active);
        assert_eq!(" idle ".parse::<AgentStatus>().unwrap(), AgentStatus::Idle);
        assert_eq!("ERROR".parse::<AgentStatus>().unwrap(), AgentStatus::Error);
        assert!("sleeping".parse::<AgentStatus>().is_err());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(AgentState::new("a", 0.0).with_confidence(1.7).confidence, 1.0);
        assert_eq!(AgentState::new("a", 0.0).with_confidence(-0.2).confidence, 0.0);
        assert_eq!(AgentState::new("a", 0.0).with_confidence(f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_numeric_metrics_filter() {
        let state = AgentState::new("a", 0.0)
            .with_metric("score", 0.5)
            .with_metric("tier", "senior");
        let numeric: Vec<_> = state.numeric_metrics().collect();
        assert_eq!(numeric, vec![("score", 0.5)]);
    }

    #[test]
    fn test_vote_key_folds_negative_zero() {
        assert_eq!(MetricValue::Number(0.0).vote_key(), MetricValue::Number(-0.0).vote_key());
        assert_ne!(MetricValue::Number(1.0).vote_key(), MetricValue::Text("1".into()).vote_key());
    }

    #[test]
    fn test_metric_value_json_is_untagged() {
        let json = serde_json::to_string(&MetricValue::Number(2.5)).unwrap();
        assert_eq!(json, "2.5");
        let back: MetricValue = serde_json::from_str("\"junior\"").unwrap();
        assert_eq!(back, MetricValue::Text("junior".to_string()));
    }

    #[test]
    fn test_behavior_signature_is_sorted() {
        let b = EmergentBehavior::new(
            BehaviorType::SpatialClustering,
            "x",
            0.8,
            vec!["c".to_string(), "a".to_string(), "b".to_string()],
            1.0,
        );
        assert_eq!(b.signature().1, vec!["a", "b", "c"]);
        assert_eq!(b.behavior_type.to_string(), "spatial_clustering");
    }
}
