//! The "TIME" Engine - Temporal Plausibility Gate
//!
//! Decides whether an agent's new report is temporally consistent with the
//! reports already accepted from it. Non-finite timestamps are refused
//! outright; after that four checks run in order and stop at the first
//! failure:
//!
//! 1. First report from an agent: always admitted
//! 2. Backward time travel: rejected
//! 3. Gap larger than the temporal window: rejected
//! 4. Arrival statistically surprising given the agent's cadence: rejected
//!
//! Check 4 uses a per-agent kernel density estimate over recent
//! inter-arrival gaps, refit on every accepted report.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::f64::consts::PI;

use crate::model::AgentState;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the TemporalValidator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Maximum gap between two accepted reports of one agent (seconds)
    pub temporal_window: f64,

    /// Fixed Gaussian kernel bandwidth (seconds, default: 0.25)
    pub density_bandwidth: f64,

    /// Densities below this are implausible (default: 0.01)
    pub implausibility_threshold: f64,

    /// Number of recent gaps kept per agent (default: 64)
    pub density_history: usize,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            temporal_window: 60.0,
            density_bandwidth: 0.25,
            implausibility_threshold: 0.01,
            density_history: 64,
        }
    }
}

/// Why a report failed temporal validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemporalViolation {
    #[error("timestamp {candidate} is not finite")]
    NonFinite { candidate: f64 },

    #[error("timestamp {candidate} precedes last accepted {last}")]
    Backward { last: f64, candidate: f64 },

    #[error("gap of {gap:.3}s exceeds temporal window {window:.3}s")]
    OutsideWindow { gap: f64, window: f64 },

    #[error("arrival density {density:.5} below threshold {threshold}")]
    Implausible { density: f64, threshold: f64 },
}

// ============================================================================
// DENSITY MODEL
// ============================================================================

/// Per-agent arrival model.
///
/// Keeps the last accepted timestamp and a bounded window of inter-arrival
/// gaps. The density is a Gaussian KDE with fixed bandwidth over the gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityModel {
    /// Last accepted timestamp
    pub last_timestamp: f64,

    /// Recent inter-arrival gaps (oldest first)
    gaps: VecDeque<f64>,

    bandwidth: f64,

    capacity: usize,
}

impl DensityModel {
    /// Start a model from the agent's first accepted timestamp.
    pub fn new(first_timestamp: f64, bandwidth: f64, capacity: usize) -> Self {
        Self {
            last_timestamp: first_timestamp,
            gaps: VecDeque::with_capacity(capacity.max(1)),
            bandwidth,
            capacity: capacity.max(1),
        }
    }

    /// Whether enough history exists to evaluate a density.
    pub fn has_estimate(&self) -> bool {
        !self.gaps.is_empty() && self.bandwidth > 0.0
    }

    /// Refit with a newly accepted timestamp.
    pub fn fit(&mut self, timestamp: f64) {
        let gap = timestamp - self.last_timestamp;
        if self.gaps.len() >= self.capacity {
            self.gaps.pop_front();
        }
        self.gaps.push_back(gap.max(0.0));
        self.last_timestamp = timestamp;
    }

    /// Estimated probability density of arriving at `timestamp`.
    ///
    /// ```text
    /// f(g) = 1/(n·h·√(2π)) · Σ exp(-(g - g_i)² / 2h²),   g = t - t_last
    /// ```
    pub fn density_at(&self, timestamp: f64) -> Option<f64> {
        if !self.has_estimate() {
            return None;
        }
        let gap = timestamp - self.last_timestamp;
        let h = self.bandwidth;
        let norm = 1.0 / (self.gaps.len() as f64 * h * (2.0 * PI).sqrt());
        let sum: f64 = self
            .gaps
            .iter()
            .map(|g| (-(gap - g).powi(2) / (2.0 * h * h)).exp())
            .sum();
        Some(norm * sum)
    }

    /// Mean historical gap.
    pub fn mean_gap(&self) -> Option<f64> {
        let gaps: Vec<f64> = self.gaps.iter().copied().collect();
        crate::stats::mean(&gaps)
    }

    pub fn sample_count(&self) -> usize {
        self.gaps.len()
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Temporal plausibility gate, one density model per agent.
#[derive(Debug, Clone)]
pub struct TemporalValidator {
    config: TemporalConfig,
    models: HashMap<String, DensityModel>,
}

impl TemporalValidator {
    pub fn new(config: TemporalConfig) -> Self {
        Self {
            config,
            models: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TemporalConfig::default())
    }

    pub fn config(&self) -> &TemporalConfig {
        &self.config
    }

    /// Boolean form of [`validate`](Self::validate).
    pub fn admit(&self, agent_id: &str, candidate: &AgentState) -> bool {
        self.validate(agent_id, candidate).is_ok()
    }

    /// Run the four checks without mutating anything.
    pub fn validate(&self, agent_id: &str, candidate: &AgentState) -> Result<(), TemporalViolation> {
        // NaN and infinities would poison every later comparison
        if !candidate.timestamp.is_finite() {
            return Err(TemporalViolation::NonFinite {
                candidate: candidate.timestamp,
            });
        }

        // Check 1: unknown agent
        let Some(model) = self.models.get(agent_id) else {
            return Ok(());
        };

        let last = model.last_timestamp;
        let t = candidate.timestamp;

        // Check 2: no backward time travel
        if t < last {
            return Err(TemporalViolation::Backward { last, candidate: t });
        }

        // Check 3: window
        let gap = t - last;
        if gap > self.config.temporal_window {
            return Err(TemporalViolation::OutsideWindow {
                gap,
                window: self.config.temporal_window,
            });
        }

        // Check 4: density. Only early arrivals can be implausible; late
        // ones are bounded by the window above.
        if let (Some(density), Some(mean_gap)) = (model.density_at(t), model.mean_gap()) {
            if gap < mean_gap && density < self.config.implausibility_threshold {
                return Err(TemporalViolation::Implausible {
                    density,
                    threshold: self.config.implausibility_threshold,
                });
            }
        }

        Ok(())
    }

    /// Record an accepted report (refits the agent's density model).
    pub fn commit(&mut self, agent_id: &str, timestamp: f64) {
        match self.models.get_mut(agent_id) {
            Some(model) => model.fit(timestamp),
            None => {
                let model = DensityModel::new(
                    timestamp,
                    self.config.density_bandwidth,
                    self.config.density_history,
                );
                self.models.insert(agent_id.to_string(), model);
            }
        }
    }

    pub fn model(&self, agent_id: &str) -> Option<&DensityModel> {
        self.models.get(agent_id)
    }

    pub fn last_timestamp(&self, agent_id: &str) -> Option<f64> {
        self.models.get(agent_id).map(|m| m.last_timestamp)
    }
}
