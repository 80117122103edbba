//! External collaborator contracts consumed by the session orchestrator.
//!
//! Implementations live outside the engine (live agent fleets, test
//! machinery, dashboards); the simulation crate provides deterministic
//! ones. Every call may fail with an [`EnvError`], which the orchestrator
//! absorbs and counts instead of aborting a session.

use async_trait::async_trait;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use swarmsync_env::{EnvError, SessionId};

use crate::model::{BehaviorType, EmergentBehavior, MetricValue};

// ============================================================================
// TEST VOCABULARY
// ============================================================================

/// Area a generated test exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Position,
    Movement,
    Coordination,
    Timing,
    Reliability,
    Concurrency,
    Interaction,
    Communication,
    Performance,
    Consistency,
    Stability,
}

impl TestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCategory::Position => "position",
            TestCategory::Movement => "movement",
            TestCategory::Coordination => "coordination",
            TestCategory::Timing => "timing",
            TestCategory::Reliability => "reliability",
            TestCategory::Concurrency => "concurrency",
            TestCategory::Interaction => "interaction",
            TestCategory::Communication => "communication",
            TestCategory::Performance => "performance",
            TestCategory::Consistency => "consistency",
            TestCategory::Stability => "stability",
        }
    }
}

impl std::fmt::Display for TestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Test categories triggered by a behavior type.
pub fn categories_for(behavior: BehaviorType) -> &'static [TestCategory] {
    use TestCategory::*;
    match behavior {
        BehaviorType::SpatialClustering => &[Position, Movement, Coordination],
        BehaviorType::PeriodicUpdates => &[Timing, Reliability],
        BehaviorType::SynchronizedUpdates => &[Timing, Coordination, Concurrency],
        BehaviorType::StrongInteractionGroup => &[Interaction, Coordination, Communication],
        BehaviorType::MetricClustering => &[Performance, Consistency],
        BehaviorType::MetricConvergence => &[Performance, Stability],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestComplexity {
    Low,
    #[default]
    Medium,
    High,
}

/// A generated test, opaque to the engine apart from its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub test_id: String,
    pub target: String,
    pub category: TestCategory,
    pub complexity: TestComplexity,
    pub edge_case: bool,
    pub description: String,
}

/// Outcome of one executed test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub success: bool,
    /// Seconds
    pub duration: f64,
    pub error: Option<String>,
}

impl TestResult {
    pub fn passed(test_id: impl Into<String>, duration: f64) -> Self {
        Self {
            test_id: test_id.into(),
            success: true,
            duration,
            error: None,
        }
    }

    pub fn failed(test_id: impl Into<String>, duration: f64, error: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            success: false,
            duration,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// CONTRACTS
// ============================================================================

/// Live data source for the agents of a session.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn get_status(&self, agent_id: &str) -> Result<String, EnvError>;

    async fn get_position(&self, agent_id: &str) -> Result<Option<Vector3<f64>>, EnvError>;

    async fn get_metrics(&self, agent_id: &str) -> Result<BTreeMap<String, MetricValue>, EnvError>;
}

#[async_trait]
pub trait TestGenerator: Send + Sync {
    async fn generate_tests(
        &self,
        target: &str,
        category: TestCategory,
        complexity: TestComplexity,
        edge_cases: bool,
        max_tests: usize,
    ) -> Result<Vec<TestCase>, EnvError>;
}

#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn execute_tests(&self, tests: &[TestCase], target: &str) -> Result<Vec<TestResult>, EnvError>;
}

/// Notification channel for dashboards and messaging.
///
/// Delivery failures are logged and counted, never fatal.
#[async_trait]
pub trait BehaviorSink: Send + Sync {
    async fn publish_behavior(&self, session: SessionId, behavior: &EmergentBehavior) -> Result<(), EnvError>;

    async fn publish_results(
        &self,
        session: SessionId,
        behavior_id: &str,
        results: &[TestResult],
    ) -> Result<(), EnvError>;
}

/// The full set of collaborators an orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub adapter: Arc<dyn AgentAdapter>,
    pub generator: Arc<dyn TestGenerator>,
    pub executor: Arc<dyn TestExecutor>,
    pub sink: Option<Arc<dyn BehaviorSink>>,
}

impl Collaborators {
    pub fn new(
        adapter: Arc<dyn AgentAdapter>,
        generator: Arc<dyn TestGenerator>,
        executor: Arc<dyn TestExecutor>,
    ) -> Self {
        Self {
            adapter,
            generator,
            executor,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn BehaviorSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}
