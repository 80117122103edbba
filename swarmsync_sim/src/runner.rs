//! Scenario runner - drives one orchestrated session per scenario.

use crate::context::SimContext;
use crate::harness::SimTestHarness;
use crate::scenarios::ScenarioId;
use crate::sink::RecordingSink;
use crate::swarm::SimSwarm;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use swarmsync_core::{Collaborators, SessionConfig, SessionMetrics, SessionOrchestrator, SessionResults, SessionStatus};
use swarmsync_env::SyncContext;
use tracing::{debug, info, warn};

/// RNG stream used to lay out the initial swarm.
const LAYOUT_STREAM: u64 = 0x5eed_0003;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Simulated wall clock when the session started
    pub started_at: SystemTime,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Behaviors the sink received
    pub delivered_behaviors: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Full session record, absent if the session never ran
    pub session: Option<SessionResults>,
}

impl ScenarioResult {
    fn aborted(scenario: ScenarioId, seed: u64, reason: String) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            started_at: UNIX_EPOCH,
            final_time_secs: 0.0,
            delivered_behaviors: 0,
            failure_reason: Some(reason),
            session: None,
        }
    }

    /// Session metrics, or all-zero ones if the session never ran.
    pub fn metrics(&self) -> SessionMetrics {
        self.session
            .as_ref()
            .map(|s| s.metrics.clone())
            .unwrap_or_default()
    }
}

/// Runs simulated scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of agents (scenarios may raise it to their minimum)
    num_agents: usize,

    /// Session duration in virtual seconds
    duration_secs: f64,

    /// Update interval in virtual seconds
    interval_secs: f64,

    config: SessionConfig,
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_agents: usize) -> Self {
        Self {
            seed,
            num_agents,
            duration_secs: 30.0,
            interval_secs: 1.0,
            config: SessionConfig::default(),
        }
    }

    /// Sets the session duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Sets the update interval.
    pub fn with_interval(mut self, secs: f64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Overrides the session configuration.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a scenario and returns the result.
    ///
    /// Each run gets its own single-threaded runtime with a paused clock, so
    /// test timeouts elapse instantly and task order depends only on the seed.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build();
        match runtime {
            Ok(runtime) => runtime.block_on(self.run_session(scenario)),
            Err(err) => ScenarioResult::aborted(scenario, self.seed, format!("Failed to start runtime: {}", err)),
        }
    }

    async fn run_session(&self, scenario: ScenarioId) -> ScenarioResult {
        let ctx = SimContext::shared(self.seed);
        let started_at = ctx.system_time();

        let swarm = Arc::new(SimSwarm::new(ctx.clone(), scenario.swarm_config()));
        let mut layout = ctx.fork_rng(LAYOUT_STREAM);
        scenario.populate(&swarm, self.num_agents, &mut layout);
        debug!("Spawned {} agents", swarm.len());

        let harness = SimTestHarness::shared(&ctx, scenario.harness_config());
        let sink = Arc::new(RecordingSink::new());
        let collaborators = Collaborators::new(swarm.clone(), harness.clone(), harness).with_sink(sink.clone());

        let orchestrator = SessionOrchestrator::new(ctx.clone(), collaborators);
        let id = orchestrator.create_session(swarm.agent_ids(), self.config.clone());

        let results = match orchestrator
            .run_session(id, secs(self.duration_secs), secs(self.interval_secs))
            .await
        {
            Ok(results) => results,
            Err(err) => return ScenarioResult::aborted(scenario, self.seed, err.to_string()),
        };

        let failure_reason = check_expectations(scenario, &results);
        match &failure_reason {
            None => info!(
                "✅ {} passed: {} behaviors, {}/{} tests passed",
                scenario, results.metrics.num_behaviors, results.metrics.passed_tests, results.metrics.num_tests
            ),
            Some(reason) => warn!("❌ {} failed: {}", scenario, reason),
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            started_at,
            final_time_secs: ctx.time_ns() as f64 / 1e9,
            delivered_behaviors: sink.behaviors().len(),
            failure_reason,
            session: Some(results),
        }
    }
}

/// First unmet expectation of a finished session, if any.
fn check_expectations(scenario: ScenarioId, results: &SessionResults) -> Option<String> {
    if results.status != SessionStatus::Completed {
        return Some(format!("Session ended {}", results.status.as_str()));
    }

    let detected = &results.metrics.behavior_types;
    let missing: Vec<&str> = scenario
        .expected_behaviors()
        .iter()
        .map(|b| b.as_str())
        .filter(|b| !detected.contains_key(*b))
        .collect();
    if !missing.is_empty() {
        return Some(format!("Expected behaviors not detected: {}", missing.join(", ")));
    }

    if scenario == ScenarioId::Blackout && results.metrics.collaborator_failures == 0 {
        return Some("No collaborator failures observed under fault injection".to_string());
    }

    None
}
