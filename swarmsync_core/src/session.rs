//! Session Orchestrator - Drives tracker and detector against live agents.
//!
//! One session is one cooperative polling loop:
//!
//! ```text
//! ┌──────────────────────── iteration ────────────────────────┐
//! │ 1. poll adapter ─► StateTracker.update (no consensus)     │
//! │ 2. EmergentDetector.analyze(current snapshot)             │
//! │ 3. new behavior ─► sink + test fan-out (JoinSet, bounded) │
//! │ 4. recompute session metrics                              │
//! │ 5. sleep to the next interval boundary (cancellable)      │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Status flow: `Created → Running → Completed | Failed`. A session never
//! stays `Running` once `run_session` has returned.
//!
//! The orchestrator is generic over [`SyncContext`], so the same loop runs
//! against the real clock or the simulation's virtual one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use swarmsync_env::{EnvError, SessionId, SyncContext};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collaborators::{
    categories_for, BehaviorSink, Collaborators, TestCategory, TestComplexity, TestExecutor,
    TestGenerator, TestResult,
};
use crate::detector::{DetectorConfig, EmergentDetector};
use crate::error::SyncError;
use crate::model::{AgentState, AgentStatus, EmergentBehavior};
use crate::tracker::{StateTracker, TrackerConfig};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tracker: TrackerConfig,

    pub detector: DetectorConfig,

    pub test_complexity: TestComplexity,

    /// Ask the generator for edge-case tests (default: true)
    pub include_edge_cases: bool,

    /// Tests requested per (agent, category) (default: 3)
    pub max_tests_per_category: usize,

    /// Agents tested at once across the session (default: 4)
    pub max_concurrent_tests: usize,

    /// Per generate/execute call timeout in seconds (default: 30.0)
    pub test_timeout_secs: f64,

    /// Per adapter query timeout in seconds (default: 10.0)
    pub adapter_timeout_secs: f64,

    /// Time in-flight tests get after cancellation (default: 5.0)
    pub cancel_grace_secs: f64,

    /// Stop after this many iterations even if time remains
    pub max_iterations: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            detector: DetectorConfig::default(),
            test_complexity: TestComplexity::Medium,
            include_edge_cases: true,
            max_tests_per_category: 3,
            max_concurrent_tests: 4,
            test_timeout_secs: 30.0,
            adapter_timeout_secs: 10.0,
            cancel_grace_secs: 5.0,
            max_iterations: None,
        }
    }
}

/// Non-negative seconds to a `Duration`, saturating instead of panicking.
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

/// First multiple of `interval` strictly after `elapsed`.
///
/// Ticks missed by a slow iteration are skipped, never replayed.
fn next_boundary(elapsed: Duration, interval: Duration) -> Duration {
    if interval.is_zero() {
        return elapsed;
    }
    let ticks = elapsed.as_nanos() / interval.as_nanos() + 1;
    let nanos = interval.as_nanos().saturating_mul(ticks);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

// ============================================================================
// SESSION RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

/// Aggregate figures, recomputed every iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub iterations: u64,
    pub elapsed_secs: f64,

    pub num_behaviors: usize,
    pub behavior_types: BTreeMap<String, usize>,

    pub num_tests: usize,
    pub passed_tests: usize,
    /// passed / total, 0 when nothing ran
    pub test_success_rate: f64,
    pub test_categories: BTreeMap<String, usize>,

    pub accepted_updates: u64,
    pub rejected_updates: u64,

    pub collaborator_failures: u64,
    pub detection_failures: u64,
    pub sink_failures: u64,
    pub abandoned_tests: u64,

    pub cancelled: bool,
}

/// One test result, tied back to what triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub behavior_id: String,
    pub agent_id: String,
    pub category: TestCategory,
    pub result: TestResult,
}

/// Detached view of a session, safe to hand to any caller.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResults {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub agents: Vec<String>,
    pub elapsed_secs: f64,
    pub config: SessionConfig,
    pub metrics: SessionMetrics,
    pub behaviors: Vec<serde_json::Value>,
    pub tests: Vec<serde_json::Value>,
}

#[derive(Default)]
struct SessionRecord {
    behaviors: Vec<EmergentBehavior>,
    tests: Vec<TestOutcome>,
    metrics: SessionMetrics,
}

impl SessionRecord {
    fn refresh_metrics(&mut self, elapsed: Duration) {
        let metrics = &mut self.metrics;
        metrics.elapsed_secs = elapsed.as_secs_f64();

        metrics.num_behaviors = self.behaviors.len();
        metrics.behavior_types.clear();
        for behavior in &self.behaviors {
            *metrics
                .behavior_types
                .entry(behavior.behavior_type.as_str().to_string())
                .or_default() += 1;
        }

        metrics.num_tests = self.tests.len();
        metrics.passed_tests = self.tests.iter().filter(|t| t.result.success).count();
        metrics.test_success_rate = if metrics.num_tests == 0 {
            0.0
        } else {
            metrics.passed_tests as f64 / metrics.num_tests as f64
        };
        metrics.test_categories.clear();
        for test in &self.tests {
            *metrics
                .test_categories
                .entry(test.category.as_str().to_string())
                .or_default() += 1;
        }
    }
}

struct Session {
    id: SessionId,
    agents: Vec<String>,
    config: SessionConfig,
    tracker: StateTracker,
    detector: Mutex<EmergentDetector>,
    cancel: CancellationToken,
    status: Mutex<SessionStatus>,
    record: Mutex<SessionRecord>,
}

impl Session {
    fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn record(&self) -> MutexGuard<'_, SessionRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Created -> Running, atomically.
    fn begin(&self) -> Result<(), SyncError> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status != SessionStatus::Created {
            return Err(SyncError::SessionNotRunnable {
                id: self.id,
                status: status.as_str().to_string(),
            });
        }
        *status = SessionStatus::Running;
        Ok(())
    }

    fn count_collaborator_failure(&self, err: &SyncError) {
        warn!("[{}] {}", self.id, err);
        self.record().metrics.collaborator_failures += 1;
    }

    /// Fold a finished test task into the record.
    fn absorb(&self, joined: Result<TestBatch, JoinError>) {
        match joined {
            Ok(batch) => {
                let mut record = self.record();
                record.metrics.collaborator_failures += batch.collaborator_failures;
                record.metrics.sink_failures += batch.sink_failures;
                record.tests.extend(batch.outcomes);
            }
            Err(err) => {
                warn!("[{}] Test task ended abnormally: {}", self.id, err);
                self.record().metrics.collaborator_failures += 1;
            }
        }
    }

    fn results(&self) -> SessionResults {
        let status = self.status();
        let record = self.record();
        SessionResults {
            session_id: self.id,
            status,
            agents: self.agents.clone(),
            elapsed_secs: record.metrics.elapsed_secs,
            config: self.config.clone(),
            metrics: record.metrics.clone(),
            behaviors: record
                .behaviors
                .iter()
                .filter_map(|b| serde_json::to_value(b).ok())
                .collect(),
            tests: record
                .tests
                .iter()
                .filter_map(|t| serde_json::to_value(t).ok())
                .collect(),
        }
    }
}

// ============================================================================
// TEST FAN-OUT
// ============================================================================

/// What one test task reports back.
#[derive(Default)]
struct TestBatch {
    outcomes: Vec<TestOutcome>,
    collaborator_failures: u64,
    sink_failures: u64,
}

/// Everything a detached test task needs for one (behavior, agent) pair.
struct TestJob {
    session_id: SessionId,
    behavior_id: String,
    target: String,
    categories: &'static [TestCategory],
    complexity: TestComplexity,
    edge_cases: bool,
    max_tests: usize,
    timeout: Duration,
    generator: Arc<dyn TestGenerator>,
    executor: Arc<dyn TestExecutor>,
    sink: Option<Arc<dyn BehaviorSink>>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl TestJob {
    async fn run(self) -> TestBatch {
        let mut batch = TestBatch::default();

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return batch,
            permit = Arc::clone(&self.limiter).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return batch,
            },
        };

        for &category in self.categories {
            let generated = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                generated = tokio::time::timeout(
                    self.timeout,
                    self.generator.generate_tests(
                        &self.target,
                        category,
                        self.complexity,
                        self.edge_cases,
                        self.max_tests,
                    ),
                ) => generated,
            };
            let tests = match flatten(generated, self.timeout) {
                Ok(tests) => tests,
                Err(err) => {
                    self.fail(&mut batch, format!("generate_tests({}, {})", self.target, category), err);
                    continue;
                }
            };
            if tests.is_empty() {
                continue;
            }

            let executed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                executed = tokio::time::timeout(
                    self.timeout,
                    self.executor.execute_tests(&tests, &self.target),
                ) => executed,
            };
            let results = match flatten(executed, self.timeout) {
                Ok(results) => results,
                Err(err) => {
                    self.fail(&mut batch, format!("execute_tests({}, {})", self.target, category), err);
                    continue;
                }
            };

            if let Some(sink) = &self.sink {
                let published = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    published = tokio::time::timeout(
                        self.timeout,
                        sink.publish_results(self.session_id, &self.behavior_id, &results),
                    ) => published,
                };
                if let Err(err) = flatten(published, self.timeout) {
                    warn!("[{}] Result delivery failed: {}", self.session_id, err);
                    batch.sink_failures += 1;
                }
            }

            batch.outcomes.extend(results.into_iter().map(|result| TestOutcome {
                behavior_id: self.behavior_id.clone(),
                agent_id: self.target.clone(),
                category,
                result,
            }));
        }

        batch
    }

    fn fail(&self, batch: &mut TestBatch, operation: String, source: EnvError) {
        warn!("[{}] {}", self.session_id, SyncError::collaborator(operation, source));
        batch.collaborator_failures += 1;
    }
}

/// One adapter query, bounded by the adapter timeout.
///
/// `None` once the session is cancelled; the partial poll is dropped.
async fn query_adapter<T>(
    session: &Session,
    call: impl std::future::Future<Output = Result<T, EnvError>>,
) -> Option<Result<T, EnvError>> {
    let timeout = secs(session.config.adapter_timeout_secs);
    tokio::select! {
        biased;
        _ = session.cancel.cancelled() => None,
        outcome = tokio::time::timeout(timeout, call) => Some(flatten(outcome, timeout)),
    }
}

fn flatten<T>(
    outcome: Result<Result<T, EnvError>, tokio::time::error::Elapsed>,
    after: Duration,
) -> Result<T, EnvError> {
    outcome.map_err(|_| EnvError::timeout(after))?
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Owns sessions and runs their polling loops.
///
/// Share it behind an `Arc` to run several sessions as independent tasks.
pub struct SessionOrchestrator<Ctx: SyncContext> {
    ctx: Arc<Ctx>,
    collaborators: Collaborators,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl<Ctx: SyncContext> SessionOrchestrator<Ctx> {
    pub fn new(ctx: Arc<Ctx>, collaborators: Collaborators) -> Self {
        Self {
            ctx,
            collaborators,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.ctx
    }

    fn session(&self, id: SessionId) -> Result<Arc<Session>, SyncError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(SyncError::UnknownSession(id))
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Allocate a session with its own tracker and detector. Nothing runs yet.
    pub fn create_session<I, S>(&self, agents: I, config: SessionConfig) -> SessionId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = Vec::new();
        for agent in agents {
            let agent = agent.into();
            if !ids.contains(&agent) {
                ids.push(agent);
            }
        }

        let id = SessionId::new();
        let session = Session {
            id,
            agents: ids,
            tracker: StateTracker::new(config.tracker.clone()),
            detector: Mutex::new(EmergentDetector::new(config.detector.clone())),
            config,
            cancel: CancellationToken::new(),
            status: Mutex::new(SessionStatus::Created),
            record: Mutex::new(SessionRecord::default()),
        };

        info!("[{}] Created session for {} agents", id, session.agents.len());
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(session));
        id
    }

    /// Run a created session to completion.
    ///
    /// Stops when `duration` has elapsed on the context clock, when
    /// `max_iterations` is reached, or on cancellation. At least one
    /// iteration always runs unless the session was cancelled first.
    pub async fn run_session(
        &self,
        id: SessionId,
        duration: Duration,
        update_interval: Duration,
    ) -> Result<SessionResults, SyncError> {
        let session = self.session(id)?;
        session.begin()?;
        info!(
            "[{}] Running for {:?} at {:?} intervals",
            id, duration, update_interval
        );

        let started = self.ctx.now();
        let limiter = Arc::new(Semaphore::new(session.config.max_concurrent_tests.max(1)));
        let mut tasks: JoinSet<TestBatch> = JoinSet::new();
        let mut iterations: u64 = 0;

        loop {
            if session.cancel.is_cancelled() {
                debug!("[{}] Cancelled before iteration {}", id, iterations + 1);
                break;
            }
            iterations += 1;

            // Step 1: poll agents
            self.poll_agents(&session).await;

            // Step 2: detect
            let snapshot = session.tracker.current_state();
            let (behaviors, failed_passes) = {
                let mut detector = session.detector.lock().unwrap_or_else(PoisonError::into_inner);
                let found = detector.analyze_state(&snapshot);
                (found, detector.failed_passes())
            };
            session.record().metrics.detection_failures = failed_passes;

            // Step 3: publish + dispatch tests
            for behavior in behaviors {
                self.publish_behavior(&session, &behavior).await;
                self.dispatch_tests(&session, &behavior, &limiter, &mut tasks);
                session.record().behaviors.push(behavior);
            }
            while let Some(joined) = tasks.try_join_next() {
                session.absorb(joined);
            }

            // Step 4: metrics
            let elapsed = self.ctx.now().saturating_sub(started);
            {
                let mut record = session.record();
                record.metrics.iterations = iterations;
                record.refresh_metrics(elapsed);
            }

            if elapsed >= duration
                || session.config.max_iterations.map_or(false, |max| iterations >= max)
            {
                break;
            }

            // Step 5: sleep to the next boundary, never past the deadline
            let wait = next_boundary(elapsed, update_interval)
                .saturating_sub(elapsed)
                .min(duration.saturating_sub(elapsed));
            tokio::select! {
                biased;
                _ = session.cancel.cancelled() => {}
                _ = self.ctx.sleep(wait) => {}
            }
        }

        let abandoned = self.drain(&session, &mut tasks).await;
        let cancelled = session.cancel.is_cancelled();

        let status = if abandoned > 0 {
            SessionStatus::Failed
        } else {
            SessionStatus::Completed
        };
        {
            let mut record = session.record();
            record.metrics.abandoned_tests = abandoned as u64;
            record.metrics.cancelled = cancelled;
            record.refresh_metrics(self.ctx.now().saturating_sub(started));
        }
        session.set_status(status);

        info!(
            "[{}] Session {} after {} iterations",
            id,
            status.as_str(),
            iterations
        );
        Ok(session.results())
    }

    /// Request cancellation. A session that never started is closed at once.
    pub fn cancel_session(&self, id: SessionId) -> Result<(), SyncError> {
        let session = self.session(id)?;
        session.cancel.cancel();

        let closed = {
            let mut status = session.status.lock().unwrap_or_else(PoisonError::into_inner);
            let created = *status == SessionStatus::Created;
            if created {
                *status = SessionStatus::Completed;
            }
            created
        };
        if closed {
            session.record().metrics.cancelled = true;
        }
        info!("[{}] Cancellation requested", id);
        Ok(())
    }

    pub fn session_status(&self, id: SessionId) -> Result<SessionStatus, SyncError> {
        Ok(self.session(id)?.status())
    }

    pub fn get_session_results(&self, id: SessionId) -> Result<SessionResults, SyncError> {
        Ok(self.session(id)?.results())
    }

    pub fn list_sessions(&self) -> Vec<(SessionId, SessionStatus)> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|s| (s.id, s.status()))
            .collect();
        sessions.sort_by_key(|(id, _)| *id);
        sessions
    }

    // ========================================================================
    // LOOP STEPS
    // ========================================================================

    async fn poll_agents(&self, session: &Session) {
        let adapter = &self.collaborators.adapter;
        let now = self.ctx.now().as_secs_f64();

        for agent_id in &session.agents {
            let mut retrieved = 0u32;

            let Some(status) = query_adapter(session, adapter.get_status(agent_id)).await else {
                return;
            };
            let status = match status.and_then(|raw| raw.parse::<AgentStatus>().map_err(EnvError::adapter)) {
                Ok(status) => {
                    retrieved += 1;
                    Some(status)
                }
                Err(source) => {
                    session.count_collaborator_failure(&SyncError::collaborator(format!("get_status({})", agent_id), source));
                    None
                }
            };
            let status = status
                .or_else(|| session.tracker.latest_state(agent_id).map(|s| s.status))
                .unwrap_or_default();

            let Some(position) = query_adapter(session, adapter.get_position(agent_id)).await else {
                return;
            };
            let position = match position {
                Ok(position) => {
                    retrieved += 1;
                    position
                }
                Err(source) => {
                    session.count_collaborator_failure(&SyncError::collaborator(format!("get_position({})", agent_id), source));
                    None
                }
            };

            let Some(metrics) = query_adapter(session, adapter.get_metrics(agent_id)).await else {
                return;
            };
            let metrics = match metrics {
                Ok(metrics) => {
                    retrieved += 1;
                    metrics
                }
                Err(source) => {
                    session.count_collaborator_failure(&SyncError::collaborator(format!("get_metrics({})", agent_id), source));
                    BTreeMap::new()
                }
            };

            let mut state = AgentState::new(agent_id.clone(), now)
                .with_status(status)
                .with_metrics(metrics)
                .with_confidence(f64::from(retrieved) / 3.0);
            if let Some(position) = position {
                state = state.with_position(position);
            }

            match session.tracker.try_update_agent_state(agent_id, state, false) {
                Ok(_) => session.record().metrics.accepted_updates += 1,
                Err(err) => {
                    debug!("[{}] {}", session.id, err);
                    session.record().metrics.rejected_updates += 1;
                }
            }
        }
    }

    async fn publish_behavior(&self, session: &Session, behavior: &EmergentBehavior) {
        let Some(sink) = &self.collaborators.sink else {
            return;
        };
        let timeout = secs(session.config.test_timeout_secs);
        let published = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => return,
            published = tokio::time::timeout(timeout, sink.publish_behavior(session.id, behavior)) => published,
        };
        if let Err(err) = flatten(published, timeout) {
            warn!("[{}] Behavior delivery failed: {}", session.id, err);
            session.record().metrics.sink_failures += 1;
        }
    }

    fn dispatch_tests(
        &self,
        session: &Session,
        behavior: &EmergentBehavior,
        limiter: &Arc<Semaphore>,
        tasks: &mut JoinSet<TestBatch>,
    ) {
        let categories = categories_for(behavior.behavior_type);
        for agent_id in &behavior.agents_involved {
            let job = TestJob {
                session_id: session.id,
                behavior_id: behavior.behavior_id.clone(),
                target: agent_id.clone(),
                categories,
                complexity: session.config.test_complexity,
                edge_cases: session.config.include_edge_cases,
                max_tests: session.config.max_tests_per_category,
                timeout: secs(session.config.test_timeout_secs),
                generator: Arc::clone(&self.collaborators.generator),
                executor: Arc::clone(&self.collaborators.executor),
                sink: self.collaborators.sink.clone(),
                limiter: Arc::clone(limiter),
                cancel: session.cancel.clone(),
            };
            tasks.spawn(job.run());
        }
    }

    /// Wait for in-flight tests; returns how many had to be abandoned.
    async fn drain(&self, session: &Session, tasks: &mut JoinSet<TestBatch>) -> usize {
        loop {
            tokio::select! {
                biased;
                _ = session.cancel.cancelled() => break,
                joined = tasks.join_next() => match joined {
                    Some(joined) => session.absorb(joined),
                    None => return 0,
                },
            }
        }

        let deadline = tokio::time::Instant::now() + secs(session.config.cancel_grace_secs);
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => session.absorb(joined),
                Ok(None) => return 0,
                Err(_) => {
                    let abandoned = tasks.len();
                    warn!("[{}] Abandoning {} test tasks after grace period", session.id, abandoned);
                    tasks.abort_all();
                    return abandoned;
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{AgentAdapter, TestCase};
    use crate::model::MetricValue;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use nalgebra::Vector3;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use swarmsync_env::TokioContext;
    use tokio::sync::Notify;

    // ------------------------------------------------------------------------
    // Mock collaborators
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct StaticAdapter {
        fail_positions: bool,
    }

    #[async_trait]
    impl AgentAdapter for StaticAdapter {
        async fn get_status(&self, _agent_id: &str) -> Result<String, EnvError> {
            Ok("active".to_string())
        }

        async fn get_position(&self, _agent_id: &str) -> Result<Option<Vector3<f64>>, EnvError> {
            if self.fail_positions {
                Err(EnvError::unavailable("gps"))
            } else {
                Ok(None)
            }
        }

        async fn get_metrics(&self, _agent_id: &str) -> Result<BTreeMap<String, MetricValue>, EnvError> {
            Ok(BTreeMap::from([("load".to_string(), MetricValue::Number(0.5))]))
        }
    }

    /// Status queries never answer.
    struct HangingAdapter;

    #[async_trait]
    impl AgentAdapter for HangingAdapter {
        async fn get_status(&self, _agent_id: &str) -> Result<String, EnvError> {
            std::future::pending().await
        }

        async fn get_position(&self, _agent_id: &str) -> Result<Option<Vector3<f64>>, EnvError> {
            Ok(None)
        }

        async fn get_metrics(&self, _agent_id: &str) -> Result<BTreeMap<String, MetricValue>, EnvError> {
            Ok(BTreeMap::new())
        }
    }

    /// Records when each poll starts; the `stall_on`-th status query takes `stall`.
    struct SlowAdapter {
        origin: tokio::time::Instant,
        stall_on: usize,
        stall: Duration,
        polled_at: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl AgentAdapter for SlowAdapter {
        async fn get_status(&self, _agent_id: &str) -> Result<String, EnvError> {
            let call = {
                let mut polled_at = self.polled_at.lock().unwrap();
                polled_at.push(self.origin.elapsed().as_secs_f64());
                polled_at.len()
            };
            if call == self.stall_on {
                tokio::time::sleep(self.stall).await;
            }
            Ok("active".to_string())
        }

        async fn get_position(&self, _agent_id: &str) -> Result<Option<Vector3<f64>>, EnvError> {
            Ok(None)
        }

        async fn get_metrics(&self, _agent_id: &str) -> Result<BTreeMap<String, MetricValue>, EnvError> {
            Ok(BTreeMap::new())
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl TestGenerator for EchoGenerator {
        async fn generate_tests(
            &self,
            target: &str,
            category: TestCategory,
            complexity: TestComplexity,
            edge_cases: bool,
            max_tests: usize,
        ) -> Result<Vec<TestCase>, EnvError> {
            Ok((0..max_tests)
                .map(|i| TestCase {
                    test_id: format!("{}-{}-{}", target, category, i),
                    target: target.to_string(),
                    category,
                    complexity,
                    edge_case: edge_cases,
                    description: String::new(),
                })
                .collect())
        }
    }

    struct PassingExecutor;

    #[async_trait]
    impl TestExecutor for PassingExecutor {
        async fn execute_tests(&self, tests: &[TestCase], _target: &str) -> Result<Vec<TestResult>, EnvError> {
            Ok(tests.iter().map(|t| TestResult::passed(t.test_id.clone(), 0.01)).collect())
        }
    }

    /// Signals once execution starts, then never finishes on its own.
    struct StallingExecutor {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl TestExecutor for StallingExecutor {
        async fn execute_tests(&self, _tests: &[TestCase], _target: &str) -> Result<Vec<TestResult>, EnvError> {
            self.started.notify_one();
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct BrokenSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BehaviorSink for BrokenSink {
        async fn publish_behavior(&self, _session: SessionId, _behavior: &EmergentBehavior) -> Result<(), EnvError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EnvError::unavailable("dashboard"))
        }

        async fn publish_results(&self, _session: SessionId, _behavior_id: &str, _results: &[TestResult]) -> Result<(), EnvError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EnvError::unavailable("dashboard"))
        }
    }

    fn orchestrator(adapter: StaticAdapter, executor: Arc<dyn TestExecutor>) -> SessionOrchestrator<TokioContext> {
        let collaborators = Collaborators::new(Arc::new(adapter), Arc::new(EchoGenerator), executor);
        SessionOrchestrator::new(TokioContext::shared(), collaborators)
    }

    fn three_iterations() -> SessionConfig {
        SessionConfig {
            max_iterations: Some(3),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());

        let config: SessionConfig =
            serde_json::from_str(r#"{"max_concurrent_tests": 2, "detector": {"min_agents": 5}}"#).unwrap();
        assert_eq!(config.max_concurrent_tests, 2);
        assert_eq!(config.detector.min_agents, 5);
        assert_eq!(config.detector.cluster_eps, 0.5);
    }

    #[test]
    fn test_secs_saturates() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(1.5), Duration::from_millis(1500));
        assert_eq!(secs(f64::INFINITY), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_iteration_session_completes() {
        let orchestrator = orchestrator(StaticAdapter::default(), Arc::new(PassingExecutor));
        let id = orchestrator.create_session(["agent-1", "agent-2"], three_iterations());
        assert_eq!(orchestrator.session_status(id).unwrap(), SessionStatus::Created);

        let results = orchestrator
            .run_session(id, Duration::from_secs(3600), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(results.status, SessionStatus::Completed);
        assert_eq!(results.metrics.iterations, 3);
        assert_eq!(results.metrics.accepted_updates, 6);
        assert!(results.metrics.test_success_rate >= 0.0 && results.metrics.test_success_rate <= 1.0);
        assert_eq!(results.behaviors.len(), results.metrics.num_behaviors);
        assert!(!results.metrics.cancelled);
        assert_eq!(orchestrator.session_status(id).unwrap(), SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_behaviors_trigger_tests() {
        let orchestrator = orchestrator(StaticAdapter::default(), Arc::new(PassingExecutor));
        let id = orchestrator.create_session(["a", "b", "c"], three_iterations());

        let results = orchestrator
            .run_session(id, Duration::from_secs(3600), Duration::from_secs(1))
            .await
            .unwrap();

        // Identical loads on three agents converge on the first iteration
        assert_eq!(results.metrics.behavior_types.get("metric_convergence"), Some(&1));
        assert!(results.metrics.num_tests > 0);
        assert_eq!(results.metrics.passed_tests, results.metrics.num_tests);
        assert_eq!(results.metrics.test_success_rate, 1.0);
        assert!(results.metrics.test_categories.contains_key("stability"));
        assert!(results.metrics.elapsed_secs >= 2.0);

        let behavior = &results.behaviors[0];
        assert!(behavior.get("behavior_id").is_some());
        assert!(results.tests[0].get("result").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_bounds_loop() {
        let orchestrator = orchestrator(StaticAdapter::default(), Arc::new(PassingExecutor));
        let id = orchestrator.create_session(["a"], SessionConfig::default());

        let results = orchestrator
            .run_session(id, Duration::from_secs(10), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(results.metrics.iterations, 11);
        assert!(results.elapsed_secs >= 10.0);
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let orchestrator = orchestrator(StaticAdapter::default(), Arc::new(PassingExecutor));
        let ghost = SessionId::from_seed(42);

        let err = orchestrator
            .run_session(ghost, Duration::from_secs(1), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownSession(id) if id == ghost));
        assert!(orchestrator.get_session_results(ghost).is_err());
        assert!(orchestrator.cancel_session(ghost).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_runs_only_once() {
        let orchestrator = orchestrator(StaticAdapter::default(), Arc::new(PassingExecutor));
        let id = orchestrator.create_session(["a"], three_iterations());
        orchestrator
            .run_session(id, Duration::from_secs(10), Duration::ZERO)
            .await
            .unwrap();

        let err = orchestrator
            .run_session(id, Duration::from_secs(10), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SessionNotRunnable { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_never_leaves_running() {
        let started = Arc::new(Notify::new());
        let executor = StallingExecutor {
            started: Arc::clone(&started),
        };
        let orchestrator = Arc::new(orchestrator(StaticAdapter::default(), Arc::new(executor)));
        let config = SessionConfig {
            test_timeout_secs: 1e6,
            ..Default::default()
        };
        let id = orchestrator.create_session(["a", "b", "c"], config);

        let runner = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .run_session(id, Duration::from_secs(1_000_000), Duration::from_secs(1))
                    .await
            })
        };

        started.notified().await;
        assert_eq!(orchestrator.session_status(id).unwrap(), SessionStatus::Running);
        orchestrator.cancel_session(id).unwrap();

        let results = runner.await.unwrap().unwrap();
        assert_ne!(results.status, SessionStatus::Running);
        assert_eq!(results.status, SessionStatus::Completed);
        assert!(results.metrics.cancelled);
        assert_eq!(results.metrics.abandoned_tests, 0);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let orchestrator = orchestrator(StaticAdapter::default(), Arc::new(PassingExecutor));
        let id = orchestrator.create_session(["a"], SessionConfig::default());
        orchestrator.cancel_session(id).unwrap();

        assert_eq!(orchestrator.session_status(id).unwrap(), SessionStatus::Completed);
        assert!(orchestrator.get_session_results(id).unwrap().metrics.cancelled);
        assert!(orchestrator
            .run_session(id, Duration::from_secs(1), Duration::ZERO)
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_failures_counted() {
        let adapter = StaticAdapter { fail_positions: true };
        let orchestrator = orchestrator(adapter, Arc::new(PassingExecutor));
        let id = orchestrator.create_session(["a", "b"], three_iterations());

        let results = orchestrator
            .run_session(id, Duration::from_secs(3600), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(results.status, SessionStatus::Completed);
        assert_eq!(results.metrics.collaborator_failures, 6);
        assert_eq!(results.metrics.accepted_updates, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failures_absorbed() {
        let sink = Arc::new(BrokenSink::default());
        let collaborators = Collaborators::new(
            Arc::new(StaticAdapter::default()),
            Arc::new(EchoGenerator),
            Arc::new(PassingExecutor),
        )
        .with_sink(sink.clone());
        let orchestrator = SessionOrchestrator::new(TokioContext::shared(), collaborators);
        let id = orchestrator.create_session(["a", "b", "c"], three_iterations());

        let results = orchestrator
            .run_session(id, Duration::from_secs(3600), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(results.status, SessionStatus::Completed);
        assert!(results.metrics.sink_failures > 0);
        assert_eq!(results.metrics.sink_failures as usize, sink.calls.load(Ordering::SeqCst));
    }

    #[test]
    fn test_next_boundary_skips_missed_ticks() {
        let second = Duration::from_secs(1);
        assert_eq!(next_boundary(Duration::ZERO, second), second);
        assert_eq!(next_boundary(Duration::from_secs(3), second), Duration::from_secs(4));
        assert_eq!(next_boundary(Duration::from_millis(7500), second), Duration::from_secs(8));
        assert_eq!(next_boundary(Duration::from_millis(7500), Duration::ZERO), Duration::from_millis(7500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_adapter_times_out() {
        let collaborators = Collaborators::new(Arc::new(HangingAdapter), Arc::new(EchoGenerator), Arc::new(PassingExecutor));
        let orchestrator = SessionOrchestrator::new(TokioContext::shared(), collaborators);
        let config = SessionConfig {
            adapter_timeout_secs: 2.0,
            max_iterations: Some(2),
            ..Default::default()
        };
        let id = orchestrator.create_session(["a"], config);

        let results = orchestrator
            .run_session(id, Duration::from_secs(3600), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(results.status, SessionStatus::Completed);
        assert_eq!(results.metrics.iterations, 2);
        assert_eq!(results.metrics.collaborator_failures, 2);
        // Status missing, position and metrics still count
        assert_eq!(results.metrics.accepted_updates, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hung_adapter() {
        let collaborators = Collaborators::new(Arc::new(HangingAdapter), Arc::new(EchoGenerator), Arc::new(PassingExecutor));
        let orchestrator = Arc::new(SessionOrchestrator::new(TokioContext::shared(), collaborators));
        let config = SessionConfig {
            adapter_timeout_secs: 1e6,
            ..Default::default()
        };
        let id = orchestrator.create_session(["a"], config);

        let runner = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .run_session(id, Duration::from_secs(1_000_000), Duration::from_secs(1))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(orchestrator.session_status(id).unwrap(), SessionStatus::Running);
        orchestrator.cancel_session(id).unwrap();

        let results = tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("session should stop promptly after cancel")
            .unwrap()
            .unwrap();
        assert_eq!(results.status, SessionStatus::Completed);
        assert!(results.metrics.cancelled);
        assert_eq!(results.metrics.accepted_updates, 0);
        assert_eq!(orchestrator.session_status(id).unwrap(), SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_iteration_does_not_burst() {
        let adapter = Arc::new(SlowAdapter {
            origin: tokio::time::Instant::now(),
            stall_on: 4,
            stall: Duration::from_millis(4500),
            polled_at: Mutex::new(Vec::new()),
        });
        let collaborators = Collaborators::new(adapter.clone(), Arc::new(EchoGenerator), Arc::new(PassingExecutor));
        let orchestrator = SessionOrchestrator::new(TokioContext::shared(), collaborators);
        let id = orchestrator.create_session(["a"], SessionConfig::default());

        let results = orchestrator
            .run_session(id, Duration::from_secs(10), Duration::from_secs(1))
            .await
            .unwrap();

        let polled_at = adapter.polled_at.lock().unwrap().clone();
        let expected = [0.0, 1.0, 2.0, 3.0, 8.0, 9.0, 10.0];
        assert_eq!(polled_at.len(), expected.len(), "{:?}", polled_at);
        for (actual, expected) in polled_at.iter().zip(expected) {
            assert_relative_eq!(*actual, expected, epsilon = 1e-6);
        }
        assert_eq!(results.metrics.iterations, 7);
        assert_eq!(results.metrics.rejected_updates, 0);
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let orchestrator = orchestrator(StaticAdapter::default(), Arc::new(PassingExecutor));
        let a = orchestrator.create_session(["x"], SessionConfig::default());
        let b = orchestrator.create_session(["y", "y"], SessionConfig::default());

        let listed = orchestrator.list_sessions();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|(_, status)| *status == SessionStatus::Created));
        assert!(listed.iter().any(|(id, _)| *id == a));
        assert_eq!(orchestrator.get_session_results(b).unwrap().agents, vec!["y"]);
    }
}
