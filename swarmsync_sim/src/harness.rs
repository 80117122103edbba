//! Deterministic test generator and executor.
//!
//! Stands in for the external test machinery. Generation is pure; execution
//! draws pass/fail and durations from a seeded stream, and can stall past
//! any sensible timeout to exercise the orchestrator's abandonment path.

use async_trait::async_trait;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use swarmsync_core::{TestCase, TestCategory, TestComplexity, TestExecutor, TestGenerator, TestResult};
use swarmsync_env::EnvError;

use crate::context::SimContext;

const HARNESS_STREAM: u64 = 0x5eed_0002;

/// How long a stalled execution hangs (tokio time).
const STALL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Probability that an individual test fails
    pub failure_rate: f64,

    /// Probability that an execution batch hangs
    pub stall_probability: f64,

    /// Probability that generation itself errors
    pub generation_failure_rate: f64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.1,
            stall_probability: 0.0,
            generation_failure_rate: 0.0,
        }
    }
}

pub struct SimTestHarness {
    config: HarnessConfig,
    rng: Mutex<ChaCha8Rng>,
}

impl SimTestHarness {
    pub fn new(ctx: &SimContext, config: HarnessConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(ctx.fork_rng(HARNESS_STREAM)),
        }
    }

    pub fn shared(ctx: &SimContext, config: HarnessConfig) -> Arc<Self> {
        Arc::new(Self::new(ctx, config))
    }

    fn roll(&self, probability: f64) -> bool {
        probability > 0.0
            && self
                .rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .gen_bool(probability.min(1.0))
    }
}

fn tests_per_complexity(complexity: TestComplexity) -> usize {
    match complexity {
        TestComplexity::Low => 1,
        TestComplexity::Medium => 2,
        TestComplexity::High => 4,
    }
}

#[async_trait]
impl TestGenerator for SimTestHarness {
    async fn generate_tests(
        &self,
        target: &str,
        category: TestCategory,
        complexity: TestComplexity,
        edge_cases: bool,
        max_tests: usize,
    ) -> Result<Vec<TestCase>, EnvError> {
        if self.roll(self.config.generation_failure_rate) {
            return Err(EnvError::adapter(format!("generator rejected {}/{}", target, category)));
        }

        let regular = tests_per_complexity(complexity);
        let total = (regular + usize::from(edge_cases)).min(max_tests);

        let tests = (0..total)
            .map(|n| {
                let edge_case = edge_cases && n == regular;
                TestCase {
                    test_id: format!("{}-{}-{}", target, category, n),
                    target: target.to_string(),
                    category,
                    complexity,
                    edge_case,
                    description: if edge_case {
                        format!("{} edge case for {}", category, target)
                    } else {
                        format!("{} check #{} for {}", category, n + 1, target)
                    },
                }
            })
            .collect();
        Ok(tests)
    }
}

#[async_trait]
impl TestExecutor for SimTestHarness {
    async fn execute_tests(&self, tests: &[TestCase], _target: &str) -> Result<Vec<TestResult>, EnvError> {
        if self.roll(self.config.stall_probability) {
            tokio::time::sleep(STALL).await;
        }

        // Draw everything under one lock, never across an await
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let results = tests
            .iter()
            .map(|test| {
                let duration = rng.gen_range(0.01..0.2);
                let fails = self.config.failure_rate > 0.0 && rng.gen_bool(self.config.failure_rate.min(1.0));
                if fails {
                    TestResult::failed(&test.test_id, duration, format!("{} assertion failed", test.category))
                } else {
                    TestResult::passed(&test.test_id, duration)
                }
            })
            .collect();
        Ok(results)
    }
}
