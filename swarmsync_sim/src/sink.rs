//! In-memory behavior sink standing in for dashboards and messaging.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use swarmsync_core::{BehaviorSink, BehaviorType, EmergentBehavior, TestResult};
use swarmsync_env::{EnvError, SessionId};

/// Records every delivery so runs can be inspected afterwards.
#[derive(Default)]
pub struct RecordingSink {
    behaviors: Mutex<Vec<(String, BehaviorType)>>,
    results: Mutex<Vec<(String, usize)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// (behavior_id, type) in delivery order.
    pub fn behaviors(&self) -> Vec<(String, BehaviorType)> {
        self.behaviors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of test results delivered across all behaviors.
    pub fn delivered_results(&self) -> usize {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, n)| n)
            .sum()
    }
}

#[async_trait]
impl BehaviorSink for RecordingSink {
    async fn publish_behavior(&self, _session: SessionId, behavior: &EmergentBehavior) -> Result<(), EnvError> {
        self.behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((behavior.behavior_id.clone(), behavior.behavior_type));
        Ok(())
    }

    async fn publish_results(
        &self,
        _session: SessionId,
        behavior_id: &str,
        results: &[TestResult],
    ) -> Result<(), EnvError> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((behavior_id.to_string(), results.len()));
        Ok(())
    }
}
