//! JSON exporter for scenario runs.
//!
//! Writes every session record (behaviors, test outcomes, metrics) so runs
//! can be diffed across seeds or fed to external dashboards.

use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;
use swarmsync_core::SessionResults;

use crate::error::SimError;
use crate::runner::ScenarioResult;

/// One scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioExport {
    pub scenario: String,
    pub seed: u64,
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Simulated wall clock at session start, seconds since the Unix epoch
    pub started_at_unix_secs: u64,

    pub final_time_secs: f64,
    pub delivered_behaviors: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionResults>,
}

impl From<&ScenarioResult> for ScenarioExport {
    fn from(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
            started_at_unix_secs: result
                .started_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            final_time_secs: result.final_time_secs,
            delivered_behaviors: result.delivered_behaviors,
            session: result.session.clone(),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimExport {
    pub passed: usize,
    pub failed: usize,
    pub runs: Vec<ScenarioExport>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a finished run.
    pub fn add_result(&mut self, result: &ScenarioResult) {
        if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.runs.push(ScenarioExport::from(result));
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
