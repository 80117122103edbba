//! Swarmsync Core - Multi-Agent State Synchronization & Emergence Detection
//!
//! This library keeps one consistent view of a swarm of independent agents
//! and mines it for patterns no single agent reports:
//! 1. **Temporal plausibility**: per-agent monotonicity, window and arrival-density checks
//! 2. **System state**: consensus-gated aggregates, interaction graph, inline summaries
//! 3. **Emergence**: spatial, temporal, interaction and metric detection passes
//!
//! The [`session`] module ties both engines to live agents through the
//! collaborator contracts in [`collaborators`].

pub mod collaborators;
pub mod consensus;
pub mod detector;
pub mod error;
pub mod interaction;
pub mod model;
pub mod session;
pub mod stats;
pub mod temporal;
pub mod tracker;

// Re-export key types for convenience
pub use collaborators::{
    categories_for, AgentAdapter, BehaviorSink, Collaborators, TestCase, TestCategory,
    TestComplexity, TestExecutor, TestGenerator, TestResult,
};
pub use consensus::{AcceptAll, ConsensusGate, MinConfidenceGate};
pub use detector::{DetectorConfig, EmergentDetector};
pub use error::SyncError;
pub use interaction::InteractionGraph;
pub use model::{
    AgentState, AgentStatus, BehaviorType, EmergentBehavior, GlobalMetrics, MetricValue,
    PatternKind, PatternSummary, SystemState,
};
pub use session::{
    SessionConfig, SessionMetrics, SessionOrchestrator, SessionResults, SessionStatus, TestOutcome,
};
pub use temporal::{TemporalConfig, TemporalValidator, TemporalViolation};
pub use tracker::{StateTracker, TrackerConfig};
