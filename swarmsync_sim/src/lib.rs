//! Swarmsync Deterministic Simulation Testing (DST) Harness
//!
//! This crate provides a controlled environment where a full orchestration
//! session runs deterministically against a simulated fleet.
//!
//! # Core Principle: The Reactor Pattern
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when the session sleeps; test
//!   timeouts run on a paused tokio clock
//! - **Agents**: Ground truth swarm with seeded noise and fault injection
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ current_thread runtime (paused clock) + SimContext   │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                         │                                   │
//! │                ┌────────▼─────────┐                         │
//! │                │ SessionOrchestrator│                       │
//! │                └──┬──────┬──────┬──┘                        │
//! │         adapter   │      │tests │  sink                     │
//! │  ┌────────────────▼┐ ┌───▼──────▼───┐ ┌──────────────┐      │
//! │  │    SimSwarm     │ │ SimTestHarness│ │RecordingSink│      │
//! │  │ (ground truth)  │ └──────────────┘ └──────────────┘      │
//! │  └─────────────────┘                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use swarmsync_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 8)
//!     .with_duration(30.0)
//!     .run(ScenarioId::Flock);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod harness;
mod runner;
mod sink;
mod swarm;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{ScenarioExport, SimExport};
pub use harness::{HarnessConfig, SimTestHarness};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use sink::RecordingSink;
pub use swarm::{SimAgent, SimSwarm, SwarmConfig};
