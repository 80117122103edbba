//! Swarmsync Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the Swarmsync
//! engines to run in both **Production** (tokio) and **Simulation**
//! (virtual clock) environments.
//!
//! # Core Concept: The Reactor Pattern
//!
//! For Deterministic Simulation Testing (DST), we intercept the clock:
//! - Time (`now()`, `sleep()`)
//! - Seeding (`seed()`)
//!
//! Collaborator I/O (agent adapters, test executors) reports failures as
//! [`EnvError`] so the orchestration layer can absorb them uniformly.
//!
//! # Example
//!
//! ```ignore
//! use swarmsync_env::SyncContext;
//!
//! async fn poll_loop<Ctx: SyncContext>(ctx: &Ctx) {
//!     loop {
//!         let t = ctx.now().as_secs_f64();
//!         pull_agents(t).await;
//!         ctx.sleep(Duration::from_millis(500)).await;
//!     }
//! }
//! ```

mod context;
mod types;
mod error;
mod tokio_impl;

pub use context::SyncContext;
pub use types::SessionId;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
