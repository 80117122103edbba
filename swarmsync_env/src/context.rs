//! Core environment context trait for Swarmsync sessions.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" clock so that the session
/// orchestrator runs identically in production (tokio) and in the
/// deterministic simulation harness.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock advanced by `sleep`
#[async_trait]
pub trait SyncContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Agent report timestamps are taken from this clock, so it must
    /// never run backwards.
    fn now(&self) -> Duration;
    
    /// Returns the wall-clock time (for exported reports).
    fn system_time(&self) -> SystemTime;
    
    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);
    
    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
