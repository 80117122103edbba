//! Production implementation of SyncContext using Tokio.

use crate::SyncContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Production context backed by Tokio and the system clock.
///
/// The monotonic clock is tokio's, so a runtime started paused drives it
/// in virtual time.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
    
    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
    
    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
    
    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            // Stay cooperative even with a zero polling interval
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }
    
    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();
        
        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }
    
    #[tokio::test]
    async fn test_zero_sleep_returns() {
        let ctx = TokioContext::new();
        ctx.sleep(Duration::ZERO).await;
    }
    
    #[tokio::test(start_paused = true)]
    async fn test_paused_runtime_drives_clock() {
        let ctx = TokioContext::new();
        ctx.sleep(Duration::from_secs(3600)).await;
        assert!(ctx.now() >= Duration::from_secs(3600));
    }
    
    #[test]
    fn test_tokio_context_seed() {
        let ctx = TokioContext::new();
        assert_eq!(ctx.seed(), 0);
    }
}
