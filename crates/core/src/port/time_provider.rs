// Time Provider Port (for testability)
use async_trait::async_trait;
use std::time::Duration;

/// Time provider interface (allows mocking in tests)
#[async_trait]
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;

    /// Block the caller for `duration` (settling delays)
    async fn sleep(&self, duration: Duration);
}

/// System time provider (production)
pub struct SystemTimeProvider;

#[async_trait]
impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Clock that advances only when slept on
    #[derive(Clone, Default)]
    pub struct ManualTimeProvider {
        now: Arc<Mutex<i64>>,
        sleeps: Arc<Mutex<Vec<Duration>>>,
    }

    impl ManualTimeProvider {
        pub fn new(start_millis: i64) -> Self {
            Self {
                now: Arc::new(Mutex::new(start_millis)),
                sleeps: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Every requested sleep, in order
        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TimeProvider for ManualTimeProvider {
        fn now_millis(&self) -> i64 {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            *self.now.lock().unwrap() += duration.as_millis() as i64;
        }
    }
}
