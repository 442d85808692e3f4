//! Time provider abstraction.
//!
//! The correlation engine arms one timer per pending request. Routing the
//! sleep through a provider keeps the engine independent of the runtime that
//! drives it.

use async_trait::async_trait;
use std::time::Duration;

/// Provider trait for time operations.
///
/// ## Time Semantics
///
/// - `sleep()`: Suspends the current task for at least `duration`.
/// - `now()`: Elapsed time since the provider was created. Used to stamp
///   pending requests, never for wall-clock display.
#[async_trait(?Send)]
pub trait TimeProvider: Clone {
    /// Sleep for the specified duration.
    async fn sleep(&self, duration: Duration);

    /// Get the current time, relative to provider creation.
    fn now(&self) -> Duration;
}

/// Real time provider using Tokio's time facilities.
#[derive(Debug, Clone)]
pub struct TokioTimeProvider {
    /// Start time for calculating elapsed duration
    start_time: std::time::Instant,
}

impl TokioTimeProvider {
    /// Create a new Tokio time provider.
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
        }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl TimeProvider for TokioTimeProvider {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Duration {
        self.start_time.elapsed()
    }
}
