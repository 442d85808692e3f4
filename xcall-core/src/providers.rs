//! Provider bundle trait for simplified type parameters.
//!
//! Without bundling, every engine type would carry three separate provider
//! type parameters:
//!
//! ```text
//! struct Messenger<T, TP, R>
//! where
//!     T: TimeProvider + Clone + 'static,
//!     TP: TaskProvider + Clone + 'static,
//!     R: RandomProvider + Clone + 'static,
//! ```
//!
//! With bundling, this simplifies to `struct Messenger<P: Providers>`.

use crate::{
    RandomProvider, TaskProvider, TimeProvider, TokioRandomProvider, TokioTaskProvider,
    TokioTimeProvider,
};

/// Bundle of all provider types for a runtime environment.
///
/// The trait uses associated types to preserve type information at compile
/// time without runtime dispatch.
pub trait Providers: Clone + 'static {
    /// Time provider type for sleep and time queries.
    type Time: TimeProvider + Clone + 'static;

    /// Task provider type for spawning local tasks.
    type Task: TaskProvider + Clone + 'static;

    /// Random provider type.
    type Random: RandomProvider + Clone + 'static;

    /// Get the time provider instance.
    fn time(&self) -> &Self::Time;

    /// Get the task provider instance.
    fn task(&self) -> &Self::Task;

    /// Get the random provider instance.
    fn random(&self) -> &Self::Random;
}

/// Production providers using the Tokio runtime.
///
/// ## Example
///
/// ```rust
/// use xcall_core::{Providers, TimeProvider, TokioProviders};
///
/// let providers = TokioProviders::new();
/// let _elapsed = providers.time().now();
/// ```
#[derive(Clone)]
pub struct TokioProviders {
    time: TokioTimeProvider,
    task: TokioTaskProvider,
    random: TokioRandomProvider,
}

impl TokioProviders {
    /// Create a new production providers bundle.
    pub fn new() -> Self {
        Self {
            time: TokioTimeProvider::new(),
            task: TokioTaskProvider,
            random: TokioRandomProvider::new(),
        }
    }
}

impl Default for TokioProviders {
    fn default() -> Self {
        Self::new()
    }
}

impl Providers for TokioProviders {
    type Time = TokioTimeProvider;
    type Task = TokioTaskProvider;
    type Random = TokioRandomProvider;

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn task(&self) -> &Self::Task {
        &self.task
    }

    fn random(&self) -> &Self::Random {
        &self.random
    }
}
