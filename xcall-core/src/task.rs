//! Task spawning abstraction for single-threaded environments.

use std::future::Future;

/// Provider for spawning local tasks in a single-threaded context.
///
/// Inbound requests, publishes, and request timers each run as their own
/// local task. Implementations must execute the futures on the current
/// thread: nothing spawned through this trait is `Send`.
pub trait TaskProvider: Clone {
    /// Spawn a named task that runs on the current thread.
    ///
    /// The returned handle may be used to abort the task (the correlation
    /// engine aborts a request's timer once the response arrives).
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static;
}

/// Tokio-based task provider using `spawn_local`.
///
/// Must be used from within a `tokio::task::LocalSet`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTaskProvider;

impl TaskProvider for TokioTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static,
    {
        tracing::trace!(task = name, "spawning local task");
        tokio::task::spawn_local(future)
    }
}
