//! # xcall-core
//!
//! Runtime-agnostic building blocks for the xcall RPC engine.
//!
//! This crate provides:
//!
//! - **Provider traits**: abstractions for time, local task spawning, and
//!   randomness, so the protocol engine never reaches for a global runtime
//! - **Core types**: [`NodeId`] and the dynamic [`Value`] model carried in
//!   call arguments, results, and error payloads
//!
//! ## Provider Traits
//!
//! - [`TimeProvider`]: Sleep and elapsed-time queries (request timeouts)
//! - [`TaskProvider`]: Named task spawning on the current thread
//! - [`RandomProvider`]: Random values (default node identities), with a
//!   [`SeededRandomProvider`] for reproducible ids
//! - [`Providers`]: Bundle of the three, with [`TokioProviders`] for
//!   production use
//!
//! Everything here is single-threaded: futures are `!Send` and tasks are
//! spawned with `spawn_local`, so callers must run inside a
//! `tokio::task::LocalSet` (or an equivalent local executor).

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod node_id;
mod providers;
mod random;
mod task;
mod time;

pub use node_id::{NodeId, NodeIdError};
pub use providers::{Providers, TokioProviders};
pub use random::{RandomProvider, SeededRandomProvider, TokioRandomProvider};
pub use task::{TaskProvider, TokioTaskProvider};
pub use time::{TimeProvider, TokioTimeProvider};

/// Dynamic value carried by calls, results, registry entries, and errors.
pub use serde_json::Value;
