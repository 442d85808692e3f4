//! # xcall
//!
//! Addressable RPC over an opaque message channel.
//!
//! Independent nodes (workers, windows, in-process modules) share a
//! [`Channel`] and call each other's named functions as if they were local:
//!
//! - **Correlation engine** ([`Messenger`]): request/response envelopes,
//!   the pending-request table and its timers, fire-and-forget publish
//! - **Dispatcher** ([`Node`]): resolves a name to a local value, a local
//!   function, a remote call, a publish, or one of the node's own members
//! - **Directory protocol**: discovers which names the peers serve
//!
//! ## Addressing
//!
//! ```text
//! "square"        local entry if registered, otherwise any peer serving it
//! "math.square"   only the node with id "math" serves it
//! "tick!"         publish to every peer, do not wait
//! "$dir"          a member of the node itself
//! ```
//!
//! ## Runtime
//!
//! Everything is single-threaded and `!Send`. Nodes spawn their work with
//! `spawn_local`, so they must live inside a `tokio::task::LocalSet`.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub use xcall_core::{
    NodeId, NodeIdError, Providers, RandomProvider, TaskProvider, TimeProvider, TokioProviders,
    Value,
};

// =============================================================================
// Modules
// =============================================================================

pub mod accessor;
pub mod address;
pub mod channel;
pub mod config;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod local_channel;
pub mod messenger;
pub mod node;
pub mod registry;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use accessor::{Accessor, AccessorKind, Member};
pub use address::{Address, FacadeName, Surface};
pub use channel::{default_decode, Channel, ChannelEvent, Decoder, Listener, ListenerId};
pub use config::{CallOptions, NodeConfig, NodeConfigBuilder};
pub use directory::{DirAction, DirMessage, DirectoryCache};
pub use envelope::{CallData, Envelope, EnvelopeKind, EnvelopeScope, RequestId, RequestIdFactory};
pub use error::{CallError, NodeConfigError};
pub use local_channel::LocalChannel;
pub use messenger::{Executor, Messenger, ReplyFuture};
pub use node::{Node, WeakNode};
pub use registry::{CallFuture, Callable, Entry, LocalFuture, Registry};
