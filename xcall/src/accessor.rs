//! Resolved accessors.
//!
//! [`Node::resolve`](crate::Node::resolve) turns a name into an [`Accessor`]
//! once; the accessor then performs every later `call`, `get` or `set`
//! without re-reading the name. Local variants never touch the channel.

use std::fmt;

use serde_json::Value;
use xcall_core::Providers;

use crate::config::CallOptions;
use crate::error::CallError;
use crate::messenger::Messenger;
use crate::node::WeakNode;
use crate::registry::{CallFuture, Callable, Registry};

/// Members reachable with the `$` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Member {
    /// `$id`: the node id.
    Id,
    /// `$dir`: the directory protocol.
    Dir,
    /// `$fns`: the directory cache.
    Fns,
    /// `$keys`: the local registry names.
    Keys,
    /// `$close`: detach the node from its channel.
    Close,
}

impl Member {
    /// Look a member up by name (marker already stripped).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Member::Id),
            "dir" => Some(Member::Dir),
            "fns" => Some(Member::Fns),
            "keys" => Some(Member::Keys),
            "close" => Some(Member::Close),
            _ => None,
        }
    }

    /// Member name without the marker.
    pub fn name(&self) -> &'static str {
        match self {
            Member::Id => "id",
            Member::Dir => "dir",
            Member::Fns => "fns",
            Member::Keys => "keys",
            Member::Close => "close",
        }
    }

    /// Whether the member is a function rather than a read-only value.
    pub fn is_callable(&self) -> bool {
        matches!(self, Member::Dir | Member::Close)
    }
}

/// Discriminant of an [`Accessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// Non-callable registry entry.
    LocalValue,
    /// Callable registry entry.
    LocalCallable,
    /// Request through the correlation engine.
    RemoteCall,
    /// Publish through the correlation engine.
    RemotePublish,
    /// Node member.
    Member,
}

/// A resolved name.
pub enum Accessor<P: Providers> {
    /// Get/set a registry value through call syntax.
    LocalValue {
        /// Registry holding the value.
        registry: Registry,
        /// Entry name.
        name: String,
    },
    /// Invoke a registry callable directly.
    LocalCallable(Callable),
    /// Send a request and await the first response.
    RemoteCall {
        /// Engine posting the request.
        messenger: Messenger<P>,
        /// Name placed on the wire.
        name: String,
        /// Options of every call made through this accessor.
        options: CallOptions,
    },
    /// Publish and return immediately.
    RemotePublish {
        /// Engine posting the publish.
        messenger: Messenger<P>,
        /// Name placed on the wire.
        name: String,
    },
    /// A member of the resolving node.
    Member {
        /// The node; members of a dropped node are unavailable.
        node: WeakNode<P>,
        /// Which member.
        member: Member,
    },
}

impl<P: Providers> Accessor<P> {
    /// Variant of this accessor.
    pub fn kind(&self) -> AccessorKind {
        match self {
            Accessor::LocalValue { .. } => AccessorKind::LocalValue,
            Accessor::LocalCallable(_) => AccessorKind::LocalCallable,
            Accessor::RemoteCall { .. } => AccessorKind::RemoteCall,
            Accessor::RemotePublish { .. } => AccessorKind::RemotePublish,
            Accessor::Member { .. } => AccessorKind::Member,
        }
    }

    /// Whether calls are served without posting anything.
    pub fn is_local(&self) -> bool {
        matches!(
            self.kind(),
            AccessorKind::LocalValue | AccessorKind::LocalCallable | AccessorKind::Member
        )
    }

    /// Invoke the accessor.
    ///
    /// For a local value, no argument reads it and exactly one argument
    /// overwrites it. A publish resolves to `null` as soon as it is posted.
    pub fn call(&self, args: Vec<Value>) -> CallFuture {
        match self {
            Accessor::LocalValue { registry, name } => match registry.invoke(name, args) {
                Some(future) => future,
                None => ready(Err(CallError::ServiceUnavailable)),
            },
            Accessor::LocalCallable(f) => f(args),
            Accessor::RemoteCall {
                messenger,
                name,
                options,
            } => Box::pin(messenger.send(name.clone(), args, *options)),
            Accessor::RemotePublish { messenger, name } => {
                messenger.publish(name.clone(), args);
                ready(Ok(Value::Null))
            }
            Accessor::Member { node, member } => node.call_member(*member, args),
        }
    }

    /// Zero-argument call.
    pub fn get(&self) -> CallFuture {
        self.call(Vec::new())
    }

    /// One-argument call.
    pub fn set(&self, value: impl Into<Value>) -> CallFuture {
        self.call(vec![value.into()])
    }
}

impl<P: Providers> Clone for Accessor<P> {
    fn clone(&self) -> Self {
        match self {
            Accessor::LocalValue { registry, name } => Accessor::LocalValue {
                registry: registry.clone(),
                name: name.clone(),
            },
            Accessor::LocalCallable(f) => Accessor::LocalCallable(f.clone()),
            Accessor::RemoteCall {
                messenger,
                name,
                options,
            } => Accessor::RemoteCall {
                messenger: messenger.clone(),
                name: name.clone(),
                options: *options,
            },
            Accessor::RemotePublish { messenger, name } => Accessor::RemotePublish {
                messenger: messenger.clone(),
                name: name.clone(),
            },
            Accessor::Member { node, member } => Accessor::Member {
                node: node.clone(),
                member: *member,
            },
        }
    }
}

impl<P: Providers> fmt::Debug for Accessor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::LocalValue { name, .. } => f.debug_tuple("LocalValue").field(name).finish(),
            Accessor::LocalCallable(_) => f.write_str("LocalCallable"),
            Accessor::RemoteCall { name, options, .. } => f
                .debug_struct("RemoteCall")
                .field("name", name)
                .field("options", options)
                .finish(),
            Accessor::RemotePublish { name, .. } => {
                f.debug_tuple("RemotePublish").field(name).finish()
            }
            Accessor::Member { member, .. } => f.debug_tuple("Member").field(member).finish(),
        }
    }
}

pub(crate) fn ready(result: Result<Value, CallError>) -> CallFuture {
    Box::pin(std::future::ready(result))
}
