//! Node: dispatcher façade and executor.
//!
//! A [`Node`] owns a local registry, a directory cache and a [`Messenger`].
//! The façade side resolves names for the local caller; the executor side
//! serves names arriving from peers. Both follow the same addressing rules
//! (see [`address`](crate::address)):
//!
//! | name            | façade                     | executor                      |
//! |-----------------|----------------------------|-------------------------------|
//! | `n!`            | publish `n`                | n/a (markers are façade-only) |
//! | `$m`            | own member `m`             | own member `m`                |
//! | `n` registered  | local accessor             | registry entry                |
//! | `n` unknown     | remote call                | service unavailable           |
//! | `id.n`          | remote call (unless a key) | served only by node `id`      |

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use xcall_core::{NodeId, Providers, TokioProviders};

use crate::accessor::{ready, Accessor, Member};
use crate::address::{Address, FacadeName, Surface};
use crate::channel::Channel;
use crate::config::{CallOptions, NodeConfig};
use crate::directory::{DirAction, DirMessage, DirectoryCache, DIR_BROADCAST};
use crate::envelope::{CallData, EnvelopeScope};
use crate::error::CallError;
use crate::messenger::{Executor, Messenger};
use crate::registry::{CallFuture, Entry, Registry};

/// A participant on a channel.
///
/// Cloning yields another handle to the same node. When the last handle is
/// dropped the listener is removed and calls still awaiting a response
/// settle with [`CallError::Closed`].
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use xcall::{Entry, LocalChannel, Node, NodeConfig, TokioProviders};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(
/// # tokio::task::LocalSet::new().run_until(async {
/// let channel = LocalChannel::new();
/// let config = NodeConfig::builder().id("math").build().unwrap();
/// let math = Node::new(channel.clone(), config, TokioProviders::new());
/// math.insert("square", Entry::func(|args| {
///     let x = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
///     Ok(json!(x * x))
/// }));
///
/// let client = Node::new(channel, NodeConfig::default(), TokioProviders::new());
/// assert_eq!(client.call("square", vec![json!(7)]).await, Ok(json!(49)));
/// # }));
/// ```
pub struct Node<P: Providers = TokioProviders> {
    inner: Rc<NodeInner<P>>,
}

struct NodeInner<P: Providers> {
    id: NodeId,
    registry: Registry,
    directory: DirectoryCache,
    messenger: Messenger<P>,
    call_options: CallOptions,
    closed: Cell<bool>,
}

/// Non-owning handle used by member accessors.
pub struct WeakNode<P: Providers> {
    inner: Weak<NodeInner<P>>,
}

impl<P: Providers> Node<P> {
    /// Attach a node with an empty registry.
    pub fn new(channel: impl Channel + 'static, config: NodeConfig, providers: P) -> Self {
        Self::with_registry(channel, Registry::new(), config, providers)
    }

    /// Attach a node serving `registry`.
    ///
    /// Without an explicit id in `config`, a random one is drawn from the
    /// providers.
    pub fn with_registry(
        channel: impl Channel + 'static,
        registry: Registry,
        config: NodeConfig,
        providers: P,
    ) -> Self {
        let id = match config.id() {
            Some(id) => id.clone(),
            None => NodeId::random(providers.random()),
        };
        let channel: Rc<dyn Channel> = Rc::new(channel);

        let inner = Rc::new_cyclic(|weak: &Weak<NodeInner<P>>| {
            let weak = weak.clone();
            let exec: Executor = Rc::new(move |call: CallData| -> CallFuture {
                match weak.upgrade() {
                    Some(node) => node.execute(call),
                    None => ready(Err(CallError::ServiceUnavailable)),
                }
            });
            let messenger = Messenger::new(
                channel,
                id.clone(),
                EnvelopeScope::new(config.channel_id()),
                exec,
                config.decoder(),
                providers,
            );
            NodeInner {
                id,
                registry,
                directory: DirectoryCache::new(),
                messenger,
                call_options: config.call_options(),
                closed: Cell::new(false),
            }
        });

        tracing::debug!(
            node = %inner.id,
            channel_id = config.channel_id(),
            names = inner.registry.len(),
            "node attached"
        );
        Self { inner }
    }

    /// This node's id.
    pub fn id(&self) -> &NodeId {
        &self.inner.id
    }

    /// Sub-channel the node talks on.
    pub fn channel_id(&self) -> &str {
        self.inner.messenger.channel_id()
    }

    /// Default options of remote calls.
    pub fn call_options(&self) -> CallOptions {
        self.inner.call_options
    }

    /// Resolve `name` with the node's default call options.
    pub fn resolve(&self, name: &str) -> Result<Accessor<P>, CallError> {
        self.inner.resolve(name, self.inner.call_options)
    }

    /// Resolve `name`; a remote call uses `options`.
    ///
    /// Fails with [`CallError::ServiceUnavailable`] for an unknown member,
    /// or for a remote name once the node is closed.
    pub fn resolve_with(&self, name: &str, options: CallOptions) -> Result<Accessor<P>, CallError> {
        self.inner.resolve(name, options)
    }

    /// Resolve and call `name`.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, CallError> {
        self.resolve(name)?.call(args).await
    }

    /// Resolve and call `name` with explicit options.
    pub async fn call_with(
        &self,
        name: &str,
        args: Vec<Value>,
        options: CallOptions,
    ) -> Result<Value, CallError> {
        self.resolve_with(name, options)?.call(args).await
    }

    /// Register or overwrite a local entry. Returns the previous one.
    pub fn insert(&self, name: impl Into<String>, entry: impl Into<Entry>) -> Option<Entry> {
        self.inner.registry.insert(name, entry)
    }

    /// Delete a local entry.
    pub fn remove(&self, name: &str) -> bool {
        self.inner.registry.remove(name)
    }

    /// Whether `name` is registered locally.
    pub fn has(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    /// Locally registered names.
    pub fn keys(&self) -> Vec<String> {
        self.inner.registry.keys()
    }

    /// The local registry.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Start a directory sweep (same as calling `$dir` with no argument).
    pub async fn dir(&self) -> Result<(), CallError> {
        self.inner.call_member(Member::Dir, Vec::new()).await.map(|_| ())
    }

    /// Snapshot of the directory cache.
    pub fn directory(&self) -> BTreeMap<String, Vec<String>> {
        self.inner.directory.snapshot()
    }

    /// Requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.messenger.pending_count()
    }

    /// Detach from the channel and serve locally only.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }
}

impl<P: Providers> Clone for Node<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Providers> fmt::Debug for Node<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("channel_id", &self.channel_id())
            .field("registry", &self.inner.registry)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<P: Providers> NodeInner<P> {
    fn resolve(self: &Rc<Self>, name: &str, options: CallOptions) -> Result<Accessor<P>, CallError> {
        let accessor = match FacadeName::parse(name) {
            FacadeName::Publish(target) => {
                self.ensure_open()?;
                Accessor::RemotePublish {
                    messenger: self.messenger.clone(),
                    name: target.to_string(),
                }
            }
            FacadeName::Member(member) => Accessor::Member {
                node: WeakNode {
                    inner: Rc::downgrade(self),
                },
                member: Member::parse(member).ok_or(CallError::ServiceUnavailable)?,
            },
            FacadeName::Plain(plain) => match self.local_entry(plain) {
                Some(Entry::Func(f)) => Accessor::LocalCallable(f),
                Some(Entry::Value(_)) => Accessor::LocalValue {
                    registry: self.registry.clone(),
                    name: plain.to_string(),
                },
                None => {
                    self.ensure_open()?;
                    Accessor::RemoteCall {
                        messenger: self.messenger.clone(),
                        name: plain.to_string(),
                        options,
                    }
                }
            },
        };
        tracing::trace!(node = %self.id, name, kind = ?accessor.kind(), "name resolved");
        Ok(accessor)
    }

    /// The full name is looked up as registered, dots included. A qualified
    /// name that is not a registry key goes remote, even when it names this
    /// node.
    fn local_entry(&self, name: &str) -> Option<Entry> {
        self.registry.get(name)
    }

    fn ensure_open(&self) -> Result<(), CallError> {
        if self.closed.get() {
            Err(CallError::ServiceUnavailable)
        } else {
            Ok(())
        }
    }

    fn execute(self: &Rc<Self>, call: CallData) -> CallFuture {
        let CallData { name, args } = call;
        let address = Address::parse(&name);
        if !address.accepts(&self.id) {
            return ready(Err(CallError::ServiceUnavailable));
        }
        match address.surface {
            Surface::Member(member) => match Member::parse(member) {
                Some(member) => self.call_member(member, args),
                None => ready(Err(CallError::ServiceUnavailable)),
            },
            Surface::Registry(entry) => match self.registry.invoke(entry, args) {
                Some(future) => future,
                None => ready(Err(CallError::ServiceUnavailable)),
            },
        }
    }

    fn call_member(self: &Rc<Self>, member: Member, args: Vec<Value>) -> CallFuture {
        if !member.is_callable() && !args.is_empty() {
            return ready(Err(CallError::InvalidArguments(format!(
                "member `{}` is read-only",
                member.name()
            ))));
        }
        match member {
            Member::Id => ready(Ok(Value::String(self.id.to_string()))),
            Member::Keys => ready(Ok(Value::Array(
                self.registry.keys().into_iter().map(Value::String).collect(),
            ))),
            Member::Fns => ready(Ok(self.directory.to_value())),
            Member::Close => {
                self.close();
                ready(Ok(Value::Null))
            }
            Member::Dir => match DirMessage::from_args(&args) {
                Ok(message) => self.dir(message),
                Err(e) => ready(Err(e)),
            },
        }
    }

    fn dir(self: &Rc<Self>, message: DirMessage) -> CallFuture {
        match message.into_action() {
            DirAction::Store { from, fns } => {
                tracing::debug!(node = %self.id, from = %from, names = fns.len(), "directory entry stored");
                self.directory.store(from, fns);
                ready(Ok(Value::Null))
            }
            DirAction::Sweep => {
                self.directory.store(self.id.to_string(), self.registry.keys());
                tracing::debug!(node = %self.id, "starting directory sweep");
                self.forward(DIR_BROADCAST, DirMessage::sweep())
            }
            DirAction::Reply { callback } => {
                tracing::trace!(node = %self.id, callback = %callback, "answering directory sweep");
                self.forward(&callback, DirMessage::report(&self.id, self.registry.keys()))
            }
        }
    }

    /// Deliver a directory message through the façade, like any caller would.
    fn forward(self: &Rc<Self>, name: &str, message: DirMessage) -> CallFuture {
        let argument = match message.to_value() {
            Ok(argument) => argument,
            Err(e) => return ready(Err(CallError::InvalidArguments(e.to_string()))),
        };
        match self.resolve(name, self.call_options) {
            Ok(accessor) => accessor.call(vec![argument]),
            Err(e) => ready(Err(e)),
        }
    }

    fn close(&self) {
        if !self.closed.replace(true) {
            self.messenger.close();
            tracing::debug!(
                node = %self.id,
                pending = self.messenger.pending_count(),
                "node closed"
            );
        }
    }
}

impl<P: Providers> WeakNode<P> {
    /// A handle to no node.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self { inner: Weak::new() }
    }

    pub(crate) fn call_member(&self, member: Member, args: Vec<Value>) -> CallFuture {
        match self.inner.upgrade() {
            Some(node) => node.call_member(member, args),
            None => ready(Err(CallError::ServiceUnavailable)),
        }
    }
}

impl<P: Providers> Clone for WeakNode<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Providers> fmt::Debug for WeakNode<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.inner.upgrade().map(|node| node.id.clone());
        f.debug_tuple("WeakNode").field(&id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use serde_json::json;

    use super::*;
    use crate::accessor::AccessorKind;
    use crate::local_channel::LocalChannel;

    fn node(channel: &LocalChannel, id: &str) -> Node {
        let config = NodeConfig::builder().id(id).build().unwrap();
        Node::new(channel.clone(), config, TokioProviders::new())
    }

    async fn run_local<F: Future<Output = ()>>(f: F) {
        tokio::task::LocalSet::new().run_until(f).await;
    }

    #[tokio::test]
    async fn test_random_id_when_unset() {
        run_local(async {
            let channel = LocalChannel::new();
            let a = Node::new(channel.clone(), NodeConfig::default(), TokioProviders::new());
            let b = Node::new(channel, NodeConfig::default(), TokioProviders::new());
            assert_eq!(a.id().as_str().len(), 32);
            assert_ne!(a.id(), b.id());
        })
        .await;
    }

    #[tokio::test]
    async fn test_resolution_kinds() {
        run_local(async {
            let channel = LocalChannel::new();
            let n = node(&channel, "n");
            n.insert("value", json!(1));
            n.insert("func", Entry::func(|_| Ok(Value::Null)));

            let kind = |name: &str| n.resolve(name).map(|a| a.kind());
            assert_eq!(kind("value"), Ok(AccessorKind::LocalValue));
            assert_eq!(kind("func"), Ok(AccessorKind::LocalCallable));
            assert_eq!(kind("elsewhere"), Ok(AccessorKind::RemoteCall));
            assert_eq!(kind("n.value"), Ok(AccessorKind::RemoteCall));
            assert_eq!(kind("value!"), Ok(AccessorKind::RemotePublish));
            assert_eq!(kind("$dir!"), Ok(AccessorKind::RemotePublish));
            assert_eq!(kind("$id"), Ok(AccessorKind::Member));
            assert_eq!(kind("$missing"), Err(CallError::ServiceUnavailable));
        })
        .await;
    }

    #[tokio::test]
    async fn test_read_only_members() {
        run_local(async {
            let channel = LocalChannel::new();
            let n = node(&channel, "n");
            n.insert("b", json!(1));
            n.insert("a", json!(2));

            assert_eq!(n.call("$id", vec![]).await, Ok(json!("n")));
            assert_eq!(n.call("$keys", vec![]).await, Ok(json!(["a", "b"])));
            assert_eq!(n.call("$fns", vec![]).await, Ok(json!({})));
            assert!(matches!(
                n.call("$id", vec![json!("other")]).await,
                Err(CallError::InvalidArguments(_))
            ));
        })
        .await;
    }

    #[tokio::test]
    async fn test_executor_rules() {
        run_local(async {
            let channel = LocalChannel::new();
            let n = node(&channel, "n");
            n.insert("v", json!(3));
            let exec = |name: &str, args: Vec<Value>| n.inner.execute(CallData::new(name, args));

            assert_eq!(exec("v", vec![]).await, Ok(json!(3)));
            assert_eq!(exec("n.v", vec![json!(4)]).await, Ok(json!(4)));
            assert_eq!(exec("other.v", vec![]).await, Err(CallError::ServiceUnavailable));
            assert_eq!(exec("missing", vec![]).await, Err(CallError::ServiceUnavailable));
            assert_eq!(exec("n.$id", vec![]).await, Ok(json!("n")));
            assert_eq!(exec("$nope", vec![]).await, Err(CallError::ServiceUnavailable));
            assert_eq!(n.call("v", vec![]).await, Ok(json!(4)));
        })
        .await;
    }

    #[tokio::test]
    async fn test_close_member() {
        run_local(async {
            let channel = LocalChannel::new();
            let n = node(&channel, "n");
            n.insert("local", json!("still here"));
            assert_eq!(channel.listener_count(), 1);

            assert_eq!(n.call("$close", vec![]).await, Ok(Value::Null));
            assert!(n.is_closed());
            assert_eq!(channel.listener_count(), 0);
            assert_eq!(n.call("local", vec![]).await, Ok(json!("still here")));
            assert_eq!(n.resolve("remote").unwrap_err(), CallError::ServiceUnavailable);
            assert_eq!(n.resolve("local!").unwrap_err(), CallError::ServiceUnavailable);
            assert_eq!(n.dir().await, Err(CallError::ServiceUnavailable));
            // Closing twice is harmless.
            n.close();
        })
        .await;
    }

    #[tokio::test]
    async fn test_sweep_records_own_entry() {
        run_local(async {
            let channel = LocalChannel::new();
            let n = node(&channel, "solo");
            n.insert("x", json!(1));
            n.dir().await.unwrap();
            assert_eq!(n.directory().get("solo"), Some(&vec!["x".to_string()]));
        })
        .await;
    }
}
