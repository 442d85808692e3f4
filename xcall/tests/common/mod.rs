//! Shared fixtures for the xcall integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use xcall::{
    Channel, Entry, Listener, ListenerId, LocalChannel, Node, NodeConfig, Registry,
    TokioProviders,
};

/// A [`LocalChannel`] that remembers every posted message.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    bus: LocalChannel,
    posted: Rc<RefCell<Vec<Value>>>,
}

impl RecordingChannel {
    /// Record posts made through this handle onto `bus`.
    pub fn new(bus: LocalChannel) -> Self {
        Self {
            bus,
            posted: Rc::default(),
        }
    }

    /// Number of messages posted through this handle.
    pub fn count(&self) -> usize {
        self.posted.borrow().len()
    }

    /// Messages posted through this handle, in order.
    pub fn messages(&self) -> Vec<Value> {
        self.posted.borrow().clone()
    }

    /// Type tags of the posted envelopes, in order.
    pub fn kinds(&self) -> Vec<String> {
        self.posted
            .borrow()
            .iter()
            .map(|message| message["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Forget what was recorded so far.
    pub fn clear(&self) {
        self.posted.borrow_mut().clear();
    }
}

impl Channel for RecordingChannel {
    fn post_message(&self, message: Value) {
        self.posted.borrow_mut().push(message.clone());
        self.bus.post_message(message);
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.bus.add_listener(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.bus.remove_listener(id)
    }
}

/// Install a test subscriber once per binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Run `f` on a `LocalSet`, where nodes spawn their tasks.
pub async fn run_local<F: Future<Output = ()>>(f: F) {
    init_tracing();
    tokio::task::LocalSet::new().run_until(f).await;
}

/// Give spawned handlers time to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Config with an explicit id on the default sub-channel.
pub fn config(id: &str) -> NodeConfig {
    NodeConfig::builder().id(id).build().unwrap()
}

/// Attach a node `id` serving `entries`.
pub fn node<C, I>(channel: C, id: &str, entries: I) -> Node
where
    C: Channel + 'static,
    I: IntoIterator<Item = (&'static str, Entry)>,
{
    let registry: Registry = entries.into_iter().collect();
    Node::with_registry(channel, registry, config(id), TokioProviders::new())
}

/// A function returning `value` whatever the arguments.
pub fn constant(value: Value) -> Entry {
    Entry::func(move |_| Ok(value.clone()))
}

/// A function counting its invocations into `counter`.
pub fn counter(counter: Rc<RefCell<i64>>) -> Entry {
    Entry::func(move |args| {
        let step = args.first().and_then(Value::as_i64).unwrap_or(1);
        *counter.borrow_mut() += step;
        Ok(Value::from(*counter.borrow()))
    })
}
