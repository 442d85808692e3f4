//! In-process channel.
//!
//! `LocalChannel` fans every posted message out to all registered listeners,
//! synchronously, on the calling thread. It lets several nodes living in the
//! same process (modules, components, tests) talk through the same protocol
//! a cross-process transport would carry.
//!
//! Dispatch works on a snapshot of the listener list, so a listener may post,
//! add, or remove listeners while it is being invoked.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;

use crate::channel::{Channel, ChannelEvent, Listener, ListenerId};

/// Synchronous in-process message bus.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct LocalChannel {
    inner: Rc<LocalChannelInner>,
}

#[derive(Default)]
struct LocalChannelInner {
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_id: Cell<u64>,
}

impl LocalChannel {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl Channel for LocalChannel {
    fn post_message(&self, message: Value) {
        let snapshot: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        tracing::trace!(listeners = snapshot.len(), "local channel post");
        let event = ChannelEvent::message(message);
        for listener in snapshot {
            listener(&event);
        }
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new(self.inner.next_id.get());
        self.inner.next_id.set(id.as_u64() + 1);
        self.inner.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        match listeners.iter().position(|(candidate, _)| *candidate == id) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn recorder(log: &Rc<RefCell<Vec<Value>>>) -> Listener {
        let log = log.clone();
        Rc::new(move |event: &ChannelEvent| log.borrow_mut().push(event.data.clone()))
    }

    #[test]
    fn test_fan_out_to_all_listeners() {
        let channel = LocalChannel::new();
        let a = Rc::new(RefCell::new(Vec::new()));
        let b = Rc::new(RefCell::new(Vec::new()));
        channel.add_listener(recorder(&a));
        channel.add_listener(recorder(&b));

        channel.post_message(json!({"n": 1}));

        assert_eq!(*a.borrow(), vec![json!({"n": 1})]);
        assert_eq!(*b.borrow(), vec![json!({"n": 1})]);
    }

    #[test]
    fn test_removed_listener_stops_receiving() {
        let channel = LocalChannel::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = channel.add_listener(recorder(&log));

        assert!(channel.remove_listener(id));
        assert!(!channel.remove_listener(id));
        channel.post_message(json!(1));

        assert!(log.borrow().is_empty());
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_post_while_dispatching() {
        let channel = LocalChannel::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        channel.add_listener(recorder(&log));

        let echo = channel.clone();
        channel.add_listener(Rc::new(move |event: &ChannelEvent| {
            if event.data == json!("ping") {
                echo.post_message(json!("pong"));
            }
        }));

        channel.post_message(json!("ping"));

        assert_eq!(*log.borrow(), vec![json!("ping"), json!("pong")]);
    }
}
