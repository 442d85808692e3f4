//! Request correlation: timeouts, lifecycle and channel decoding.

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use xcall::{
    CallError, CallOptions, Channel, ChannelEvent, Entry, Listener, ListenerId, LocalChannel,
    Node, NodeConfig, TokioProviders,
};

use common::{config, constant, node, run_local, settle, RecordingChannel};

/// Delivers messages as custom events, in the `detail` field.
#[derive(Clone, Default)]
struct DetailChannel {
    listeners: Rc<RefCell<Vec<(ListenerId, Listener)>>>,
    next_id: Rc<Cell<u64>>,
}

impl Channel for DetailChannel {
    fn post_message(&self, message: Value) {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        let event = ChannelEvent::custom(message);
        for listener in listeners {
            listener(&event);
        }
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new(self.next_id.get());
        self.next_id.set(id.as_u64() + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(candidate, _)| *candidate != id);
        listeners.len() != before
    }
}

#[tokio::test]
async fn test_timeout_not_before_deadline() {
    run_local(async {
        let bus = LocalChannel::new();
        let caller = node(bus.clone(), "caller", []);
        let _peer = node(bus, "peer", []);

        let timeout = Duration::from_millis(50);
        let started = Instant::now();
        let result = caller
            .call_with("nobody_serves_this", vec![], CallOptions::with_timeout(timeout))
            .await;
        let elapsed = started.elapsed();

        assert_eq!(result, Err(CallError::Timeout));
        assert!(elapsed >= timeout, "settled after {:?}", elapsed);
        assert!(elapsed < timeout + Duration::from_millis(500), "settled after {:?}", elapsed);
        assert_eq!(caller.pending_count(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_node_default_timeout() {
    run_local(async {
        let bus = LocalChannel::new();
        let config = NodeConfig::builder()
            .id("caller")
            .timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let caller = Node::new(bus, config, TokioProviders::new());

        assert_eq!(caller.call("missing", vec![]).await, Err(CallError::Timeout));
        // A per-call override wins over the node default.
        let forever = caller.call_with("missing", vec![], CallOptions::wait_forever());
        let bounded = tokio::time::timeout(Duration::from_millis(60), forever).await;
        assert!(bounded.is_err());
    })
    .await;
}

#[tokio::test]
async fn test_zero_timeout_waits_forever() {
    run_local(async {
        let bus = LocalChannel::new();
        let caller = node(bus.clone(), "caller", []);
        let _peer = node(bus, "peer", []);

        let reply = caller.resolve("missing").unwrap().get();
        assert_eq!(caller.pending_count(), 1);
        let bounded = tokio::time::timeout(Duration::from_millis(50), reply).await;
        assert!(bounded.is_err());
        // The entry stays until a response or the node goes away.
        assert_eq!(caller.pending_count(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_response_disarms_timer() {
    run_local(async {
        let bus = LocalChannel::new();
        let caller = node(bus.clone(), "caller", []);
        let _server = node(bus, "server", [("fast", constant(json!("ok")))]);

        let options = CallOptions::with_timeout(Duration::from_millis(20));
        assert_eq!(caller.call_with("fast", vec![], options).await, Ok(json!("ok")));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(caller.pending_count(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_late_response_is_dropped() {
    run_local(async {
        let bus = LocalChannel::new();
        let recorder = RecordingChannel::new(bus.clone());
        let caller = node(bus.clone(), "caller", []);
        let slow = Entry::async_func(|_args| async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(json!("too late"))
        });
        let _server = node(recorder.clone(), "server", [("slow", slow)]);

        let options = CallOptions::with_timeout(Duration::from_millis(10));
        assert_eq!(caller.call_with("slow", vec![], options).await, Err(CallError::Timeout));

        tokio::time::sleep(Duration::from_millis(60)).await;
        // The server answered, the caller had already given up.
        assert_eq!(recorder.kinds(), vec![":X-MSG-RESPONSE".to_string()]);
        assert_eq!(caller.pending_count(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_request_ids_are_per_sender_counters() {
    run_local(async {
        let bus = LocalChannel::new();
        let recorder = RecordingChannel::new(bus.clone());
        let caller = node(recorder.clone(), "caller", []);
        let _server = node(bus, "server", [("x", Entry::value(1))]);

        for _ in 0..3 {
            caller.call("x", vec![]).await.unwrap();
        }
        let ids: Vec<Value> = recorder
            .messages()
            .iter()
            .map(|message| message["requestId"].clone())
            .collect();
        assert_eq!(ids, vec![json!("caller.1"), json!("caller.2"), json!("caller.3")]);
    })
    .await;
}

#[tokio::test]
async fn test_close_keeps_local_and_lets_timers_fire() {
    run_local(async {
        let bus = LocalChannel::new();
        let caller = node(bus.clone(), "caller", [("mine", Entry::value("local"))]);
        let slow = Entry::async_func(|_args| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(json!("remote"))
        });
        let server = node(bus.clone(), "server", [("slow", slow)]);

        let options = CallOptions::with_timeout(Duration::from_millis(40));
        let pending = caller.resolve_with("slow", options).unwrap().get();
        caller.close();
        assert_eq!(bus.listener_count(), 1);

        // The response is posted but nobody listens for it anymore.
        assert_eq!(pending.await, Err(CallError::Timeout));
        assert_eq!(caller.call("mine", vec![]).await, Ok(json!("local")));
        assert_eq!(caller.resolve("slow").unwrap_err(), CallError::ServiceUnavailable);

        // A closed node no longer serves peers either.
        let options = CallOptions::with_timeout(Duration::from_millis(20));
        assert_eq!(
            server.call_with("mine", vec![], options).await,
            Err(CallError::Timeout)
        );
    })
    .await;
}

#[tokio::test]
async fn test_dropping_the_node_settles_with_closed() {
    run_local(async {
        let bus = LocalChannel::new();
        let caller = node(bus.clone(), "caller", []);
        let _peer = node(bus.clone(), "peer", []);

        let pending = caller.resolve("missing").unwrap().get();
        drop(caller);
        assert_eq!(bus.listener_count(), 1);
        assert_eq!(pending.await, Err(CallError::Closed));
    })
    .await;
}

#[tokio::test]
async fn test_detail_events_use_default_decoding() {
    run_local(async {
        let channel = DetailChannel::default();
        let caller = node(channel.clone(), "caller", []);
        let _server = node(channel, "server", [("answer", Entry::value(42))]);

        assert_eq!(caller.call("answer", vec![]).await, Ok(json!(42)));
    })
    .await;
}

#[tokio::test]
async fn test_custom_decoder_unwraps_envelopes() {
    run_local(async {
        let bus = LocalChannel::new();
        let unwrap = |event: &ChannelEvent| event.data["payload"].clone();
        let server_config = NodeConfig::builder()
            .id("server")
            .decode(unwrap)
            .build()
            .unwrap();
        let hits = Rc::new(RefCell::new(0));
        let server = Node::new(bus.clone(), server_config, TokioProviders::new());
        server.insert("hit", common::counter(hits.clone()));

        // A foreign sender wrapping the envelope in its own frame.
        let request = json!({
            "type": ":X-MSG-PUBLISH",
            "from": "foreign",
            "data": {"name": "hit", "args": [5]},
        });
        bus.post_message(json!({"payload": request.clone()}));
        // Unwrapped envelopes are not what this decoder reads.
        bus.post_message(request);
        settle().await;
        assert_eq!(*hits.borrow(), 5);
    })
    .await;
}

#[test]
fn test_invalid_config_is_rejected() {
    assert!(NodeConfig::builder().id("").build().is_err());
    assert!(NodeConfig::builder().id("with.dot").build().is_err());
    assert!(NodeConfig::builder().channel_id("a:b").build().is_err());
    assert_eq!(config("ok").id().map(|id| id.as_str()), Some("ok"));
}
