//! Channel contract.
//!
//! A channel is the raw bidirectional transport the engine rides on: it
//! delivers every posted message to the listeners attached to it. Whether the
//! poster hears its own message is up to the channel; the engine drops its
//! own echoes either way.
//!
//! Concrete transports (in-process bus, worker port, window messaging) live
//! outside the engine and only need to implement [`Channel`].
//!
//! Messages travel as JSON values. A listener receives a [`ChannelEvent`]
//! from which the engine extracts the envelope with a [`Decoder`].

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// Handle identifying a registered listener, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wrap a raw listener number. Channels allocate these.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw listener number.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({})", self.0)
    }
}

/// An inbound message as seen by a listener.
///
/// Mirrors the two shapes a message event usually takes: a plain message
/// carries its payload in `data`, a custom event carries it in `detail`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelEvent {
    /// Payload of a plain message event.
    pub data: Value,
    /// Payload of a custom event.
    pub detail: Value,
}

impl ChannelEvent {
    /// An event carrying `message` in `data`.
    pub fn message(message: Value) -> Self {
        Self {
            data: message,
            detail: Value::Null,
        }
    }

    /// An event carrying `detail` in `detail`.
    pub fn custom(detail: Value) -> Self {
        Self {
            data: Value::Null,
            detail,
        }
    }
}

/// Callback invoked for every inbound message.
pub type Listener = Rc<dyn Fn(&ChannelEvent)>;

/// Extracts the envelope object from an inbound event.
pub type Decoder = Rc<dyn Fn(&ChannelEvent) -> Value>;

/// Bidirectional message transport.
///
/// Delivery ordering and timing are channel-defined; the engine guarantees
/// nothing beyond what the channel gives.
pub trait Channel {
    /// Enqueue `message` for delivery to the listeners on the channel.
    fn post_message(&self, message: Value);

    /// Subscribe to inbound messages.
    fn add_listener(&self, listener: Listener) -> ListenerId;

    /// Unsubscribe. Returns `false` if the listener was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Default decoding of an inbound event.
///
/// Reads `data`, falling back to `detail` when `data` is absent. Anything
/// that is not a JSON object decodes to an empty object, which the engine
/// then ignores.
pub fn default_decode(event: &ChannelEvent) -> Value {
    let payload = if event.data.is_null() {
        &event.detail
    } else {
        &event.data
    };
    match payload {
        Value::Object(_) => payload.clone(),
        _ => Value::Object(Default::default()),
    }
}
