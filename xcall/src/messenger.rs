//! Correlation engine.
//!
//! A [`Messenger`] owns one listener on a [`Channel`]. Outbound calls get a
//! fresh [`RequestId`] and a pending entry in the correlation table; inbound
//! responses settle the matching entry, inbound requests and publishes are
//! handed to the executor.
//!
//! # Lifecycle of a request
//!
//! ```text
//! send() ──► pending[id] ──► post REQUEST
//!               │
//!               ├── RESPONSE(id) arrives ──► abort timer, settle, remove
//!               └── timer fires          ──► settle Timeout, remove
//! ```
//!
//! Whichever event happens first removes the entry, so a late response or a
//! second responder finds nothing and is dropped.
//!
//! # Runtime
//!
//! Timers and executor invocations are spawned through the
//! [`TaskProvider`](xcall_core::TaskProvider), which runs them on the current
//! `LocalSet`. The channel is delivered synchronously, so no `RefCell` borrow
//! is ever held across a post.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use xcall_core::{NodeId, Providers, TaskProvider, TimeProvider};

use crate::channel::{Channel, ChannelEvent, Decoder, ListenerId};
use crate::config::CallOptions;
use crate::envelope::{CallData, Envelope, EnvelopeKind, EnvelopeScope, RequestId, RequestIdFactory};
use crate::error::CallError;
use crate::registry::CallFuture;

/// Handler for inbound requests and publishes.
///
/// Returning [`CallError::ServiceUnavailable`] means "not handled here": no
/// response is posted.
pub type Executor = Rc<dyn Fn(CallData) -> CallFuture>;

type ReplySender = oneshot::Sender<Result<Value, CallError>>;

/// Entry of the correlation table.
struct PendingRequest {
    sender: ReplySender,
    created_at: Duration,
    timeout: Duration,
    timer: Option<JoinHandle<()>>,
}

impl PendingRequest {
    fn settle(mut self, result: Result<Value, CallError>) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if self.sender.send(result).is_err() {
            tracing::trace!("caller stopped waiting for the reply");
        }
    }

    /// Called from the timer task itself, which must not abort itself.
    fn expire(mut self) {
        self.timer.take();
        let _ = self.sender.send(Err(CallError::Timeout));
    }
}

/// Future returned by [`Messenger::send`].
///
/// Resolves with the response payload, the remote error, a timeout, or
/// [`CallError::Closed`] if the messenger is dropped first.
#[must_use = "a reply future does nothing unless awaited"]
pub struct ReplyFuture {
    request_id: RequestId,
    receiver: oneshot::Receiver<Result<Value, CallError>>,
}

impl ReplyFuture {
    /// Id of the request this future waits on.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Future for ReplyFuture {
    type Output = Result<Value, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CallError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for ReplyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyFuture")
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Request/response correlation over a shared channel.
///
/// Cheap to clone; clones share the correlation table and the listener.
/// Dropping the last clone detaches the listener and fails every pending
/// call with [`CallError::Closed`].
pub struct Messenger<P: Providers> {
    inner: Rc<MessengerInner<P>>,
}

impl<P: Providers> Clone for Messenger<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct MessengerInner<P: Providers> {
    id: NodeId,
    channel: Rc<dyn Channel>,
    scope: EnvelopeScope,
    exec: Executor,
    decode: Decoder,
    providers: P,
    request_ids: RequestIdFactory,
    requests: RefCell<HashMap<RequestId, PendingRequest>>,
    listener: Cell<Option<ListenerId>>,
}

impl<P: Providers> Messenger<P> {
    /// Attach a messenger to `channel`.
    ///
    /// The listener is registered immediately; it only holds a weak
    /// reference back to the messenger.
    pub fn new(
        channel: Rc<dyn Channel>,
        id: NodeId,
        scope: EnvelopeScope,
        exec: Executor,
        decode: Decoder,
        providers: P,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<MessengerInner<P>>| {
            let weak = weak.clone();
            let listener = channel.add_listener(Rc::new(move |event: &ChannelEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_message(event);
                }
            }));
            tracing::debug!(node = %id, channel_id = scope.channel_id(), %listener, "messenger attached");
            MessengerInner {
                request_ids: RequestIdFactory::new(id.clone()),
                id,
                channel,
                scope,
                exec,
                decode,
                providers,
                requests: RefCell::new(HashMap::new()),
                listener: Cell::new(Some(listener)),
            }
        });
        Self { inner }
    }

    /// Node id stamped on every outbound envelope.
    pub fn id(&self) -> &NodeId {
        &self.inner.id
    }

    /// Sub-channel this messenger is scoped to.
    pub fn channel_id(&self) -> &str {
        self.inner.scope.channel_id()
    }

    /// Post a request and wait for the first response.
    ///
    /// The pending entry is registered before the request is posted, so a
    /// synchronous responder is always correlated.
    pub fn send(&self, name: impl Into<String>, args: Vec<Value>, options: CallOptions) -> ReplyFuture {
        let inner = &self.inner;
        let request_id = inner.request_ids.next();
        let call = CallData::new(name, args);
        let (sender, receiver) = oneshot::channel();

        let timer = if options.has_timeout() {
            Some(inner.arm_timer(request_id.clone(), options.timeout))
        } else {
            None
        };
        let pending = PendingRequest {
            sender,
            created_at: inner.providers.time().now(),
            timeout: options.timeout,
            timer,
        };
        inner.requests.borrow_mut().insert(request_id.clone(), pending);

        tracing::debug!(
            node = %inner.id,
            request_id = %request_id,
            name = %call.name,
            timeout_ms = options.timeout.as_millis() as u64,
            "posting request"
        );
        inner.post(inner.scope.request(&inner.id, request_id.clone(), &call));

        ReplyFuture {
            request_id,
            receiver,
        }
    }

    /// Post a publish. Nothing is tracked and nothing is awaited.
    pub fn publish(&self, name: impl Into<String>, args: Vec<Value>) {
        let inner = &self.inner;
        let call = CallData::new(name, args);
        tracing::debug!(node = %inner.id, name = %call.name, "posting publish");
        inner.post(inner.scope.publish(&inner.id, &call));
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.requests.borrow().len()
    }

    /// Detach from the channel.
    ///
    /// Pending requests are left alone: their timers still fire, but no
    /// response can reach them anymore.
    pub fn close(&self) {
        if let Some(listener) = self.inner.listener.take() {
            self.inner.channel.remove_listener(listener);
            tracing::debug!(node = %self.inner.id, %listener, "messenger detached");
        }
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.listener.get().is_none()
    }
}

impl<P: Providers> fmt::Debug for Messenger<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("id", &self.inner.id)
            .field("channel_id", &self.inner.scope.channel_id())
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<P: Providers> MessengerInner<P> {
    fn post(&self, envelope: Result<Envelope, serde_json::Error>) {
        match envelope.and_then(|envelope| envelope.to_value()) {
            Ok(message) => self.channel.post_message(message),
            Err(e) => tracing::warn!(node = %self.id, error = %e, "failed to encode envelope"),
        }
    }

    fn arm_timer(self: &Rc<Self>, request_id: RequestId, timeout: Duration) -> JoinHandle<()> {
        let weak = Rc::downgrade(self);
        let time = self.providers.time().clone();
        self.providers.task().spawn_task("xcall_request_timer", async move {
            time.sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&request_id);
            }
        })
    }

    fn expire(&self, request_id: &RequestId) {
        let pending = self.requests.borrow_mut().remove(request_id);
        if let Some(pending) = pending {
            let waited = self.providers.time().now().saturating_sub(pending.created_at);
            tracing::debug!(
                node = %self.id,
                request_id = %request_id,
                timeout_ms = pending.timeout.as_millis() as u64,
                waited_ms = waited.as_millis() as u64,
                "request timed out"
            );
            pending.expire();
        }
    }

    fn on_message(self: &Rc<Self>, event: &ChannelEvent) {
        let envelope = match Envelope::from_value((self.decode)(event)) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::trace!(node = %self.id, error = %e, "ignoring undecodable message");
                return;
            }
        };
        if envelope.is_from(&self.id) {
            tracing::trace!(node = %self.id, "ignoring own envelope");
            return;
        }
        match self.scope.classify(&envelope) {
            Some(EnvelopeKind::Response) => self.on_response(envelope),
            Some(EnvelopeKind::Request) => self.on_request(envelope),
            Some(EnvelopeKind::Publish) => self.on_publish(envelope),
            None => {
                tracing::trace!(node = %self.id, kind = %envelope.kind, "ignoring foreign envelope")
            }
        }
    }

    fn on_response(&self, envelope: Envelope) {
        let Some(response_id) = envelope.response_id.clone() else {
            return;
        };
        let pending = self.requests.borrow_mut().remove(&response_id);
        match pending {
            Some(pending) => {
                tracing::debug!(
                    node = %self.id,
                    request_id = %response_id,
                    from = envelope.from.as_deref().unwrap_or(""),
                    "response correlated"
                );
                pending.settle(envelope.outcome().map_err(CallError::Remote));
            }
            None => {
                tracing::trace!(node = %self.id, request_id = %response_id, "dropping uncorrelated response")
            }
        }
    }

    fn on_request(self: &Rc<Self>, envelope: Envelope) {
        let Some(request_id) = envelope.request_id.clone() else {
            return;
        };
        let call = match envelope.call_data() {
            Ok(call) => call,
            Err(e) => {
                tracing::trace!(node = %self.id, request_id = %request_id, error = %e, "ignoring request without call data");
                return;
            }
        };
        tracing::trace!(node = %self.id, request_id = %request_id, name = %call.name, "executing request");

        let name = call.name.clone();
        let future = (self.exec)(call);
        let weak = Rc::downgrade(self);
        self.providers.task().spawn_task("xcall_request", async move {
            let outcome = match future.await {
                Ok(value) => Ok(value),
                Err(CallError::ServiceUnavailable) => {
                    tracing::trace!(request_id = %request_id, name = %name, "not served here");
                    return;
                }
                Err(e) => Err(e.to_wire()),
            };
            if let Some(inner) = weak.upgrade() {
                tracing::debug!(
                    node = %inner.id,
                    request_id = %request_id,
                    failed = outcome.is_err(),
                    "posting response"
                );
                inner.post(Ok(inner.scope.response(&inner.id, request_id, outcome)));
            }
        });
    }

    fn on_publish(&self, envelope: Envelope) {
        let call = match envelope.call_data() {
            Ok(call) => call,
            Err(e) => {
                tracing::trace!(node = %self.id, error = %e, "ignoring publish without call data");
                return;
            }
        };
        tracing::trace!(node = %self.id, name = %call.name, "executing publish");

        let name = call.name.clone();
        let future = (self.exec)(call);
        let id = self.id.clone();
        self.providers.task().spawn_task("xcall_publish", async move {
            match future.await {
                Ok(_) | Err(CallError::ServiceUnavailable) => {}
                Err(e) => tracing::warn!(node = %id, name = %name, error = %e, "publish handler failed"),
            }
        });
    }
}

impl<P: Providers> Drop for MessengerInner<P> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.channel.remove_listener(listener);
        }
        // Senders are dropped with the table; receivers observe Closed.
        let pending = self.requests.get_mut().len();
        if pending > 0 {
            tracing::debug!(node = %self.id, pending, "messenger dropped with pending requests");
        }
    }
}
