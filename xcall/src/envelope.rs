//! Wire envelope for xcall messages.
//!
//! # Format
//!
//! Envelopes travel as JSON objects:
//!
//! ```text
//! {
//!   "type":       "<channelId>:X-MSG-REQUEST" | ...-RESPONSE | ...-PUBLISH,
//!   "data":       {"name": ..., "args": [...]}   // request / publish
//!                 <result>                       // response
//!   "requestId":  "<senderId>.<n>",              // request only
//!   "responseId": "<senderId>.<n>",              // response only
//!   "from":       "<senderId>",
//!   "error":      <payload>                      // failed response only
//! }
//! ```
//!
//! The type tag is namespaced by the sub-channel id so several logical buses
//! can share one physical channel without seeing each other's traffic.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use xcall_core::NodeId;

/// Type tag suffix of request envelopes.
pub const REQUEST_TAG: &str = "X-MSG-REQUEST";
/// Type tag suffix of response envelopes.
pub const RESPONSE_TAG: &str = "X-MSG-RESPONSE";
/// Type tag suffix of publish envelopes.
pub const PUBLISH_TAG: &str = "X-MSG-PUBLISH";

/// Message flow semantics.
///
/// ```text
/// Request → Response  (responseId == requestId)
/// Publish → (terminal, no response)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Call expecting a response.
    Request,
    /// Result (or error) of an earlier request.
    Response,
    /// Fire-and-forget call.
    Publish,
}

/// Correlation id of a request: `"<senderId>.<counter>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap a raw correlation id taken off the wire.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Factory for request ids, unique per sender.
///
/// Uses `Cell<u64>` for single-threaded increment; counting starts at 1.
#[derive(Debug)]
pub struct RequestIdFactory {
    sender: NodeId,
    next_id: Cell<u64>,
}

impl RequestIdFactory {
    /// Create a factory stamping ids with `sender`.
    pub fn new(sender: NodeId) -> Self {
        Self {
            sender,
            next_id: Cell::new(1),
        }
    }

    /// Generate the next request id.
    pub fn next(&self) -> RequestId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        RequestId(format!("{}.{}", self.sender, id))
    }
}

/// Body of a request or publish: the called name and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallData {
    /// Name as addressed by the caller (may be qualified or member-marked).
    pub name: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CallData {
    /// Build a call body.
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The unit on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Scoped type tag, see [`EnvelopeScope`].
    #[serde(rename = "type")]
    pub kind: String,

    /// Call body (request/publish) or result (response).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    /// Correlation id, set on requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,

    /// Correlation id of the answered request, set on responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<RequestId>,

    /// Sender node id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Failure payload of a response.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub error: Value,
}

impl Envelope {
    /// Parse an envelope out of a decoded JSON object.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Render the envelope as a JSON object for posting.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Whether the envelope was sent by `id`.
    pub fn is_from(&self, id: &NodeId) -> bool {
        self.from.as_deref() == Some(id.as_str())
    }

    /// Extract the call body of a request or publish.
    pub fn call_data(&self) -> Result<CallData, serde_json::Error> {
        CallData::deserialize(&self.data)
    }

    /// Outcome carried by a response: `Err` when `error` is set.
    pub fn outcome(self) -> Result<Value, Value> {
        if self.error.is_null() {
            Ok(self.data)
        } else {
            Err(self.error)
        }
    }
}

/// Type tags of one sub-channel.
///
/// Builds outbound envelopes and classifies inbound ones; envelopes tagged
/// for another sub-channel classify as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeScope {
    channel_id: String,
    request: String,
    response: String,
    publish: String,
}

impl EnvelopeScope {
    /// Scope for the sub-channel `channel_id` (`""` for the default bus).
    pub fn new(channel_id: impl Into<String>) -> Self {
        let channel_id = channel_id.into();
        Self {
            request: format!("{}:{}", channel_id, REQUEST_TAG),
            response: format!("{}:{}", channel_id, RESPONSE_TAG),
            publish: format!("{}:{}", channel_id, PUBLISH_TAG),
            channel_id,
        }
    }

    /// The sub-channel id.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Scoped type tag for `kind`.
    pub fn tag(&self, kind: EnvelopeKind) -> &str {
        match kind {
            EnvelopeKind::Request => &self.request,
            EnvelopeKind::Response => &self.response,
            EnvelopeKind::Publish => &self.publish,
        }
    }

    /// Classify an inbound envelope.
    ///
    /// A request must carry a `requestId` and a response a `responseId`;
    /// anything else, or a tag from another scope, yields `None`.
    pub fn classify(&self, envelope: &Envelope) -> Option<EnvelopeKind> {
        if envelope.kind == self.request && envelope.request_id.is_some() {
            Some(EnvelopeKind::Request)
        } else if envelope.kind == self.response && envelope.response_id.is_some() {
            Some(EnvelopeKind::Response)
        } else if envelope.kind == self.publish {
            Some(EnvelopeKind::Publish)
        } else {
            None
        }
    }

    /// Build a request envelope.
    pub fn request(
        &self,
        from: &NodeId,
        request_id: RequestId,
        call: &CallData,
    ) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope {
            kind: self.request.clone(),
            data: serde_json::to_value(call)?,
            request_id: Some(request_id),
            response_id: None,
            from: Some(from.to_string()),
            error: Value::Null,
        })
    }

    /// Build a response envelope answering `response_id`.
    pub fn response(
        &self,
        from: &NodeId,
        response_id: RequestId,
        outcome: Result<Value, Value>,
    ) -> Envelope {
        let (data, error) = match outcome {
            Ok(data) => (data, Value::Null),
            Err(error) => (Value::Null, error),
        };
        Envelope {
            kind: self.response.clone(),
            data,
            request_id: None,
            response_id: Some(response_id),
            from: Some(from.to_string()),
            error,
        }
    }

    /// Build a publish envelope.
    pub fn publish(&self, from: &NodeId, call: &CallData) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope {
            kind: self.publish.clone(),
            data: serde_json::to_value(call)?,
            request_id: None,
            response_id: None,
            from: Some(from.to_string()),
            error: Value::Null,
        })
    }
}
