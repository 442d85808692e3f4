//! Node and per-call configuration.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use xcall_core::NodeId;

use crate::channel::{default_decode, ChannelEvent, Decoder};
use crate::error::NodeConfigError;

/// Options of a single call.
///
/// A zero timeout waits indefinitely: no timer is armed and the pending
/// request lives until a response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallOptions {
    /// How long to wait for a response.
    pub timeout: Duration,
}

impl CallOptions {
    /// Options with the given timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Options that wait forever.
    pub fn wait_forever() -> Self {
        Self::default()
    }

    /// Whether a timer must be armed.
    pub fn has_timeout(&self) -> bool {
        !self.timeout.is_zero()
    }
}

/// Configuration of a [`Node`](crate::Node).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use xcall::NodeConfig;
///
/// let config = NodeConfig::builder()
///     .id("worker-1")
///     .channel_id("jobs")
///     .timeout(Duration::from_secs(1))
///     .build()
///     .unwrap();
/// assert_eq!(config.channel_id(), "jobs");
/// ```
#[derive(Clone, Default)]
pub struct NodeConfig {
    id: Option<NodeId>,
    channel_id: String,
    call_options: CallOptions,
    decode: Option<Decoder>,
}

impl NodeConfig {
    /// Start building a node configuration.
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::default()
    }

    /// Explicit node id; `None` means a random id is generated.
    pub fn id(&self) -> Option<&NodeId> {
        self.id.as_ref()
    }

    /// Sub-channel id (`""` for the default bus).
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Default options of calls made through the node.
    pub fn call_options(&self) -> CallOptions {
        self.call_options
    }

    /// Envelope decoder, falling back to [`default_decode`].
    pub fn decoder(&self) -> Decoder {
        match &self.decode {
            Some(decode) => decode.clone(),
            None => Rc::new(default_decode),
        }
    }
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("call_options", &self.call_options)
            .field("custom_decode", &self.decode.is_some())
            .finish()
    }
}

/// Builder for [`NodeConfig`].
#[derive(Default)]
pub struct NodeConfigBuilder {
    id: Option<String>,
    channel_id: String,
    timeout: Duration,
    decode: Option<Decoder>,
}

impl NodeConfigBuilder {
    /// Set the node id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the sub-channel id.
    pub fn channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    /// Set the default call timeout (zero waits forever).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override how envelopes are extracted from inbound events.
    pub fn decode<F>(mut self, decode: F) -> Self
    where
        F: Fn(&ChannelEvent) -> serde_json::Value + 'static,
    {
        self.decode = Some(Rc::new(decode));
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<NodeConfig, NodeConfigError> {
        let id = self.id.map(NodeId::parse).transpose()?;
        if self.channel_id.contains(':') {
            return Err(NodeConfigError::InvalidChannelId(self.channel_id));
        }
        Ok(NodeConfig {
            id,
            channel_id: self.channel_id,
            call_options: CallOptions::with_timeout(self.timeout),
            decode: self.decode,
        })
    }
}
