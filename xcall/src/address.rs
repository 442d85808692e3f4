//! Addressing grammar.
//!
//! ```text
//! name      := [nodeId "."] ["$"] ident ["!"]
//! "!"       trailing publish marker: fire-and-forget instead of call
//! "$"       leading member marker: the node's own surface, not its registry
//! nodeId.   qualifier: only the node with that id may serve the call
//! ```
//!
//! Parsing is split by side. The caller's façade only looks at the markers
//! ([`FacadeName`]); qualified names are forwarded untouched. The executor of
//! the receiving node reads the qualifier and the member marker
//! ([`Address`]).

use xcall_core::NodeId;

/// Trailing marker selecting publish (fire-and-forget) delivery.
pub const PUBLISH_MARKER: char = '!';

/// Leading marker selecting the node's member surface.
pub const MEMBER_MARKER: char = '$';

/// Separator between a node qualifier and the rest of the name.
pub const NODE_SEPARATOR: char = '.';

/// How a façade treats an accessed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeName<'a> {
    /// Publish the name (marker stripped) to the channel.
    Publish(&'a str),
    /// Access the node's own member (marker stripped).
    Member(&'a str),
    /// Local registry first, remote call otherwise.
    Plain(&'a str),
}

impl<'a> FacadeName<'a> {
    /// Classify a name accessed on a node's façade.
    ///
    /// The publish marker wins over the member marker, so `"$dir!"` publishes
    /// `"$dir"` rather than calling a local member.
    pub fn parse(name: &'a str) -> Self {
        if let Some(stripped) = name.strip_suffix(PUBLISH_MARKER) {
            FacadeName::Publish(stripped)
        } else if let Some(member) = name.strip_prefix(MEMBER_MARKER) {
            FacadeName::Member(member)
        } else {
            FacadeName::Plain(name)
        }
    }
}

/// What an inbound name targets once the qualifier is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface<'a> {
    /// A member of the node itself (marker stripped).
    Member(&'a str),
    /// An entry of the local registry.
    Registry(&'a str),
}

/// Executor-side reading of an inbound name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address<'a> {
    /// Qualifying node id, if any.
    pub node: Option<&'a str>,
    /// Target once the qualifier is removed.
    pub surface: Surface<'a>,
}

impl<'a> Address<'a> {
    /// Parse an inbound name. The qualifier ends at the first separator.
    pub fn parse(name: &'a str) -> Self {
        let (node, rest) = match name.split_once(NODE_SEPARATOR) {
            Some((node, rest)) => (Some(node), rest),
            None => (None, name),
        };
        let surface = match rest.strip_prefix(MEMBER_MARKER) {
            Some(member) => Surface::Member(member),
            None => Surface::Registry(rest),
        };
        Self { node, surface }
    }

    /// Whether the node `id` may serve this address.
    pub fn accepts(&self, id: &NodeId) -> bool {
        match self.node {
            Some(node) => id.as_str() == node,
            None => true,
        }
    }
}
