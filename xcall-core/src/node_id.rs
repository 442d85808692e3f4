//! Node identity.
//!
//! A node id is an opaque string, unique per participant on a channel. It is
//! stamped as `from` on every envelope the node sends, prefixes the node's
//! request ids, and doubles as the address prefix of qualified names
//! (`"<nodeId>.<name>"`).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::RandomProvider;

/// Errors related to NodeId parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeIdError {
    /// The id was empty.
    #[error("node id cannot be empty")]
    Empty,

    /// The id contains the address separator and could never be targeted.
    #[error("node id cannot contain '.': {0}")]
    ContainsSeparator(String),
}

/// Opaque identifier of a node on a channel.
///
/// # Examples
///
/// ```
/// use xcall_core::{NodeId, TokioRandomProvider};
///
/// let named = NodeId::parse("worker-1").unwrap();
/// assert_eq!(named.as_str(), "worker-1");
///
/// let random = NodeId::random(&TokioRandomProvider::new());
/// assert_eq!(random.as_str().len(), 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Validate and wrap an id.
    ///
    /// Ids must be non-empty and must not contain `.`, the separator of
    /// qualified names.
    pub fn parse(id: impl Into<String>) -> Result<Self, NodeIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(NodeIdError::Empty);
        }
        if id.contains('.') {
            return Err(NodeIdError::ContainsSeparator(id));
        }
        Ok(Self(id))
    }

    /// Generate a random id: 128 random bits as 32 lowercase hex digits.
    pub fn random<R: RandomProvider>(random: &R) -> Self {
        let first: u64 = random.random();
        let second: u64 = random.random();
        Self(format!("{:016x}{:016x}", first, second))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
