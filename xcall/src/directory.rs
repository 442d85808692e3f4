//! Directory protocol.
//!
//! A best-effort discovery exchange built on publish:
//!
//! ```text
//! X: $dir()                       sweep: publish "$dir" {callback: "$dir!"}
//! Y: $dir({callback: "$dir!"})    reply: "$dir!" {from: "Y", fns: [...]}
//! X: $dir({from: "Y", fns})       store: cache["Y"] = fns
//! ```
//!
//! Replies travel through the callback name like any other call, so they are
//! published too and every node on the sub-channel learns about `Y`. There is
//! no completeness signal: the cache converges eventually.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use xcall_core::NodeId;

use crate::error::CallError;

/// Name a sweep is published under, also the callback peers reply to.
pub const DIR_BROADCAST: &str = "$dir!";

/// Argument of the `$dir` member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirMessage {
    /// Name the receiver should report to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,

    /// Reporting node id; marks the message as a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Registry names of the reporting node, set on replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fns: Option<Vec<String>>,
}

/// What a node does with a [`DirMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirAction {
    /// Record a peer's names.
    Store {
        /// Reporting node.
        from: String,
        /// Its names.
        fns: Vec<String>,
    },
    /// Ask every peer to report.
    Sweep,
    /// Report own names to `callback`.
    Reply {
        /// Name to report to.
        callback: String,
    },
}

impl DirMessage {
    /// Sweep request asking peers to reply to [`DIR_BROADCAST`].
    pub fn sweep() -> Self {
        Self {
            callback: Some(DIR_BROADCAST.to_string()),
            ..Self::default()
        }
    }

    /// Reply carrying `fns` on behalf of `from`.
    pub fn report(from: &NodeId, fns: Vec<String>) -> Self {
        Self {
            callback: None,
            from: Some(from.to_string()),
            fns: Some(fns),
        }
    }

    /// Read the message out of the member's call arguments.
    ///
    /// No argument (or `null`) is an empty message, which starts a sweep.
    pub fn from_args(args: &[Value]) -> Result<Self, CallError> {
        match args.first() {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => Self::deserialize(value)
                .map_err(|e| CallError::InvalidArguments(format!("directory message: {}", e))),
        }
    }

    /// Render as a call argument.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Decide how to handle the message. A `from` wins over a callback.
    pub fn into_action(self) -> DirAction {
        match (self.from, self.callback) {
            (Some(from), _) if !from.is_empty() => DirAction::Store {
                from,
                fns: self.fns.unwrap_or_default(),
            },
            (_, Some(callback)) if !callback.is_empty() => DirAction::Reply { callback },
            _ => DirAction::Sweep,
        }
    }
}

/// Node id to last reported names.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone, Default)]
pub struct DirectoryCache {
    entries: Rc<RefCell<BTreeMap<String, Vec<String>>>>,
}

impl DirectoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the names of `node`, replacing any previous report.
    pub fn store(&self, node: impl Into<String>, fns: Vec<String>) {
        self.entries.borrow_mut().insert(node.into(), fns);
    }

    /// Names last reported by `node`.
    pub fn get(&self, node: &str) -> Option<Vec<String>> {
        self.entries.borrow().get(node).cloned()
    }

    /// Known node ids, sorted.
    pub fn nodes(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Copy of the whole cache.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.entries.borrow().clone()
    }

    /// Cache as a JSON object `{nodeId: [names]}`.
    pub fn to_value(&self) -> Value {
        let entries = self.entries.borrow();
        Value::Object(
            entries
                .iter()
                .map(|(node, fns)| {
                    let names = fns.iter().cloned().map(Value::String).collect();
                    (node.clone(), Value::Array(names))
                })
                .collect(),
        )
    }

    /// Number of known nodes.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no node is known.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl fmt::Debug for DirectoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.borrow().iter()).finish()
    }
}
