//! Local registry: the names a node serves.
//!
//! An entry is either a callable or a plain value. Both the façade and the
//! executor apply the same rule when an entry is invoked:
//!
//! - a callable is called with the arguments,
//! - a value is read when called with zero arguments (or two or more),
//! - a value is overwritten, and the new value returned, when called with
//!   exactly one argument.
//!
//! The registry is mutable at any time and unversioned; an invocation sees
//! whatever the entry holds when it is processed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde_json::Value;

use crate::error::CallError;

/// A boxed `!Send` future.
pub type LocalFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// Future settled by a call.
pub type CallFuture = LocalFuture<Result<Value, CallError>>;

/// A registered function.
pub type Callable = Rc<dyn Fn(Vec<Value>) -> CallFuture>;

/// A registry entry.
#[derive(Clone)]
pub enum Entry {
    /// Plain value, readable and writable through call syntax.
    Value(Value),
    /// Function invoked with the call's arguments.
    Func(Callable),
}

impl Entry {
    /// A plain value entry.
    pub fn value(value: impl Into<Value>) -> Self {
        Entry::Value(value.into())
    }

    /// A function entry from a synchronous closure.
    ///
    /// # Example
    ///
    /// ```rust
    /// use xcall::Entry;
    ///
    /// let add = Entry::func(|args| {
    ///     let a = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
    ///     let b = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0);
    ///     Ok((a + b).into())
    /// });
    /// assert!(add.is_callable());
    /// ```
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, CallError> + 'static,
    {
        Entry::Func(Rc::new(move |args: Vec<Value>| -> CallFuture {
            let result = f(args);
            Box::pin(std::future::ready(result))
        }))
    }

    /// A function entry from an async closure.
    pub fn async_func<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = Result<Value, CallError>> + 'static,
    {
        Entry::Func(Rc::new(move |args: Vec<Value>| -> CallFuture { Box::pin(f(args)) }))
    }

    /// Whether the entry is a function.
    pub fn is_callable(&self) -> bool {
        matches!(self, Entry::Func(_))
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Entry::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Value(value)
    }
}

/// Shared handle to a node's local registry.
///
/// Cloning yields another handle to the same entries. Names enumerate in
/// sorted order.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Rc<RefCell<BTreeMap<String, Entry>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry.
    pub fn get(&self, name: &str) -> Option<Entry> {
        self.entries.borrow().get(name).cloned()
    }

    /// Insert or overwrite an entry, returning the previous one.
    pub fn insert(&self, name: impl Into<String>, entry: impl Into<Entry>) -> Option<Entry> {
        self.entries.borrow_mut().insert(name.into(), entry.into())
    }

    /// Remove an entry. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.borrow_mut().remove(name).is_some()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    /// Registered names.
    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Invoke `name` with the callable/value rule.
    ///
    /// Returns `None` when the name is not registered.
    pub fn invoke(&self, name: &str, mut args: Vec<Value>) -> Option<CallFuture> {
        // Clone out of the borrow: the callable may itself touch the registry.
        let entry = self.get(name)?;
        let future: CallFuture = match entry {
            Entry::Func(f) => f(args),
            Entry::Value(current) => {
                let result = if args.len() == 1 {
                    let value = args.remove(0);
                    self.insert(name, Entry::Value(value.clone()));
                    value
                } else {
                    current
                };
                Box::pin(std::future::ready(Ok(result)))
            }
        };
        Some(future)
    }
}

impl<K: Into<String>, E: Into<Entry>> FromIterator<(K, E)> for Registry {
    fn from_iter<I: IntoIterator<Item = (K, E)>>(iter: I) -> Self {
        let registry = Registry::new();
        for (name, entry) in iter {
            registry.insert(name, entry);
        }
        registry
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sum() -> Entry {
        Entry::func(|args| Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>())))
    }

    #[tokio::test]
    async fn test_invoke_callable() {
        let registry: Registry = [("sum", sum())].into_iter().collect();
        let result = registry.invoke("sum", vec![json!(1), json!(2)]).unwrap().await;
        assert_eq!(result, Ok(json!(3)));
    }

    #[tokio::test]
    async fn test_invoke_value_get_and_set() {
        let registry = Registry::new();
        registry.insert("var2", json!(111));

        assert_eq!(registry.invoke("var2", vec![]).unwrap().await, Ok(json!(111)));
        assert_eq!(
            registry.invoke("var2", vec![json!(222)]).unwrap().await,
            Ok(json!(222))
        );
        assert_eq!(registry.invoke("var2", vec![]).unwrap().await, Ok(json!(222)));
    }

    #[tokio::test]
    async fn test_invoke_value_with_many_args_reads() {
        let registry = Registry::new();
        registry.insert("v", json!("keep"));
        let result = registry.invoke("v", vec![json!(1), json!(2)]).unwrap().await;
        assert_eq!(result, Ok(json!("keep")));
        assert_eq!(registry.invoke("v", vec![]).unwrap().await, Ok(json!("keep")));
    }

    #[test]
    fn test_invoke_unknown_is_none() {
        assert!(Registry::new().invoke("nope", vec![]).is_none());
    }

    #[tokio::test]
    async fn test_async_func() {
        let registry = Registry::new();
        registry.insert(
            "later",
            Entry::async_func(|args| async move {
                tokio::task::yield_now().await;
                Ok(json!(args.len()))
            }),
        );
        let result = registry.invoke("later", vec![json!(null); 3]).unwrap().await;
        assert_eq!(result, Ok(json!(3)));
    }

    #[test]
    fn test_keys_contains_remove() {
        let registry = Registry::new();
        registry.insert("b", json!(2));
        registry.insert("a", sum());

        assert_eq!(registry.keys(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.contains("a"));
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(!registry.contains("a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_handles_share_entries() {
        let registry = Registry::new();
        let other = registry.clone();
        other.insert("x", json!(1));
        assert!(registry.contains("x"));
    }
}
