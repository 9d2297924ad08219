//! Accumulating chain context
//!
//! A [`Context`] is an immutable snapshot. Middlewares never mutate it; they
//! return a [`ContextDelta`] and the engine produces the next snapshot with a
//! shallow, last-writer-wins merge.

use crate::request::GatewayRequest;
use axum::http::{HeaderMap, Method};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Type-erased context entry
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Frozen snapshot of everything contributed so far
#[derive(Clone, Default)]
pub struct Context {
    entries: Arc<BTreeMap<String, ContextValue>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed view of `key`; `None` if absent or of another type
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        let value = self.entries.get(key)?;
        (**value).downcast_ref::<T>()
    }

    /// Shared handle to `key`'s value
    pub fn get_arc<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.entries.get(key)?.clone().downcast::<T>().ok()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// New snapshot with `delta` applied on top of `self`
    pub(crate) fn merged(&self, delta: ContextDelta) -> Context {
        if delta.entries.is_empty() {
            return self.clone();
        }
        let mut entries = (*self.entries).clone();
        for (key, value) in delta.entries {
            entries.insert(key, value);
        }
        Context {
            entries: Arc::new(entries),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl From<ContextDelta> for Context {
    fn from(delta: ContextDelta) -> Self {
        Context::new().merged(delta)
    }
}

/// Contribution returned by one middleware
#[derive(Default)]
pub struct ContextDelta {
    entries: Vec<(String, ContextValue)>,
}

impl ContextDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` under `key`; a later insert with the same key wins
    pub fn insert<T: Any + Send + Sync>(self, key: impl Into<String>, value: T) -> Self {
        self.insert_arc(key, Arc::new(value))
    }

    pub fn insert_arc(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.entries.push((key.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ContextDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(key, _)| key))
            .finish()
    }
}

/// What a middleware sees when it runs
#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    pub method: Method,
    /// Path used for skip/include filtering
    pub path: String,
    pub request: Arc<GatewayRequest>,
    /// Contributions from the middlewares that ran before this one
    pub context: Context,
}

impl MiddlewareContext {
    pub fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }
}
