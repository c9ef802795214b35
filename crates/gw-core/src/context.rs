//! Context as ambient state (spec §9).
//!
//! The source threads request-scoped values (request id, retry count,
//! selected key id, virtual-key metadata, tracer) through a context object.
//! We model it as an explicit immutable record alongside each call — a
//! string→value map with well-known keys — rather than as dynamic/implicit
//! scope (spec §9).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Well-known context keys. Plugins and components may also stash
/// arbitrary values under their own keys.
pub mod keys {
    pub const REQUEST_ID: &str = "request_id";
    pub const RETRY_COUNT: &str = "retry_count";
    pub const SELECTED_KEY_ID: &str = "selected_key_id";
    pub const VIRTUAL_KEY_ID: &str = "virtual_key_id";
    pub const TRACE_ID: &str = "trace_id";
    pub const FALLBACK_INDEX: &str = "fallback_index";
    pub const PROVIDER: &str = "provider";
    pub const MODEL: &str = "model";
}

/// An immutable, cheaply-cloneable per-request context.
///
/// `RequestContext` is never mutated in place: every state transition that
/// needs to add or override a value goes through [`ContextBuilder`] and
/// produces a new, independent context. This matches the invariant that a
/// request id is set before any plugin sees the request and never changes
/// afterwards.
#[derive(Clone, Debug)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    values: HashMap<String, Value>,
    created_at: DateTime<Utc>,
}

impl RequestContext {
    /// Start a brand new context for an incoming request. Generates and
    /// fixes the request id.
    pub fn new() -> Self {
        let request_id = Uuid::new_v4().to_string();
        let mut values = HashMap::new();
        values.insert(keys::REQUEST_ID.to_string(), Value::String(request_id));
        values.insert(keys::RETRY_COUNT.to_string(), Value::from(0));
        Self {
            inner: Arc::new(ContextInner {
                values,
                created_at: Utc::now(),
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        self.get_str(keys::REQUEST_ID).unwrap_or_default()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// Derive a builder seeded with this context's values, for producing a
    /// child context (e.g. a fallback attempt or an MCP tool-call turn).
    pub fn child(&self) -> ContextBuilder {
        ContextBuilder {
            values: self.inner.values.clone(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for deriving a new, independent [`RequestContext`] from an
/// existing one without mutating the parent.
pub struct ContextBuilder {
    values: HashMap<String, Value>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn increment_retry(mut self) -> Self {
        let current = self
            .values
            .get(keys::RETRY_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        self.values
            .insert(keys::RETRY_COUNT.to_string(), Value::from(current + 1));
        self
    }

    pub fn build(self) -> RequestContext {
        RequestContext {
            inner: Arc::new(ContextInner {
                values: self.values,
                created_at: Utc::now(),
            }),
        }
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_fixed_at_creation() {
        let ctx = RequestContext::new();
        let id = ctx.request_id().to_string();
        let child = ctx.child().set(keys::PROVIDER, "openai").build();
        assert_eq!(child.request_id(), id);
    }

    #[test]
    fn child_does_not_mutate_parent() {
        let parent = RequestContext::new();
        let _child = parent.child().set(keys::PROVIDER, "anthropic").build();
        assert!(parent.get(keys::PROVIDER).is_none());
    }

    #[test]
    fn retry_count_increments_on_child() {
        let parent = RequestContext::new();
        let child = parent.child().increment_retry().build();
        assert_eq!(parent.get_u64(keys::RETRY_COUNT), Some(0));
        assert_eq!(child.get_u64(keys::RETRY_COUNT), Some(1));
    }
}
