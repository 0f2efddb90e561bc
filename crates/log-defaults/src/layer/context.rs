//! Ambient log context
//!
//! # Thread-Local Storage
//!
//! Properties pushed here are stored in thread-local storage and are **not**
//! propagated across `.await` points in work-stealing runtimes. For async
//! code, record the values as `tracing::Span` fields instead; the
//! LogContext enricher picks up both.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

thread_local! {
    static CONTEXT: RefCell<Arc<LogContext>> = RefCell::new(Arc::new(LogContext::default()));
}

/// Set of properties attached to every event recorded on this thread
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogContext {
    properties: BTreeMap<String, Value>,
}

impl LogContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property; values that fail to serialize are skipped
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.properties.insert(name.into(), v);
        }
        self
    }

    /// Properties in this context
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Layer this context over the current one until the guard drops
    #[must_use]
    pub fn push(self) -> LogContextGuard {
        CONTEXT.with(|ctx| {
            let old = Arc::clone(&ctx.borrow());
            let mut merged = (*old).clone();
            merged.properties.extend(self.properties);
            *ctx.borrow_mut() = Arc::new(merged);
            LogContextGuard {
                old: Some(old),
                _not_send: PhantomData,
            }
        })
    }

    /// Push a single property until the guard drops
    #[must_use]
    pub fn push_property(name: impl Into<String>, value: impl Serialize) -> LogContextGuard {
        Self::new().with_property(name, value).push()
    }

    /// Get current context (cheap `Arc::clone`, no deep copy)
    #[inline]
    #[must_use]
    pub fn current() -> Arc<Self> {
        CONTEXT.with(|ctx| Arc::clone(&ctx.borrow()))
    }

    /// Run a closure with this context pushed
    pub fn scope<R>(self, f: impl FnOnce() -> R) -> R {
        let _guard = self.push();
        f()
    }
}

/// RAII guard that restores the previous context on drop
///
/// This guard is `!Send` because it references thread-local storage.
#[derive(Debug)]
pub struct LogContextGuard {
    old: Option<Arc<LogContext>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for LogContextGuard {
    fn drop(&mut self) {
        if let Some(old) = self.old.take() {
            CONTEXT.with(|ctx| {
                *ctx.borrow_mut() = old;
            });
        }
    }
}
