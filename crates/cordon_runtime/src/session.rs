//! Initialised contexts.

use crate::cancel::{CancelScope, CancelSignal};
use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::service::{BoundService, UseView};
use cordon_core::{ContextResult, ErrorVariant};
use indexmap::IndexMap;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct SessionInner {
    context: Context,
    scope: CancelScope,
    children: IndexMap<String, Session>,
}

/// A context bound to a cancellation scope
///
/// Every nested context (services, and features holding a [`Context`]) is
/// initialised as a child session whose scope cancels this one.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn start(context: Context, parent: Option<&CancelScope>) -> Self {
        let scope = match parent {
            Some(parent) => CancelScope::child_of(parent),
            None => CancelScope::new(),
        };

        let children: IndexMap<String, Session> = context
            .nested()
            .map(|(name, nested)| (name.to_string(), nested.init_with_parent(&scope)))
            .collect();

        debug!(
            context = %context.name(),
            scope = %scope.id(),
            children = children.len(),
            "session initialised"
        );

        Self {
            inner: Arc::new(SessionInner {
                context,
                scope,
                children,
            }),
        }
    }

    /// Already initialised: returns a handle to this same session
    #[must_use]
    pub fn init(&self) -> Session {
        self.clone()
    }

    /// Underlying context
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Runtime configuration of the context
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        self.inner.context.config()
    }

    /// Own cancellation scope
    #[must_use]
    pub fn scope(&self) -> &CancelScope {
        &self.inner.scope
    }

    /// Subscribe to this session's cancellation
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        self.inner.scope.signal()
    }

    /// Check whether this session's scope was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.scope.is_cancelled()
    }

    /// Child session for a nested entry
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Session> {
        self.inner.children.get(name)
    }

    /// All child sessions in flattening order
    #[must_use]
    pub fn children(&self) -> &IndexMap<String, Session> {
        &self.inner.children
    }

    /// Flattened view over the context
    #[must_use]
    pub fn use_view(&self) -> UseView<'_> {
        self.inner.context.use_view()
    }

    /// Borrow a feature by name and type
    ///
    /// # Errors
    ///
    /// Returns error if the feature is absent or holds another type
    pub fn feature<T: Any + Send + Sync>(&self, name: &str) -> ContextResult<&T> {
        self.inner.context.feature(name)
    }

    /// Fetch a nested service by name and type
    ///
    /// # Errors
    ///
    /// Returns error if the service is absent or is another type
    pub fn service<S: BoundService>(&self, name: &str) -> ContextResult<Arc<S>> {
        self.inner.context.service(name)
    }

    /// Look up one of the context's own error variants
    ///
    /// # Errors
    ///
    /// Returns error if no variant is registered under the tag
    pub fn error(&self, tag: &str) -> ContextResult<&ErrorVariant> {
        self.inner.context.error(tag)
    }
}
