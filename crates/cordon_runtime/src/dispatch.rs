//! Running work under a session and routing its failures.
//!
//! A failure is matched by variant identity against the session's own
//! error map first, then against each nested service's map in declaration
//! order. The first match whose tag has a handler wins; otherwise the
//! `Any` handler runs if present, and failing that the fault is returned
//! unchanged. At most one handler runs per dispatch.

use crate::session::Session;
use cordon_core::{Fault, ANY_TAG};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use tracing::{debug, trace, warn};

/// Where a fault is routed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// Declared by the session's own context
    Own {
        /// Matched tag
        tag: String,
    },
    /// Declared by a nested service
    Service {
        /// Service key in the context
        service: String,
        /// Matched tag
        tag: String,
    },
    /// Caught by the fallback handler
    Any,
    /// No handler applies
    Unhandled,
}

impl Route {
    /// Whether a handler will run
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        !matches!(self, Self::Unhandled)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Own { tag } => write!(f, "own:{}", tag),
            Self::Service { service, tag } => write!(f, "service:{}:{}", service, tag),
            Self::Any => write!(f, "any"),
            Self::Unhandled => write!(f, "unhandled"),
        }
    }
}

/// Anything that can answer which tags it handles
pub trait HandlerSet {
    /// Whether a handler is registered for the tag
    fn handles(&self, tag: &str) -> bool;

    /// Whether a fallback handler is registered
    fn has_fallback(&self) -> bool;
}

struct HandlerTable<H> {
    routes: IndexMap<String, H>,
    fallback: Option<H>,
}

impl<H> HandlerTable<H> {
    fn new() -> Self {
        Self {
            routes: IndexMap::new(),
            fallback: None,
        }
    }

    fn insert(&mut self, tag: String, handler: H) {
        if tag == ANY_TAG {
            self.fallback = Some(handler);
        } else {
            self.routes.insert(tag, handler);
        }
    }

    fn take(&mut self, route: &Route) -> Option<H> {
        match route {
            Route::Own { tag } | Route::Service { tag, .. } => self.routes.shift_remove(tag),
            Route::Any => self.fallback.take(),
            Route::Unhandled => None,
        }
    }

    fn tags(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }
}

impl<H> HandlerSet for HandlerTable<H> {
    fn handles(&self, tag: &str) -> bool {
        self.routes.contains_key(tag)
    }

    fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

type SyncHandler<'a, T> = Box<dyn FnOnce(Fault) -> Result<T, Fault> + 'a>;
type AsyncHandler<'a, T> = Box<dyn FnOnce(Fault) -> BoxFuture<'a, Result<T, Fault>> + Send + 'a>;

/// Tag-keyed handlers for [`Session::catch`]
pub struct Handlers<'a, T> {
    table: HandlerTable<SyncHandler<'a, T>>,
}

impl<'a, T> Handlers<'a, T> {
    /// Create an empty handler set
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: HandlerTable::new(),
        }
    }

    /// Handle faults of the tagged variant
    ///
    /// Registering under `"Any"` sets the fallback.
    #[must_use]
    pub fn on<F>(mut self, tag: impl Into<String>, handler: F) -> Self
    where
        F: FnOnce(Fault) -> Result<T, Fault> + 'a,
    {
        self.table.insert(tag.into(), Box::new(handler));
        self
    }

    /// Handle anything no tagged handler claims
    #[must_use]
    pub fn any<F>(self, handler: F) -> Self
    where
        F: FnOnce(Fault) -> Result<T, Fault> + 'a,
    {
        self.on(ANY_TAG, handler)
    }
}

impl<T> Default for Handlers<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandlerSet for Handlers<'_, T> {
    fn handles(&self, tag: &str) -> bool {
        self.table.handles(tag)
    }

    fn has_fallback(&self) -> bool {
        self.table.has_fallback()
    }
}

impl<T> fmt::Debug for Handlers<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("tags", &self.table.tags())
            .field("fallback", &self.table.has_fallback())
            .finish()
    }
}

/// Tag-keyed asynchronous handlers for [`Session::catch_async`]
pub struct AsyncHandlers<'a, T> {
    table: HandlerTable<AsyncHandler<'a, T>>,
}

impl<'a, T> AsyncHandlers<'a, T> {
    /// Create an empty handler set
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: HandlerTable::new(),
        }
    }

    /// Handle faults of the tagged variant
    ///
    /// Registering under `"Any"` sets the fallback.
    #[must_use]
    pub fn on<F, Fut>(mut self, tag: impl Into<String>, handler: F) -> Self
    where
        F: FnOnce(Fault) -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, Fault>> + Send + 'a,
    {
        self.table
            .insert(tag.into(), Box::new(move |fault: Fault| handler(fault).boxed()));
        self
    }

    /// Handle anything no tagged handler claims
    #[must_use]
    pub fn any<F, Fut>(self, handler: F) -> Self
    where
        F: FnOnce(Fault) -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, Fault>> + Send + 'a,
    {
        self.on(ANY_TAG, handler)
    }
}

impl<T> Default for AsyncHandlers<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandlerSet for AsyncHandlers<'_, T> {
    fn handles(&self, tag: &str) -> bool {
        self.table.handles(tag)
    }

    fn has_fallback(&self) -> bool {
        self.table.has_fallback()
    }
}

impl<T> fmt::Debug for AsyncHandlers<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandlers")
            .field("tags", &self.table.tags())
            .field("fallback", &self.table.has_fallback())
            .finish()
    }
}

impl Session {
    /// Decide where a fault would be routed without running anything
    #[must_use]
    pub fn route(&self, fault: &Fault, handlers: &impl HandlerSet) -> Route {
        if let Some(error) = fault.as_tagged() {
            let context = self.context();

            if let Some(variant) = context.errors().find_instance(error) {
                if handlers.handles(variant.tag()) {
                    return Route::Own {
                        tag: variant.tag().to_string(),
                    };
                }
            }

            for (name, entry) in context.services() {
                if let Some(variant) = entry.errors().find_instance(error) {
                    if handlers.handles(variant.tag()) {
                        return Route::Service {
                            service: name.clone(),
                            tag: variant.tag().to_string(),
                        };
                    }
                }
            }
        }

        if handlers.has_fallback() {
            Route::Any
        } else {
            Route::Unhandled
        }
    }

    /// Run synchronous work and route its failure
    ///
    /// Returns the work's value, the handler's value when a handler ran,
    /// or the original fault when none applied. A handler's own failure is
    /// returned as-is and leaves the scope untouched.
    ///
    /// # Errors
    ///
    /// Returns the fault when no handler applies or the handler fails
    pub fn catch<T, F>(&self, work: F, handlers: Handlers<'_, T>) -> Result<T, Fault>
    where
        F: FnOnce() -> Result<T, Fault>,
    {
        let fault = match work() {
            Ok(value) => {
                trace!(context = %self.context().name(), "work completed");
                return Ok(value);
            }
            Err(fault) => fault,
        };

        let mut table = handlers.table;
        match self.select(&fault, &mut table) {
            Some(handler) => self.finish(handler(fault)),
            None => Err(fault),
        }
    }

    /// Await asynchronous work and route its failure
    ///
    /// Same routing as [`Session::catch`], applied once the work settles.
    ///
    /// # Errors
    ///
    /// Returns the fault when no handler applies or the handler fails
    pub async fn catch_async<T, Fut>(
        &self,
        work: Fut,
        handlers: AsyncHandlers<'_, T>,
    ) -> Result<T, Fault>
    where
        Fut: Future<Output = Result<T, Fault>>,
    {
        let fault = match work.await {
            Ok(value) => {
                trace!(context = %self.context().name(), "work completed");
                return Ok(value);
            }
            Err(fault) => fault,
        };

        let mut table = handlers.table;
        match self.select(&fault, &mut table) {
            Some(handler) => self.finish(handler(fault).await),
            None => Err(fault),
        }
    }

    fn select<H>(&self, fault: &Fault, table: &mut HandlerTable<H>) -> Option<H> {
        let route = self.route(fault, &*table);
        let handler = table.take(&route);

        if handler.is_some() {
            debug!(
                context = %self.context().name(),
                route = %route,
                fault = %fault,
                "fault routed"
            );
        } else if self.config().log_unhandled {
            warn!(
                context = %self.context().name(),
                fault = %fault,
                "fault unhandled"
            );
        }
        handler
    }

    fn finish<T>(&self, outcome: Result<T, Fault>) -> Result<T, Fault> {
        match outcome {
            Ok(value) => {
                if self.config().cancel_on_handled {
                    self.scope().cancel();
                }
                Ok(value)
            }
            Err(fault) => {
                debug!(
                    context = %self.context().name(),
                    fault = %fault,
                    "handler failed"
                );
                Err(fault)
            }
        }
    }
}
