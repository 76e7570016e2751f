//! Services and the flattened `use` view.
//!
//! A service is a capability bound to exactly one [`Context`]. User types
//! embed a [`Service`] and implement [`BoundService`] so they can be nested
//! into other contexts and retrieved again by type.

use crate::context::{Context, Feature};
use cordon_core::{ContextResult, ErrorMap, ErrorVariant};
use indexmap::{IndexMap, IndexSet};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A user service bound to a context
pub trait BoundService: Any + Send + Sync {
    /// The service's own context binding
    fn service(&self) -> &Service;
}

/// Capability wrapper around a single context
#[derive(Debug, Clone)]
pub struct Service {
    context: Context,
}

impl Service {
    /// Bind a context
    #[must_use]
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Bound context
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Errors the service can raise
    #[must_use]
    pub fn errors(&self) -> &ErrorMap {
        self.context.errors()
    }

    /// Feature values of the bound context
    #[must_use]
    pub fn features(&self) -> &IndexMap<String, Feature> {
        self.context.features()
    }

    /// Services nested in the bound context
    #[must_use]
    pub fn services(&self) -> &IndexMap<String, ServiceEntry> {
        self.context.services()
    }

    /// Flattened view over the bound context
    #[must_use]
    pub fn use_view(&self) -> UseView<'_> {
        self.context.use_view()
    }

    /// Borrow a feature by name and type
    ///
    /// # Errors
    ///
    /// Returns error if the feature is absent or holds another type
    pub fn feature<T: Any + Send + Sync>(&self, name: &str) -> ContextResult<&T> {
        self.context.feature(name)
    }

    /// Look up one of the service's error variants
    ///
    /// # Errors
    ///
    /// Returns error if no variant is registered under the tag
    pub fn error(&self, tag: &str) -> ContextResult<&ErrorVariant> {
        self.context.error(tag)
    }
}

impl BoundService for Service {
    fn service(&self) -> &Service {
        self
    }
}

/// A nested service as stored in a context
///
/// Holds the same allocation twice: once as a [`BoundService`] for
/// routing and once as [`Any`] for typed retrieval.
#[derive(Clone)]
pub struct ServiceEntry {
    handle: Arc<dyn BoundService>,
    object: Arc<dyn Any + Send + Sync>,
}

impl ServiceEntry {
    /// Wrap a service
    #[must_use]
    pub fn new<S: BoundService>(service: Arc<S>) -> Self {
        Self {
            handle: service.clone(),
            object: service,
        }
    }

    /// Service binding
    #[must_use]
    pub fn service(&self) -> &Service {
        self.handle.service()
    }

    /// Bound context
    #[must_use]
    pub fn context(&self) -> &Context {
        self.service().context()
    }

    /// Errors the service can raise
    #[must_use]
    pub fn errors(&self) -> &ErrorMap {
        self.service().errors()
    }

    /// Recover the concrete service type
    #[must_use]
    pub fn downcast<S: BoundService>(&self) -> Option<Arc<S>> {
        Arc::clone(&self.object).downcast::<S>().ok()
    }
}

impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("context", &self.context().name())
            .finish_non_exhaustive()
    }
}

/// One entry of the flattened view
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    /// Feature value
    Feature(&'a Feature),
    /// Nested service
    Service(&'a ServiceEntry),
    /// Error variant
    Error(&'a ErrorVariant),
}

impl Member<'_> {
    /// Kind label
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Feature(_) => "feature",
            Self::Service(_) => "service",
            Self::Error(_) => "error",
        }
    }
}

/// Read-only projection of a context under one namespace
///
/// On a name clash errors shadow services and services shadow features.
#[derive(Debug, Clone, Copy)]
pub struct UseView<'a> {
    context: &'a Context,
}

impl<'a> UseView<'a> {
    pub(crate) fn new(context: &'a Context) -> Self {
        Self { context }
    }

    /// Look up any member by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Member<'a>> {
        let context = self.context;
        if let Some(variant) = context.errors().get(name) {
            return Some(Member::Error(variant));
        }
        if let Some(entry) = context.services().get(name) {
            return Some(Member::Service(entry));
        }
        context.features().get(name).map(Member::Feature)
    }

    /// Check if a name resolves
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Distinct names: features, then services, then errors
    #[must_use]
    pub fn names(&self) -> Vec<&'a str> {
        let context = self.context;
        let names: IndexSet<&'a str> = context
            .features()
            .keys()
            .map(String::as_str)
            .chain(context.services().keys().map(String::as_str))
            .chain(context.errors().tags())
            .collect();
        names.into_iter().collect()
    }

    /// Borrow a feature by name and type
    ///
    /// # Errors
    ///
    /// Returns error if the feature is absent or holds another type
    pub fn feature<T: Any + Send + Sync>(&self, name: &str) -> ContextResult<&'a T> {
        self.context.feature(name)
    }

    /// Fetch a nested service by name and type
    ///
    /// # Errors
    ///
    /// Returns error if the service is absent or is another type
    pub fn service<S: BoundService>(&self, name: &str) -> ContextResult<Arc<S>> {
        self.context.service(name)
    }

    /// Look up an error variant by tag
    ///
    /// # Errors
    ///
    /// Returns error if no variant is registered under the tag
    pub fn error(&self, tag: &str) -> ContextResult<&'a ErrorVariant> {
        self.context.error(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ContextShape;

    struct Mailer {
        service: Service,
        outbox: &'static str,
    }

    impl BoundService for Mailer {
        fn service(&self) -> &Service {
            &self.service
        }
    }

    fn mailer() -> Arc<Mailer> {
        let context = ContextShape::builder("mailer")
            .feature("host")
            .error(ErrorVariant::new("Bounce"))
            .build()
            .unwrap()
            .instantiate()
            .feature("host", "smtp.local")
            .build()
            .unwrap();
        Arc::new(Mailer {
            service: Service::new(context),
            outbox: "outbox",
        })
    }

    #[test]
    fn test_service_accessors() {
        let mailer = mailer();
        let service = mailer.service();
        assert_eq!(service.errors().tags().collect::<Vec<_>>(), vec!["Bounce"]);
        assert_eq!(*service.feature::<&str>("host").unwrap(), "smtp.local");
        assert!(service.services().is_empty());
        assert_eq!(service.features().len(), 1);
        assert_eq!(service.error("Bounce").unwrap().tag(), "Bounce");
    }

    #[test]
    fn test_entry_downcast() {
        let entry = ServiceEntry::new(mailer());
        let typed = entry.downcast::<Mailer>().unwrap();
        assert_eq!(typed.outbox, "outbox");
        assert!(entry.downcast::<Service>().is_none());
        assert_eq!(entry.context().name(), "mailer");
        assert!(entry.errors().contains("Bounce"));
    }

    #[test]
    fn test_bare_service_is_bound() {
        let entry = ServiceEntry::new(Arc::new(mailer().service().clone()));
        assert!(entry.downcast::<Service>().is_some());
        assert_eq!(entry.service().context().name(), "mailer");
    }

    #[test]
    fn test_use_view_precedence() {
        let clash = ErrorVariant::new("mail");
        let context = ContextShape::builder("app")
            .feature("mail")
            .feature("port")
            .service("mail")
            .error(clash.clone())
            .build()
            .unwrap()
            .instantiate()
            .feature("mail", 1u8)
            .feature("port", 25u16)
            .service("mail", mailer())
            .build()
            .unwrap();

        let view = context.use_view();
        assert!(matches!(view.get("mail"), Some(Member::Error(v)) if *v == clash));
        assert!(matches!(view.get("port"), Some(Member::Feature(_))));
        assert!(view.get("missing").is_none());
        assert_eq!(view.names(), vec!["mail", "port"]);
        assert_eq!(*view.feature::<u16>("port").unwrap(), 25);
        assert!(view.service::<Mailer>("mail").is_ok());
        assert_eq!(view.get("port").map(|m| m.kind()), Some("feature"));
    }

    #[test]
    fn test_use_view_service_over_feature() {
        let context = ContextShape::builder("app")
            .feature("mail")
            .service("mail")
            .build()
            .unwrap()
            .instantiate()
            .feature("mail", 1u8)
            .service("mail", mailer())
            .build()
            .unwrap();
        assert!(matches!(context.use_view().get("mail"), Some(Member::Service(_))));
    }
}
