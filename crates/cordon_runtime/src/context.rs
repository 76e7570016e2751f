//! Concrete contexts: a shape plus the values that satisfy it.

use crate::cancel::CancelScope;
use crate::config::RuntimeConfig;
use crate::service::{BoundService, ServiceEntry, UseView};
use crate::session::Session;
use crate::shape::ContextShape;
use cordon_core::{ContextError, ContextResult, ErrorMap, ErrorVariant};
use indexmap::IndexMap;
use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Type-erased feature value
pub type Feature = Arc<dyn Any + Send + Sync>;

struct ContextInner {
    shape: ContextShape,
    features: IndexMap<String, Feature>,
    services: IndexMap<String, ServiceEntry>,
    config: RuntimeConfig,
}

/// Immutable, cheaply clonable context
///
/// A context is a template: [`Context::init`] produces a [`Session`] that
/// can run work, and every call yields an independent session.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Start supplying values for a shape
    #[must_use]
    pub fn builder(shape: &ContextShape) -> ContextBuilder {
        shape.instantiate()
    }

    /// Context name
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.shape.name()
    }

    /// Declaration this context satisfies
    #[must_use]
    pub fn shape(&self) -> &ContextShape {
        &self.inner.shape
    }

    /// Runtime configuration
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Own error map
    #[must_use]
    pub fn errors(&self) -> &ErrorMap {
        self.inner.shape.errors()
    }

    /// Feature values in declaration order
    #[must_use]
    pub fn features(&self) -> &IndexMap<String, Feature> {
        &self.inner.features
    }

    /// Nested services in declaration order
    #[must_use]
    pub fn services(&self) -> &IndexMap<String, ServiceEntry> {
        &self.inner.services
    }

    /// Borrow a feature by name and type
    ///
    /// # Errors
    ///
    /// Returns error if the feature is absent or holds another type
    pub fn feature<T: Any + Send + Sync>(&self, name: &str) -> ContextResult<&T> {
        let value = self
            .inner
            .features
            .get(name)
            .ok_or_else(|| ContextError::MissingFeature {
                context: self.name().to_string(),
                name: name.to_string(),
            })?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| ContextError::FeatureType {
                name: name.to_string(),
                expected: type_name::<T>().to_string(),
            })
    }

    /// Fetch a nested service by name and type
    ///
    /// # Errors
    ///
    /// Returns error if the service is absent or is another type
    pub fn service<S: BoundService>(&self, name: &str) -> ContextResult<Arc<S>> {
        let entry = self
            .inner
            .services
            .get(name)
            .ok_or_else(|| ContextError::MissingService {
                context: self.name().to_string(),
                name: name.to_string(),
            })?;
        entry.downcast::<S>().ok_or_else(|| ContextError::ServiceType {
            name: name.to_string(),
            expected: type_name::<S>().to_string(),
        })
    }

    /// Look up one of this context's own error variants
    ///
    /// # Errors
    ///
    /// Returns error if no variant is registered under the tag
    pub fn error(&self, tag: &str) -> ContextResult<&ErrorVariant> {
        self.errors().get(tag).ok_or_else(|| ContextError::UnknownError {
            context: self.name().to_string(),
            tag: tag.to_string(),
        })
    }

    /// Flattened view over features, services, and errors
    #[must_use]
    pub fn use_view(&self) -> UseView<'_> {
        UseView::new(self)
    }

    /// Entries that carry a context of their own, in flattening order
    pub(crate) fn nested(&self) -> impl Iterator<Item = (&str, &Context)> {
        let features = self.inner.features.iter().filter_map(|(name, value)| {
            value
                .downcast_ref::<Context>()
                .map(|context| (name.as_str(), context))
        });
        let services = self
            .inner
            .services
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.context()));
        features.chain(services)
    }

    /// Initialise a root session
    #[must_use]
    pub fn init(&self) -> Session {
        Session::start(self.clone(), None)
    }

    /// Initialise a session whose cancellation reaches `parent`
    #[must_use]
    pub fn init_with_parent(&self, parent: &CancelScope) -> Session {
        Session::start(self.clone(), Some(parent))
    }

    /// Initialise a fresh session and hand it to `work`
    pub fn run<R, F>(&self, work: F) -> R
    where
        F: FnOnce(&Session) -> R,
    {
        work(&self.init())
    }

    /// Initialise a fresh session and await `work` on it
    pub async fn run_async<R, F, Fut>(&self, work: F) -> R
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = R>,
    {
        work(self.init()).await
    }

    /// Whether both handles share the same tables
    #[must_use]
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name())
            .field("features", &self.inner.features.keys().collect::<Vec<_>>())
            .field("services", &self.inner.services.keys().collect::<Vec<_>>())
            .field("errors", &self.errors().tags().collect::<Vec<_>>())
            .finish()
    }
}

/// Supplies values for a [`ContextShape`]
pub struct ContextBuilder {
    shape: ContextShape,
    features: IndexMap<String, Feature>,
    services: IndexMap<String, ServiceEntry>,
    config: RuntimeConfig,
}

impl ContextBuilder {
    pub(crate) fn new(shape: ContextShape) -> Self {
        Self {
            shape,
            features: IndexMap::new(),
            services: IndexMap::new(),
            config: RuntimeConfig::default(),
        }
    }

    /// Supply a feature value
    #[must_use]
    pub fn feature<T: Any + Send + Sync>(self, name: impl Into<String>, value: T) -> Self {
        self.feature_arc(name, Arc::new(value))
    }

    /// Supply an already shared feature value
    #[must_use]
    pub fn feature_arc(mut self, name: impl Into<String>, value: Feature) -> Self {
        self.features.insert(name.into(), value);
        self
    }

    /// Supply a nested service
    #[must_use]
    pub fn service<S: BoundService>(mut self, name: impl Into<String>, service: Arc<S>) -> Self {
        self.services.insert(name.into(), ServiceEntry::new(service));
        self
    }

    /// Attach runtime configuration
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate coverage and freeze the context
    ///
    /// # Errors
    ///
    /// Returns error if a declared key has no value or a supplied key was
    /// never declared
    pub fn build(mut self) -> ContextResult<Context> {
        let context = self.shape.name().to_string();

        if let Some(name) = self.features.keys().find(|k| !self.shape.declares_feature(k)) {
            return Err(ContextError::UndeclaredFeature {
                context,
                name: name.clone(),
            });
        }
        if let Some(name) = self.services.keys().find(|k| !self.shape.declares_service(k)) {
            return Err(ContextError::UndeclaredService {
                context,
                name: name.clone(),
            });
        }

        let mut features = IndexMap::with_capacity(self.features.len());
        for name in self.shape.features() {
            let value = self
                .features
                .shift_remove(name)
                .ok_or_else(|| ContextError::MissingFeature {
                    context: context.clone(),
                    name: name.to_string(),
                })?;
            features.insert(name.to_string(), value);
        }

        let mut services = IndexMap::with_capacity(self.services.len());
        for name in self.shape.services() {
            let entry = self
                .services
                .shift_remove(name)
                .ok_or_else(|| ContextError::MissingService {
                    context: context.clone(),
                    name: name.to_string(),
                })?;
            services.insert(name.to_string(), entry);
        }

        debug!(
            context = %context,
            features = features.len(),
            services = services.len(),
            "context built"
        );

        Ok(Context {
            inner: Arc::new(ContextInner {
                shape: self.shape,
                features,
                services,
                config: self.config,
            }),
        })
    }
}

impl fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("shape", &self.shape.name())
            .field("features", &self.features.keys().collect::<Vec<_>>())
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Service;

    #[derive(Debug)]
    struct Greeter {
        service: Service,
    }

    impl BoundService for Greeter {
        fn service(&self) -> &Service {
            &self.service
        }
    }

    #[derive(Debug)]
    struct Other {
        service: Service,
    }

    impl BoundService for Other {
        fn service(&self) -> &Service {
            &self.service
        }
    }

    fn greet(name: &str) -> String {
        format!("hello {name}")
    }

    fn leaf(name: &str) -> Context {
        ContextShape::builder(name)
            .build()
            .unwrap()
            .instantiate()
            .build()
            .unwrap()
    }

    fn hello_shape() -> ContextShape {
        ContextShape::builder("hello")
            .feature("format")
            .feature("retries")
            .error(ErrorVariant::new("Itch"))
            .service("greeter")
            .build()
            .unwrap()
    }

    fn hello() -> Context {
        Context::builder(&hello_shape())
            .feature("retries", 3u32)
            .feature("format", greet as fn(&str) -> String)
            .service(
                "greeter",
                Arc::new(Greeter {
                    service: Service::new(leaf("greeter")),
                }),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_orders_by_declaration() {
        let ctx = hello();
        assert_eq!(ctx.name(), "hello");
        assert_eq!(
            ctx.features().keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["format", "retries"]
        );
        assert_eq!(ctx.services().len(), 1);
    }

    #[test]
    fn test_typed_feature() {
        let ctx = hello();
        let format = ctx.feature::<fn(&str) -> String>("format").unwrap();
        assert_eq!(format("ada"), "hello ada");
        assert_eq!(*ctx.feature::<u32>("retries").unwrap(), 3);
    }

    #[test]
    fn test_feature_type_mismatch() {
        let ctx = hello();
        let err = ctx.feature::<String>("retries").unwrap_err();
        assert!(matches!(err, ContextError::FeatureType { .. }));
        let err = ctx.feature::<u32>("absent").unwrap_err();
        assert!(matches!(err, ContextError::MissingFeature { .. }));
    }

    #[test]
    fn test_typed_service() {
        let ctx = hello();
        let greeter = ctx.service::<Greeter>("greeter").unwrap();
        assert_eq!(greeter.service().context().name(), "greeter");

        let err = ctx.service::<Other>("greeter").unwrap_err();
        assert!(matches!(err, ContextError::ServiceType { .. }));
        let err = ctx.service::<Greeter>("absent").unwrap_err();
        assert!(matches!(err, ContextError::MissingService { .. }));
    }

    #[test]
    fn test_error_lookup() {
        let ctx = hello();
        assert_eq!(ctx.error("Itch").unwrap().tag(), "Itch");
        assert!(matches!(
            ctx.error("Damn"),
            Err(ContextError::UnknownError { .. })
        ));
    }

    #[test]
    fn test_missing_feature_rejected() {
        let result = Context::builder(&hello_shape())
            .feature("format", greet as fn(&str) -> String)
            .build();
        assert_eq!(
            result.unwrap_err(),
            ContextError::MissingFeature {
                context: "hello".to_string(),
                name: "retries".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_service_rejected() {
        let result = Context::builder(&hello_shape())
            .feature("format", greet as fn(&str) -> String)
            .feature("retries", 1u32)
            .build();
        assert!(matches!(result, Err(ContextError::MissingService { .. })));
    }

    #[test]
    fn test_undeclared_keys_rejected() {
        let shape = ContextShape::builder("tight").build().unwrap();
        let result = shape.instantiate().feature("extra", 1u8).build();
        assert!(matches!(result, Err(ContextError::UndeclaredFeature { .. })));

        let result = shape
            .instantiate()
            .service(
                "extra",
                Arc::new(Other {
                    service: Service::new(leaf("extra")),
                }),
            )
            .build();
        assert!(matches!(result, Err(ContextError::UndeclaredService { .. })));
    }

    #[test]
    fn test_nested_walk() {
        let inner = leaf("inner");
        let shape = ContextShape::builder("outer")
            .feature("inner")
            .feature("plain")
            .service("greeter")
            .build()
            .unwrap();
        let ctx = shape
            .instantiate()
            .feature("inner", inner.clone())
            .feature("plain", "text")
            .service(
                "greeter",
                Arc::new(Greeter {
                    service: Service::new(leaf("greeter")),
                }),
            )
            .build()
            .unwrap();

        let nested: Vec<_> = ctx.nested().map(|(name, c)| (name, c.name())).collect();
        assert_eq!(nested, vec![("inner", "inner"), ("greeter", "greeter")]);
        assert!(ctx.nested().any(|(_, c)| c.ptr_eq(&inner)));
    }

    #[test]
    fn test_run_uses_fresh_session() {
        let ctx = hello();
        let first = ctx.run(|session| {
            session.scope().cancel();
            session.scope().id()
        });
        let (second, cancelled) = ctx.run(|session| (session.scope().id(), session.is_cancelled()));

        assert_ne!(first, second);
        assert!(!cancelled);
        let retries = ctx.run(|session| *session.feature::<u32>("retries").unwrap());
        assert_eq!(retries, 3);
    }

    #[tokio::test]
    async fn test_run_async_owns_session() {
        let ctx = hello();
        let session = ctx
            .run_async(|session| async move {
                tokio::task::yield_now().await;
                session
            })
            .await;
        assert!(session.context().ptr_eq(&ctx));
        assert!(session.child("greeter").is_some());
        assert!(!session.is_cancelled());
    }

    #[test]
    fn test_clone_shares_tables() {
        let ctx = hello();
        assert!(ctx.ptr_eq(&ctx.clone()));
        assert!(!ctx.ptr_eq(&hello()));
    }
}
