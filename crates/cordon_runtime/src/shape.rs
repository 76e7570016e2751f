//! Context declarations and their composition.
//!
//! A [`ContextShape`] names the features and services a context needs and
//! closes over the error variants it can raise. Shapes carry no values;
//! [`ContextShape::instantiate`] starts a [`ContextBuilder`] that supplies
//! them.

use crate::config::RuntimeConfig;
use crate::context::ContextBuilder;
use cordon_core::{CollisionPolicy, ContextResult, ErrorMap, ErrorVariant};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Immutable declaration of a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextShape {
    name: String,
    features: IndexSet<String>,
    errors: ErrorMap,
    services: IndexSet<String>,
}

impl ContextShape {
    /// Start a declaration
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ShapeBuilder {
        ShapeBuilder::new(name)
    }

    /// Declare a shape in one call
    ///
    /// # Errors
    ///
    /// Returns error if an error variant has no usable tag or two distinct
    /// variants share a tag
    pub fn create<F, E, S>(
        name: impl Into<String>,
        features: F,
        errors: E,
        services: S,
    ) -> ContextResult<Self>
    where
        F: IntoIterator,
        F::Item: Into<String>,
        E: IntoIterator<Item = ErrorVariant>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self::builder(name)
            .features(features)
            .errors(errors)
            .services(services)
            .build()
    }

    /// Union several shapes with the default configuration
    ///
    /// # Errors
    ///
    /// Returns error if two distinct variants share a tag
    pub fn merge(name: impl Into<String>, shapes: &[&ContextShape]) -> ContextResult<Self> {
        Self::merge_with(name, shapes, &RuntimeConfig::default())
    }

    /// Union several shapes
    ///
    /// Keys keep their first-seen position. The same variant declared by
    /// several inputs is merged silently; distinct variants sharing a tag
    /// follow `config.collision_policy`.
    ///
    /// # Errors
    ///
    /// Returns error on a tag collision under [`CollisionPolicy::Reject`]
    pub fn merge_with(
        name: impl Into<String>,
        shapes: &[&ContextShape],
        config: &RuntimeConfig,
    ) -> ContextResult<Self> {
        let mut merged = Self {
            name: name.into(),
            features: IndexSet::new(),
            errors: ErrorMap::new(),
            services: IndexSet::new(),
        };

        for shape in shapes {
            merged.features.extend(shape.features.iter().cloned());
            merged.services.extend(shape.services.iter().cloned());
            merged
                .errors
                .extend_from(&shape.errors, config.collision_policy)?;
        }

        debug!(
            shape = %merged.name,
            inputs = shapes.len(),
            features = merged.features.len(),
            services = merged.services.len(),
            errors = merged.errors.len(),
            "shapes merged"
        );
        Ok(merged)
    }

    /// Shape name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared feature keys in order
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(String::as_str)
    }

    /// Declared service keys in order
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(String::as_str)
    }

    /// Closed error map
    #[must_use]
    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    /// Check if a feature key is declared
    #[must_use]
    pub fn declares_feature(&self, name: &str) -> bool {
        self.features.contains(name)
    }

    /// Check if a service key is declared
    #[must_use]
    pub fn declares_service(&self, name: &str) -> bool {
        self.services.contains(name)
    }

    /// Start supplying values for this shape
    #[must_use]
    pub fn instantiate(&self) -> ContextBuilder {
        ContextBuilder::new(self.clone())
    }

    /// Serializable summary
    #[must_use]
    pub fn summary(&self) -> ShapeSummary {
        ShapeSummary {
            name: self.name.clone(),
            features: self.features.iter().cloned().collect(),
            services: self.services.iter().cloned().collect(),
            errors: self.errors.tags().map(str::to_string).collect(),
        }
    }
}

/// Builder for [`ContextShape`]
#[derive(Debug, Clone)]
pub struct ShapeBuilder {
    name: String,
    features: IndexSet<String>,
    errors: Vec<ErrorVariant>,
    services: IndexSet<String>,
    policy: CollisionPolicy,
}

impl ShapeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: IndexSet::new(),
            errors: Vec::new(),
            services: IndexSet::new(),
            policy: CollisionPolicy::default(),
        }
    }

    /// Declare a feature key
    #[must_use]
    pub fn feature(mut self, name: impl Into<String>) -> Self {
        self.features.insert(name.into());
        self
    }

    /// Declare several feature keys
    #[must_use]
    pub fn features<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.features.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare an error variant
    #[must_use]
    pub fn error(mut self, variant: ErrorVariant) -> Self {
        self.errors.push(variant);
        self
    }

    /// Declare several error variants
    #[must_use]
    pub fn errors<I>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = ErrorVariant>,
    {
        self.errors.extend(variants);
        self
    }

    /// Declare a service key
    #[must_use]
    pub fn service(mut self, name: impl Into<String>) -> Self {
        self.services.insert(name.into());
        self
    }

    /// Declare several service keys
    #[must_use]
    pub fn services<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.services.extend(names.into_iter().map(Into::into));
        self
    }

    /// Set how tag collisions within this declaration are handled
    #[must_use]
    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Close the declaration
    ///
    /// # Errors
    ///
    /// Returns error if an error variant has no usable tag, uses the
    /// reserved fallback tag, or collides under [`CollisionPolicy::Reject`]
    pub fn build(self) -> ContextResult<ContextShape> {
        let errors = ErrorMap::from_variants(self.errors, self.policy)?;
        debug!(
            shape = %self.name,
            features = self.features.len(),
            services = self.services.len(),
            errors = errors.len(),
            "shape declared"
        );
        Ok(ContextShape {
            name: self.name,
            features: self.features,
            errors,
            services: self.services,
        })
    }
}

/// Serializable view of a shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeSummary {
    /// Shape name
    pub name: String,
    /// Feature keys
    pub features: Vec<String>,
    /// Service keys
    pub services: Vec<String>,
    /// Error tags
    pub errors: Vec<String>,
}
