//! Usage errors for CORDON.
//!
//! These are precondition violations raised while declaring, composing, or
//! reading a context. They are returned to the caller immediately and never
//! travel through error dispatch.

use crate::id::VariantId;

/// Core result type
pub type ContextResult<T> = Result<T, ContextError>;

/// Declaration, construction, and lookup errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// An error variant was declared without a usable tag
    #[error("Error variant {variant} has no tag")]
    MissingTag {
        /// Offending variant
        variant: VariantId,
    },

    /// An error variant uses a tag reserved for the fallback handler
    #[error("Error tag {tag:?} is reserved")]
    ReservedTag {
        /// Reserved tag
        tag: String,
    },

    /// Two distinct variants were declared under the same tag
    #[error("Tag collision for {tag:?}: {existing} vs {incoming}")]
    TagCollision {
        /// Shared tag
        tag: String,
        /// Variant already registered under the tag
        existing: VariantId,
        /// Variant that tried to register under the tag
        incoming: VariantId,
    },

    /// A declared feature was not supplied
    #[error("Context {context} is missing feature {name:?}")]
    MissingFeature {
        /// Context name
        context: String,
        /// Feature key
        name: String,
    },

    /// A supplied feature was never declared
    #[error("Context {context} does not declare feature {name:?}")]
    UndeclaredFeature {
        /// Context name
        context: String,
        /// Feature key
        name: String,
    },

    /// A feature exists but holds a different type
    #[error("Feature {name:?} is not a {expected}")]
    FeatureType {
        /// Feature key
        name: String,
        /// Requested type name
        expected: String,
    },

    /// A declared service was not supplied
    #[error("Context {context} is missing service {name:?}")]
    MissingService {
        /// Context name
        context: String,
        /// Service key
        name: String,
    },

    /// A supplied service was never declared
    #[error("Context {context} does not declare service {name:?}")]
    UndeclaredService {
        /// Context name
        context: String,
        /// Service key
        name: String,
    },

    /// A service exists but is a different type
    #[error("Service {name:?} is not a {expected}")]
    ServiceType {
        /// Service key
        name: String,
        /// Requested type name
        expected: String,
    },

    /// No error variant is registered under the tag
    #[error("Context {context} has no error tagged {tag:?}")]
    UnknownError {
        /// Context name
        context: String,
        /// Requested tag
        tag: String,
    },

    /// Runtime configuration could not be loaded
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Why loading failed
        reason: String,
    },
}

impl From<serde_json::Error> for ContextError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config {
            reason: err.to_string(),
        }
    }
}
