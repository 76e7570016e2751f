//! CORDON Core Types
//!
//! This crate contains pure types with no I/O: tagged error variants,
//! the faults a unit of work can fail with, closed error maps, and the
//! identifiers that give variants and scopes their identity.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod error_map;
pub mod id;
pub mod tagged;

// Re-exports
pub use error::{ContextError, ContextResult};
pub use error_map::{CollisionPolicy, ErrorMap};
pub use id::{ScopeId, VariantId};
pub use tagged::{DynError, ErrorReport, ErrorVariant, Fault, TaggedError, ANY_TAG};
