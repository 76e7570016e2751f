//! CORDON Runtime
//!
//! Composes typed effect contexts out of features, services, and closed
//! error maps, initialises them into sessions with cancellation scopes,
//! and runs units of work that route failures to tag-matched handlers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod dispose;
pub mod service;
pub mod session;
pub mod shape;

pub use cancel::{CancelScope, CancelSignal};
pub use config::RuntimeConfig;
pub use context::{Context, ContextBuilder, Feature};
pub use dispatch::{AsyncHandlers, HandlerSet, Handlers, Route};
pub use dispose::{
    Disposable, DisposableGroup, DisposalOutcome, DisposalReport, DisposeError, Guard,
    TeardownPhase,
};
pub use service::{BoundService, Member, Service, ServiceEntry, UseView};
pub use session::Session;
pub use shape::{ContextShape, ShapeBuilder, ShapeSummary};

pub use cordon_core::{
    CollisionPolicy, ContextError, ContextResult, ErrorMap, ErrorVariant, Fault, TaggedError,
};
