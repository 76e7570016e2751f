//! Tagged error variants and the faults a unit of work can fail with.
//!
//! An [`ErrorVariant`] plays the role of an error constructor: it owns a
//! stable tag and an identity, and every [`TaggedError`] it builds carries
//! both. Routing compares identities, so two variants that happen to share
//! a tag never match each other's instances.

use crate::error::ContextError;
use crate::id::VariantId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Handler key for the fallback route
pub const ANY_TAG: &str = "Any";

/// Argument keys that never land in `details`
const RESERVED_KEYS: [&str; 3] = ["message", "parent", "tag"];

/// Shared, type-erased error used for causal parents and foreign faults
pub type DynError = Arc<dyn StdError + Send + Sync + 'static>;

/// A declared error variant (the constructor side of a tagged error)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorVariant {
    id: VariantId,
    tag: Arc<str>,
}

impl ErrorVariant {
    /// Create a new variant with a fresh identity
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            id: VariantId::new(),
            tag: Arc::from(tag.into()),
        }
    }

    /// Variant identity
    #[must_use]
    pub const fn id(&self) -> VariantId {
        self.id
    }

    /// Stable tag
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether the tag is usable as a dictionary key
    #[must_use]
    pub fn has_tag(&self) -> bool {
        !self.tag.trim().is_empty()
    }

    /// Build an instance with no message and no details
    #[must_use]
    pub fn error(&self) -> TaggedError {
        TaggedError::of(self)
    }

    /// Build an instance with a message
    #[must_use]
    pub fn with_message(&self, message: impl Into<String>) -> TaggedError {
        self.error().with_message(message)
    }

    /// Build an instance from a loose argument object
    ///
    /// `message` becomes the message, `parent` and `tag` are dropped, and
    /// every other key is stored in `details`.
    #[must_use]
    pub fn from_args(&self, args: Map<String, Value>) -> TaggedError {
        self.error().with_args(args)
    }

    /// Check whether an error was built by this variant
    #[must_use]
    pub fn is_instance(&self, error: &TaggedError) -> bool {
        error.variant == self.id
    }

    /// Check whether a fault is an instance of this variant
    #[must_use]
    pub fn matches(&self, fault: &Fault) -> bool {
        fault.as_tagged().is_some_and(|error| self.is_instance(error))
    }
}

impl fmt::Display for ErrorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)
    }
}

/// An error value produced by an [`ErrorVariant`]
#[derive(Clone)]
pub struct TaggedError {
    tag: Arc<str>,
    variant: VariantId,
    message: String,
    details: Map<String, Value>,
    parent: Option<DynError>,
    trace: Arc<Backtrace>,
}

impl TaggedError {
    fn of(variant: &ErrorVariant) -> Self {
        Self {
            tag: Arc::clone(&variant.tag),
            variant: variant.id,
            message: String::new(),
            details: Map::new(),
            parent: None,
            trace: Arc::new(Backtrace::capture()),
        }
    }

    /// Variant tag
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Identity of the producing variant
    #[must_use]
    pub const fn variant(&self) -> VariantId {
        self.variant
    }

    /// Human-readable message (empty when omitted)
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Structured payload
    #[must_use]
    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    /// Single detail entry
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    /// Causal parent, if any
    #[must_use]
    pub fn parent(&self) -> Option<&DynError> {
        self.parent.as_ref()
    }

    /// Backtrace of the original failure site
    ///
    /// Adopted from the parent when the parent is itself tagged.
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.trace
    }

    /// Set the message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add a detail entry
    ///
    /// `message` sets the message; `parent` and `tag` are ignored.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        if key == "message" {
            self.message = message_text(value);
        } else if !RESERVED_KEYS.contains(&key.as_str()) {
            self.details.insert(key, value);
        }
        self
    }

    /// Merge a loose argument object
    #[must_use]
    pub fn with_args(self, args: Map<String, Value>) -> Self {
        args.into_iter()
            .fold(self, |error, (key, value)| error.with_detail(key, value))
    }

    /// Attach a causal parent
    #[must_use]
    pub fn with_parent<E>(self, parent: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.with_cause(Arc::new(parent))
    }

    /// Attach an already shared causal parent
    #[must_use]
    pub fn with_cause(mut self, parent: DynError) -> Self {
        if let Some(trace) = adopted_trace(parent.as_ref()) {
            self.trace = trace;
        }
        self.parent = Some(parent);
        self
    }

    /// Serializable summary
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            tag: self.tag.to_string(),
            message: self.message.clone(),
            details: self.details.clone(),
            parent: self.parent.as_ref().map(|p| p.to_string()),
        }
    }
}

fn message_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn adopted_trace(parent: &(dyn StdError + Send + Sync + 'static)) -> Option<Arc<Backtrace>> {
    if let Some(tagged) = parent.downcast_ref::<TaggedError>() {
        return Some(Arc::clone(&tagged.trace));
    }
    match parent.downcast_ref::<Fault>() {
        Some(Fault::Tagged(tagged)) => Some(Arc::clone(&tagged.trace)),
        _ => None,
    }
}

impl fmt::Debug for TaggedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedError")
            .field("tag", &self.tag)
            .field("variant", &self.variant)
            .field("message", &self.message)
            .field("details", &self.details)
            .field("parent", &self.parent.as_ref().map(|p| p.to_string()))
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TaggedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.tag)
        } else {
            write!(f, "{}: {}", self.tag, self.message)
        }
    }
}

impl StdError for TaggedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.parent
            .as_deref()
            .map(|parent| parent as &(dyn StdError + 'static))
    }
}

/// Serializable view of a tagged error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Variant tag
    pub tag: String,
    /// Message
    pub message: String,
    /// Structured payload
    pub details: Map<String, Value>,
    /// Rendered causal parent
    pub parent: Option<String>,
}

/// Everything a unit of work can fail with
#[derive(Debug, Clone)]
pub enum Fault {
    /// An error built by a declared variant
    Tagged(TaggedError),
    /// Any other error
    Foreign(DynError),
}

impl Fault {
    /// Wrap an arbitrary error
    #[must_use]
    pub fn foreign<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Foreign(Arc::new(error))
    }

    /// Tag of a tagged fault
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.as_tagged().map(TaggedError::tag)
    }

    /// Borrow the tagged error
    #[must_use]
    pub fn as_tagged(&self) -> Option<&TaggedError> {
        match self {
            Self::Tagged(error) => Some(error),
            Self::Foreign(_) => None,
        }
    }

    /// Whether the fault came from outside any declared variant
    #[must_use]
    pub const fn is_foreign(&self) -> bool {
        matches!(self, Self::Foreign(_))
    }

    /// Whether the fault is an instance of the variant
    #[must_use]
    pub fn is_instance_of(&self, variant: &ErrorVariant) -> bool {
        variant.matches(self)
    }

    /// Whether both faults are the same underlying value
    #[must_use]
    pub fn same_as(&self, other: &Fault) -> bool {
        match (self, other) {
            (Self::Foreign(a), Self::Foreign(b)) => Arc::ptr_eq(a, b),
            (Self::Tagged(a), Self::Tagged(b)) => {
                a.variant == b.variant && a.message == b.message && Arc::ptr_eq(&a.trace, &b.trace)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tagged(error) => write!(f, "{}", error),
            Self::Foreign(error) => write!(f, "{}", error),
        }
    }
}

impl StdError for Fault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Tagged(error) => error.source(),
            Self::Foreign(error) => error.source(),
        }
    }
}

impl From<TaggedError> for Fault {
    fn from(error: TaggedError) -> Self {
        Self::Tagged(error)
    }
}

impl From<ContextError> for Fault {
    fn from(error: ContextError) -> Self {
        Self::foreign(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Upstream;

    impl fmt::Display for Upstream {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection reset")
        }
    }

    impl StdError for Upstream {}

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_variant_tag_is_fixed() {
        let itch = ErrorVariant::new("Itch");
        let a = itch.error();
        let b = itch.with_message("scratch");
        assert_eq!(a.tag(), "Itch");
        assert_eq!(b.tag(), "Itch");
        assert_eq!(a.variant(), itch.id());
        assert_eq!(b.variant(), itch.id());
    }

    #[test]
    fn test_args_cannot_override_tag() {
        let itch = ErrorVariant::new("Itch");
        let err = itch.from_args(args(json!({ "tag": "Other", "balance": 3 })));
        assert_eq!(err.tag(), "Itch");
        assert!(err.detail("tag").is_none());
        assert_eq!(err.detail("balance"), Some(&json!(3)));
    }

    #[test]
    fn test_reserved_keys_excluded_from_details() {
        let variant = ErrorVariant::new("FetchParseError");
        let err = variant.from_args(args(json!({
            "message": "Failed to parse JSON",
            "parent": "ignored",
            "status": 502,
        })));
        assert_eq!(err.message(), "Failed to parse JSON");
        assert_eq!(err.details().len(), 1);
        assert_eq!(err.detail("status"), Some(&json!(502)));
    }

    #[test]
    fn test_message_defaults_to_empty() {
        let err = ErrorVariant::new("Damn").error();
        assert_eq!(err.message(), "");
        assert_eq!(err.to_string(), "Damn");

        let err = err.with_message("oops");
        assert_eq!(err.to_string(), "Damn: oops");
    }

    #[test]
    fn test_non_string_message_rendered() {
        let err = ErrorVariant::new("Code").error().with_detail("message", 42);
        assert_eq!(err.message(), "42");
    }

    #[test]
    fn test_parent_is_source() {
        let err = ErrorVariant::new("FetchNetworkError")
            .with_message("Network request failed")
            .with_parent(Upstream);
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection reset"));
        assert!(err.parent().is_some());
    }

    #[test]
    fn test_tagged_parent_trace_adopted() {
        let inner = ErrorVariant::new("Inner").error();
        let outer = ErrorVariant::new("Outer").error().with_parent(inner.clone());
        assert!(Arc::ptr_eq(&inner.trace, &outer.trace));

        let wrapped = ErrorVariant::new("Wrapped")
            .error()
            .with_parent(Fault::from(inner.clone()));
        assert!(Arc::ptr_eq(&inner.trace, &wrapped.trace));

        let foreign = ErrorVariant::new("Foreign").error().with_parent(Upstream);
        assert!(!Arc::ptr_eq(&inner.trace, &foreign.trace));
    }

    #[test]
    fn test_distinct_variants_sharing_tag() {
        let a = ErrorVariant::new("Boom");
        let b = ErrorVariant::new("Boom");
        assert_ne!(a, b);

        let fault = Fault::from(a.error());
        assert!(fault.is_instance_of(&a));
        assert!(!fault.is_instance_of(&b));
        assert_eq!(fault.tag(), Some("Boom"));
    }

    #[test]
    fn test_has_tag() {
        assert!(ErrorVariant::new("Itch").has_tag());
        assert!(!ErrorVariant::new("").has_tag());
        assert!(!ErrorVariant::new("   ").has_tag());
    }

    #[test]
    fn test_foreign_fault_identity() {
        let fault = Fault::foreign(Upstream);
        let copy = fault.clone();
        assert!(fault.same_as(&copy));
        assert!(fault.is_foreign());
        assert!(fault.tag().is_none());
        assert!(!fault.same_as(&Fault::foreign(Upstream)));
    }

    #[test]
    fn test_context_error_into_fault() {
        let fault = Fault::from(ContextError::ReservedTag {
            tag: ANY_TAG.to_string(),
        });
        assert!(fault.is_foreign());
        assert!(fault.to_string().contains("reserved"));
    }

    #[test]
    fn test_report_serializes() {
        let err = ErrorVariant::new("Itch")
            .with_message("itchy")
            .with_detail("balance", 10);
        let json = serde_json::to_value(err.report()).unwrap();
        assert_eq!(json["tag"], "Itch");
        assert_eq!(json["message"], "itchy");
        assert_eq!(json["details"]["balance"], 10);
        assert!(json["parent"].is_null());
    }
}
