//! Closed, ordered maps from tag to error variant.

use crate::error::{ContextError, ContextResult};
use crate::tagged::{ErrorVariant, TaggedError, ANY_TAG};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What to do when two distinct variants claim the same tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Fail the declaration or merge
    #[default]
    Reject,
    /// The later variant replaces the earlier one
    LastWins,
}

/// Tag-keyed error variants in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMap {
    variants: IndexMap<String, ErrorVariant>,
}

impl ErrorMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from variants in order
    ///
    /// # Errors
    ///
    /// Returns error if a variant has no tag, uses the reserved fallback
    /// tag, or collides under [`CollisionPolicy::Reject`]
    pub fn from_variants<I>(variants: I, policy: CollisionPolicy) -> ContextResult<Self>
    where
        I: IntoIterator<Item = ErrorVariant>,
    {
        let mut map = Self::new();
        for variant in variants {
            map.insert(variant, policy)?;
        }
        Ok(map)
    }

    /// Register a variant under its tag
    ///
    /// Registering the same variant twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the variant has no tag, uses the reserved fallback
    /// tag, or collides under [`CollisionPolicy::Reject`]
    pub fn insert(&mut self, variant: ErrorVariant, policy: CollisionPolicy) -> ContextResult<()> {
        if !variant.has_tag() {
            return Err(ContextError::MissingTag {
                variant: variant.id(),
            });
        }
        if variant.tag() == ANY_TAG {
            return Err(ContextError::ReservedTag {
                tag: ANY_TAG.to_string(),
            });
        }

        if let Some(existing) = self.variants.get(variant.tag()) {
            if existing.id() == variant.id() {
                return Ok(());
            }
            match policy {
                CollisionPolicy::Reject => {
                    return Err(ContextError::TagCollision {
                        tag: variant.tag().to_string(),
                        existing: existing.id(),
                        incoming: variant.id(),
                    });
                }
                CollisionPolicy::LastWins => {
                    warn!(
                        tag = variant.tag(),
                        existing = %existing.id(),
                        incoming = %variant.id(),
                        "error tag shadowed"
                    );
                }
            }
        }

        self.variants.insert(variant.tag().to_string(), variant);
        Ok(())
    }

    /// Fold another map into this one
    ///
    /// # Errors
    ///
    /// Returns error on a collision under [`CollisionPolicy::Reject`]
    pub fn extend_from(&mut self, other: &ErrorMap, policy: CollisionPolicy) -> ContextResult<()> {
        for variant in other.variants.values() {
            self.insert(variant.clone(), policy)?;
        }
        Ok(())
    }

    /// Look up a variant by tag
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&ErrorVariant> {
        self.variants.get(tag)
    }

    /// Check if a tag is registered
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.variants.contains_key(tag)
    }

    /// Find the registered variant that produced an error
    #[must_use]
    pub fn find_instance(&self, error: &TaggedError) -> Option<&ErrorVariant> {
        self.variants
            .values()
            .find(|variant| variant.is_instance(error))
    }

    /// Tags in declaration order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    /// Variants in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &ErrorVariant> {
        self.variants.values()
    }

    /// Number of registered variants
    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_insert_and_lookup() {
        let itch = ErrorVariant::new("Itch");
        let damn = ErrorVariant::new("Damn");
        let map = ErrorMap::from_variants([itch.clone(), damn.clone()], CollisionPolicy::Reject)
            .unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("Itch"), Some(&itch));
        assert!(map.contains("Damn"));
        assert!(!map.contains("Other"));
        assert_eq!(map.tags().collect::<Vec<_>>(), vec!["Itch", "Damn"]);
    }

    #[test]
    fn test_missing_tag_rejected() {
        let blank = ErrorVariant::new("");
        let result = ErrorMap::from_variants([blank.clone()], CollisionPolicy::Reject);
        assert_eq!(
            result,
            Err(ContextError::MissingTag {
                variant: blank.id()
            })
        );
    }

    #[test]
    fn test_reserved_tag_rejected() {
        let result =
            ErrorMap::from_variants([ErrorVariant::new(ANY_TAG)], CollisionPolicy::LastWins);
        assert!(matches!(result, Err(ContextError::ReservedTag { .. })));
    }

    #[test]
    fn test_same_variant_twice_is_noop() {
        let itch = ErrorVariant::new("Itch");
        let map = ErrorMap::from_variants([itch.clone(), itch], CollisionPolicy::Reject).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_collision_rejected() {
        let a = ErrorVariant::new("Boom");
        let b = ErrorVariant::new("Boom");
        let result = ErrorMap::from_variants([a.clone(), b.clone()], CollisionPolicy::Reject);
        assert_eq!(
            result,
            Err(ContextError::TagCollision {
                tag: "Boom".to_string(),
                existing: a.id(),
                incoming: b.id(),
            })
        );
    }

    #[test]
    fn test_collision_last_wins() {
        let a = ErrorVariant::new("Boom");
        let b = ErrorVariant::new("Boom");
        let map = ErrorMap::from_variants([a, b.clone()], CollisionPolicy::LastWins).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Boom"), Some(&b));
    }

    #[test]
    fn test_find_instance_uses_identity() {
        let registered = ErrorVariant::new("Boom");
        let impostor = ErrorVariant::new("Boom");
        let map = ErrorMap::from_variants([registered.clone()], CollisionPolicy::Reject).unwrap();

        assert_eq!(map.find_instance(&registered.error()), Some(&registered));
        assert!(map.find_instance(&impostor.error()).is_none());
    }

    #[test]
    fn test_extend_from() {
        let shared = ErrorVariant::new("Shared");
        let mut left = ErrorMap::from_variants(
            [shared.clone(), ErrorVariant::new("Left")],
            CollisionPolicy::Reject,
        )
        .unwrap();
        let right =
            ErrorMap::from_variants([shared, ErrorVariant::new("Right")], CollisionPolicy::Reject)
                .unwrap();

        left.extend_from(&right, CollisionPolicy::Reject).unwrap();
        assert_eq!(left.tags().collect::<Vec<_>>(), vec!["Shared", "Left", "Right"]);
    }

    proptest::proptest! {
        #[test]
        fn prop_distinct_tags_preserve_order(
            tags in proptest::collection::btree_set("[A-Z][a-z]{1,8}", 0..12)
        ) {
            let tags: Vec<String> = tags.into_iter().filter(|t| t != ANY_TAG).collect();
            let variants: Vec<ErrorVariant> = tags.iter().map(ErrorVariant::new).collect();
            let map = ErrorMap::from_variants(variants.clone(), CollisionPolicy::Reject).unwrap();

            prop_assert_eq!(map.len(), variants.len());
            let listed: Vec<&str> = map.tags().collect();
            let expected: Vec<&str> = tags.iter().map(String::as_str).collect();
            prop_assert_eq!(listed, expected);
            for variant in &variants {
                prop_assert_eq!(map.find_instance(&variant.error()), Some(variant));
            }
        }

        #[test]
        fn prop_fresh_variant_with_taken_tag_collides(tag in "[A-Z][a-z]{1,8}") {
            prop_assume!(tag != ANY_TAG);
            let mut map = ErrorMap::new();
            map.insert(ErrorVariant::new(tag.clone()), CollisionPolicy::Reject).unwrap();
            let collision = map.insert(ErrorVariant::new(tag), CollisionPolicy::Reject);
            let is_collision = matches!(collision, Err(ContextError::TagCollision { .. }));
            prop_assert!(is_collision);
            prop_assert_eq!(map.len(), 1);
        }
    }
}
