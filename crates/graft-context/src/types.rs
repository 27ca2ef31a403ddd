//! Type-level override context
//!
//! Provides [`TypeContext`], the layered `type -> allocator` map consulted
//! before an independent bean is constructed.

use crate::bean::TypeKey;
use std::fmt::{self, Debug, Formatter};

/// Layered map from bean type to allocator
///
/// Generic over the allocator so the context stays independent of the engine
/// that interprets it. The most recent layer wins on lookup.
#[derive(Clone)]
pub struct TypeContext<A> {
    allocators: im::HashMap<TypeKey, A>,
}

impl<A: Clone> TypeContext<A> {
    /// Create empty context
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocators: im::HashMap::new(),
        }
    }

    /// Layer `overrides` on top of this context
    #[must_use]
    pub fn merge(&self, overrides: impl IntoIterator<Item = (TypeKey, A)>) -> Self {
        let mut allocators = self.allocators.clone();
        allocators.extend(overrides);
        Self { allocators }
    }

    /// Allocator for `type_key`, most specific layer first
    #[inline]
    #[must_use]
    pub fn get(&self, type_key: &TypeKey) -> Option<&A> {
        self.allocators.get(type_key)
    }

    /// Check if an allocator is registered for `type_key`
    #[inline]
    #[must_use]
    pub fn contains(&self, type_key: &TypeKey) -> bool {
        self.allocators.contains_key(type_key)
    }

    /// Check if no allocator is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocators.is_empty()
    }
}

impl<A: Clone> Default for TypeContext<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Clone> Debug for TypeContext<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeContext")
            .field("allocators", &self.allocators.len())
            .finish_non_exhaustive()
    }
}
