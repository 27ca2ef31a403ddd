//! Allocation registry
//!
//! Folds the allocations of a list of blueprints into the four maps a chain
//! layer is extended with. Duplicate keys across blueprints and alias cycles
//! are fatal immediately.

use crate::allocation::{Allocation, Allocator, Blueprint};
use crate::error::{AllocationKind, InjectionError, Result};
use graft_context::{MappingContext, TypeKey};
use indexmap::map::Entry;
use indexmap::IndexMap;
use std::hash::Hash;
use std::sync::Arc;

/// Allocations of one sequence (or one extended injection point)
#[derive(Debug, Clone, Default)]
pub struct AllocationRegistry {
    types: IndexMap<TypeKey, Allocator>,
    singletons: IndexMap<String, Allocator>,
    properties: IndexMap<String, String>,
    aliases: MappingContext,
}

impl AllocationRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every blueprint in order and fold its allocations
    ///
    /// # Errors
    /// - `InjectionError::Blueprint` if a blueprint fails
    /// - `InjectionError::DuplicateAllocation` for a key allocated twice
    /// - `MappingError` for an alias that would close a cycle
    pub fn build(blueprints: &[Arc<dyn Blueprint>]) -> Result<Self> {
        let mut registry = Self::new();
        for blueprint in blueprints {
            let allocations = blueprint.allocations().map_err(InjectionError::Blueprint)?;
            for allocation in allocations {
                registry.add(allocation)?;
            }
        }
        tracing::debug!(
            blueprints = blueprints.len(),
            types = registry.types.len(),
            singletons = registry.singletons.len(),
            properties = registry.properties.len(),
            aliases = registry.aliases.len(),
            "allocation registry built"
        );
        Ok(registry)
    }

    /// Fold one allocation
    ///
    /// # Errors
    /// Same as [`Self::build`]
    pub fn add(&mut self, allocation: Allocation) -> Result<()> {
        match allocation {
            Allocation::Type {
                type_key,
                allocator,
            } => insert_unique(&mut self.types, type_key, allocator, AllocationKind::Type, |key| {
                key.name().to_string()
            }),
            Allocation::Singleton {
                qualifier,
                allocator,
            } => insert_unique(
                &mut self.singletons,
                qualifier,
                allocator,
                AllocationKind::Singleton,
                String::clone,
            ),
            Allocation::Property { key, value } => insert_unique(
                &mut self.properties,
                key,
                value,
                AllocationKind::Property,
                String::clone,
            ),
            Allocation::Alias { qualifier, target } => {
                if self.aliases.is_aliased(&qualifier) {
                    return Err(InjectionError::DuplicateAllocation {
                        kind: AllocationKind::Alias,
                        key: qualifier,
                    }
                    .into());
                }
                self.aliases.insert(qualifier, target)?;
                Ok(())
            }
        }
    }

    /// Type allocations in registration order
    pub fn types(&self) -> impl Iterator<Item = (&TypeKey, &Allocator)> {
        self.types.iter()
    }

    /// Singleton allocations in registration order
    pub fn singletons(&self) -> impl Iterator<Item = (&String, &Allocator)> {
        self.singletons.iter()
    }

    /// Property allocations in registration order
    pub fn properties(&self) -> impl Iterator<Item = (&String, &String)> {
        self.properties.iter()
    }

    /// Alias allocations
    #[inline]
    #[must_use]
    pub fn aliases(&self) -> &MappingContext {
        &self.aliases
    }

    /// Check if nothing is allocated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.singletons.is_empty()
            && self.properties.is_empty()
            && self.aliases.is_empty()
    }
}

fn insert_unique<K: Hash + Eq, V>(
    map: &mut IndexMap<K, V>,
    key: K,
    value: V,
    kind: AllocationKind,
    describe: impl Fn(&K) -> String,
) -> Result<()> {
    match map.entry(key) {
        Entry::Occupied(slot) => Err(InjectionError::DuplicateAllocation {
            kind,
            key: describe(slot.key()),
        }
        .into()),
        Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
    }
}
