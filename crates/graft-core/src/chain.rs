//! Injection chain
//!
//! [`ChainLayer`] is the immutable part of the chain: the four context layers
//! and the dependency classification at one injection point. Extending a
//! layer never mutates its parent, so a sibling branch keeps seeing exactly
//! what it saw before.
//!
//! [`SequenceState`] is the mutable part, owned by one build sequence: the
//! live singleton pool, the constructor stack and the deferred queues.

use crate::allocation::Allocator;
use crate::descriptor::Descriptor;
use crate::error::{InjectionError, Result};
use crate::lifecycle::{Destroyable, PostProcessor};
use crate::registry::AllocationRegistry;
use graft_context::{
    Bean, MappingContext, ResolvingContext, SingletonContext, SingletonEntry, TypeContext,
    TypeKey,
};
use graft_plugin::PluginNamespace;
use indexmap::IndexSet;
use std::collections::VecDeque;
use std::sync::Arc;

/// How long whatever is being built must live
///
/// Escalates monotonically along a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub(crate) enum DependencyContext {
    /// An independent bean
    #[default]
    Independent,
    /// A singleton of the current sequence
    Sequence,
    /// A singleton committed to the injector's pool
    Global,
}

/// Context layers at one injection point
#[derive(Debug, Clone, Default)]
pub(crate) struct ChainLayer {
    pub(crate) resolving: ResolvingContext,
    pub(crate) mapping: MappingContext,
    pub(crate) types: TypeContext<Allocator>,
    pub(crate) qualifiers: im::HashMap<String, Allocator>,
    pub(crate) dependency: DependencyContext,
}

impl ChainLayer {
    /// New layer with every allocation of `registry` on top
    pub(crate) fn extend(&self, registry: &AllocationRegistry) -> Result<Self> {
        if registry.is_empty() {
            return Ok(self.clone());
        }
        let mut qualifiers = self.qualifiers.clone();
        qualifiers.extend(registry.singletons().map(|(q, a)| (q.clone(), a.clone())));
        Ok(Self {
            resolving: self
                .resolving
                .merge(registry.properties().map(|(k, v)| (k.clone(), v.clone()))),
            mapping: self.mapping.merge_context(registry.aliases())?,
            types: self
                .types
                .merge(registry.types().map(|(k, a)| (*k, a.clone()))),
            qualifiers,
            dependency: self.dependency,
        })
    }

    /// Same layer, building something that lives at least as long as `dependency`
    pub(crate) fn escalate(&self, dependency: DependencyContext) -> Self {
        Self {
            dependency: self.dependency.max(dependency),
            ..self.clone()
        }
    }

    /// Same layers for a fresh tree root
    pub(crate) fn detached(&self) -> Self {
        Self {
            dependency: DependencyContext::Independent,
            ..self.clone()
        }
    }
}

/// Aggregate fields of one bean, waiting for the pool to settle
pub(crate) struct AggregateTask {
    pub(crate) bean: Bean,
    pub(crate) descriptor: Arc<Descriptor>,
    pub(crate) layer: ChainLayer,
}

/// Post-construct processors of one bean
pub(crate) struct PostConstructTask {
    pub(crate) bean: Bean,
    pub(crate) type_key: TypeKey,
    pub(crate) processors: Vec<PostProcessor>,
    pub(crate) layer: ChainLayer,
}

/// Global singleton to commit once the sequence succeeds
pub(crate) struct Activation {
    pub(crate) qualifier: String,
    pub(crate) entry: SingletonEntry,
}

/// Mutable state of one build sequence
pub(crate) struct SequenceState {
    pub(crate) singletons: SingletonContext,
    constructing: IndexSet<TypeKey>,
    allocating: IndexSet<String>,
    pub(crate) aggregates: VecDeque<AggregateTask>,
    pub(crate) post_constructs: Vec<PostConstructTask>,
    pub(crate) activations: VecDeque<Activation>,
    pub(crate) destroyables: Vec<Destroyable>,
    /// Plugin namespaces beans of this sequence were built from
    pub(crate) namespaces: Vec<Arc<dyn PluginNamespace<Arc<Descriptor>>>>,
}

impl SequenceState {
    pub(crate) fn new(singletons: SingletonContext) -> Self {
        Self {
            singletons,
            constructing: IndexSet::new(),
            allocating: IndexSet::new(),
            aggregates: VecDeque::new(),
            post_constructs: Vec::new(),
            activations: VecDeque::new(),
            destroyables: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    /// Push `type_key` on the constructor stack
    ///
    /// # Errors
    /// `InjectionError::Cycle` if it is already being constructed
    pub(crate) fn enter(&mut self, type_key: TypeKey) -> std::result::Result<(), InjectionError> {
        if self.constructing.contains(&type_key) {
            return Err(InjectionError::cycle(&self.constructing, type_key));
        }
        self.constructing.insert(type_key);
        Ok(())
    }

    /// Pop `type_key` off the constructor stack
    pub(crate) fn leave(&mut self, type_key: TypeKey) {
        self.constructing.shift_remove(&type_key);
    }

    /// Mark the singleton allocation of `qualifier` as in progress
    ///
    /// # Errors
    /// `InjectionError::AllocationCycle` if its allocator is already running
    pub(crate) fn enter_qualifier(
        &mut self,
        qualifier: &str,
    ) -> std::result::Result<(), InjectionError> {
        if self.allocating.contains(qualifier) {
            return Err(InjectionError::qualifier_cycle(&self.allocating, qualifier));
        }
        self.allocating.insert(qualifier.to_string());
        Ok(())
    }

    /// Mark the singleton allocation of `qualifier` as finished
    pub(crate) fn leave_qualifier(&mut self, qualifier: &str) {
        self.allocating.shift_remove(qualifier);
    }

    /// Check if every deferred queue is empty
    pub(crate) fn is_settled(&self) -> bool {
        self.aggregates.is_empty() && self.post_constructs.is_empty() && self.activations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::Allocation;
    use crate::error::Error;
    use graft_context::MappingError;

    struct A;
    struct B;

    #[test]
    fn dependency_escalates_monotonically() {
        let layer = ChainLayer::default().escalate(DependencyContext::Global);
        assert_eq!(
            layer.escalate(DependencyContext::Sequence).dependency,
            DependencyContext::Global
        );
        assert_eq!(layer.detached().dependency, DependencyContext::Independent);
    }

    #[test]
    fn extend_leaves_parent_untouched() {
        let mut registry = AllocationRegistry::new();
        registry.add(Allocation::property("mode", "prod")).unwrap();
        registry.add(Allocation::alias("main", "db")).unwrap();
        let parent = ChainLayer::default().extend(&registry).unwrap();

        let mut overrides = AllocationRegistry::new();
        overrides.add(Allocation::property("mode", "test")).unwrap();
        overrides
            .add(Allocation::singleton("db", Allocator::instance(1_u8)))
            .unwrap();
        let child = parent.extend(&overrides).unwrap();

        assert_eq!(parent.resolving.get("mode"), Some("prod"));
        assert_eq!(child.resolving.get("mode"), Some("test"));
        assert_eq!(child.mapping.resolve("main"), "db");
        assert!(child.qualifiers.get("db").is_some());
        assert!(parent.qualifiers.get("db").is_none());
    }

    #[test]
    fn extension_cannot_close_alias_cycle() {
        let mut registry = AllocationRegistry::new();
        registry.add(Allocation::alias("a", "b")).unwrap();
        let parent = ChainLayer::default().extend(&registry).unwrap();

        let mut closing = AllocationRegistry::new();
        closing.add(Allocation::alias("b", "a")).unwrap();
        let err = parent.extend(&closing).unwrap_err();
        assert!(matches!(err, Error::Mapping(MappingError::Cycle { .. })));
    }

    #[test]
    fn constructor_stack_detects_reentry() {
        let mut state = SequenceState::new(SingletonContext::new());
        state.enter(TypeKey::of::<A>()).unwrap();
        state.enter(TypeKey::of::<B>()).unwrap();

        let err = state.enter(TypeKey::of::<A>()).unwrap_err();
        assert_eq!(err.to_string(), "constructor cycle: A -> B -> A");

        state.leave(TypeKey::of::<B>());
        state.leave(TypeKey::of::<A>());
        assert!(state.enter(TypeKey::of::<A>()).is_ok());
        assert!(state.is_settled());
    }

    #[test]
    fn allocation_stack_detects_reentry() {
        let mut state = SequenceState::new(SingletonContext::new());
        state.enter_qualifier("db").unwrap();
        state.enter_qualifier("pool").unwrap();

        let err = state.enter_qualifier("pool").unwrap_err();
        assert_eq!(err.to_string(), "singleton allocation cycle: 'pool' -> 'pool'");

        state.leave_qualifier("pool");
        state.leave_qualifier("db");
        assert!(state.enter_qualifier("db").is_ok());
    }

    #[test]
    fn overlay_may_override_parent_alias() {
        let mut registry = AllocationRegistry::new();
        registry.add(Allocation::alias("a", "b")).unwrap();
        let parent = ChainLayer::default().extend(&registry).unwrap();

        let mut overrides = AllocationRegistry::new();
        overrides.add(Allocation::alias("b", "a")).unwrap();
        overrides.add(Allocation::alias("a", "c")).unwrap();
        let child = parent.extend(&overrides).unwrap();

        assert_eq!(child.mapping.resolve("b"), "c");
        assert_eq!(parent.mapping.resolve("a"), "b");
    }
}
