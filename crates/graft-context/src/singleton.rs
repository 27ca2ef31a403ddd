//! Singleton pool context
//!
//! Provides [`SingletonContext`], the layered `qualifier -> instance` pool.
//! Unlike the other contexts the top layer is live: a build sequence keeps
//! registering singletons into it while it runs. Layers below the top are
//! never written through a child, and layers beyond an inheritance boundary
//! (a parent tree) are reported as allocated environment entries.

use crate::bean::{same_bean, Bean, TypeKey};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// A registered singleton
#[derive(Clone)]
pub struct SingletonEntry {
    /// The instance
    pub bean: Bean,
    /// Type the instance was registered as
    pub type_key: TypeKey,
    /// Supplied through an explicit allocation (or inherited) rather than built on demand
    pub is_allocated: bool,
    /// Supplied from outside the owning tree
    pub is_environment: bool,
}

impl SingletonEntry {
    /// Entry for an instance built on demand
    #[inline]
    #[must_use]
    pub fn on_demand(bean: Bean, type_key: TypeKey) -> Self {
        Self {
            bean,
            type_key,
            is_allocated: false,
            is_environment: false,
        }
    }

    /// Entry for an instance supplied by an allocation
    #[inline]
    #[must_use]
    pub fn allocated(bean: Bean, type_key: TypeKey) -> Self {
        Self {
            bean,
            type_key,
            is_allocated: true,
            is_environment: false,
        }
    }

    /// Entry for an instance handed in from a parent tree
    #[inline]
    #[must_use]
    pub fn environment(bean: Bean, type_key: TypeKey) -> Self {
        Self {
            bean,
            type_key,
            is_allocated: true,
            is_environment: true,
        }
    }

    /// Check if `bean` is this entry's instance
    #[inline]
    #[must_use]
    pub fn is(&self, bean: &Bean) -> bool {
        same_bean(&self.bean, bean)
    }
}

impl Debug for SingletonEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonEntry")
            .field("type_key", &self.type_key)
            .field("is_allocated", &self.is_allocated)
            .field("is_environment", &self.is_environment)
            .finish_non_exhaustive()
    }
}

struct Pool {
    entries: RwLock<IndexMap<String, SingletonEntry>>,
    parent: Option<Arc<Pool>>,
    /// Entries of `parent` and above belong to another tree
    inherits: bool,
}

impl Pool {
    fn new(parent: Option<Arc<Pool>>, inherits: bool) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            parent,
            inherits,
        }
    }
}

/// Layered singleton pool with a live top layer
///
/// Cloning shares the same layers, including the live one.
#[derive(Clone)]
pub struct SingletonContext {
    pool: Arc<Pool>,
}

impl SingletonContext {
    /// Create empty root pool
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: Arc::new(Pool::new(None, false)),
        }
    }

    /// New live layer on top of this one, within the same tree
    #[inline]
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            pool: Arc::new(Pool::new(Some(Arc::clone(&self.pool)), false)),
        }
    }

    /// New live layer for a child tree
    ///
    /// Everything visible through `self` is reported as allocated environment
    /// from the returned context.
    #[inline]
    #[must_use]
    pub fn inherit(&self) -> Self {
        Self {
            pool: Arc::new(Pool::new(Some(Arc::clone(&self.pool)), true)),
        }
    }

    /// New live layer holding `overrides`, leaving `self` untouched
    #[must_use]
    pub fn merge(&self, overrides: impl IntoIterator<Item = (String, SingletonEntry)>) -> Self {
        let child = self.child();
        child.pool.entries.write().extend(overrides);
        child
    }

    /// Look up `qualifier`, most specific layer first
    #[must_use]
    pub fn get(&self, qualifier: &str) -> Option<SingletonEntry> {
        let mut crossed = false;
        let mut pool = Some(&self.pool);
        while let Some(current) = pool {
            if let Some(entry) = current.entries.read().get(qualifier) {
                let mut entry = entry.clone();
                if crossed {
                    entry.is_allocated = true;
                    entry.is_environment = true;
                }
                return Some(entry);
            }
            crossed |= current.inherits;
            pool = current.parent.as_ref();
        }
        None
    }

    /// Look up `qualifier`, optionally ignoring on-demand entries
    #[inline]
    #[must_use]
    pub fn get_if(&self, qualifier: &str, allocated_only: bool) -> Option<SingletonEntry> {
        self.get(qualifier)
            .filter(|entry| !allocated_only || entry.is_allocated)
    }

    /// Check if `qualifier` is visible
    #[inline]
    #[must_use]
    pub fn contains(&self, qualifier: &str) -> bool {
        self.get(qualifier).is_some()
    }

    /// Register into the live layer
    ///
    /// Returns `false` (and keeps the existing entry) if `qualifier` is
    /// already visible from this context.
    pub fn register(&self, qualifier: impl Into<String>, entry: SingletonEntry) -> bool {
        let qualifier = qualifier.into();
        if self.contains(&qualifier) {
            return false;
        }
        tracing::trace!(qualifier = %qualifier, type_key = %entry.type_key, "singleton registered");
        self.pool.entries.write().insert(qualifier, entry);
        true
    }

    /// All visible entries, outermost layer first, registration order within a layer
    ///
    /// Shadowed entries are omitted; inherited entries carry the environment flag.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, SingletonEntry)> {
        let mut layers = Vec::new();
        let mut crossed = false;
        let mut pool = Some(&self.pool);
        while let Some(current) = pool {
            layers.push((Arc::clone(current), crossed));
            crossed |= current.inherits;
            pool = current.parent.as_ref();
        }

        let mut visible: IndexMap<String, SingletonEntry> = IndexMap::new();
        for (layer, inherited) in layers.into_iter().rev() {
            for (qualifier, entry) in layer.entries.read().iter() {
                let mut entry = entry.clone();
                if inherited {
                    entry.is_allocated = true;
                    entry.is_environment = true;
                }
                visible.shift_remove(qualifier);
                visible.insert(qualifier.clone(), entry);
            }
        }
        visible.into_iter().collect()
    }

    /// Number of entries in the live layer
    #[inline]
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.pool.entries.read().len()
    }
}

impl Default for SingletonContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SingletonContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonContext")
            .field("local", &self.local_len())
            .finish_non_exhaustive()
    }
}
