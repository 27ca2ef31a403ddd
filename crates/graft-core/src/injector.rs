//! Injector
//!
//! An [`Injector`] owns a singleton pool and a base chain layer, and drives
//! build sequences on them. Injectors spawned from it (by requesting
//! `Injector` as a dependency) form one tree: they share the tree lock, the
//! descriptor registry, the plugin cache and the configuration.
//!
//! # Example
//!
//! ```rust
//! use graft_core::{Descriptor, Injector, Param, ResolvingSettings};
//!
//! struct Server {
//!     port: u16,
//! }
//!
//! let injector = Injector::builder().property("server.port", "9000").build().unwrap();
//! injector
//!     .descriptors()
//!     .describe(
//!         Descriptor::builder::<Server>()
//!             .param(Param::resolvable("port", ResolvingSettings::new("server.port")))
//!             .constructor(|args| Ok(Server { port: args.require(0)? })),
//!     )
//!     .unwrap();
//!
//! let server = injector.instantiate::<Server>().unwrap();
//! assert_eq!(server.port, 9000);
//! ```

use crate::allocation::{Allocation, Blueprint};
use crate::chain::{ChainLayer, SequenceState};
use crate::config::InjectorConfig;
use crate::descriptor::{Descriptor, DescriptorRegistry};
use crate::error::{Error, InjectionError, ProcessorError, Result};
use crate::lifecycle::{teardown, Destroyable};
use crate::lock::{TreeLock, TreeToken};
use crate::registry::AllocationRegistry;
use crate::settings::InjectionSettings;
use graft_context::{bean, downcast, Bean, SingletonContext, SingletonEntry, TypeKey};
use graft_plugin::{ManifestLoader, PluginCache, PluginLoader, PluginNamespace};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// State shared by every injector of one tree
pub(crate) struct Tree {
    pub(crate) lock: TreeLock,
    pub(crate) descriptors: Arc<DescriptorRegistry>,
    pub(crate) plugins: PluginCache<Arc<Descriptor>>,
    pub(crate) config: InjectorConfig,
}

/// Teardown processors recorded by one successful sequence
struct Record {
    /// Root the sequence returned; `None` for global singletons
    root: Option<Bean>,
    destroyables: Vec<Destroyable>,
}

/// Builds object graphs and owns what it built
pub struct Injector {
    pub(crate) tree: Arc<Tree>,
    pub(crate) pool: SingletonContext,
    base: ChainLayer,
    records: Mutex<Vec<Record>>,
    /// Keeps cached plugin namespaces alive while beans built from them may be in use
    namespaces: Mutex<Vec<Arc<dyn PluginNamespace<Arc<Descriptor>>>>>,
}

impl Injector {
    /// Start configuring a root injector
    #[inline]
    #[must_use]
    pub fn builder() -> InjectorBuilder {
        InjectorBuilder::new()
    }

    pub(crate) fn from_parts(tree: Arc<Tree>, pool: SingletonContext, base: ChainLayer) -> Self {
        Self {
            tree,
            pool,
            base,
            records: Mutex::new(Vec::new()),
            namespaces: Mutex::new(Vec::new()),
        }
    }

    /// Token of this injector's tree
    #[inline]
    #[must_use]
    pub fn tree_token(&self) -> TreeToken {
        self.tree.lock.token()
    }

    /// Tree configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &InjectorConfig {
        &self.tree.config
    }

    /// Descriptor registry of the tree
    #[inline]
    #[must_use]
    pub fn descriptors(&self) -> &Arc<DescriptorRegistry> {
        &self.tree.descriptors
    }

    /// Plugin cache of the tree
    #[inline]
    #[must_use]
    pub fn plugins(&self) -> &PluginCache<Arc<Descriptor>> {
        &self.tree.plugins
    }

    /// Singleton visible from this injector's pool
    ///
    /// Sees global singletons of this injector and whatever it inherited.
    #[must_use]
    pub fn singleton(&self, qualifier: &str) -> Option<SingletonEntry> {
        self.pool.get(qualifier)
    }

    /// Child injector of the same tree inheriting this injector's pool and base layer
    #[must_use]
    pub fn spawn(&self) -> Self {
        Self::from_parts(
            Arc::clone(&self.tree),
            self.pool.inherit(),
            self.base.detached(),
        )
    }

    /// Build an independent `T` in the configured default mode
    ///
    /// # Errors
    /// Any error of the sequence; `InjectionError::Unresolved` if nothing was built
    pub fn instantiate<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.instantiate_with(&[])
    }

    /// Build an independent `T` with extra allocations for this sequence
    ///
    /// # Errors
    /// Same as [`Self::instantiate`]
    pub fn instantiate_with<T: Any + Send + Sync>(
        &self,
        blueprints: &[Arc<dyn Blueprint>],
    ) -> Result<Arc<T>> {
        let target = InjectionSettings::of::<T>().with_mode(self.tree.config.default_mode);
        let root = self.instantiate_target(&target, blueprints)?;
        require(root, target.type_key)
    }

    /// Build (or fetch) the `T` singleton under `qualifier`
    ///
    /// # Errors
    /// Same as [`Self::instantiate`]
    pub fn instantiate_qualified<T: Any + Send + Sync>(
        &self,
        qualifier: impl Into<String>,
        blueprints: &[Arc<dyn Blueprint>],
    ) -> Result<Arc<T>> {
        let target =
            InjectionSettings::qualified::<T>(qualifier).with_mode(self.tree.config.default_mode);
        let root = self.instantiate_target(&target, blueprints)?;
        require(root, target.type_key)
    }

    /// Run one build sequence for `target`
    ///
    /// Holds the tree lock for the whole sequence. On failure everything the
    /// sequence registered for teardown is torn down before the error is
    /// returned, and no global singleton of the sequence is committed.
    ///
    /// # Errors
    /// - `InjectionError::SequenceActive` if called from inside a sequence on this tree
    /// - registry errors for the sequence blueprints
    /// - any resolution, construction, processor or aggregation error
    /// - `ProcessorError::Teardown` if the teardown after a failure failed too
    pub fn instantiate_target(
        &self,
        target: &InjectionSettings,
        blueprints: &[Arc<dyn Blueprint>],
    ) -> Result<Option<Bean>> {
        let _guard = self.tree.lock.acquire()?;

        let registry = AllocationRegistry::build(blueprints)?;
        for (qualifier, allocator) in registry.singletons() {
            if let Some(entry) = self.pool.get(qualifier) {
                tracing::warn!(
                    qualifier = %qualifier,
                    allocator = allocator.kind(),
                    inherited = entry.is_environment,
                    "singleton allocation ignored, qualifier already bound"
                );
            }
        }
        let layer = self.base.extend(&registry)?;
        let mut state = SequenceState::new(self.pool.child());

        tracing::debug!(
            tree = %self.tree_token(),
            target = %target.type_key,
            qualifier = target.qualifier.as_deref(),
            "sequence started"
        );
        let outcome = self
            .resolve(&mut state, &layer, target)
            .and_then(|root| self.drain(&mut state).map(|()| root));

        match outcome {
            Ok(root) => {
                debug_assert!(state.is_settled());
                let destroyables = std::mem::take(&mut state.destroyables);
                tracing::debug!(
                    target = %target.type_key,
                    singletons = state.singletons.local_len(),
                    destroyables = destroyables.len(),
                    "sequence finished"
                );
                self.record(root.as_ref(), destroyables);
                self.retain(std::mem::take(&mut state.namespaces));
                Ok(root)
            }
            Err(error) => Err(Self::abort(&state, error)),
        }
    }

    fn record(&self, root: Option<&Bean>, destroyables: Vec<Destroyable>) {
        let (global, scoped): (Vec<_>, Vec<_>) =
            destroyables.into_iter().partition(|destroyable| destroyable.global);
        let mut records = self.records.lock();
        if !global.is_empty() {
            records.push(Record {
                root: None,
                destroyables: global,
            });
        }
        if !scoped.is_empty() {
            records.push(Record {
                root: root.cloned(),
                destroyables: scoped,
            });
        }
    }

    fn retain(&self, loaded: Vec<Arc<dyn PluginNamespace<Arc<Descriptor>>>>) {
        if loaded.is_empty() {
            return;
        }
        let mut namespaces = self.namespaces.lock();
        for namespace in loaded {
            if !namespaces.iter().any(|held| Arc::ptr_eq(held, &namespace)) {
                namespaces.push(namespace);
            }
        }
    }

    fn abort(state: &SequenceState, error: Error) -> Error {
        tracing::debug!(%error, destroyables = state.destroyables.len(), "sequence failed, tearing down");
        match teardown(&state.destroyables) {
            0 => error,
            failures => ProcessorError::Teardown {
                failures,
                cause: Box::new(error),
            }
            .into(),
        }
    }

    /// Tear down the sequence that returned `root`
    ///
    /// Returns `false` if `root` is not the root of a sequence of this
    /// injector (or was already destroyed).
    ///
    /// # Errors
    /// - `InjectionError::SequenceActive` if called from inside a sequence on this tree
    /// - `ProcessorError::DestroyFailed` if any destroy processor failed
    pub fn destroy<T: ?Sized>(&self, root: &Arc<T>) -> Result<bool> {
        let _guard = self.tree.lock.acquire()?;
        let target = Arc::as_ptr(root).cast::<()>();
        let record = {
            let mut records = self.records.lock();
            let position = records.iter().position(|record| {
                record
                    .root
                    .as_ref()
                    .is_some_and(|bean| Arc::as_ptr(bean).cast::<()>() == target)
            });
            match position {
                Some(index) => records.remove(index),
                None => return Ok(false),
            }
        };
        match teardown(&record.destroyables) {
            0 => Ok(true),
            failures => Err(ProcessorError::DestroyFailed { failures }.into()),
        }
    }

    /// Tear down everything this injector built, global singletons included
    ///
    /// Also releases the plugin namespaces the injector kept loaded.
    ///
    /// # Errors
    /// Same as [`Self::destroy`]
    pub fn destroy_all(&self) -> Result<()> {
        let _guard = self.tree.lock.acquire()?;
        let records = std::mem::take(&mut *self.records.lock());
        self.namespaces.lock().clear();
        let destroyables: Vec<Destroyable> = records
            .into_iter()
            .flat_map(|record| record.destroyables)
            .collect();
        match teardown(&destroyables) {
            0 => Ok(()),
            failures => Err(ProcessorError::DestroyFailed { failures }.into()),
        }
    }
}

/// Typed view of a resolved root
pub(crate) fn require<T: Any + Send + Sync>(resolved: Option<Bean>, type_key: TypeKey) -> Result<Arc<T>> {
    let resolved = resolved.ok_or(InjectionError::Unresolved(type_key))?;
    downcast::<T>(&resolved).ok_or_else(|| {
        InjectionError::NotAssignable {
            from: type_key,
            to: TypeKey::of::<T>(),
        }
        .into()
    })
}

impl Drop for Injector {
    fn drop(&mut self) {
        if !self.tree.config.destroy_on_drop || self.records.get_mut().is_empty() {
            return;
        }
        if self.tree.lock.is_held_here() {
            tracing::warn!(
                tree = %self.tree_token(),
                "injector dropped inside a sequence, teardown skipped"
            );
            return;
        }
        if let Err(error) = self.destroy_all() {
            tracing::warn!(tree = %self.tree_token(), %error, "teardown on drop failed");
        }
    }
}

impl Debug for Injector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("tree", &self.tree_token())
            .field("pool", &self.pool)
            .field("records", &self.records.lock().len())
            .field("namespaces", &self.namespaces.lock().len())
            .finish_non_exhaustive()
    }
}

/// Builder for a root [`Injector`]
pub struct InjectorBuilder {
    config: InjectorConfig,
    descriptors: Option<Arc<DescriptorRegistry>>,
    loader: Option<Arc<dyn PluginLoader<Arc<Descriptor>>>>,
    blueprints: Vec<Arc<dyn Blueprint>>,
    allocations: Vec<Allocation>,
    environment: Vec<(String, SingletonEntry)>,
}

impl InjectorBuilder {
    fn new() -> Self {
        Self {
            config: InjectorConfig::default(),
            descriptors: None,
            loader: None,
            blueprints: Vec::new(),
            allocations: Vec::new(),
            environment: Vec::new(),
        }
    }

    /// With configuration
    #[inline]
    #[must_use]
    pub fn config(mut self, config: InjectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing descriptor registry
    #[inline]
    #[must_use]
    pub fn descriptors(mut self, descriptors: Arc<DescriptorRegistry>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    /// With plugin loader; defaults to an empty [`ManifestLoader`]
    #[inline]
    #[must_use]
    pub fn plugin_loader(mut self, loader: Arc<dyn PluginLoader<Arc<Descriptor>>>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Add a blueprint every sequence of the injector sees
    #[must_use]
    pub fn blueprint(mut self, blueprint: impl Blueprint + 'static) -> Self {
        self.blueprints.push(Arc::new(blueprint));
        self
    }

    /// Add a base allocation
    #[must_use]
    pub fn allocation(mut self, allocation: Allocation) -> Self {
        self.allocations.push(allocation);
        self
    }

    /// Add a base property
    #[must_use]
    pub fn property(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.allocation(Allocation::property(key, value))
    }

    /// Hand in a singleton from outside the tree
    ///
    /// Environment singletons are visible to every sequence but never
    /// aggregated and never replaced.
    #[must_use]
    pub fn environment<T: Any + Send + Sync>(mut self, qualifier: impl Into<String>, value: T) -> Self {
        self.environment.push((
            qualifier.into(),
            SingletonEntry::environment(bean(value), TypeKey::of::<T>()),
        ));
        self
    }

    /// Validate and build
    ///
    /// # Errors
    /// - `ConfigError::Invalid` for an invalid configuration
    /// - registry errors for the base blueprints and allocations
    pub fn build(self) -> Result<Injector> {
        self.config.validate()?;

        let mut blueprints = self.blueprints;
        if !self.allocations.is_empty() {
            blueprints.push(Arc::new(self.allocations));
        }
        let registry = AllocationRegistry::build(&blueprints)?;
        let base = ChainLayer::default().extend(&registry)?;

        let pool = if self.environment.is_empty() {
            SingletonContext::new()
        } else {
            SingletonContext::new().merge(self.environment).inherit()
        };

        let loader: Arc<dyn PluginLoader<Arc<Descriptor>>> = match self.loader {
            Some(loader) => loader,
            None => Arc::new(ManifestLoader::new()),
        };
        let tree = Tree {
            lock: TreeLock::new(),
            descriptors: self.descriptors.unwrap_or_default(),
            plugins: PluginCache::with_extension(loader, self.config.plugin.artifact_extension.clone()),
            config: self.config,
        };
        tracing::debug!(tree = %tree.lock.token(), "injector tree created");

        Ok(Injector::from_parts(Arc::new(tree), pool, base))
    }
}

impl Debug for InjectorBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorBuilder")
            .field("config", &self.config)
            .field("blueprints", &self.blueprints.len())
            .field("allocations", &self.allocations)
            .field("environment", &self.environment.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::InjectionMode;

    #[derive(Debug, Default)]
    struct Plain;

    fn injector() -> Injector {
        let injector = Injector::builder().build().unwrap();
        injector
            .descriptors()
            .describe(Descriptor::builder::<Plain>().default_constructor())
            .unwrap();
        injector
    }

    #[test]
    fn explicit_root_without_allocation_is_unresolved() {
        let injector = Injector::builder()
            .config(InjectorConfig::new().with_default_mode(InjectionMode::Explicit))
            .build()
            .unwrap();
        let err = injector.instantiate::<Plain>().unwrap_err();
        assert!(matches!(err, Error::Injection(InjectionError::Unresolved(_))));
    }

    #[test]
    fn unknown_type() {
        let err = Injector::builder().build().unwrap().instantiate::<Plain>().unwrap_err();
        assert!(matches!(err, Error::Injection(InjectionError::UnknownType(_))));
    }

    #[test]
    fn independent_beans_are_distinct() {
        let injector = injector();
        let first = injector.instantiate::<Plain>().unwrap();
        let second = injector.instantiate::<Plain>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn destroy_unknown_root() {
        let injector = injector();
        let plain = injector.instantiate::<Plain>().unwrap();
        // nothing to tear down, so no record was kept
        assert!(!injector.destroy(&plain).unwrap());
        assert!(injector.destroy_all().is_ok());
    }

    #[test]
    fn spawned_children_share_the_tree() {
        let injector = Injector::builder()
            .environment("answer", 42_u32)
            .build()
            .unwrap();
        let child = injector.spawn();

        assert_eq!(child.tree_token(), injector.tree_token());
        let entry = child.singleton("answer").unwrap();
        assert!(entry.is_environment);
        assert!(Arc::ptr_eq(child.descriptors(), injector.descriptors()));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Injector::builder()
            .config(InjectorConfig::new().with_parallel_threshold(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
