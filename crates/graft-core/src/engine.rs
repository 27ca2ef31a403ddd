//! Resolution engine
//!
//! The recursive part of a build sequence. [`Injector::resolve`] decides,
//! for one injection point, between an independent bean and a scoped
//! singleton, delegates to allocators and constructs what nothing else
//! supplies. Construction runs the per-bean phases (pre-construct,
//! parameters, constructor, post-inject, fields) and queues the deferred
//! ones; [`Injector::drain`] runs the queues once the root is built.

use crate::aggregation::AggregateRequest;
use crate::allocation::Allocator;
use crate::args::{ArgValue, Args};
use crate::callback::Callback;
use crate::chain::{
    Activation, AggregateTask, ChainLayer, DependencyContext, PostConstructTask, SequenceState,
};
use crate::descriptor::{Descriptor, ParamRole};
use crate::error::{AggregationError, BoxError, Error, InjectionError, Phase, ProcessorError, Result};
use crate::injector::Injector;
use crate::lifecycle::{Destroyable, Lifecycle};
use crate::registry::AllocationRegistry;
use crate::settings::{InjectionMode, InjectionSettings, SingletonMode, SingletonPredicate};
use graft_context::{bean, downcast, Bean, SingletonEntry, TypeKey};
use std::sync::Arc;

/// Singleton slot a bean is registered under once it exists
struct Registration {
    qualifier: String,
    allocated: bool,
    mode: SingletonMode,
}

fn failed(type_key: TypeKey, phase: Phase, source: BoxError) -> Error {
    ProcessorError::Failed {
        type_key,
        phase,
        source,
    }
    .into()
}

impl Injector {
    /// Resolve `target` on `layer`
    ///
    /// `Ok(None)` means the target is absent (explicit mode, nothing allocated).
    pub(crate) fn resolve(
        &self,
        state: &mut SequenceState,
        layer: &ChainLayer,
        target: &InjectionSettings,
    ) -> Result<Option<Bean>> {
        let extended;
        let layer = if target.extensions.is_empty() {
            layer
        } else {
            let registry = AllocationRegistry::build(&target.extensions)?;
            extended = layer.extend(&registry)?;
            &extended
        };

        if target.type_key == TypeKey::of::<Self>() {
            return self.spawn_child(state, layer).map(Some);
        }

        match target.qualifier.as_deref() {
            None => self.resolve_independent(state, layer, target),
            Some(qualifier) => self.resolve_singleton(state, layer, target, qualifier),
        }
    }

    fn resolve_independent(
        &self,
        state: &mut SequenceState,
        layer: &ChainLayer,
        target: &InjectionSettings,
    ) -> Result<Option<Bean>> {
        if let Some(allocator) = layer.types.get(&target.type_key) {
            tracing::debug!(
                type_key = %target.type_key,
                allocator = allocator.kind(),
                "delegating to type allocation"
            );
            return self
                .allocate(state, layer, allocator, target.type_key, None)
                .map(Some);
        }
        match target.mode {
            InjectionMode::Eager => self
                .construct_type(state, layer, target.type_key, target.type_key, &Lifecycle::new(), None)
                .map(Some),
            InjectionMode::Explicit => Ok(None),
        }
    }

    fn resolve_singleton(
        &self,
        state: &mut SequenceState,
        layer: &ChainLayer,
        target: &InjectionSettings,
        requested: &str,
    ) -> Result<Option<Bean>> {
        let qualifier = layer.mapping.resolve(requested);
        if qualifier != requested {
            tracing::trace!(alias = requested, qualifier, "alias resolved");
        }

        let dependency = match target.singleton_mode {
            SingletonMode::Sequence => DependencyContext::Sequence,
            SingletonMode::Global => DependencyContext::Global,
        };
        if layer.dependency > dependency {
            return Err(InjectionError::IllegalNesting {
                requested: target.type_key,
            }
            .into());
        }
        let layer = layer.escalate(dependency);

        let allocated_only = target.mode == InjectionMode::Explicit;
        if let Some(entry) = state.singletons.get_if(qualifier, allocated_only) {
            return self.reuse(qualifier, &entry, target.type_key).map(Some);
        }

        if let Some(allocator) = layer.qualifiers.get(qualifier) {
            tracing::debug!(
                qualifier,
                allocator = allocator.kind(),
                "delegating to singleton allocation"
            );
            let registration = Registration {
                qualifier: qualifier.to_string(),
                allocated: true,
                mode: target.singleton_mode,
            };
            state.enter_qualifier(qualifier)?;
            let allocated =
                self.allocate(state, &layer, allocator, target.type_key, Some(&registration));
            state.leave_qualifier(qualifier);
            return allocated.map(Some);
        }

        match target.mode {
            InjectionMode::Eager => {
                let registration = Registration {
                    qualifier: qualifier.to_string(),
                    allocated: false,
                    mode: target.singleton_mode,
                };
                self.construct_type(
                    state,
                    &layer,
                    target.type_key,
                    target.type_key,
                    &Lifecycle::new(),
                    Some(&registration),
                )
                .map(Some)
            }
            InjectionMode::Explicit => Ok(None),
        }
    }

    /// Existing singleton requested as `requested`
    ///
    /// Only allocated singletons may be viewed as another type; an on-demand
    /// singleton is bound to the type it was first built as.
    fn reuse(&self, qualifier: &str, entry: &SingletonEntry, requested: TypeKey) -> Result<Bean> {
        if entry.type_key == requested {
            return Ok(Arc::clone(&entry.bean));
        }
        let mismatch = || InjectionError::TypeMismatch {
            qualifier: qualifier.to_string(),
            registered: entry.type_key,
            requested,
        };
        if !entry.is_allocated {
            return Err(mismatch().into());
        }
        self.assign(&entry.bean, entry.type_key, requested)
            .ok_or_else(|| mismatch().into())
    }

    /// View `bean`, an instance of `from`, as `to`
    pub(crate) fn assign(&self, bean: &Bean, from: TypeKey, to: TypeKey) -> Option<Bean> {
        if from == to {
            return Some(Arc::clone(bean));
        }
        self.tree
            .descriptors
            .get(&from)
            .and_then(|descriptor| descriptor.cast(bean, to))
    }

    fn spawn_child(&self, state: &SequenceState, layer: &ChainLayer) -> Result<Bean> {
        if layer.dependency == DependencyContext::Global {
            return Err(InjectionError::IllegalNesting {
                requested: TypeKey::of::<Self>(),
            }
            .into());
        }
        let child = Self::from_parts(
            Arc::clone(&self.tree),
            state.singletons.inherit(),
            layer.detached(),
        );
        tracing::debug!(tree = %self.tree_token(), "child injector spawned");
        Ok(bean(child))
    }

    fn allocate(
        &self,
        state: &mut SequenceState,
        layer: &ChainLayer,
        allocator: &Allocator,
        view: TypeKey,
        registration: Option<&Registration>,
    ) -> Result<Bean> {
        match allocator {
            Allocator::Instance { bean, type_key } => {
                let viewed = self.assign(bean, *type_key, view).ok_or(
                    InjectionError::NotAssignable {
                        from: *type_key,
                        to: view,
                    },
                )?;
                self.register(state, registration, &viewed, view)?;
                Ok(viewed)
            }
            Allocator::Provider { type_key, factory } => {
                let produced = {
                    let mut callback = Callback::new(self, state, layer, *type_key);
                    factory(&mut callback).map_err(|source| InjectionError::ProviderFailed {
                        type_key: *type_key,
                        source,
                    })?
                };
                let viewed = self.assign(&produced, *type_key, view).ok_or(
                    InjectionError::NotAssignable {
                        from: *type_key,
                        to: view,
                    },
                )?;
                self.register(state, registration, &viewed, view)?;
                Ok(viewed)
            }
            Allocator::Type {
                type_key,
                lifecycle,
            } => self.construct_type(state, layer, *type_key, view, lifecycle, registration),
            Allocator::Plugin {
                directory,
                id,
                range,
                spi,
                lifecycle,
            } => {
                let spi = spi.as_deref().unwrap_or(view.name());
                let pluggable = self.tree.plugins.find_pluggable(directory, id, spi, range)?;
                tracing::debug!(
                    plugin = id.as_str(),
                    version = %pluggable.descriptor().version,
                    implementation = pluggable.implementation(),
                    "delegating to plugin implementation"
                );
                let descriptor = Arc::clone(pluggable.handle());
                let built = self.construct(state, layer, &descriptor, view, lifecycle, registration)?;
                let namespace = pluggable.namespace();
                if !state.namespaces.iter().any(|held| Arc::ptr_eq(held, namespace)) {
                    state.namespaces.push(Arc::clone(namespace));
                }
                Ok(built)
            }
        }
    }

    fn register(
        &self,
        state: &mut SequenceState,
        registration: Option<&Registration>,
        bean: &Bean,
        type_key: TypeKey,
    ) -> Result<()> {
        let Some(registration) = registration else {
            return Ok(());
        };
        let entry = if registration.allocated {
            SingletonEntry::allocated(Arc::clone(bean), type_key)
        } else {
            SingletonEntry::on_demand(Arc::clone(bean), type_key)
        };
        if !state
            .singletons
            .register(registration.qualifier.clone(), entry.clone())
        {
            return Err(InjectionError::DuplicateSingleton(registration.qualifier.clone()).into());
        }
        if registration.mode == SingletonMode::Global {
            state.activations.push_back(Activation {
                qualifier: registration.qualifier.clone(),
                entry,
            });
        }
        tracing::debug!(
            qualifier = %registration.qualifier,
            type_key = %type_key,
            allocated = registration.allocated,
            mode = ?registration.mode,
            "singleton registered"
        );
        Ok(())
    }

    fn construct_type(
        &self,
        state: &mut SequenceState,
        layer: &ChainLayer,
        type_key: TypeKey,
        view: TypeKey,
        extra: &Lifecycle,
        registration: Option<&Registration>,
    ) -> Result<Bean> {
        let descriptor = self
            .tree
            .descriptors
            .get(&type_key)
            .ok_or(InjectionError::UnknownType(type_key))?;
        self.construct(state, layer, &descriptor, view, extra, registration)
    }

    fn construct(
        &self,
        state: &mut SequenceState,
        layer: &ChainLayer,
        descriptor: &Arc<Descriptor>,
        view: TypeKey,
        extra: &Lifecycle,
        registration: Option<&Registration>,
    ) -> Result<Bean> {
        let type_key = descriptor.type_key();
        if descriptor.is_context_sensitive() {
            if layer.dependency == DependencyContext::Global {
                return Err(InjectionError::IllegalNesting { requested: type_key }.into());
            }
            return Err(InjectionError::ContextSensitive(type_key).into());
        }
        if !descriptor.is_assignable_to(view) {
            return Err(InjectionError::NotAssignable {
                from: type_key,
                to: view,
            }
            .into());
        }

        state.enter(type_key)?;
        let built = self.build(state, layer, descriptor, view, extra, registration);
        state.leave(type_key);
        built
    }

    fn build(
        &self,
        state: &mut SequenceState,
        layer: &ChainLayer,
        descriptor: &Arc<Descriptor>,
        view: TypeKey,
        extra: &Lifecycle,
        registration: Option<&Registration>,
    ) -> Result<Bean> {
        let type_key = descriptor.type_key();
        let lifecycle = descriptor.lifecycle().chain(extra);
        // dependencies built below queue their post-construct tasks after this slot
        let slot = state.post_constructs.len();
        tracing::debug!(type_key = %type_key, dependency = ?layer.dependency, "constructing");

        for processor in &lifecycle.pre_construct {
            let mut callback = Callback::new(self, state, layer, type_key);
            processor(&mut callback).map_err(|source| failed(type_key, Phase::PreConstruct, source))?;
        }

        let args = self.resolve_params(state, layer, descriptor)?;
        let instance = match descriptor.construct(&args) {
            Some(Ok(instance)) => instance,
            Some(Err(source)) => {
                return Err(InjectionError::ConstructionFailed { type_key, source }.into())
            }
            None => return Err(InjectionError::ContextSensitive(type_key).into()),
        };

        if lifecycle.has_destroyers() {
            state.destroyables.push(Destroyable {
                type_key,
                bean: Arc::clone(&instance),
                pre_destroy: lifecycle.pre_destroy.clone(),
                post_destroy: lifecycle.post_destroy.clone(),
                global: layer.dependency == DependencyContext::Global,
            });
        }

        let viewed = descriptor
            .cast(&instance, view)
            .ok_or(InjectionError::NotAssignable {
                from: type_key,
                to: view,
            })?;
        self.register(state, registration, &viewed, view)?;

        for processor in &lifecycle.post_inject {
            let mut callback = Callback::new(self, state, layer, type_key);
            processor(&instance, &mut callback)
                .map_err(|source| failed(type_key, Phase::PostInject, source))?;
        }

        for field in &descriptor.resolvable_fields {
            if let Some(value) = field.settings.resolve(&layer.resolving, field.matcher.as_ref())? {
                (field.set)(&instance, &value).map_err(|source| InjectionError::FieldFailed {
                    type_key,
                    field: field.name.clone(),
                    source,
                })?;
            }
        }

        for field in &descriptor.injectable_fields {
            let value = self.resolve(state, layer, &field.settings)?;
            if value.is_none() && !field.settings.overwrite_with_null {
                continue;
            }
            (field.set)(&instance, value).map_err(|source| InjectionError::FieldFailed {
                type_key,
                field: field.name.clone(),
                source,
            })?;
        }

        if !lifecycle.post_construct.is_empty() {
            state.post_constructs.insert(
                slot,
                PostConstructTask {
                    bean: Arc::clone(&instance),
                    type_key,
                    processors: lifecycle.post_construct.clone(),
                    layer: layer.clone(),
                },
            );
        }
        if !descriptor.aggregate_fields.is_empty() {
            state.aggregates.push_back(AggregateTask {
                bean: Arc::clone(&instance),
                descriptor: Arc::clone(descriptor),
                layer: layer.clone(),
            });
        }
        Ok(viewed)
    }

    fn resolve_params(
        &self,
        state: &mut SequenceState,
        layer: &ChainLayer,
        descriptor: &Descriptor,
    ) -> Result<Args> {
        let params = descriptor.params();
        let mut names = Vec::with_capacity(params.len());
        let mut values = Vec::with_capacity(params.len());

        for param in params {
            let role = param.role();
            let mut value = ArgValue::Absent;

            if matches!(role, ParamRole::Resolvable | ParamRole::Both) {
                if let Some(settings) = param.resolving() {
                    if let Some(property) = settings.resolve(&layer.resolving, param.matcher())? {
                        value = ArgValue::Property(property);
                    }
                }
            }
            if matches!(role, ParamRole::Injectable | ParamRole::Both) {
                if let Some(settings) = param.injection() {
                    match self.resolve(state, layer, settings)? {
                        Some(bean) => value = ArgValue::Bean(bean),
                        None if settings.overwrite_with_null => value = ArgValue::Absent,
                        None => {}
                    }
                }
            }

            names.push(param.name().to_string());
            values.push(value);
        }
        Ok(Args::new(names, values))
    }

    /// Run the deferred queues until all are empty
    ///
    /// Aggregates go first (FIFO), then post-construct processors (LIFO),
    /// then global activations (FIFO). Processors may queue more work through
    /// their callback, which is picked up in the same order.
    pub(crate) fn drain(&self, state: &mut SequenceState) -> Result<()> {
        loop {
            if let Some(task) = state.aggregates.pop_front() {
                self.aggregate(state, &task)?;
            } else if let Some(task) = state.post_constructs.pop() {
                for processor in &task.processors {
                    let mut callback = Callback::new(self, state, &task.layer, task.type_key);
                    processor(&task.bean, &mut callback)
                        .map_err(|source| failed(task.type_key, Phase::PostConstruct, source))?;
                }
            } else if let Some(activation) = state.activations.pop_front() {
                let type_key = activation.entry.type_key;
                if self.pool.register(activation.qualifier.clone(), activation.entry) {
                    tracing::debug!(
                        qualifier = %activation.qualifier,
                        type_key = %type_key,
                        "global singleton activated"
                    );
                } else {
                    tracing::warn!(
                        qualifier = %activation.qualifier,
                        "global singleton already present, keeping the existing one"
                    );
                }
            } else {
                return Ok(());
            }
        }
    }

    fn aggregate(&self, state: &mut SequenceState, task: &AggregateTask) -> Result<()> {
        let owner = task.descriptor.type_key();
        let threshold = self.tree.config.aggregation.parallel_threshold;

        for field in &task.descriptor.aggregate_fields {
            let mut predicates: Vec<Arc<dyn SingletonPredicate>> =
                Vec::with_capacity(field.settings.predicates.len());
            for settings in &field.settings.predicates {
                let predicate = self
                    .resolve(state, &task.layer, settings)?
                    .and_then(|resolved| downcast::<Arc<dyn SingletonPredicate>>(&resolved))
                    .map(|predicate| Arc::clone(predicate.as_ref()))
                    .ok_or_else(|| AggregationError::InvalidPredicate {
                        owner,
                        field: field.name.clone(),
                        predicate: settings.type_key,
                    })?;
                predicates.push(predicate);
            }

            let element = field.settings.type_key;
            let request = AggregateRequest {
                owner,
                field: &field.name,
                settings: &field.settings,
                qualifier: field.qualifier.as_ref(),
                predicates: &predicates,
            };
            let aggregate = request.collect(
                &state.singletons.entries(),
                |entry| self.assign(&entry.bean, entry.type_key, element),
                threshold,
            )?;

            (field.set)(&task.bean, aggregate).map_err(|source| InjectionError::FieldFailed {
                type_key: owner,
                field: field.name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
