//! Type descriptors
//!
//! A [`Descriptor`] is the immutable record of how one type is built: its
//! constructor parameters, its late-bound fields, the processors of each
//! lifecycle phase and the types its instances can be viewed as. Descriptors
//! are registered explicitly in a [`DescriptorRegistry`] shared by a whole
//! injector tree.
//!
//! # Example
//!
//! ```rust
//! use graft_core::{Descriptor, Param, ResolvingSettings};
//!
//! struct Server {
//!     port: u16,
//! }
//!
//! let descriptor = Descriptor::builder::<Server>()
//!     .param(Param::resolvable("port", ResolvingSettings::new("server.port").with_default("8080")))
//!     .constructor(|args| Ok(Server { port: args.require(0)? }))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(descriptor.params().len(), 1);
//! ```

use crate::aggregation::Aggregate;
use crate::args::{ArgumentError, Args};
use crate::callback::Callback;
use crate::error::{BoxError, DescriptorError};
use crate::lifecycle::{concrete, Lifecycle};
use crate::settings::{AggregateSettings, AggregateShape, InjectionSettings, ResolvingSettings};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use graft_context::{bean, downcast, full_match, Bean, TypeKey};
use regex::Regex;
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

type Constructor = Arc<dyn Fn(&Args) -> Result<Bean, BoxError> + Send + Sync>;
type PropertySetter = Arc<dyn Fn(&Bean, &str) -> Result<(), BoxError> + Send + Sync>;
type BeanSetter = Arc<dyn Fn(&Bean, Option<Bean>) -> Result<(), BoxError> + Send + Sync>;
type AggregateSetter = Arc<dyn Fn(&Bean, Aggregate) -> Result<(), BoxError> + Send + Sync>;
type Caster = Arc<dyn Fn(&Bean) -> Option<Bean> + Send + Sync>;

/// How a constructor parameter is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    /// From the property context
    Resolvable,
    /// By recursive injection
    Injectable,
    /// Property first, then injection (an injected value wins)
    Both,
    /// Never resolved; always absent
    Plain,
}

/// One constructor parameter
#[derive(Clone)]
pub struct Param {
    name: String,
    role: ParamRole,
    resolving: Option<ResolvingSettings>,
    injection: Option<InjectionSettings>,
    matcher: Option<Regex>,
}

impl Param {
    /// Parameter with `role` and no settings yet
    #[must_use]
    pub fn new(name: impl Into<String>, role: ParamRole) -> Self {
        Self {
            name: name.into(),
            role,
            resolving: None,
            injection: None,
            matcher: None,
        }
    }

    /// Property parameter
    #[must_use]
    pub fn resolvable(name: impl Into<String>, settings: ResolvingSettings) -> Self {
        Self::new(name, ParamRole::Resolvable).with_resolving(settings)
    }

    /// Injected parameter
    #[must_use]
    pub fn injectable(name: impl Into<String>, settings: InjectionSettings) -> Self {
        Self::new(name, ParamRole::Injectable).with_injection(settings)
    }

    /// Property parameter an injected value may replace
    #[must_use]
    pub fn both(
        name: impl Into<String>,
        resolving: ResolvingSettings,
        injection: InjectionSettings,
    ) -> Self {
        Self::new(name, ParamRole::Both)
            .with_resolving(resolving)
            .with_injection(injection)
    }

    /// Parameter the engine leaves absent
    #[must_use]
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, ParamRole::Plain)
    }

    /// With resolving settings
    #[inline]
    #[must_use]
    pub fn with_resolving(mut self, settings: ResolvingSettings) -> Self {
        self.resolving = Some(settings);
        self
    }

    /// With injection settings
    #[inline]
    #[must_use]
    pub fn with_injection(mut self, settings: InjectionSettings) -> Self {
        self.injection = Some(settings);
        self
    }

    /// Parameter name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter role
    #[inline]
    #[must_use]
    pub fn role(&self) -> ParamRole {
        self.role
    }

    /// Resolving settings
    #[inline]
    #[must_use]
    pub fn resolving(&self) -> Option<&ResolvingSettings> {
        self.resolving.as_ref()
    }

    /// Injection settings
    #[inline]
    #[must_use]
    pub fn injection(&self) -> Option<&InjectionSettings> {
        self.injection.as_ref()
    }

    pub(crate) fn matcher(&self) -> Option<&Regex> {
        self.matcher.as_ref()
    }
}

impl Debug for Param {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("resolving", &self.resolving)
            .field("injection", &self.injection)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct ResolvableField {
    pub(crate) name: String,
    pub(crate) settings: ResolvingSettings,
    pub(crate) matcher: Option<Regex>,
    pub(crate) set: PropertySetter,
}

#[derive(Clone)]
pub(crate) struct InjectableField {
    pub(crate) name: String,
    pub(crate) settings: InjectionSettings,
    pub(crate) set: BeanSetter,
}

#[derive(Clone)]
pub(crate) struct AggregateField {
    pub(crate) name: String,
    pub(crate) settings: AggregateSettings,
    pub(crate) qualifier: Option<Regex>,
    pub(crate) set: AggregateSetter,
}

#[derive(Clone)]
struct Cast {
    target: TypeKey,
    cast: Caster,
}

/// Immutable description of how to build one type
#[derive(Clone)]
pub struct Descriptor {
    type_key: TypeKey,
    params: Vec<Param>,
    constructor: Option<Constructor>,
    pub(crate) resolvable_fields: Vec<ResolvableField>,
    pub(crate) injectable_fields: Vec<InjectableField>,
    pub(crate) aggregate_fields: Vec<AggregateField>,
    lifecycle: Lifecycle,
    casts: Vec<Cast>,
    context_sensitive: bool,
}

impl Descriptor {
    /// Start describing `T`
    #[inline]
    #[must_use]
    pub fn builder<T: Any + Send + Sync>() -> DescriptorBuilder<T> {
        DescriptorBuilder::new()
    }

    /// Described type
    #[inline]
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    /// Constructor parameters in order
    #[inline]
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Processors per phase
    #[inline]
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Whether instances must be supplied ready-made
    #[inline]
    #[must_use]
    pub fn is_context_sensitive(&self) -> bool {
        self.context_sensitive
    }

    /// Whether instances can be viewed as `target`
    #[must_use]
    pub fn is_assignable_to(&self, target: TypeKey) -> bool {
        target == self.type_key || self.casts.iter().any(|cast| cast.target == target)
    }

    /// Names of late-bound fields, resolvable then injectable then aggregate
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.resolvable_fields
            .iter()
            .map(|field| field.name.as_str())
            .chain(self.injectable_fields.iter().map(|field| field.name.as_str()))
            .chain(self.aggregate_fields.iter().map(|field| field.name.as_str()))
            .collect()
    }

    /// View `bean` (an instance of this type) as `target`
    ///
    /// Returns `None` if this type does not implement `target`.
    #[must_use]
    pub fn cast(&self, bean: &Bean, target: TypeKey) -> Option<Bean> {
        if target == self.type_key {
            return Some(Arc::clone(bean));
        }
        self.casts
            .iter()
            .find(|cast| cast.target == target)
            .and_then(|cast| (cast.cast)(bean))
    }

    pub(crate) fn construct(&self, args: &Args) -> Option<Result<Bean, BoxError>> {
        self.constructor.as_ref().map(|constructor| constructor(args))
    }
}

impl Debug for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("type_key", &self.type_key)
            .field("params", &self.params)
            .field("fields", &self.field_names())
            .field("lifecycle", &self.lifecycle)
            .field("context_sensitive", &self.context_sensitive)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Descriptor`]
pub struct DescriptorBuilder<T> {
    descriptor: Descriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> DescriptorBuilder<T> {
    fn new() -> Self {
        Self {
            descriptor: Descriptor {
                type_key: TypeKey::of::<T>(),
                params: Vec::new(),
                constructor: None,
                resolvable_fields: Vec::new(),
                injectable_fields: Vec::new(),
                aggregate_fields: Vec::new(),
                lifecycle: Lifecycle::new(),
                casts: Vec::new(),
                context_sensitive: false,
            },
            _marker: PhantomData,
        }
    }

    /// Append a constructor parameter
    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.descriptor.params.push(param);
        self
    }

    /// Set the constructor
    #[must_use]
    pub fn constructor(
        mut self,
        f: impl Fn(&Args) -> Result<T, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.descriptor.constructor = Some(Arc::new(move |args: &Args| f(args).map(bean)));
        self
    }

    /// Construct through `T::default()`
    #[must_use]
    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(|_| Ok(T::default()))
    }

    /// Add a field set from a property once the bean is constructed
    ///
    /// The setter only runs when the property (or its default) has a value.
    #[must_use]
    pub fn resolvable_field(
        mut self,
        name: impl Into<String>,
        settings: ResolvingSettings,
        setter: impl Fn(&T, &str) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        let set: PropertySetter =
            Arc::new(move |target: &Bean, value: &str| setter(concrete::<T>(target)?, value));
        self.descriptor.resolvable_fields.push(ResolvableField {
            name: name.into(),
            settings,
            matcher: None,
            set,
        });
        self
    }

    /// Add a field injected with a `D` once the bean is constructed
    ///
    /// An absent dependency only reaches the setter (as `None`) when the
    /// settings allow overwriting with null.
    #[must_use]
    pub fn injectable_field<D: Any + Send + Sync>(
        mut self,
        name: impl Into<String>,
        settings: InjectionSettings,
        setter: impl Fn(&T, Option<Arc<D>>) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let field = name.clone();
        let set: BeanSetter = Arc::new(move |target: &Bean, value: Option<Bean>| {
            let value = match value {
                Some(value) => Some(downcast::<D>(&value).ok_or_else(|| {
                    ArgumentError::TypeMismatch {
                        name: field.clone(),
                        expected: TypeKey::of::<D>(),
                    }
                })?),
                None => None,
            };
            setter(concrete::<T>(target)?, value)
        });
        self.descriptor.injectable_fields.push(InjectableField {
            name,
            settings,
            set,
        });
        self
    }

    /// Add a field collecting matching singletons
    ///
    /// Aggregation runs after every bean of the sequence is constructed.
    #[must_use]
    pub fn aggregate_field(
        mut self,
        name: impl Into<String>,
        settings: AggregateSettings,
        setter: impl Fn(&T, Aggregate) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        let set: AggregateSetter =
            Arc::new(move |target: &Bean, value: Aggregate| setter(concrete::<T>(target)?, value));
        self.descriptor.aggregate_fields.push(AggregateField {
            name: name.into(),
            settings,
            qualifier: None,
            set,
        });
        self
    }

    /// Append every processor of `lifecycle`
    #[must_use]
    pub fn lifecycle(mut self, lifecycle: &Lifecycle) -> Self {
        self.descriptor.lifecycle = self.descriptor.lifecycle.chain(lifecycle);
        self
    }

    /// Add a pre-construct processor
    #[must_use]
    pub fn pre_construct(
        mut self,
        f: impl Fn(&mut Callback<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.descriptor.lifecycle = self.descriptor.lifecycle.on_pre_construct(f);
        self
    }

    /// Add a post-inject processor
    #[must_use]
    pub fn post_inject(
        mut self,
        f: impl Fn(&T, &mut Callback<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.descriptor.lifecycle = self.descriptor.lifecycle.on_post_inject(f);
        self
    }

    /// Add a post-construct processor
    #[must_use]
    pub fn post_construct(
        mut self,
        f: impl Fn(&T, &mut Callback<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.descriptor.lifecycle = self.descriptor.lifecycle.on_post_construct(f);
        self
    }

    /// Add a pre-destroy processor
    #[must_use]
    pub fn pre_destroy(
        mut self,
        f: impl Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.descriptor.lifecycle = self.descriptor.lifecycle.on_pre_destroy(f);
        self
    }

    /// Add a post-destroy processor
    #[must_use]
    pub fn post_destroy(
        mut self,
        f: impl Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.descriptor.lifecycle = self.descriptor.lifecycle.on_post_destroy(f);
        self
    }

    /// Declare that `T` can be viewed as `I`
    ///
    /// `I` is usually a shared trait object:
    /// `.implements::<Arc<dyn Greeter>>(|hello| hello as Arc<dyn Greeter>)`.
    #[must_use]
    pub fn implements<I: Any + Send + Sync>(
        mut self,
        f: impl Fn(Arc<T>) -> I + Send + Sync + 'static,
    ) -> Self {
        let cast: Caster = Arc::new(move |source: &Bean| downcast::<T>(source).map(|t| bean(f(t))));
        self.descriptor.casts.push(Cast {
            target: TypeKey::of::<I>(),
            cast,
        });
        self
    }

    /// Mark `T` as supplied ready-made only
    #[must_use]
    pub fn context_sensitive(mut self) -> Self {
        self.descriptor.context_sensitive = true;
        self
    }

    /// Validate and finish
    ///
    /// # Errors
    /// - `DescriptorError::MissingConstructor` for a constructible type without constructor
    /// - `DescriptorError::MissingSettings` for parameters lacking the settings their role needs
    /// - `DescriptorError::EmptyKey` for empty property keys or qualifiers
    /// - `DescriptorError::InvalidPattern` for matchers or qualifier patterns that do not compile
    /// - `DescriptorError::ShapeConflict` for collection aggregates marked distinct
    pub fn build(self) -> Result<Descriptor, DescriptorError> {
        let mut descriptor = self.descriptor;
        let type_key = descriptor.type_key;

        if descriptor.constructor.is_none() && !descriptor.context_sensitive {
            return Err(DescriptorError::MissingConstructor(type_key));
        }

        for param in &mut descriptor.params {
            let needs_resolving = matches!(param.role, ParamRole::Resolvable | ParamRole::Both);
            let needs_injection = matches!(param.role, ParamRole::Injectable | ParamRole::Both);
            if needs_resolving && param.resolving.is_none() {
                return Err(missing_settings(type_key, &param.name, "resolving"));
            }
            if needs_injection && param.injection.is_none() {
                return Err(missing_settings(type_key, &param.name, "injection"));
            }
            if let Some(settings) = &param.resolving {
                param.matcher = compile_resolving(type_key, &param.name, settings)?;
            }
            if let Some(settings) = &param.injection {
                check_injection(type_key, &param.name, settings)?;
            }
        }

        for field in &mut descriptor.resolvable_fields {
            field.matcher = compile_resolving(type_key, &field.name, &field.settings)?;
        }

        for field in &descriptor.injectable_fields {
            check_injection(type_key, &field.name, &field.settings)?;
        }

        for field in &mut descriptor.aggregate_fields {
            if field.settings.distinct && field.settings.shape != AggregateShape::Single {
                return Err(DescriptorError::ShapeConflict {
                    type_key,
                    field: field.name.clone(),
                });
            }
            for predicate in &field.settings.predicates {
                check_injection(type_key, &field.name, predicate)?;
            }
            field.qualifier = field
                .settings
                .qualifier
                .as_deref()
                .map(full_match)
                .transpose()
                .map_err(|source| DescriptorError::InvalidPattern {
                    type_key,
                    name: field.name.clone(),
                    source,
                })?;
        }

        tracing::trace!(type_key = %type_key, params = descriptor.params.len(), "descriptor built");
        Ok(descriptor)
    }
}

fn missing_settings(type_key: TypeKey, param: &str, missing: &'static str) -> DescriptorError {
    DescriptorError::MissingSettings {
        type_key,
        param: param.to_string(),
        missing,
    }
}

fn compile_resolving(
    type_key: TypeKey,
    name: &str,
    settings: &ResolvingSettings,
) -> Result<Option<Regex>, DescriptorError> {
    if settings.key.is_empty() {
        return Err(DescriptorError::EmptyKey {
            type_key,
            name: name.to_string(),
            what: "property key",
        });
    }
    settings
        .compile()
        .map_err(|source| DescriptorError::InvalidPattern {
            type_key,
            name: name.to_string(),
            source,
        })
}

fn check_injection(
    type_key: TypeKey,
    name: &str,
    settings: &InjectionSettings,
) -> Result<(), DescriptorError> {
    if settings.qualifier.as_deref() == Some("") {
        return Err(DescriptorError::EmptyKey {
            type_key,
            name: name.to_string(),
            what: "qualifier",
        });
    }
    Ok(())
}

/// Descriptors of one injector tree, keyed by type
#[derive(Default)]
pub struct DescriptorRegistry {
    descriptors: DashMap<TypeKey, Arc<Descriptor>>,
}

impl DescriptorRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptor`
    ///
    /// # Errors
    /// `DescriptorError::Duplicate` if the type already has a descriptor
    pub fn register(&self, descriptor: Descriptor) -> Result<Arc<Descriptor>, DescriptorError> {
        let type_key = descriptor.type_key();
        match self.descriptors.entry(type_key) {
            Entry::Occupied(_) => Err(DescriptorError::Duplicate(type_key)),
            Entry::Vacant(slot) => {
                let descriptor = Arc::new(descriptor);
                slot.insert(Arc::clone(&descriptor));
                tracing::debug!(type_key = %type_key, "descriptor registered");
                Ok(descriptor)
            }
        }
    }

    /// Build and register a descriptor
    ///
    /// # Errors
    /// Any `DescriptorError` from [`DescriptorBuilder::build`] or [`Self::register`]
    pub fn describe<T: Any + Send + Sync>(
        &self,
        builder: DescriptorBuilder<T>,
    ) -> Result<Arc<Descriptor>, DescriptorError> {
        self.register(builder.build()?)
    }

    /// Descriptor for `type_key`
    #[inline]
    #[must_use]
    pub fn get(&self, type_key: &TypeKey) -> Option<Arc<Descriptor>> {
        self.descriptors.get(type_key).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if `type_key` is described
    #[inline]
    #[must_use]
    pub fn contains(&self, type_key: &TypeKey) -> bool {
        self.descriptors.contains_key(type_key)
    }

    /// Number of descriptors
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if no descriptor is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("descriptors", &self.descriptors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AggregateSettings;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Default)]
    struct Hello;

    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn missing_constructor() {
        let err = Descriptor::builder::<Hello>().build().unwrap_err();
        assert!(matches!(err, DescriptorError::MissingConstructor(_)));
        assert!(Descriptor::builder::<Hello>().context_sensitive().build().is_ok());
    }

    #[test]
    fn param_roles_need_settings() {
        let err = Descriptor::builder::<Hello>()
            .param(Param::new("x", ParamRole::Both).with_resolving(ResolvingSettings::new("x")))
            .default_constructor()
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::MissingSettings { missing: "injection", .. }
        ));
    }

    #[test]
    fn empty_keys_and_bad_patterns() {
        let empty_key = Descriptor::builder::<Hello>()
            .param(Param::resolvable("x", ResolvingSettings::new("")))
            .default_constructor()
            .build();
        assert!(matches!(empty_key, Err(DescriptorError::EmptyKey { .. })));

        let empty_qualifier = Descriptor::builder::<Hello>()
            .param(Param::injectable("x", InjectionSettings::qualified::<String>("")))
            .default_constructor()
            .build();
        assert!(matches!(empty_qualifier, Err(DescriptorError::EmptyKey { .. })));

        let bad_pattern = Descriptor::builder::<Hello>()
            .resolvable_field("x", ResolvingSettings::new("x").matching("("), |_, _| Ok(()))
            .default_constructor()
            .build();
        assert!(matches!(bad_pattern, Err(DescriptorError::InvalidPattern { .. })));
    }

    #[test]
    fn distinct_collection_conflicts() {
        let err = Descriptor::builder::<Hello>()
            .aggregate_field("all", AggregateSettings::list::<String>().distinct(), |_, _| Ok(()))
            .default_constructor()
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::ShapeConflict { .. }));
    }

    #[test]
    fn casts_view_instances() {
        let descriptor = Descriptor::builder::<Hello>()
            .default_constructor()
            .implements::<Arc<dyn Greeter>>(|hello| hello as Arc<dyn Greeter>)
            .build()
            .unwrap();
        let instance = bean(Hello);

        let target = TypeKey::of::<Arc<dyn Greeter>>();
        assert!(descriptor.is_assignable_to(target));
        let view = descriptor.cast(&instance, target).unwrap();
        let greeter = downcast::<Arc<dyn Greeter>>(&view).unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(descriptor.cast(&instance, TypeKey::of::<String>()).is_none());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let registry = DescriptorRegistry::new();
        registry
            .describe(Descriptor::builder::<Hello>().default_constructor())
            .unwrap();
        let err = registry
            .describe(Descriptor::builder::<Hello>().default_constructor())
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Duplicate(_)));
        assert!(registry.contains(&TypeKey::of::<Hello>()));
        assert_eq!(registry.len(), 1);
    }
}
