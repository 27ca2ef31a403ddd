//! Injection point settings
//!
//! - [`InjectionSettings`]: what a dependency resolves to and how
//! - [`ResolvingSettings`]: how a property value is looked up and validated
//! - [`AggregateSettings`]: which singletons an aggregate field collects

use crate::allocation::Blueprint;
use graft_context::{Bean, ResolvingContext, ResolvingError, TypeKey};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Whether a missing dependency is constructed on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionMode {
    /// Construct when nothing is allocated
    #[default]
    Eager,
    /// Only use what is explicitly allocated; otherwise absent
    Explicit,
}

/// How long a qualified singleton lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingletonMode {
    /// Lives in the pool of the sequence that built it
    #[default]
    Sequence,
    /// Committed to the injector's pool once the sequence succeeds
    Global,
}

/// Settings of one injection point
#[derive(Clone)]
pub struct InjectionSettings {
    /// Requested type
    pub type_key: TypeKey,
    /// Singleton qualifier; `None` requests an independent bean
    pub qualifier: Option<String>,
    /// Construct on demand or only use allocations
    pub mode: InjectionMode,
    /// Lifetime of a qualified singleton built for this point
    pub singleton_mode: SingletonMode,
    /// Let an absent result overwrite an already resolved value
    pub overwrite_with_null: bool,
    /// Blueprints layered over the chain for this point only
    pub extensions: Vec<Arc<dyn Blueprint>>,
}

impl InjectionSettings {
    /// Independent bean of type `T`
    #[inline]
    #[must_use]
    pub fn of<T: Any + ?Sized>() -> Self {
        Self::for_key(TypeKey::of::<T>())
    }

    /// Independent bean of `type_key`
    #[must_use]
    pub fn for_key(type_key: TypeKey) -> Self {
        Self {
            type_key,
            qualifier: None,
            mode: InjectionMode::Eager,
            singleton_mode: SingletonMode::Sequence,
            overwrite_with_null: false,
            extensions: Vec::new(),
        }
    }

    /// Singleton of type `T` under `qualifier`
    #[inline]
    #[must_use]
    pub fn qualified<T: Any + ?Sized>(qualifier: impl Into<String>) -> Self {
        Self::of::<T>().with_qualifier(qualifier)
    }

    /// With qualifier
    #[inline]
    #[must_use]
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// With injection mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: InjectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Only use explicit allocations
    #[inline]
    #[must_use]
    pub fn explicit(self) -> Self {
        self.with_mode(InjectionMode::Explicit)
    }

    /// Build the singleton into the injector's pool
    #[inline]
    #[must_use]
    pub fn global(mut self) -> Self {
        self.singleton_mode = SingletonMode::Global;
        self
    }

    /// Let an absent result overwrite
    #[inline]
    #[must_use]
    pub fn overwrite_with_null(mut self) -> Self {
        self.overwrite_with_null = true;
        self
    }

    /// Attach an extension blueprint
    #[must_use]
    pub fn with_extension(mut self, blueprint: impl Blueprint + 'static) -> Self {
        self.extensions.push(Arc::new(blueprint));
        self
    }

    /// Check if this point requests a scoped singleton
    #[inline]
    #[must_use]
    pub fn is_qualified(&self) -> bool {
        self.qualifier.is_some()
    }
}

impl Debug for InjectionSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionSettings")
            .field("type_key", &self.type_key)
            .field("qualifier", &self.qualifier)
            .field("mode", &self.mode)
            .field("singleton_mode", &self.singleton_mode)
            .field("overwrite_with_null", &self.overwrite_with_null)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

/// Settings of one property lookup
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolvingSettings {
    /// Property key
    pub key: String,
    /// Pattern the whole value must match
    #[serde(default)]
    pub matcher: Option<String>,
    /// Value used when the key is unset
    #[serde(default)]
    pub default: Option<String>,
    /// Fail when neither value nor default exists
    #[serde(default)]
    pub forced: bool,
}

impl ResolvingSettings {
    /// Lookup of `key`
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// With matcher pattern (anchored to the whole value)
    #[inline]
    #[must_use]
    pub fn matching(mut self, pattern: impl Into<String>) -> Self {
        self.matcher = Some(pattern.into());
        self
    }

    /// With default value
    #[inline]
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Require a value
    #[inline]
    #[must_use]
    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    /// Compile the matcher
    ///
    /// # Errors
    /// Returns the regex error for an invalid pattern
    pub fn compile(&self) -> Result<Option<Regex>, regex::Error> {
        self.matcher
            .as_deref()
            .map(graft_context::full_match)
            .transpose()
    }

    /// Look the property up in `context` using a matcher compiled by [`Self::compile`]
    ///
    /// # Errors
    /// `ResolvingError` if forced and absent, or present and non-matching
    pub fn resolve(
        &self,
        context: &ResolvingContext,
        matcher: Option<&Regex>,
    ) -> Result<Option<String>, ResolvingError> {
        context
            .resolve_or(&self.key, matcher, self.default.as_deref(), self.forced)
            .map(|value| value.map(str::to_string))
    }
}

/// Test applied to every aggregation candidate
///
/// Predicates are beans themselves: an aggregate field names them through
/// [`InjectionSettings`] whose type is `Arc<dyn SingletonPredicate>`.
pub trait SingletonPredicate: Send + Sync {
    /// Whether the singleton registered under `qualifier` is collected
    fn test(&self, qualifier: &str, bean: &Bean) -> bool;
}

/// Shape of an aggregate field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateShape {
    /// At most one value
    #[default]
    Single,
    /// Every match, in registration order
    List,
    /// Every distinct instance, in registration order
    Set,
}

/// Settings of one aggregate field
#[derive(Clone)]
pub struct AggregateSettings {
    /// Element type
    pub type_key: TypeKey,
    /// Pattern the whole qualifier must match
    pub qualifier: Option<String>,
    /// Predicate beans, all of which must accept a candidate
    pub predicates: Vec<InjectionSettings>,
    /// Field shape
    pub shape: AggregateShape,
    /// A single-value field may stay empty
    pub optional: bool,
    /// A single-value field picks the first of several matches
    pub distinct: bool,
}

impl AggregateSettings {
    /// Single-value aggregate of `T`
    #[inline]
    #[must_use]
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            type_key: TypeKey::of::<T>(),
            qualifier: None,
            predicates: Vec::new(),
            shape: AggregateShape::Single,
            optional: false,
            distinct: false,
        }
    }

    /// List of every `T`
    #[inline]
    #[must_use]
    pub fn list<T: Any + ?Sized>() -> Self {
        Self::of::<T>().with_shape(AggregateShape::List)
    }

    /// Set of every distinct `T`
    #[inline]
    #[must_use]
    pub fn set<T: Any + ?Sized>() -> Self {
        Self::of::<T>().with_shape(AggregateShape::Set)
    }

    /// With shape
    #[inline]
    #[must_use]
    pub fn with_shape(mut self, shape: AggregateShape) -> Self {
        self.shape = shape;
        self
    }

    /// Only qualifiers matching `pattern`
    #[inline]
    #[must_use]
    pub fn with_qualifier(mut self, pattern: impl Into<String>) -> Self {
        self.qualifier = Some(pattern.into());
        self
    }

    /// Add a predicate bean
    #[inline]
    #[must_use]
    pub fn with_predicate(mut self, predicate: InjectionSettings) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Allow an empty single-value field
    #[inline]
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Pick the first match instead of failing on several
    #[inline]
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

impl Debug for AggregateSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateSettings")
            .field("type_key", &self.type_key)
            .field("qualifier", &self.qualifier)
            .field("predicates", &self.predicates.len())
            .field("shape", &self.shape)
            .field("optional", &self.optional)
            .field("distinct", &self.distinct)
            .finish()
    }
}
