//! Allocations and blueprints
//!
//! An [`Allocation`] overrides what the engine would otherwise construct: a
//! qualified singleton, an independent bean of some type, a property value or
//! a qualifier alias. A [`Blueprint`] is a declarative source producing
//! allocations; blueprints are folded into an `AllocationRegistry` at the
//! start of every sequence and for every injection point extension.

use crate::callback::Callback;
use crate::error::BoxError;
use crate::lifecycle::Lifecycle;
use graft_context::{bean, Bean, TypeKey};
use graft_plugin::VersionRange;
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

/// Factory behind a provider allocation
pub type ProviderFn = Arc<dyn Fn(&mut Callback<'_>) -> Result<Bean, BoxError> + Send + Sync>;

fn provider_fn<F>(f: F) -> ProviderFn
where
    F: Fn(&mut Callback<'_>) -> Result<Bean, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Strategy producing a value for a type or qualifier
#[derive(Clone)]
pub enum Allocator {
    /// A ready-made instance
    Instance {
        /// The instance
        bean: Bean,
        /// Its concrete type
        type_key: TypeKey,
    },
    /// A factory invoked with the scoped callback
    Provider {
        /// Type the factory produces
        type_key: TypeKey,
        /// The factory
        factory: ProviderFn,
    },
    /// Construction of another (assignable) type
    Type {
        /// Type to construct
        type_key: TypeKey,
        /// Processors added to the descriptor's
        lifecycle: Lifecycle,
    },
    /// Construction of the single implementation a plugin artifact provides
    Plugin {
        /// Artifact directory
        directory: PathBuf,
        /// Plugin id
        id: String,
        /// Accepted versions
        range: VersionRange,
        /// Service interface name; the requested type's name when `None`
        spi: Option<String>,
        /// Processors added to the implementation descriptor's
        lifecycle: Lifecycle,
    },
}

impl Allocator {
    /// Ready-made instance
    #[must_use]
    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        Self::Instance {
            bean: bean(value),
            type_key: TypeKey::of::<T>(),
        }
    }

    /// Already shared instance
    #[must_use]
    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self::Instance {
            bean: value,
            type_key: TypeKey::of::<T>(),
        }
    }

    /// Factory producing a `T`
    #[must_use]
    pub fn provider<T: Any + Send + Sync>(
        f: impl Fn(&mut Callback<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::Provider {
            type_key: TypeKey::of::<T>(),
            factory: provider_fn(move |callback| f(callback).map(bean)),
        }
    }

    /// Construct a `U` instead
    #[must_use]
    pub fn to_type<U: Any + Send + Sync>() -> Self {
        Self::Type {
            type_key: TypeKey::of::<U>(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Construct the implementation plugin `id` provides within `range`
    #[must_use]
    pub fn plugin(directory: impl Into<PathBuf>, id: impl Into<String>, range: VersionRange) -> Self {
        Self::Plugin {
            directory: directory.into(),
            id: id.into(),
            range,
            spi: None,
            lifecycle: Lifecycle::new(),
        }
    }

    /// With service interface name (plugin allocators only)
    #[must_use]
    pub fn with_spi(mut self, name: impl Into<String>) -> Self {
        if let Self::Plugin { spi, .. } = &mut self {
            *spi = Some(name.into());
        }
        self
    }

    /// With extra processors (type and plugin allocators only)
    #[must_use]
    pub fn with_lifecycle(mut self, extra: &Lifecycle) -> Self {
        if let Self::Type { lifecycle, .. } | Self::Plugin { lifecycle, .. } = &mut self {
            *lifecycle = lifecycle.chain(extra);
        }
        self
    }

    /// Short name of the strategy, for diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Instance { .. } => "instance",
            Self::Provider { .. } => "provider",
            Self::Type { .. } => "type",
            Self::Plugin { .. } => "plugin",
        }
    }
}

impl Debug for Allocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance { type_key, .. } => f.debug_struct("Instance").field("type_key", type_key).finish(),
            Self::Provider { type_key, .. } => f.debug_struct("Provider").field("type_key", type_key).finish(),
            Self::Type { type_key, lifecycle } => f
                .debug_struct("Type")
                .field("type_key", type_key)
                .field("lifecycle", lifecycle)
                .finish(),
            Self::Plugin {
                directory,
                id,
                range,
                spi,
                ..
            } => f
                .debug_struct("Plugin")
                .field("directory", directory)
                .field("id", id)
                .field("range", &range.to_string())
                .field("spi", spi)
                .finish(),
        }
    }
}

/// One declarative override
#[derive(Debug, Clone)]
pub enum Allocation {
    /// Scoped singleton under a qualifier
    Singleton {
        /// Qualifier
        qualifier: String,
        /// Strategy
        allocator: Allocator,
    },
    /// Independent beans of a type
    Type {
        /// Overridden type
        type_key: TypeKey,
        /// Strategy
        allocator: Allocator,
    },
    /// Property value
    Property {
        /// Property key
        key: String,
        /// Value
        value: String,
    },
    /// Qualifier alias
    Alias {
        /// Aliased qualifier
        qualifier: String,
        /// Qualifier it stands for
        target: String,
    },
}

impl Allocation {
    /// Singleton allocation
    #[must_use]
    pub fn singleton(qualifier: impl Into<String>, allocator: Allocator) -> Self {
        Self::Singleton {
            qualifier: qualifier.into(),
            allocator,
        }
    }

    /// Type allocation for independent beans of `T`
    #[must_use]
    pub fn for_type<T: Any + ?Sized>(allocator: Allocator) -> Self {
        Self::Type {
            type_key: TypeKey::of::<T>(),
            allocator,
        }
    }

    /// Property allocation
    #[must_use]
    pub fn property(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Property {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Alias allocation
    #[must_use]
    pub fn alias(qualifier: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Alias {
            qualifier: qualifier.into(),
            target: target.into(),
        }
    }
}

/// Declarative source of allocations
pub trait Blueprint: Send + Sync {
    /// Produce this blueprint's allocations, in order
    ///
    /// # Errors
    /// Any error aborts the sequence that folds this blueprint
    fn allocations(&self) -> Result<Vec<Allocation>, BoxError>;
}

impl Blueprint for Vec<Allocation> {
    fn allocations(&self) -> Result<Vec<Allocation>, BoxError> {
        Ok(self.clone())
    }
}

/// Blueprint computed by a closure
pub struct FnBlueprint<F>(F);

impl<F> FnBlueprint<F>
where
    F: Fn() -> Result<Vec<Allocation>, BoxError> + Send + Sync,
{
    /// Wrap `f`
    #[inline]
    #[must_use]
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Blueprint for FnBlueprint<F>
where
    F: Fn() -> Result<Vec<Allocation>, BoxError> + Send + Sync,
{
    fn allocations(&self) -> Result<Vec<Allocation>, BoxError> {
        (self.0)()
    }
}
