//! graft Core - Dependency Injection Engine
//!
//! Builds fully wired object graphs from explicitly registered descriptors:
//! - Resolves constructor parameters and fields from properties and beans
//! - Scopes singletons per build sequence or per injector
//! - Detects constructor cycles and illegal nesting
//! - Runs the five-phase bean lifecycle, tearing down on failure
//! - Aggregates singletons into collection fields
//! - Delegates to allocations: instances, providers, types and plugins
//!
//! # Example
//!
//! ```rust
//! use graft_core::prelude::*;
//! use std::sync::Arc;
//!
//! struct Repository {
//!     url: String,
//! }
//!
//! struct Service {
//!     repository: Arc<Repository>,
//! }
//!
//! # fn main() -> graft_core::Result<()> {
//! let injector = Injector::builder().property("db.url", "mem://").build()?;
//! let descriptors = injector.descriptors();
//! descriptors.describe(
//!     Descriptor::builder::<Repository>()
//!         .param(Param::resolvable("url", ResolvingSettings::new("db.url").forced()))
//!         .constructor(|args| Ok(Repository { url: args.require(0)? })),
//! )?;
//! descriptors.describe(
//!     Descriptor::builder::<Service>()
//!         .param(Param::injectable("repository", InjectionSettings::qualified::<Repository>("main")))
//!         .constructor(|args| Ok(Service { repository: args.bean(0)? })),
//! )?;
//!
//! let service = injector.instantiate::<Service>()?;
//! assert_eq!(service.repository.url, "mem://");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod aggregation;
mod allocation;
mod args;
mod callback;
mod chain;
mod config;
mod descriptor;
mod engine;
mod error;
mod injector;
mod lifecycle;
mod lock;
mod registry;
mod settings;

pub use aggregation::Aggregate;
pub use allocation::{Allocation, Allocator, Blueprint, FnBlueprint, ProviderFn};
pub use args::{ArgumentError, Args};
pub use callback::Callback;
pub use config::{AggregationConfig, InjectorConfig, PluginConfig};
pub use descriptor::{Descriptor, DescriptorBuilder, DescriptorRegistry, Param, ParamRole};
pub use error::{
    AggregationError, AllocationKind, BoxError, ConfigError, DescriptorError, Error,
    InjectionError, Phase, ProcessorError, Result,
};
pub use injector::{Injector, InjectorBuilder};
pub use lifecycle::{DestroyProcessor, Lifecycle, PostProcessor, PreConstruct, ProcessorTypeMismatch};
pub use lock::TreeToken;
pub use registry::AllocationRegistry;
pub use settings::{
    AggregateSettings, AggregateShape, InjectionMode, InjectionSettings, ResolvingSettings,
    SingletonMode, SingletonPredicate,
};

pub use graft_context::{bean, downcast, same_bean, Bean, SingletonEntry, TypeKey};
pub use graft_plugin::{ManifestLoader, PluginCache, VersionRange};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for describing types and building graphs
    pub use crate::{
        bean, Aggregate, AggregateSettings, Allocation, Allocator, Args, Bean, BoxError,
        Callback, Descriptor, InjectionSettings, Injector, InjectorConfig, Lifecycle, Param,
        ResolvingSettings, SingletonPredicate, TypeKey,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
