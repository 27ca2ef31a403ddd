//! graft Context Layers
//!
//! Immutable, chainable contexts a build sequence threads through the
//! object graph. The property, alias and type contexts are persistent maps
//! (`im`), so a child layer costs a structural-sharing clone.
//!
//! # Core Concepts
//!
//! - [`ResolvingContext`]: layered property values
//! - [`MappingContext`]: layered qualifier aliases, cycle-checked on insertion
//! - [`TypeContext`]: layered type-level allocator overrides
//! - [`SingletonContext`]: layered singleton pool with a live top layer
//! - [`TypeKey`] / [`Bean`]: type identity and type-erased instances
//!
//! Every context supports "merge a child layer on top of a parent without
//! mutating the parent":
//!
//! ```rust
//! use graft_context::ResolvingContext;
//!
//! let parent = ResolvingContext::with_properties([("mode", "prod")]);
//! let child = parent.merge([("mode", "test")]);
//!
//! assert_eq!(parent.get("mode"), Some("prod"));
//! assert_eq!(child.get("mode"), Some("test"));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod bean;
mod error;
mod mapping;
mod resolving;
mod singleton;
mod types;

pub use bean::{bean, downcast, same_bean, Bean, TypeKey};
pub use error::{MappingError, ResolvingError};
pub use mapping::MappingContext;
pub use resolving::{full_match, ResolvingContext};
pub use singleton::{SingletonContext, SingletonEntry};
pub use types::TypeContext;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
