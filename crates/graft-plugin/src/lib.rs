//! graft Plugin Resolution
//!
//! Locates versioned plugin artifacts in a directory, loads each distinct
//! artifact content once into an isolated namespace and hands out the single
//! implementation an artifact declares for a service interface.
//!
//! # Core Concepts
//!
//! - [`Version`] / [`VersionRange`]: dotted versions and half-open ranges
//! - [`ArtifactPattern`]: `<id>[_v<version>].<ext>` file name matching
//! - [`Checksum`]: Blake3 content hash, the cache key
//! - [`PluginLoader`] / [`PluginNamespace`]: the loading seam
//! - [`PluginCache`]: weak, checksum-keyed namespace cache
//!
//! # Example
//!
//! ```rust,no_run
//! use graft_plugin::{ManifestLoader, PluginCache, VersionRange};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let loader = ManifestLoader::new();
//! loader.link("greeter_plugin::Hello", "hello");
//!
//! let cache = PluginCache::new(Arc::new(loader));
//! let pluggable = cache.find_pluggable(
//!     Path::new("plugins"),
//!     "greeter",
//!     "my_app::Greeter",
//!     &VersionRange::between(1, 2),
//! )?;
//! assert_eq!(*pluggable.handle(), "hello");
//! # Ok::<(), graft_plugin::PluginError>(())
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod artifact;
mod cache;
mod checksum;
mod error;
mod loader;
mod version;

pub use artifact::{scan, select, ArtifactCandidate, ArtifactPattern, PluginDescriptor};
pub use cache::{CacheStats, Pluggable, PluginCache, DEFAULT_EXTENSION};
pub use checksum::Checksum;
pub use error::PluginError;
pub use loader::{Manifest, ManifestLoader, PluginLoader, PluginNamespace};
pub use version::{Version, VersionRange};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
