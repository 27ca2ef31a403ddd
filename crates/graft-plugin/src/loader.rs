//! Plugin loader abstraction
//!
//! A [`PluginLoader`] turns artifact bytes into an isolated
//! [`PluginNamespace`]: the set of service providers the artifact declares and
//! the handles their implementations resolve to. The loader is the only
//! platform-specific piece; version selection and caching do not depend on it.
//!
//! [`ManifestLoader`] is the in-process implementation: artifacts are TOML
//! manifests declaring implementation names per service, and implementation
//! names are linked to handles ahead of time.

use crate::artifact::PluginDescriptor;
use crate::error::PluginError;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// An isolated view of one loaded artifact
pub trait PluginNamespace<H>: Send + Sync {
    /// Implementation names declared for service interface `spi`, in declaration order
    fn service_providers(&self, spi: &str) -> Vec<String>;

    /// Handle for a declared implementation
    fn handle(&self, implementation: &str) -> Option<H>;
}

/// Loads artifacts into namespaces
pub trait PluginLoader<H>: Send + Sync {
    /// Load the artifact described by `descriptor` from its raw `bytes`
    ///
    /// # Errors
    /// `PluginError::MalformedArtifact` if the content cannot be interpreted
    fn load(
        &self,
        descriptor: &PluginDescriptor,
        bytes: &[u8],
    ) -> Result<Arc<dyn PluginNamespace<H>>, PluginError>;
}

/// On-disk manifest format read by [`ManifestLoader`]
///
/// ```toml
/// [services]
/// "my_app::Greeter" = ["greeter_plugin::Hello"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Service interface name -> implementation names
    #[serde(default)]
    pub services: BTreeMap<String, Vec<String>>,
}

/// In-process loader linking manifest implementation names to handles
pub struct ManifestLoader<H> {
    linked: DashMap<String, H>,
}

impl<H: Clone + Send + Sync + 'static> ManifestLoader<H> {
    /// Create loader with no linked implementations
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            linked: DashMap::new(),
        }
    }

    /// Link `implementation` to `handle`
    ///
    /// Returns the previously linked handle, if any. Artifacts loaded before
    /// the call keep the handle they were loaded with.
    pub fn link(&self, implementation: impl Into<String>, handle: H) -> Option<H> {
        self.linked.insert(implementation.into(), handle)
    }

    /// Check if `implementation` is linked
    #[inline]
    #[must_use]
    pub fn is_linked(&self, implementation: &str) -> bool {
        self.linked.contains_key(implementation)
    }
}

impl<H: Clone + Send + Sync + 'static> Default for ManifestLoader<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Debug for ManifestLoader<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestLoader")
            .field("linked", &self.linked.len())
            .finish()
    }
}

impl<H: Clone + Send + Sync + 'static> PluginLoader<H> for ManifestLoader<H> {
    fn load(
        &self,
        descriptor: &PluginDescriptor,
        bytes: &[u8],
    ) -> Result<Arc<dyn PluginNamespace<H>>, PluginError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PluginError::malformed(&descriptor.path, e.to_string()))?;
        let manifest: Manifest = toml::from_str(text)
            .map_err(|e| PluginError::malformed(&descriptor.path, e.to_string()))?;

        // snapshot: later links do not leak into an already loaded namespace
        let handles = manifest
            .services
            .values()
            .flatten()
            .filter_map(|name| {
                self.linked
                    .get(name)
                    .map(|handle| (name.clone(), handle.value().clone()))
            })
            .collect();

        Ok(Arc::new(ManifestNamespace {
            services: manifest.services,
            handles,
        }))
    }
}

/// Namespace produced by [`ManifestLoader`]
struct ManifestNamespace<H> {
    services: BTreeMap<String, Vec<String>>,
    handles: BTreeMap<String, H>,
}

impl<H: Clone + Send + Sync> PluginNamespace<H> for ManifestNamespace<H> {
    fn service_providers(&self, spi: &str) -> Vec<String> {
        self.services.get(spi).cloned().unwrap_or_default()
    }

    fn handle(&self, implementation: &str) -> Option<H> {
        self.handles.get(implementation).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::version::Version;
    use std::path::PathBuf;

    fn descriptor() -> PluginDescriptor {
        PluginDescriptor {
            directory: PathBuf::from("plugins"),
            id: "greeter".into(),
            version: Version::zero(),
            path: PathBuf::from("plugins/greeter.jar"),
            checksum: Checksum::compute(b""),
        }
    }

    #[test]
    fn load_manifest() {
        let loader = ManifestLoader::new();
        loader.link("impl.Hello", 7_u32);

        let manifest = br#"
            [services]
            "api.Greeter" = ["impl.Hello", "impl.Missing"]
        "#;
        let namespace = loader.load(&descriptor(), manifest).unwrap();

        assert_eq!(
            namespace.service_providers("api.Greeter"),
            vec!["impl.Hello".to_string(), "impl.Missing".to_string()]
        );
        assert!(namespace.service_providers("api.Other").is_empty());
        assert_eq!(namespace.handle("impl.Hello"), Some(7));
        assert_eq!(namespace.handle("impl.Missing"), None);
    }

    #[test]
    fn namespace_is_a_snapshot() {
        let loader = ManifestLoader::new();
        loader.link("impl.Hello", 1_u32);
        let namespace = loader
            .load(&descriptor(), b"[services]\n\"api\" = [\"impl.Hello\"]\n")
            .unwrap();

        loader.link("impl.Hello", 2);
        assert_eq!(namespace.handle("impl.Hello"), Some(1));
    }

    #[test]
    fn malformed_manifest() {
        let loader: ManifestLoader<u32> = ManifestLoader::new();
        let err = loader.load(&descriptor(), b"[services\n").err().unwrap();
        assert!(matches!(err, PluginError::MalformedArtifact { .. }));
    }
}
