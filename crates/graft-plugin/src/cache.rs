//! Content-addressed plugin cache
//!
//! [`PluginCache`] resolves a plugin id and version range against a directory,
//! loads the chosen artifact through a [`PluginLoader`] and keeps the resulting
//! namespace keyed by the artifact checksum. Entries are held weakly: once no
//! [`Pluggable`] references a namespace it can be reclaimed.

use crate::artifact::{scan, select, ArtifactPattern, PluginDescriptor};
use crate::checksum::Checksum;
use crate::error::PluginError;
use crate::loader::{PluginLoader, PluginNamespace};
use crate::version::VersionRange;
use dashmap::DashMap;
use std::fmt::{self, Debug, Formatter};
use std::path::Path;
use std::sync::{Arc, Weak};

/// Default artifact file extension
pub const DEFAULT_EXTENSION: &str = "jar";

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries whose namespace is still referenced
    pub live: usize,
    /// Entries whose namespace has been dropped but not pruned yet
    pub dead: usize,
}

/// A resolved service implementation from a plugin artifact
pub struct Pluggable<H> {
    descriptor: PluginDescriptor,
    implementation: String,
    handle: H,
    namespace: Arc<dyn PluginNamespace<H>>,
}

impl<H> Pluggable<H> {
    /// Artifact the implementation came from
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Implementation name as declared by the artifact
    #[inline]
    #[must_use]
    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    /// Handle usable for construction
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Namespace the implementation lives in
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &Arc<dyn PluginNamespace<H>> {
        &self.namespace
    }
}

impl<H> Debug for Pluggable<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pluggable")
            .field("descriptor", &self.descriptor)
            .field("implementation", &self.implementation)
            .finish_non_exhaustive()
    }
}

/// Weak, checksum-keyed cache of loaded plugin namespaces
///
/// Safe for concurrent lookups: population is idempotent per checksum, so two
/// racing loads of the same artifact waste work but agree on the result.
pub struct PluginCache<H> {
    loader: Arc<dyn PluginLoader<H>>,
    extension: String,
    entries: DashMap<Checksum, Weak<dyn PluginNamespace<H>>>,
}

impl<H: 'static> PluginCache<H> {
    /// Create cache over `loader` with the default artifact extension
    #[inline]
    #[must_use]
    pub fn new(loader: Arc<dyn PluginLoader<H>>) -> Self {
        Self::with_extension(loader, DEFAULT_EXTENSION)
    }

    /// Create cache over `loader` matching artifacts with `extension`
    #[must_use]
    pub fn with_extension(loader: Arc<dyn PluginLoader<H>>, extension: impl Into<String>) -> Self {
        Self {
            loader,
            extension: extension.into(),
            entries: DashMap::new(),
        }
    }

    /// Artifact extension this cache matches
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Resolve the single implementation of `spi` in plugin `id`
    ///
    /// Picks the highest artifact version inside `range`, loads it (or reuses
    /// the cached namespace for its checksum) and checks that exactly one
    /// implementation of `spi` is declared.
    ///
    /// # Errors
    /// - `PluginError::DirectoryNotFound` / `PluginError::Io` for filesystem failures
    /// - `PluginError::NoMatchingArtifact` if no version lies in `range`
    /// - `PluginError::NoProvider` / `PluginError::AmbiguousProvider` for SPI contract violations
    /// - `PluginError::NotLinked` if the implementation has no handle
    /// - any error from the loader
    pub fn find_pluggable(
        &self,
        directory: &Path,
        id: &str,
        spi: &str,
        range: &VersionRange,
    ) -> Result<Pluggable<H>, PluginError> {
        let pattern = ArtifactPattern::new(id, &self.extension)?;
        let candidates = scan(directory, &pattern)?;
        let chosen = select(candidates, range).ok_or_else(|| PluginError::NoMatchingArtifact {
            directory: directory.to_path_buf(),
            id: id.to_string(),
            range: range.to_string(),
        })?;

        let bytes =
            std::fs::read(&chosen.path).map_err(|e| PluginError::io_error(&chosen.path, e))?;
        let descriptor = PluginDescriptor {
            directory: directory.to_path_buf(),
            id: id.to_string(),
            version: chosen.version,
            path: chosen.path,
            checksum: Checksum::compute(&bytes),
        };
        tracing::info!(
            plugin = id,
            version = %descriptor.version,
            checksum = %descriptor.checksum.short(),
            "plugin artifact selected"
        );

        let namespace = self.namespace_for(&descriptor, &bytes)?;

        let mut providers = namespace.service_providers(spi);
        let implementation = match providers.len() {
            0 => {
                return Err(PluginError::NoProvider {
                    artifact: descriptor.file_name(),
                    spi: spi.to_string(),
                })
            }
            1 => providers.remove(0),
            _ => {
                return Err(PluginError::AmbiguousProvider {
                    artifact: descriptor.file_name(),
                    spi: spi.to_string(),
                    providers,
                })
            }
        };

        let handle = namespace
            .handle(&implementation)
            .ok_or_else(|| PluginError::NotLinked {
                artifact: descriptor.file_name(),
                implementation: implementation.clone(),
            })?;

        Ok(Pluggable {
            descriptor,
            implementation,
            handle,
            namespace,
        })
    }

    /// Cached namespace for `descriptor`, loading it on a miss
    fn namespace_for(
        &self,
        descriptor: &PluginDescriptor,
        bytes: &[u8],
    ) -> Result<Arc<dyn PluginNamespace<H>>, PluginError> {
        if let Some(namespace) = self.lookup(&descriptor.checksum) {
            tracing::debug!(checksum = %descriptor.checksum.short(), "plugin cache hit");
            return Ok(namespace);
        }

        let loaded = self.loader.load(descriptor, bytes)?;

        // another caller may have populated the slot while we were loading
        let mut slot = self
            .entries
            .entry(descriptor.checksum)
            .or_insert_with(|| Weak::<DeadNamespace>::new() as Weak<dyn PluginNamespace<H>>);
        if let Some(existing) = slot.upgrade() {
            return Ok(existing);
        }
        *slot = Arc::downgrade(&loaded);
        tracing::info!(
            plugin = %descriptor.id,
            checksum = %descriptor.checksum.short(),
            "plugin namespace cached"
        );
        Ok(loaded)
    }

    /// Live cached namespace for `checksum`, pruning a dead entry
    #[must_use]
    pub fn lookup(&self, checksum: &Checksum) -> Option<Arc<dyn PluginNamespace<H>>> {
        let live = self.entries.get(checksum).and_then(|weak| weak.upgrade());
        if live.is_none() {
            self.entries
                .remove_if(checksum, |_, weak| weak.strong_count() == 0);
        }
        live
    }

    /// Drop every entry whose namespace is no longer referenced
    ///
    /// Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        before - self.entries.len()
    }

    /// Cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in &self.entries {
            if entry.value().strong_count() > 0 {
                stats.live += 1;
            } else {
                stats.dead += 1;
            }
        }
        stats
    }
}

impl<H> Debug for PluginCache<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCache")
            .field("extension", &self.extension)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// Placeholder type for creating an empty `Weak<dyn PluginNamespace<H>>`
struct DeadNamespace;

impl<H> PluginNamespace<H> for DeadNamespace {
    fn service_providers(&self, _spi: &str) -> Vec<String> {
        Vec::new()
    }

    fn handle(&self, _implementation: &str) -> Option<H> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ManifestLoader;
    use std::fs;

    fn manifest(implementation: &str) -> String {
        format!("[services]\n\"api.Greeter\" = [\"{implementation}\"]\n")
    }

    fn cache_with(links: &[(&str, u32)]) -> PluginCache<u32> {
        let loader = ManifestLoader::new();
        for (name, handle) in links {
            loader.link(*name, *handle);
        }
        PluginCache::new(Arc::new(loader))
    }

    #[test]
    fn selects_highest_version_in_range() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("greeter_v1.jar"), manifest("impl.V1")).unwrap();
        fs::write(dir.path().join("greeter_v2.jar"), manifest("impl.V2")).unwrap();
        let cache = cache_with(&[("impl.V1", 1), ("impl.V2", 2)]);

        let newest = cache
            .find_pluggable(dir.path(), "greeter", "api.Greeter", &VersionRange::any())
            .unwrap();
        assert_eq!(*newest.handle(), 2);

        let older = cache
            .find_pluggable(dir.path(), "greeter", "api.Greeter", &VersionRange::between(0, 2))
            .unwrap();
        assert_eq!(*older.handle(), 1);
        assert_eq!(older.implementation(), "impl.V1");
    }

    #[test]
    fn same_checksum_shares_namespace() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("greeter.jar"), manifest("impl.V1")).unwrap();
        let cache = cache_with(&[("impl.V1", 1)]);

        let a = cache
            .find_pluggable(dir.path(), "greeter", "api.Greeter", &VersionRange::any())
            .unwrap();
        let b = cache
            .find_pluggable(dir.path(), "greeter", "api.Greeter", &VersionRange::any())
            .unwrap();
        assert!(Arc::ptr_eq(a.namespace(), b.namespace()));
        assert_eq!(cache.stats(), CacheStats { live: 1, dead: 0 });
    }

    #[test]
    fn republished_artifact_gets_new_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greeter.jar");
        fs::write(&path, manifest("impl.V1")).unwrap();
        let cache = cache_with(&[("impl.V1", 1), ("impl.V2", 2)]);

        let first = cache
            .find_pluggable(dir.path(), "greeter", "api.Greeter", &VersionRange::any())
            .unwrap();
        fs::write(&path, manifest("impl.V2")).unwrap();
        let second = cache
            .find_pluggable(dir.path(), "greeter", "api.Greeter", &VersionRange::any())
            .unwrap();

        assert_ne!(first.descriptor().checksum, second.descriptor().checksum);
        assert_eq!(*second.handle(), 2);
    }

    #[test]
    fn unused_entries_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("greeter.jar"), manifest("impl.V1")).unwrap();
        let cache = cache_with(&[("impl.V1", 1)]);

        let pluggable = cache
            .find_pluggable(dir.path(), "greeter", "api.Greeter", &VersionRange::any())
            .unwrap();
        drop(pluggable);

        assert_eq!(cache.stats(), CacheStats { live: 0, dead: 1 });
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn spi_contract_violations() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("none.jar"), "[services]\n").unwrap();
        fs::write(
            dir.path().join("many.jar"),
            "[services]\n\"api.Greeter\" = [\"impl.A\", \"impl.B\"]\n",
        )
        .unwrap();
        fs::write(dir.path().join("unlinked.jar"), manifest("impl.Nowhere")).unwrap();
        let cache = cache_with(&[("impl.A", 1), ("impl.B", 2)]);
        let any = VersionRange::any();

        let none = cache.find_pluggable(dir.path(), "none", "api.Greeter", &any);
        assert!(matches!(none, Err(PluginError::NoProvider { .. })));

        let many = cache.find_pluggable(dir.path(), "many", "api.Greeter", &any);
        assert!(matches!(many, Err(PluginError::AmbiguousProvider { .. })));

        let unlinked = cache.find_pluggable(dir.path(), "unlinked", "api.Greeter", &any);
        assert!(matches!(unlinked, Err(PluginError::NotLinked { .. })));
    }

    #[test]
    fn no_matching_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("greeter_v3.jar"), manifest("impl.V1")).unwrap();
        let cache = cache_with(&[("impl.V1", 1)]);

        let result =
            cache.find_pluggable(dir.path(), "greeter", "api.Greeter", &VersionRange::between(0, 2));
        assert!(matches!(result, Err(PluginError::NoMatchingArtifact { .. })));
    }
}
