//! Testing utilities for graft workspace
//!
//! Shared test helpers and fixtures: tracing setup, an event journal for
//! asserting lifecycle order, and plugin directories on disk.

#![allow(missing_docs)]

use graft_core::{BoxError, Descriptor, ManifestLoader};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once; `RUST_LOG` controls the filter
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Ordered record of events shared between processors and assertions
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// Closure-friendly `push` returning `Ok(())`
    pub fn note(&self, event: impl Into<String>) -> Result<(), BoxError> {
        self.push(event);
        Ok(())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Events starting with `prefix`, in order
    pub fn filtered(&self, prefix: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Manifest text declaring `implementations` for service interface `spi`
pub fn manifest(spi: &str, implementations: &[&str]) -> String {
    let mut text = String::from("[services]\n");
    let names: Vec<String> = implementations
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect();
    let _ = writeln!(text, "\"{spi}\" = [{}]", names.join(", "));
    text
}

/// Temporary plugin directory holding `(file name, content)` artifacts
pub fn plugin_dir(artifacts: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("create plugin dir");
    for (name, content) in artifacts {
        write_artifact(dir.path(), name, content);
    }
    dir
}

pub fn write_artifact(directory: &Path, name: &str, content: &str) {
    std::fs::write(directory.join(name), content).expect("write plugin artifact");
}

/// Manifest loader with `links` (implementation name, descriptor) linked
pub fn linked_loader(links: Vec<(&str, Arc<Descriptor>)>) -> Arc<ManifestLoader<Arc<Descriptor>>> {
    let loader = ManifestLoader::new();
    for (implementation, descriptor) in links {
        loader.link(implementation, descriptor);
    }
    Arc::new(loader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_keeps_order() {
        let journal = Journal::new();
        journal.push("a: one");
        journal.note("b: two").unwrap();
        journal.push("a: three");

        assert_eq!(journal.events().len(), 3);
        assert_eq!(journal.filtered("a:"), ["a: one", "a: three"]);
        journal.clear();
        assert!(journal.events().is_empty());
    }

    #[test]
    fn manifest_text() {
        assert_eq!(
            manifest("api::Greeter", &["impl::Hello", "impl::Hi"]),
            "[services]\n\"api::Greeter\" = [\"impl::Hello\", \"impl::Hi\"]\n"
        );
    }

    #[test]
    fn plugin_dir_writes_artifacts() {
        let dir = plugin_dir(&[("greeter_v1.jar", "[services]\n")]);
        assert!(dir.path().join("greeter_v1.jar").is_file());
    }
}
