//! Plugin allocations resolved through the tree's plugin cache

use graft_core::{
    Allocation, Allocator, Blueprint, Descriptor, Error, Injector, InjectorConfig, Lifecycle,
    VersionRange,
};
use graft_test_utils::{init_tracing, linked_loader, manifest, plugin_dir, Journal};
use std::path::Path;
use std::sync::Arc;

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

#[derive(Default)]
struct EnglishV1;

impl Greeter for EnglishV1 {
    fn greet(&self) -> String {
        "hello from v1".into()
    }
}

#[derive(Default)]
struct EnglishV2;

impl Greeter for EnglishV2 {
    fn greet(&self) -> String {
        "hello from v2".into()
    }
}

fn injector(config: InjectorConfig) -> Injector {
    let v1 = Descriptor::builder::<EnglishV1>()
        .default_constructor()
        .implements::<Arc<dyn Greeter>>(|greeter| greeter as Arc<dyn Greeter>)
        .build()
        .unwrap();
    let v2 = Descriptor::builder::<EnglishV2>()
        .default_constructor()
        .implements::<Arc<dyn Greeter>>(|greeter| greeter as Arc<dyn Greeter>)
        .build()
        .unwrap();

    Injector::builder()
        .config(config)
        .plugin_loader(linked_loader(vec![
            ("greeters.EnglishV1", Arc::new(v1)),
            ("greeters.EnglishV2", Arc::new(v2)),
        ]))
        .build()
        .unwrap()
}

fn greeter_plugin(directory: &Path, range: VersionRange) -> Arc<dyn Blueprint> {
    Arc::new(vec![Allocation::for_type::<Arc<dyn Greeter>>(
        Allocator::plugin(directory, "greeter", range).with_spi("greeting"),
    )])
}

fn versions() -> tempfile::TempDir {
    plugin_dir(&[
        ("greeter_v1.jar", manifest("greeting", &["greeters.EnglishV1"]).as_str()),
        ("greeter_v2.jar", manifest("greeting", &["greeters.EnglishV2"]).as_str()),
        ("other_v9.jar", manifest("greeting", &["greeters.EnglishV2"]).as_str()),
    ])
}

#[test]
fn highest_version_in_range_wins() {
    init_tracing();
    let dir = versions();
    let injector = injector(InjectorConfig::new());

    let latest = injector
        .instantiate_with::<Arc<dyn Greeter>>(&[greeter_plugin(dir.path(), VersionRange::any())])
        .unwrap();
    assert_eq!(latest.greet(), "hello from v2");

    let bounded = injector
        .instantiate_with::<Arc<dyn Greeter>>(&[greeter_plugin(
            dir.path(),
            VersionRange::between(0, 2),
        )])
        .unwrap();
    assert_eq!(bounded.greet(), "hello from v1");
}

#[test]
fn loaded_namespaces_are_cached_by_content() {
    let dir = versions();
    let injector = injector(InjectorConfig::new());
    let blueprint = greeter_plugin(dir.path(), VersionRange::any());

    let first = injector
        .instantiate_with::<Arc<dyn Greeter>>(&[Arc::clone(&blueprint)])
        .unwrap();
    let second = injector
        .instantiate_with::<Arc<dyn Greeter>>(&[blueprint])
        .unwrap();

    // independent beans, one namespace kept alive by the injector
    assert!(!Arc::ptr_eq(&first, &second));
    let stats = injector.plugins().stats();
    assert_eq!((stats.live, stats.dead), (1, 0));

    injector.destroy_all().unwrap();
    let stats = injector.plugins().stats();
    assert_eq!((stats.live, stats.dead), (0, 1));
    assert_eq!(injector.plugins().prune(), 1);
}

#[test]
fn plugin_contract_violations() {
    let dir = plugin_dir(&[
        ("greeter_v1.jar", manifest("greeting", &[]).as_str()),
        (
            "greeter_v2.jar",
            manifest("greeting", &["greeters.EnglishV1", "greeters.EnglishV2"]).as_str(),
        ),
        ("greeter_v3.jar", manifest("greeting", &["greeters.Unlinked"]).as_str()),
    ]);
    let injector = injector(InjectorConfig::new());

    for range in [
        VersionRange::between(1, 2),
        VersionRange::between(2, 3),
        VersionRange::at_least(3),
        VersionRange::at_least(4),
    ] {
        let err = injector
            .instantiate_with::<Arc<dyn Greeter>>(&[greeter_plugin(dir.path(), range)])
            .err().unwrap();
        assert!(matches!(err, Error::Plugin(_)), "unexpected error: {err}");
    }
}

#[test]
fn configured_extension_and_allocation_lifecycle() {
    let dir = plugin_dir(&[(
        "greeter_v1.plugin",
        manifest("greeting", &["greeters.EnglishV1"]).as_str(),
    )]);
    let injector = injector(InjectorConfig::new().with_artifact_extension("plugin"));
    let journal = Journal::new();

    let lifecycle = {
        let journal = journal.clone();
        Lifecycle::new().on_post_construct::<EnglishV1>(move |greeter, _| {
            journal.note(format!("constructed: {}", greeter.greet()))
        })
    };
    let blueprint: Arc<dyn Blueprint> = Arc::new(vec![Allocation::singleton(
        "greeter",
        Allocator::plugin(dir.path(), "greeter", VersionRange::any())
            .with_spi("greeting")
            .with_lifecycle(&lifecycle),
    )]);

    let greeter = injector
        .instantiate_qualified::<Arc<dyn Greeter>>("greeter", &[blueprint])
        .unwrap();
    assert_eq!(greeter.greet(), "hello from v1");
    assert_eq!(journal.events(), ["constructed: hello from v1"]);
}
