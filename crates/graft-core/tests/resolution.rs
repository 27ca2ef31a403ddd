//! Properties, injection modes, allocations and providers

use graft_core::{
    Allocation, Allocator, Blueprint, Descriptor, Error, InjectionError, InjectionSettings,
    Injector, Param, ResolvingSettings,
};
use graft_test_utils::init_tracing;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Conn {
    origin: String,
}

struct Optional {
    conn: Option<Arc<Conn>>,
}

#[derive(Default)]
struct Wired {
    conn: Mutex<Option<Arc<Conn>>>,
    calls: AtomicUsize,
    timeout: Mutex<Option<String>>,
}

fn injector_with(allocations: Vec<Allocation>) -> Injector {
    let mut builder = Injector::builder();
    for allocation in allocations {
        builder = builder.allocation(allocation);
    }
    let injector = builder.build().unwrap();
    injector
        .descriptors()
        .describe(
            Descriptor::builder::<Conn>()
                .param(Param::resolvable(
                    "origin",
                    ResolvingSettings::new("conn.origin").with_default("built"),
                ))
                .constructor(|args| Ok(Conn { origin: args.require(0)? })),
        )
        .unwrap();
    injector
}

fn describe_optional(injector: &Injector) {
    injector
        .descriptors()
        .describe(
            Descriptor::builder::<Optional>()
                .param(Param::injectable(
                    "conn",
                    InjectionSettings::qualified::<Conn>("opt").explicit(),
                ))
                .constructor(|args| Ok(Optional { conn: args.optional_bean(0)? })),
        )
        .unwrap();
}

fn describe_wired(injector: &Injector, settings: InjectionSettings) {
    injector
        .descriptors()
        .describe(
            Descriptor::builder::<Wired>()
                .default_constructor()
                .injectable_field::<Conn>("conn", settings, |wired, conn| {
                    wired.calls.fetch_add(1, Ordering::SeqCst);
                    *wired.conn.lock().unwrap() = conn;
                    Ok(())
                })
                .resolvable_field(
                    "timeout",
                    ResolvingSettings::new("wired.timeout").matching(r"\d+"),
                    |wired, value| {
                        *wired.timeout.lock().unwrap() = Some(value.to_string());
                        Ok(())
                    },
                ),
        )
        .unwrap();
}

#[test]
fn properties_feed_parameters() {
    init_tracing();
    let injector = injector_with(vec![Allocation::property("conn.origin", "configured")]);
    let conn = injector.instantiate::<Conn>().unwrap();
    assert_eq!(conn.origin, "configured");
}

#[test]
fn sequence_properties_override_base_properties() {
    let injector = injector_with(vec![Allocation::property("conn.origin", "base")]);
    let overrides: Arc<dyn Blueprint> =
        Arc::new(vec![Allocation::property("conn.origin", "sequence")]);

    let conn = injector.instantiate_with::<Conn>(&[overrides]).unwrap();
    assert_eq!(conn.origin, "sequence");
    assert_eq!(injector.instantiate::<Conn>().unwrap().origin, "base");
}

#[test]
fn forced_and_mismatching_properties_fail() {
    #[derive(Debug)]
    struct Strict;

    let injector = injector_with(Vec::new());
    injector
        .descriptors()
        .describe(
            Descriptor::builder::<Strict>()
                .param(Param::resolvable(
                    "port",
                    ResolvingSettings::new("strict.port").matching(r"\d+").forced(),
                ))
                .constructor(|_| Ok(Strict)),
        )
        .unwrap();

    let err = injector.instantiate::<Strict>().unwrap_err();
    assert!(matches!(err, Error::Resolving(_)));

    let bad: Arc<dyn Blueprint> = Arc::new(vec![Allocation::property("strict.port", "eighty")]);
    let err = injector.instantiate_with::<Strict>(&[bad]).unwrap_err();
    assert!(matches!(err, Error::Resolving(ref e) if e.key() == "strict.port"));

    let good: Arc<dyn Blueprint> = Arc::new(vec![Allocation::property("strict.port", "80")]);
    assert!(injector.instantiate_with::<Strict>(&[good]).is_ok());
}

#[test]
fn explicit_dependencies_need_an_allocation() {
    let injector = injector_with(Vec::new());
    describe_optional(&injector);
    assert!(injector.instantiate::<Optional>().unwrap().conn.is_none());

    let injector = injector_with(vec![Allocation::singleton(
        "opt",
        Allocator::instance(Conn { origin: "allocated".into() }),
    )]);
    describe_optional(&injector);
    let optional = injector.instantiate::<Optional>().unwrap();
    assert_eq!(optional.conn.as_ref().unwrap().origin, "allocated");
}

#[test]
fn absent_field_keeps_its_value_unless_overwritten_with_null() {
    let injector = injector_with(Vec::new());
    describe_wired(&injector, InjectionSettings::qualified::<Conn>("missing").explicit());
    let wired = injector.instantiate::<Wired>().unwrap();
    assert_eq!(wired.calls.load(Ordering::SeqCst), 0);
    assert!(wired.timeout.lock().unwrap().is_none());

    let injector = injector_with(vec![Allocation::property("wired.timeout", "30")]);
    describe_wired(
        &injector,
        InjectionSettings::qualified::<Conn>("missing")
            .explicit()
            .overwrite_with_null(),
    );
    let wired = injector.instantiate::<Wired>().unwrap();
    assert_eq!(wired.calls.load(Ordering::SeqCst), 1);
    assert!(wired.conn.lock().unwrap().is_none());
    assert_eq!(wired.timeout.lock().unwrap().as_deref(), Some("30"));
}

#[test]
fn type_allocations_replace_independent_beans() {
    let injector = injector_with(vec![Allocation::for_type::<Conn>(Allocator::provider(|_| {
        Ok(Conn { origin: "provided".into() })
    }))]);
    assert_eq!(injector.instantiate::<Conn>().unwrap().origin, "provided");
}

#[test]
fn providers_run_once_per_singleton_and_see_the_sequence() {
    struct Pair {
        first: Arc<Conn>,
        second: Arc<Conn>,
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let injector = injector_with(vec![
        Allocation::property("conn.origin", "callback"),
        Allocation::singleton(
            "db",
            Allocator::provider(move |callback| {
                counter.fetch_add(1, Ordering::SeqCst);
                let origin = callback.resolve_property(&ResolvingSettings::new("conn.origin"))?;
                // nested construction joins the running sequence
                let inner = callback.instantiate::<Conn>()?;
                Ok(Conn {
                    origin: format!("{}+{}", origin.unwrap_or_default(), inner.origin),
                })
            }),
        ),
    ]);
    injector
        .descriptors()
        .describe(
            Descriptor::builder::<Pair>()
                .param(Param::injectable("first", InjectionSettings::qualified::<Conn>("db")))
                .param(Param::injectable("second", InjectionSettings::qualified::<Conn>("db")))
                .constructor(|args| {
                    Ok(Pair {
                        first: args.bean(0)?,
                        second: args.bean(1)?,
                    })
                }),
        )
        .unwrap();

    let pair = injector.instantiate::<Pair>().unwrap();
    assert!(Arc::ptr_eq(&pair.first, &pair.second));
    assert_eq!(pair.first.origin, "callback+callback");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_provider_is_reported() {
    let injector = injector_with(vec![Allocation::singleton(
        "db",
        Allocator::provider::<Conn>(|_| Err("connection refused".into())),
    )]);

    let err = injector.instantiate_qualified::<Conn>("db", &[]).unwrap_err();
    assert!(matches!(
        err,
        Error::Injection(InjectionError::ProviderFailed { .. })
    ));
}

#[test]
fn extensions_scope_allocations_to_one_injection_point() {
    struct Scoped {
        conn: Arc<Conn>,
    }

    let injector = injector_with(Vec::new());
    injector
        .descriptors()
        .describe(
            Descriptor::builder::<Scoped>()
                .param(Param::injectable(
                    "conn",
                    InjectionSettings::of::<Conn>()
                        .with_extension(vec![Allocation::property("conn.origin", "extended")]),
                ))
                .constructor(|args| Ok(Scoped { conn: args.bean(0)? })),
        )
        .unwrap();

    let scoped = injector.instantiate::<Scoped>().unwrap();
    assert_eq!(scoped.conn.origin, "extended");
    assert_eq!(injector.instantiate::<Conn>().unwrap().origin, "built");
}

#[test]
fn context_sensitive_types_are_never_constructed() {
    #[derive(Debug)]
    struct Request;

    let injector = injector_with(Vec::new());
    injector
        .descriptors()
        .describe(Descriptor::builder::<Request>().context_sensitive())
        .unwrap();

    let err = injector.instantiate::<Request>().unwrap_err();
    assert!(matches!(
        err,
        Error::Injection(InjectionError::ContextSensitive(_))
    ));

    let supplied: Arc<dyn Blueprint> = Arc::new(vec![Allocation::for_type::<Request>(
        Allocator::instance(Request),
    )]);
    assert!(injector.instantiate_with::<Request>(&[supplied]).is_ok());
}
