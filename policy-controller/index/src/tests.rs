use crate::{store, PushContext, PushContextBuilder, Scope};
use futures::prelude::*;
use mesh_policy_controller_core::{HostMatch, Proxy, ProxyKind, ResourceId, Service};
use std::sync::Arc;
use tokio::time;


/// Stands in for a destination rule resource.
#[derive(Debug, PartialEq, Eq)]
struct Rule(&'static str);

struct TestConfig {
    local: Arc<Rule>,
    target: Arc<Rule>,
    all: Arc<Rule>,
    proxy: Proxy,
    service: Service,
}

fn host(s: &str) -> HostMatch {
    s.parse().expect("host must parse")
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            local: Arc::new(Rule("local")),
            target: Arc::new(Rule("target")),
            all: Arc::new(Rule("all")),
            proxy: Proxy::new("istio-system", ProxyKind::Router),
            service: Service::new("baz.foo.bar".parse().unwrap(), "default"),
        }
    }
}

impl TestConfig {
    /// Builds a context with the given local rule hosts (bound in the proxy's
    /// namespace), target rule hosts (exported from the service's namespace)
    /// and an exact global rule for the service.
    fn context(&self, local: &[&str], target: &[&str]) -> PushContext<Rule> {
        let mut builder = PushContextBuilder::new();
        for h in local {
            builder.local(&self.proxy.config_namespace, host(h), self.local.clone());
        }
        for h in target {
            builder.exported(&self.service.namespace, host(h), self.target.clone());
        }
        builder.global(host("baz.foo.bar"), self.all.clone());
        builder.build(1).expect("context must build")
    }

    fn resolve(&self, local: &[&str], target: &[&str]) -> Arc<Rule> {
        let ctx = self.context(local, target);
        ctx.destination_rule(&self.proxy, &self.service)
            .expect("a rule must resolve")
            .clone()
    }
}

#[test]
fn has_local_no_target() {
    let test = TestConfig::default();
    assert!(Arc::ptr_eq(&test.resolve(&["*"], &[]), &test.local));
}

#[test]
fn no_local_has_target() {
    let test = TestConfig::default();
    assert!(Arc::ptr_eq(&test.resolve(&[], &["*.foo.bar"]), &test.target));
}

#[test]
fn no_local_no_target() {
    let test = TestConfig::default();
    assert!(Arc::ptr_eq(&test.resolve(&[], &[]), &test.all));
}

#[test]
fn local_is_more_specific() {
    let test = TestConfig::default();
    assert!(Arc::ptr_eq(
        &test.resolve(&["*.foo.bar"], &["*"]),
        &test.local
    ));
}

#[test]
fn target_is_more_specific() {
    let test = TestConfig::default();
    assert!(Arc::ptr_eq(
        &test.resolve(&["*"], &["*.foo.bar"]),
        &test.target
    ));
}

#[test]
fn same_local_and_target() {
    let test = TestConfig::default();
    assert!(Arc::ptr_eq(
        &test.resolve(&["*.foo.bar"], &["*.foo.bar"]),
        &test.local
    ));
}

#[test]
fn exact_local_and_target_prefers_local() {
    let test = TestConfig::default();
    assert!(Arc::ptr_eq(
        &test.resolve(&["baz.foo.bar"], &["baz.foo.bar"]),
        &test.local
    ));
}

#[test]
fn exact_target_beats_local_suffix() {
    let test = TestConfig::default();
    assert!(Arc::ptr_eq(
        &test.resolve(&["*.foo.bar", "*"], &["baz.foo.bar"]),
        &test.target
    ));
}

#[test]
fn local_match_shadows_global_exact_match() {
    // The global rule is more specific, but it is only a fallback.
    let test = TestConfig::default();
    let ctx = test.context(&["*"], &[]);
    let resolution = ctx.resolve(&test.proxy, &test.service).unwrap();
    assert_eq!(resolution.scope, Scope::Local);
    assert_eq!(*resolution.host, HostMatch::any());
}

#[test]
fn resolution_reports_scope_and_host() {
    let test = TestConfig::default();
    let ctx = test.context(&["*"], &["*.foo.bar"]);
    let resolution = ctx.resolve(&test.proxy, &test.service).unwrap();
    assert_eq!(resolution.scope, Scope::Exported);
    assert_eq!(resolution.host.to_string(), "*.foo.bar");
    assert!(Arc::ptr_eq(resolution.rule, &test.target));

    let ctx = test.context(&[], &[]);
    let resolution = ctx.resolve(&test.proxy, &test.service).unwrap();
    assert_eq!(resolution.scope, Scope::Global);
}

#[test]
fn unrelated_namespaces_do_not_apply() {
    let test = TestConfig::default();
    let mut builder = PushContextBuilder::new();
    builder
        .local("other", host("*"), test.local.clone())
        .exported("other", host("*"), test.target.clone());
    let ctx = builder.build(1).unwrap();
    assert!(ctx.destination_rule(&test.proxy, &test.service).is_none());
}

#[test]
fn no_rules_resolve_to_none() {
    let test = TestConfig::default();
    let ctx = PushContext::<Rule>::empty();
    assert!(ctx.destination_rule(&test.proxy, &test.service).is_none());
    assert!(ctx.global_destination_rule(&test.service).is_none());
}

#[test]
fn unmatched_global_resolves_to_none() {
    let test = TestConfig::default();
    let ctx = test.context(&["*.qux.bar"], &["qux.foo.bar"]);
    let service = Service::new("qux.example.com".parse().unwrap(), "default");
    assert!(ctx.destination_rule(&test.proxy, &service).is_none());
}

#[test]
fn services_without_a_namespace_skip_exported_rules() {
    let test = TestConfig::default();
    let mut builder = PushContextBuilder::new();
    builder.exported("", host("*"), test.target.clone());
    let ctx = builder.build(1).unwrap();
    let service = Service::new("baz.foo.bar".parse().unwrap(), "");
    assert!(ctx.destination_rule(&test.proxy, &service).is_none());
}

#[test]
fn resolution_is_idempotent() {
    let test = TestConfig::default();
    let ctx = test.context(&["*"], &["*.foo.bar"]);
    let first = ctx.destination_rule(&test.proxy, &test.service).unwrap();
    for _ in 0..10 {
        let next = ctx.destination_rule(&test.proxy, &test.service).unwrap();
        assert!(std::ptr::eq(first, next));
        assert!(Arc::ptr_eq(first, next));
    }
}

#[test]
fn proxyless_lookups_only_use_global_rules() {
    let test = TestConfig::default();
    let ctx = test.context(&["*"], &["*.foo.bar"]);
    let rule = ctx.global_destination_rule(&test.service).unwrap();
    assert!(Arc::ptr_eq(rule, &test.all));
}

#[test]
fn sidecar_scope_overrides_namespace_rules() {
    let test = TestConfig::default();
    let sidecar = ResourceId::new("istio-system", "default");
    let selected = Arc::new(Rule("sidecar"));

    let mut builder = PushContextBuilder::new();
    builder
        .local("istio-system", host("baz.foo.bar"), test.local.clone())
        .sidecar(sidecar.clone(), host("*"), selected.clone());
    let ctx = builder.build(1).unwrap();

    let proxy = Proxy::new("istio-system", ProxyKind::Sidecar).with_sidecar_scope(sidecar.clone());
    let resolution = ctx.resolve(&proxy, &test.service).unwrap();
    assert_eq!(resolution.scope, Scope::Sidecar);
    assert!(Arc::ptr_eq(resolution.rule, &selected));

    // Routers do not use sidecar scopes.
    let router = Proxy::new("istio-system", ProxyKind::Router).with_sidecar_scope(sidecar);
    assert!(Arc::ptr_eq(
        ctx.destination_rule(&router, &test.service).unwrap(),
        &test.local
    ));
}

#[test]
fn sidecar_scope_without_a_match_does_not_fall_back() {
    let test = TestConfig::default();
    let sidecar = ResourceId::new("istio-system", "default");

    let mut builder = PushContextBuilder::new();
    builder
        .local("istio-system", host("*"), test.local.clone())
        .global(host("*"), test.all.clone())
        .sidecar_scope(sidecar.clone());
    let ctx = builder.build(1).unwrap();

    let proxy = Proxy::new("istio-system", ProxyKind::Sidecar).with_sidecar_scope(sidecar);
    assert!(ctx.resolve(&proxy, &test.service).is_none());
}

#[test]
fn unknown_sidecar_scope_resolves_by_namespace() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .try_init()
        .ok();

    let test = TestConfig::default();
    let ctx = test.context(&["*"], &[]);
    let proxy = Proxy::new("istio-system", ProxyKind::Sidecar)
        .with_sidecar_scope(ResourceId::new("istio-system", "missing"));
    let resolution = ctx.resolve(&proxy, &test.service).unwrap();
    assert_eq!(resolution.scope, Scope::Local);
}

#[test]
fn contexts_are_shared_across_threads() {
    let test = TestConfig::default();
    let ctx = Arc::new(test.context(&["*"], &["*.foo.bar"]));
    let handles = (0..4)
        .map(|_| {
            let ctx = ctx.clone();
            let proxy = test.proxy.clone();
            let service = test.service.clone();
            std::thread::spawn(move || {
                (0..100)
                    .map(|_| ctx.destination_rule(&proxy, &service).map(|r| r.0))
                    .collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        let results = handle.join().expect("resolver thread must not panic");
        assert!(results.iter().all(|r| *r == Some("target")));
    }
}

#[tokio::test]
async fn streams_published_contexts() {
    let test = TestConfig::default();
    let (mut writer, reader) = store::pair::<Rule>();
    let mut stream = Box::pin(reader.into_stream());

    let initial = time::timeout(time::Duration::from_secs(1), stream.next())
        .await
        .expect("initial context must be available")
        .expect("stream must not end");
    assert_eq!(initial.generation(), 0);

    let mut builder = PushContextBuilder::new();
    builder.local("istio-system", host("*"), test.local.clone());
    writer.publish(builder).unwrap();

    let next = time::timeout(time::Duration::from_secs(1), stream.next())
        .await
        .expect("published context must be observed")
        .expect("stream must not end");
    assert_eq!(next.generation(), 1);
    assert!(Arc::ptr_eq(
        next.destination_rule(&test.proxy, &test.service).unwrap(),
        &test.local
    ));
}
