use crate::context::{PushContext, Resolution};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Describes published push contexts.
#[derive(Clone, Debug)]
pub struct ContextMetrics {
    generation: Gauge,
    publishes: Counter,
    build_errors: Counter,
    rules: Family<ScopeLabels, Gauge>,
}

/// Counts destination rule resolutions by the scope that satisfied them.
#[derive(Clone, Debug)]
pub struct ResolveMetrics {
    resolutions: Family<ScopeLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ScopeLabels {
    scope: String,
}

// === impl ContextMetrics ===

impl ContextMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let generation = Gauge::default();
        prom.register(
            "push_context_generation",
            "The generation of the most recently published push context",
            generation.clone(),
        );

        let publishes = Counter::default();
        prom.register(
            "push_context_publishes",
            "Count of push contexts published",
            publishes.clone(),
        );

        let build_errors = Counter::default();
        prom.register(
            "push_context_build_errors",
            "Count of configuration snapshots rejected while building a push context",
            build_errors.clone(),
        );

        let rules = Family::default();
        prom.register(
            "push_context_rules",
            "Gauge of the number of rule bindings in the published push context",
            rules.clone(),
        );

        Self {
            generation,
            publishes,
            build_errors,
            rules,
        }
    }

    pub(crate) fn published<T>(&self, ctx: &PushContext<T>) {
        self.publishes.inc();
        self.observe(ctx);
    }

    /// Updates gauges to describe `ctx`.
    pub(crate) fn observe<T>(&self, ctx: &PushContext<T>) {
        self.generation.set(ctx.generation() as i64);

        let sidecar = ctx.sidecars.values().map(|idx| idx.len()).sum::<usize>();
        for (scope, size) in [
            ("sidecar", sidecar),
            ("local", ctx.local().len()),
            ("exported", ctx.exported().len()),
            ("global", ctx.global().len()),
        ] {
            self.rules
                .get_or_create(&ScopeLabels {
                    scope: scope.to_string(),
                })
                .set(size as i64);
        }
    }

    pub(crate) fn build_failed(&self) {
        self.build_errors.inc();
    }
}

// === impl ResolveMetrics ===

impl ResolveMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let resolutions = Family::default();
        prom.register(
            "destination_rule_resolutions",
            "Count of destination rule resolutions by the scope of the selected rule",
            resolutions.clone(),
        );
        Self { resolutions }
    }

    /// Records the outcome of a resolution. Resolutions without a rule are
    /// recorded with the `none` scope.
    pub fn observe<T>(&self, resolution: Option<&Resolution<'_, T>>) {
        let scope = resolution.map(|r| r.scope.as_str()).unwrap_or("none");
        self.resolutions
            .get_or_create(&ScopeLabels {
                scope: scope.to_string(),
            })
            .inc();
    }
}
