use crate::scope::{BoundRule, NamespaceScopes, ScopeIndex};
use ahash::AHashMap as HashMap;
use mesh_policy_controller_core::{HostMatch, Proxy, ResourceId, Service};
use std::{cmp::Ordering, fmt, sync::Arc};

/// An immutable snapshot of the mesh's destination rules, indexed for lookup.
///
/// A `PushContext` is never modified once built; a configuration change
/// produces a new context that replaces this one (see [`crate::store`]).
#[derive(Debug)]
pub struct PushContext<T> {
    pub(crate) generation: u64,

    /// Rules visible only to proxies in a namespace, keyed by that namespace.
    pub(crate) local: NamespaceScopes<T>,

    /// Rules exported by a namespace to every consumer of its services, keyed
    /// by the service namespace.
    pub(crate) exported: NamespaceScopes<T>,

    /// Rules exported to the whole mesh.
    pub(crate) global: ScopeIndex<T>,

    /// Rules selected by sidecar resources.
    pub(crate) sidecars: HashMap<ResourceId, ScopeIndex<T>>,
}

/// The scope from which a rule was resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Sidecar,
    Local,
    Exported,
    Global,
}

/// A resolved rule along with where it was found.
#[derive(Debug)]
pub struct Resolution<'a, T> {
    pub scope: Scope,
    pub host: &'a HostMatch,
    pub rule: &'a Arc<T>,
}

// === impl PushContext ===

impl<T> PushContext<T> {
    /// A context without any rules.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            local: NamespaceScopes::default(),
            exported: NamespaceScopes::default(),
            global: ScopeIndex::empty(),
            sidecars: HashMap::new(),
        }
    }

    /// Identifies the configuration snapshot this context was built from.
    /// Generations increase with every published snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the destination rule that applies to traffic from `proxy` to
    /// `service`, if any.
    pub fn destination_rule(&self, proxy: &Proxy, service: &Service) -> Option<&Arc<T>> {
        self.resolve(proxy, service).map(|r| r.rule)
    }

    /// Returns the destination rule for `service` when no proxy is known.
    /// Only rules exported to the whole mesh apply.
    pub fn global_destination_rule(&self, service: &Service) -> Option<&Arc<T>> {
        self.global
            .best_match(&service.hostname)
            .map(|BoundRule { rule, .. }| rule)
    }

    /// Resolves the destination rule for traffic from `proxy` to `service`.
    ///
    /// A sidecar proxy with a sidecar scope only sees the rules its scope
    /// selected. Otherwise, the most specific match from the proxy's
    /// namespace-local rules and the service namespace's exported rules wins,
    /// preferring the local rule when both are equally specific. Rules exported
    /// to the whole mesh are only consulted when neither namespace has a match.
    pub fn resolve(&self, proxy: &Proxy, service: &Service) -> Option<Resolution<'_, T>> {
        let hostname = &service.hostname;

        if let Some(id) = proxy.sidecar_scope() {
            match self.sidecars.get(id) {
                Some(sidecar) => {
                    let resolution = sidecar
                        .best_match(hostname)
                        .map(|bound| Resolution::new(Scope::Sidecar, bound));
                    tracing::trace!(
                        sidecar = %id,
                        %hostname,
                        host = ?resolution.as_ref().map(|r| r.host.to_string()),
                        "resolved through sidecar scope"
                    );
                    return resolution;
                }
                None => {
                    tracing::warn!(
                        sidecar = %id,
                        generation = self.generation,
                        "sidecar scope not found; resolving without it"
                    );
                }
            }
        }

        let local = self
            .local
            .best_match(&proxy.config_namespace, hostname)
            .map(|bound| Resolution::new(Scope::Local, bound));

        let exported = if service.namespace.is_empty() {
            None
        } else {
            self.exported
                .best_match(&service.namespace, hostname)
                .map(|bound| Resolution::new(Scope::Exported, bound))
        };

        let resolution = match (local, exported) {
            (Some(local), Some(exported)) => {
                // Equally specific rules resolve to the proxy's own namespace.
                match exported.host.cmp_specificity(local.host) {
                    Ordering::Greater => Some(exported),
                    Ordering::Less | Ordering::Equal => Some(local),
                }
            }
            (local, exported) => local.or(exported).or_else(|| {
                self.global
                    .best_match(hostname)
                    .map(|bound| Resolution::new(Scope::Global, bound))
            }),
        };

        tracing::trace!(
            namespace = %proxy.config_namespace,
            service_namespace = %service.namespace,
            %hostname,
            scope = ?resolution.as_ref().map(|r| r.scope),
            host = ?resolution.as_ref().map(|r| r.host.to_string()),
            "resolved destination rule"
        );
        resolution
    }

    pub fn local(&self) -> &NamespaceScopes<T> {
        &self.local
    }

    pub fn exported(&self) -> &NamespaceScopes<T> {
        &self.exported
    }

    pub fn global(&self) -> &ScopeIndex<T> {
        &self.global
    }

    pub fn sidecar(&self, id: &ResourceId) -> Option<&ScopeIndex<T>> {
        self.sidecars.get(id)
    }
}

impl<T> Default for PushContext<T> {
    fn default() -> Self {
        Self::empty()
    }
}

// === impl Scope ===

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sidecar => "sidecar",
            Self::Local => "local",
            Self::Exported => "exported",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Resolution ===

impl<'a, T> Resolution<'a, T> {
    fn new(scope: Scope, BoundRule { host, rule }: BoundRule<'a, T>) -> Self {
        Self { scope, host, rule }
    }
}
