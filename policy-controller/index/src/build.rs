use crate::{
    context::{PushContext, Scope},
    scope::{DuplicateHost, NamespaceScopes, ScopeIndex},
};
use ahash::AHashMap as HashMap;
use mesh_policy_controller_core::{HostMatch, ResourceId};
use std::sync::Arc;

/// Collects classified rule bindings for a configuration snapshot.
///
/// Rules are classified into scopes before they reach the builder; the builder
/// only indexes them.
#[derive(Debug)]
pub struct PushContextBuilder<T> {
    local: HashMap<String, Vec<(HostMatch, Arc<T>)>>,
    exported: HashMap<String, Vec<(HostMatch, Arc<T>)>>,
    global: Vec<(HostMatch, Arc<T>)>,
    sidecars: HashMap<ResourceId, Vec<(HostMatch, Arc<T>)>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("multiple {scope} rules in namespace {namespace} are bound to host {host}")]
    DuplicateHost {
        scope: Scope,
        namespace: String,
        host: HostMatch,
    },

    #[error("multiple global rules are bound to host {host}")]
    DuplicateGlobalHost { host: HostMatch },

    #[error("multiple rules in sidecar scope {sidecar} are bound to host {host}")]
    DuplicateSidecarHost { sidecar: ResourceId, host: HostMatch },
}

// === impl PushContextBuilder ===

impl<T> PushContextBuilder<T> {
    pub fn new() -> Self {
        Self {
            local: HashMap::new(),
            exported: HashMap::new(),
            global: Vec::new(),
            sidecars: HashMap::new(),
        }
    }

    /// Binds a rule that is only visible to proxies in `namespace`.
    pub fn local(
        &mut self,
        namespace: impl ToString,
        host: HostMatch,
        rule: Arc<T>,
    ) -> &mut Self {
        self.local
            .entry(namespace.to_string())
            .or_default()
            .push((host, rule));
        self
    }

    /// Binds a rule exported for services in `namespace`.
    pub fn exported(
        &mut self,
        namespace: impl ToString,
        host: HostMatch,
        rule: Arc<T>,
    ) -> &mut Self {
        self.exported
            .entry(namespace.to_string())
            .or_default()
            .push((host, rule));
        self
    }

    /// Binds a rule exported to the whole mesh.
    pub fn global(&mut self, host: HostMatch, rule: Arc<T>) -> &mut Self {
        self.global.push((host, rule));
        self
    }

    /// Binds a rule selected by a sidecar resource.
    pub fn sidecar(&mut self, sidecar: ResourceId, host: HostMatch, rule: Arc<T>) -> &mut Self {
        self.sidecars.entry(sidecar).or_default().push((host, rule));
        self
    }

    /// Declares a sidecar scope, even if it selects no rules.
    pub fn sidecar_scope(&mut self, sidecar: ResourceId) -> &mut Self {
        self.sidecars.entry(sidecar).or_default();
        self
    }

    /// Indexes all bindings into a context for the given generation.
    pub fn build(self, generation: u64) -> Result<PushContext<T>, BuildError> {
        let local = index_namespaces(Scope::Local, self.local)?;
        let exported = index_namespaces(Scope::Exported, self.exported)?;

        let global = ScopeIndex::from_bindings(self.global)
            .map_err(|DuplicateHost(host)| BuildError::DuplicateGlobalHost { host })?;

        let sidecars = self
            .sidecars
            .into_iter()
            .map(|(sidecar, bindings)| match ScopeIndex::from_bindings(bindings) {
                Ok(idx) => Ok((sidecar, idx)),
                Err(DuplicateHost(host)) => {
                    Err(BuildError::DuplicateSidecarHost { sidecar, host })
                }
            })
            .collect::<Result<HashMap<_, _>, BuildError>>()?;

        let ctx = PushContext {
            generation,
            local,
            exported,
            global,
            sidecars,
        };
        tracing::debug!(
            generation,
            local = ctx.local.len(),
            exported = ctx.exported.len(),
            global = ctx.global.len(),
            sidecars = ctx.sidecars.len(),
            "built push context"
        );
        Ok(ctx)
    }
}

impl<T> Default for PushContextBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn index_namespaces<T>(
    scope: Scope,
    bindings: HashMap<String, Vec<(HostMatch, Arc<T>)>>,
) -> Result<NamespaceScopes<T>, BuildError> {
    bindings
        .into_iter()
        .map(|(namespace, bindings)| match ScopeIndex::from_bindings(bindings) {
            Ok(idx) => Ok((namespace, idx)),
            Err(DuplicateHost(host)) => Err(BuildError::DuplicateHost {
                scope,
                namespace,
                host,
            }),
        })
        .collect()
}
