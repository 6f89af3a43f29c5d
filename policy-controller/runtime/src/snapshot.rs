use crate::{
    core::{HostMatch, ResourceId},
    index::PushContextBuilder,
};
use ahash::AHashMap as HashMap;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, sync::Arc};

/// A classified configuration snapshot.
///
/// Rules are declared once and bound to hostname patterns in each scope by
/// their `namespace/name` reference, so that the same rule may be bound in
/// several scopes.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    #[serde(default)]
    pub rules: Vec<DestinationRule>,

    /// Rules visible only to proxies in the keyed namespace.
    #[serde(default)]
    pub local: BTreeMap<String, Vec<Binding>>,

    /// Rules exported for services in the keyed namespace.
    #[serde(default)]
    pub exported: BTreeMap<String, Vec<Binding>>,

    #[serde(default)]
    pub global: Vec<Binding>,

    #[serde(default)]
    pub sidecars: Vec<Sidecar>,
}

/// An opaque destination rule resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DestinationRule {
    pub namespace: String,
    pub name: String,

    #[serde(default)]
    pub spec: serde_json::Value,
}

/// Binds a rule to a hostname pattern.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Binding {
    pub host: String,
    pub rule: String,
}

/// The rules selected by a sidecar resource.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sidecar {
    pub namespace: String,
    pub name: String,

    #[serde(default)]
    pub rules: Vec<Binding>,
}

// === impl Snapshot ===

impl Snapshot {
    pub async fn read(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        json.parse()
            .with_context(|| format!("invalid snapshot {}", path.display()))
    }

    /// Resolves rule references and binds every rule into a builder.
    pub fn into_builder(self) -> Result<PushContextBuilder<DestinationRule>> {
        let mut rules = HashMap::with_capacity(self.rules.len());
        for rule in self.rules {
            let id = ResourceId::new(&rule.namespace, &rule.name);
            if rules.insert(id.clone(), Arc::new(rule)).is_some() {
                bail!("rule {} is declared more than once", id);
            }
        }

        let bind = |binding: &Binding| -> Result<(HostMatch, Arc<DestinationRule>)> {
            let host = binding
                .host
                .parse()
                .with_context(|| format!("invalid host for rule {}", binding.rule))?;
            let id = binding.rule.parse::<ResourceId>()?;
            let rule = rules
                .get(&id)
                .cloned()
                .ok_or_else(|| anyhow!("unknown rule {}", id))?;
            Ok((host, rule))
        };

        let mut builder = PushContextBuilder::new();
        for (ns, bindings) in &self.local {
            for binding in bindings {
                let (host, rule) =
                    bind(binding).with_context(|| format!("local rules in {}", ns))?;
                builder.local(ns, host, rule);
            }
        }
        for (ns, bindings) in &self.exported {
            for binding in bindings {
                let (host, rule) =
                    bind(binding).with_context(|| format!("exported rules in {}", ns))?;
                builder.exported(ns, host, rule);
            }
        }
        for binding in &self.global {
            let (host, rule) = bind(binding).context("global rules")?;
            builder.global(host, rule);
        }
        for sidecar in &self.sidecars {
            let id = ResourceId::new(&sidecar.namespace, &sidecar.name);
            builder.sidecar_scope(id.clone());
            for binding in &sidecar.rules {
                let (host, rule) = bind(binding).with_context(|| format!("sidecar {}", id))?;
                builder.sidecar(id.clone(), host, rule);
            }
        }

        tracing::debug!(
            rules = rules.len(),
            local = self.local.len(),
            exported = self.exported.len(),
            global = self.global.len(),
            sidecars = self.sidecars.len(),
            "loaded snapshot"
        );
        Ok(builder)
    }
}

impl std::str::FromStr for Snapshot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(Into::into)
    }
}
