use crate::Hostname;
use anyhow::{anyhow, ensure, Error, Result};
use std::{fmt, str::FromStr};

/// Identifies a namespaced configuration resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

/// A managed proxy for which configuration is being generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proxy {
    /// The namespace whose configuration applies to this proxy.
    pub config_namespace: String,

    pub kind: ProxyKind,

    /// A sidecar resource that restricts the configuration visible to this
    /// proxy. Only honored for [`ProxyKind::Sidecar`] proxies.
    pub sidecar_scope: Option<ResourceId>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Sidecar,
    Router,
}

/// A destination service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Service {
    pub hostname: Hostname,
    pub namespace: String,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Parses the `namespace/name` form.
impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (namespace, name) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("resource {:?} must be of the form namespace/name", s))?;
        ensure!(
            !namespace.is_empty() && !name.is_empty() && !name.contains('/'),
            "resource {:?} must be of the form namespace/name",
            s
        );
        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl Proxy ===

impl Proxy {
    pub fn new(config_namespace: impl ToString, kind: ProxyKind) -> Self {
        Self {
            config_namespace: config_namespace.to_string(),
            kind,
            sidecar_scope: None,
        }
    }

    pub fn with_sidecar_scope(mut self, scope: ResourceId) -> Self {
        self.sidecar_scope = Some(scope);
        self
    }

    /// Returns the sidecar scope that governs this proxy's configuration, if
    /// any.
    pub fn sidecar_scope(&self) -> Option<&ResourceId> {
        match self.kind {
            ProxyKind::Sidecar => self.sidecar_scope.as_ref(),
            ProxyKind::Router => None,
        }
    }
}

// === impl ProxyKind ===

impl FromStr for ProxyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sidecar" => Ok(Self::Sidecar),
            "router" => Ok(Self::Router),
            s => Err(anyhow!("invalid proxy kind: {:?}", s)),
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sidecar => f.write_str("sidecar"),
            Self::Router => f.write_str("router"),
        }
    }
}

// === impl Service ===

impl Service {
    pub fn new(hostname: Hostname, namespace: impl ToString) -> Self {
        Self {
            hostname,
            namespace: namespace.to_string(),
        }
    }
}
