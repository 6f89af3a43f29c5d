use ahash::AHashMap as HashMap;
use mesh_policy_controller_core::{host, HostMatch, Hostname};
use std::{collections::hash_map::Entry, sync::Arc};

/// Rules bound to hostname patterns within a single scope.
///
/// Patterns are kept sorted from most to least specific so that the first
/// pattern matching a hostname is its best match.
#[derive(Debug)]
pub struct ScopeIndex<T> {
    hosts: Vec<HostMatch>,
    rules: HashMap<HostMatch, Arc<T>>,
}

/// A rule and the pattern through which it was selected.
#[derive(Debug)]
pub struct BoundRule<'a, T> {
    pub host: &'a HostMatch,
    pub rule: &'a Arc<T>,
}

/// Scope indexes keyed by namespace. A namespace without an index behaves
/// like an empty index.
#[derive(Debug)]
pub struct NamespaceScopes<T> {
    by_ns: HashMap<String, ScopeIndex<T>>,
}

/// Indicates that more than one rule was bound to the same pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateHost(pub HostMatch);

// === impl ScopeIndex ===

impl<T> ScopeIndex<T> {
    pub fn empty() -> Self {
        Self {
            hosts: Vec::new(),
            rules: HashMap::new(),
        }
    }

    /// Builds an index from rule bindings.
    ///
    /// Fails if two bindings share a pattern. Merging rules that target the
    /// same hosts must happen before they are indexed.
    pub fn from_bindings(
        bindings: impl IntoIterator<Item = (HostMatch, Arc<T>)>,
    ) -> Result<Self, DuplicateHost> {
        let mut rules = HashMap::new();
        for (host, rule) in bindings {
            match rules.entry(host) {
                Entry::Vacant(entry) => {
                    entry.insert(rule);
                }
                Entry::Occupied(entry) => return Err(DuplicateHost(entry.key().clone())),
            }
        }

        let mut hosts = rules.keys().cloned().collect::<Vec<_>>();
        host::sort_by_specificity(&mut hosts);
        Ok(Self { hosts, rules })
    }

    /// Returns the rule bound to the most specific pattern matching `hostname`.
    pub fn best_match(&self, hostname: &Hostname) -> Option<BoundRule<'_, T>> {
        let host = self.hosts.iter().find(|h| h.matches(hostname))?;
        let rule = self.rules.get(host)?;
        Some(BoundRule { host, rule })
    }

    pub fn get(&self, host: &HostMatch) -> Option<&Arc<T>> {
        self.rules.get(host)
    }

    /// Iterates over patterns from most to least specific.
    pub fn hosts(&self) -> impl Iterator<Item = &HostMatch> {
        self.hosts.iter()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl<T> Default for ScopeIndex<T> {
    fn default() -> Self {
        Self::empty()
    }
}

// === impl BoundRule ===

impl<T> Clone for BoundRule<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BoundRule<'_, T> {}

// === impl NamespaceScopes ===

impl<T> NamespaceScopes<T> {
    pub fn get(&self, namespace: &str) -> Option<&ScopeIndex<T>> {
        self.by_ns.get(namespace)
    }

    /// Returns the best match for `hostname` in the namespace's index.
    pub fn best_match(&self, namespace: &str, hostname: &Hostname) -> Option<BoundRule<'_, T>> {
        self.get(namespace)?.best_match(hostname)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &ScopeIndex<T>)> {
        self.by_ns.iter().map(|(ns, idx)| (ns.as_str(), idx))
    }

    /// The total number of bound patterns across all namespaces.
    pub fn len(&self) -> usize {
        self.by_ns.values().map(ScopeIndex::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ns.values().all(ScopeIndex::is_empty)
    }
}

impl<T> Default for NamespaceScopes<T> {
    fn default() -> Self {
        Self {
            by_ns: HashMap::new(),
        }
    }
}

impl<T> FromIterator<(String, ScopeIndex<T>)> for NamespaceScopes<T> {
    fn from_iter<I: IntoIterator<Item = (String, ScopeIndex<T>)>>(iter: I) -> Self {
        Self {
            by_ns: iter.into_iter().collect(),
        }
    }
}
