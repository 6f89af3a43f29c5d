use anyhow::{bail, ensure, Error, Result};
use std::{
    cmp::{Ordering, Reverse},
    fmt,
    str::FromStr,
};

/// A destination hostname pattern that a rule is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostMatch {
    /// Matches a single, identical hostname.
    Exact(String),

    /// Matches any hostname with at least one label before the suffix. The
    /// suffix is stored with its labels reversed (`*.foo.bar` is `["bar",
    /// "foo"]`) and `*` is the suffix with no labels.
    Suffix { reverse_labels: Vec<String> },
}

/// A concrete (non-wildcard) service hostname.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hostname(String);

/// How precisely a [`HostMatch`] describes the hostnames it matches.
///
/// All wildcards order below every exact match; wildcards order among
/// themselves by the number of labels in their suffix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Specificity {
    Wildcard { labels: usize },
    Exact,
}

/// Sorts patterns from most to least specific.
///
/// Patterns of equal specificity are ordered by their text so that the order
/// is stable across builds.
pub fn sort_by_specificity(hosts: &mut [HostMatch]) {
    hosts.sort_by_cached_key(|h| (Reverse(h.specificity()), h.to_string()));
}

// === impl HostMatch ===

impl HostMatch {
    /// The pattern that matches every hostname.
    pub fn any() -> Self {
        Self::Suffix {
            reverse_labels: Vec::new(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Suffix { .. })
    }

    pub fn specificity(&self) -> Specificity {
        match self {
            Self::Exact(_) => Specificity::Exact,
            Self::Suffix { reverse_labels } => Specificity::Wildcard {
                labels: reverse_labels.len(),
            },
        }
    }

    pub fn matches(&self, host: &Hostname) -> bool {
        match self {
            Self::Exact(name) => *name == host.0,
            Self::Suffix { reverse_labels } => {
                let mut labels = host.0.rsplit('.');
                reverse_labels
                    .iter()
                    .all(|suffix| labels.next() == Some(suffix.as_str()))
                    // The wildcard must cover at least one label.
                    && labels.next().is_some()
            }
        }
    }

    /// Compares two patterns by specificity alone.
    pub fn cmp_specificity(&self, other: &Self) -> Ordering {
        self.specificity().cmp(&other.specificity())
    }
}

impl FromStr for HostMatch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "*" {
            return Ok(Self::any());
        }

        if let Some(suffix) = s.strip_prefix("*.") {
            let mut reverse_labels = suffix
                .split('.')
                .map(|label| check_label(s, label).map(|()| label.to_string()))
                .collect::<Result<Vec<_>>>()?;
            reverse_labels.reverse();
            return Ok(Self::Suffix { reverse_labels });
        }

        let Hostname(name) = s.parse()?;
        Ok(Self::Exact(name))
    }
}

impl fmt::Display for HostMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use std::fmt::Write;
        match self {
            Self::Exact(name) => f.write_str(name),
            Self::Suffix { reverse_labels } => {
                f.write_char('*')?;
                for label in reverse_labels.iter().rev() {
                    write!(f, ".{}", label)?;
                }
                Ok(())
            }
        }
    }
}

impl From<Hostname> for HostMatch {
    fn from(Hostname(name): Hostname) -> Self {
        Self::Exact(name)
    }
}

// === impl Hostname ===

impl Hostname {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Hostname {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ensure!(!s.is_empty(), "hostname must not be empty");
        for label in s.split('.') {
            check_label(s, label)?;
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn check_label(host: &str, label: &str) -> Result<()> {
    if label.is_empty() {
        bail!("hostname {:?} has an empty label", host);
    }
    if label.contains('*') {
        bail!("hostname {:?} may only use '*' as its leftmost label", host);
    }
    Ok(())
}
