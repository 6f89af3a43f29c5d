//! Mesh Policy Controller Index
//!
//! Resolves the destination rule that a proxy applies to traffic for a
//! service. Rules arrive already classified into one of three scopes:
//!
//! - *Local* rules are visible only to proxies whose configuration namespace
//!   matches the rule's namespace.
//! - *Exported* rules are published by a namespace to every consumer of the
//!   services in that namespace.
//! - *Global* rules are visible to the whole mesh.
//!
//! Within a scope, each rule is bound to a hostname pattern (`baz.foo.bar`,
//! `*.foo.bar`, or `*`) and a lookup selects the most specific pattern that
//! matches the service's hostname. Across scopes, the more specific of the
//! local and exported matches wins and the local match breaks ties; the
//! global scope is only consulted when neither matches.
//!
//! ```text
//! [ Proxy ] -> local[proxy ns]      \
//!                                    > most specific, local on ties -> [ Rule ]
//! [ Service ] -> exported[svc ns]   /        |
//!                                            v (no match)
//!                                        global
//! ```
//!
//! Indexes are built once per configuration snapshot into an immutable
//! [`PushContext`], which is shared by all readers until a new snapshot is
//! published through the [`store`].

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod build;
mod context;
pub mod metrics;
mod scope;
pub mod store;

#[cfg(test)]
mod tests;

pub use self::{
    build::{BuildError, PushContextBuilder},
    context::{PushContext, Resolution, Scope},
    scope::{BoundRule, DuplicateHost, NamespaceScopes, ScopeIndex},
};
