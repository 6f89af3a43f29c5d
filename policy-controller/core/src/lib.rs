#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod host;
mod workload;

pub use self::{
    host::{HostMatch, Hostname, Specificity},
    workload::{Proxy, ProxyKind, ResourceId, Service},
};
