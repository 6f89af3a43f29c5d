#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use mesh_policy_controller_core as core;
pub use mesh_policy_controller_index as index;

mod args;
mod snapshot;

pub use self::{
    args::Args,
    snapshot::{Binding, DestinationRule, Sidecar, Snapshot},
};
