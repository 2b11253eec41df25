#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Reconciliation loop and status write-back (§4.9): owns the only code
//! path that calls [`lbc_k8s_index::builder::build`] and
//! [`lbc_aws::synth::synthesize`] against live Kubernetes and AWS state,
//! and patches the triggering Gateways/Ingresses/Routes with the result.

mod conditions;
mod controller;
mod finalizer;
mod metrics;
mod resource_id;
mod status_write;
mod target_group_binding;

pub use controller::{Controller, Update};
pub use metrics::ReconcileMetrics;
pub use resource_id::ResourceId;
