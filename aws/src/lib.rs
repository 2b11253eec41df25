#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Wires the [`lbc_core::cloud`] capability traits to real AWS SDK clients,
//! and drives the per-kind synthesizers (§4.6) that reconcile a built
//! [`lbc_core::Stack`] against AWS.
//!
//! Nothing upstream of this crate names an `aws-sdk-*` type directly; the
//! trait boundary in `lbc-core::cloud` is what the Model Builder and the
//! synthesizers below are written against.

mod acm;
mod ec2;
mod elbv2;
mod shield;
mod waf;

pub mod provider;
pub mod synth;
pub mod waiters;

pub use provider::{CloudConfig, CloudProvider, RegionCloud};
pub use synth::{synthesize, TargetGroupBindingWrite};
