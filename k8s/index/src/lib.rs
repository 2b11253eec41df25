#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Group/attachment indexing and the Model Builder (§4.3, §4.4): turns
//! watched Gateways, Routes, Ingresses, and Services into the
//! [`lbc_core::Stack`]s the synthesizers drive toward AWS.

pub mod builder;
pub mod cluster_info;
pub mod config_merge;
pub mod discovery;
pub mod grouping;
pub mod index;
pub mod naming;

pub use builder::{build, BackendRequest, BuildOutput, GroupInput, ListenerRequest, RuleRequest};
pub use cluster_info::ClusterInfo;
pub use config_merge::{ConfigMerger, MergedLoadBalancerConfig, Precedence};
pub use grouping::{AttachmentCandidate, AttachmentError, IngressGroupId, IngressGroupMember, ParentRef, RouteKind};
pub use index::{Index, Shared};
