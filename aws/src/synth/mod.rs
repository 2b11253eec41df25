//! Per-kind synthesizers (§4.6): each module diffs one resource kind's
//! desired entries in a [`Stack`] against AWS, in the fixed order the spec
//! requires — a dependee's synthesizer always runs before its dependers'.

mod associations;
mod listener;
mod load_balancer;
mod rule;
mod security_group;
mod target_group;
mod target_group_binding;

use lbc_core::token::StatusTable;
use lbc_core::{Cloud, Result, Stack};
use std::collections::BTreeMap;
use std::time::Duration;

pub use target_group_binding::TargetGroupBindingWrite;

/// Tags every AWS resource this stack owns must carry (§6), namespaced under
/// the controller's own tag prefix plus the resource-specific tags the
/// builder already attached to each spec.
fn ownership_tags(controller_name: &str, cluster_name: &str, stack_id: &str) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert(lbc_core::tags::namespaced(controller_name, lbc_core::tags::CLUSTER), cluster_name.to_string());
    tags.insert(lbc_core::tags::namespaced(controller_name, lbc_core::tags::STACK), stack_id.to_string());
    tags
}

/// Reconciles every resource in `stack` against AWS, in fixed kind order:
/// SecurityGroup → LoadBalancer → TargetGroup → Listener → ListenerRule →
/// TargetGroupBinding → WebACL/Shield associations. Returns the writes the
/// caller must apply to Kubernetes `TargetGroupBinding` objects, since those
/// have no AWS-side synthesis step of their own.
pub async fn synthesize(
    cloud: &dyn Cloud,
    stack: &mut Stack,
    controller_name: &str,
    cluster_name: &str,
    stabilization_window: Duration,
) -> Result<Vec<TargetGroupBindingWrite>> {
    let stack_id = stack
        .id()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();
    let tags = ownership_tags(controller_name, cluster_name, &stack_id);
    let statuses = StatusTable::new();
    stack.seed_status_table(&statuses);

    security_group::synthesize(cloud, stack, cluster_name, &stack_id, &tags, &statuses).await?;
    load_balancer::synthesize(cloud, stack, cluster_name, &stack_id, &tags, &statuses, stabilization_window).await?;
    target_group::synthesize(cloud, stack, cluster_name, &stack_id, &tags, &statuses).await?;
    listener::synthesize(cloud, stack, &statuses).await?;
    rule::synthesize(cloud, stack, &statuses).await?;
    let tgb_writes = target_group_binding::collect(stack, &statuses)?;
    associations::synthesize(cloud, stack, &statuses).await?;

    Ok(tgb_writes)
}
