use lbc_core::model::{ResourceSpec, ResourceStatus, TargetGroupStatus};
use lbc_core::token::StatusTable;
use lbc_core::{Cloud, Result, Stack};
use std::collections::BTreeMap;

const KIND: &str = "AWS::ELBV2::TargetGroup";

/// TargetGroup identity is the fingerprint-derived name, not its ARN — a
/// spec change that would rename it is a delete-and-recreate, never a
/// rename-in-place (§3).
pub async fn synthesize(
    cloud: &dyn Cloud,
    stack: &mut Stack,
    cluster_name: &str,
    stack_id: &str,
    tags: &BTreeMap<String, String>,
    statuses: &StatusTable,
) -> Result<()> {
    let live = cloud.elbv2().find_tagged_target_groups(cluster_name, stack_id).await?;
    let desired_ids: Vec<_> = stack.list_resources(KIND).into_iter().map(|r| r.id()).collect();

    for id in desired_ids {
        let ResourceSpec::TargetGroup(spec) = stack.get(&id).expect("listed by kind").spec().clone() else {
            unreachable!("list_resources(KIND) only returns TargetGroup specs")
        };

        let arn = match live.iter().find(|l| l.name == spec.name) {
            Some(existing) => {
                // target_type/port/protocol/ip_address_type are baked into
                // the fingerprint-derived name (see doc comment above), so a
                // name match already guarantees those match too — only
                // health check settings and attributes can drift.
                let unchanged = existing.health_check == spec.health_check && existing.attributes == spec.attributes;
                if !unchanged {
                    cloud.elbv2().modify_target_group(&existing.arn, &spec).await?;
                }
                existing.arn.clone()
            }
            None => {
                let arn = cloud.elbv2().create_target_group(&spec, tags).await?;
                tracing::info!(name = %spec.name, arn, "created target group");
                arn
            }
        };

        statuses.set(id.clone(), "arn", arn.clone());
        stack
            .get_mut(&id)
            .expect("id came from this stack")
            .set_status(ResourceStatus::TargetGroup(TargetGroupStatus { arn }));
    }

    let desired_names: Vec<String> = stack
        .list_resources(KIND)
        .into_iter()
        .filter_map(|r| match r.spec() {
            ResourceSpec::TargetGroup(spec) => Some(spec.name.clone()),
            _ => None,
        })
        .collect();
    for orphan in live.iter().filter(|l| !desired_names.contains(&l.name)) {
        tracing::info!(arn = %orphan.arn, name = %orphan.name, "deleting orphaned target group");
        cloud.elbv2().delete_target_group(&orphan.arn).await?;
    }

    Ok(())
}
