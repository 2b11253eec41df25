use lbc_core::graph::ResourceId;
use lbc_core::model::{IpAddressType, ResourceSpec, TargetGroupBindingNetworkingRule, TargetType};
use lbc_core::token::StatusTable;
use lbc_core::{Result, Stack};

const KIND: &str = "AWS::ELBV2::TargetGroupBinding";

/// A resolved `TargetGroupBinding` the caller must create/update in
/// Kubernetes — this kind has no AWS-side synthesis of its own (§3), it's a
/// pure hand-off to the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetGroupBindingWrite {
    pub resource_id: ResourceId,
    pub target_group_arn: String,
    pub target_type: TargetType,
    pub service_name: String,
    pub service_port: String,
    pub ip_address_type: IpAddressType,
    pub networking: Option<Vec<TargetGroupBindingNetworkingRule>>,
}

pub fn collect(stack: &Stack, statuses: &StatusTable) -> Result<Vec<TargetGroupBindingWrite>> {
    let mut writes = Vec::new();
    for resource in stack.list_resources(KIND) {
        let ResourceSpec::TargetGroupBinding(spec) = resource.spec() else {
            unreachable!("list_resources(KIND) only returns TargetGroupBinding specs")
        };
        writes.push(TargetGroupBindingWrite {
            resource_id: resource.id(),
            target_group_arn: spec.target_group_arn.resolve(statuses)?,
            target_type: spec.target_type,
            service_name: spec.service_name.clone(),
            service_port: spec.service_port.clone(),
            ip_address_type: spec.ip_address_type,
            networking: spec.networking.clone(),
        });
    }
    Ok(writes)
}
