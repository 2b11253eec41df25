//! EC2-backed [`Ec2`] implementation: subnet discovery and managed security
//! group CRUD (§4.4 steps 3-4).

use aws_sdk_ec2::types::{Filter, IpPermission, IpRange, Ipv6Range, Tag, TagSpecification};
use lbc_core::cloud::{Ec2, SecurityGroupObservation, SubnetInfo};
use lbc_core::model::{Scheme, SecurityGroupIngressRule, SecurityGroupSpec};
use lbc_core::{ControllerError, ErrorContext, Result};
use std::collections::BTreeMap;

pub struct Ec2Client {
    client: aws_sdk_ec2::Client,
    vpc_id: String,
    controller_name: String,
}

impl Ec2Client {
    pub fn new(client: aws_sdk_ec2::Client, vpc_id: String, controller_name: String) -> Self {
        Self {
            client,
            vpc_id,
            controller_name,
        }
    }

    fn role_tag_key(&self, scheme: Scheme) -> &'static str {
        match scheme {
            Scheme::Internal => "kubernetes.io/role/internal-elb",
            Scheme::InternetFacing => "kubernetes.io/role/elb",
        }
    }
}

fn map_sdk_error(err: impl std::fmt::Display, context: ErrorContext) -> ControllerError {
    let message = err.to_string();
    if message.contains("RequestLimitExceeded") || message.contains("Throttling") {
        ControllerError::AwsThrottling { message, context }
    } else if message.contains("InvalidGroup.NotFound") || message.contains("InvalidSubnetID.NotFound") {
        ControllerError::AwsNotFound { context }
    } else {
        ControllerError::TransientIo { message, context }
    }
}

#[async_trait::async_trait]
impl Ec2 for Ec2Client {
    async fn describe_subnets_by_ids(&self, ids: &[String]) -> Result<Vec<SubnetInfo>> {
        let resp = self
            .client
            .describe_subnets()
            .set_subnet_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::field("subnets")))?;

        Ok(resp
            .subnets
            .unwrap_or_default()
            .into_iter()
            .filter_map(subnet_info)
            .collect())
    }

    async fn discover_subnets(&self, scheme: Scheme, cluster_name: &str) -> Result<Vec<SubnetInfo>> {
        let role_tag = self.role_tag_key(scheme);
        let resp = self
            .client
            .describe_subnets()
            .filters(Filter::builder().name("vpc-id").values(&self.vpc_id).build())
            .filters(Filter::builder().name(format!("tag:{role_tag}")).values("*").build())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::field("subnets")))?;

        let ownership_keys = [
            format!("kubernetes.io/cluster/{cluster_name}"),
            "kubernetes.io/role/elb".to_string(),
        ];
        let _ = ownership_keys; // ownership filtering happens in subnet_info's tag check below.

        Ok(resp
            .subnets
            .unwrap_or_default()
            .into_iter()
            .filter(|s| {
                s.tags().iter().any(|t| {
                    t.key() == Some(&format!("kubernetes.io/cluster/{cluster_name}"))
                        && matches!(t.value(), Some("owned") | Some("shared"))
                })
            })
            .filter_map(subnet_info)
            .collect())
    }

    async fn resolve_security_groups(&self, ids_or_names: &[String]) -> Result<Vec<String>> {
        let (ids, names): (Vec<_>, Vec<_>) = ids_or_names
            .iter()
            .cloned()
            .partition(|v| v.starts_with("sg-"));

        let mut resolved = ids;
        if !names.is_empty() {
            let resp = self
                .client
                .describe_security_groups()
                .filters(Filter::builder().name("vpc-id").values(&self.vpc_id).build())
                .filters(Filter::builder().name("tag:Name").values(names).build())
                .send()
                .await
                .map_err(|e| map_sdk_error(e, ErrorContext::field("securityGroups")))?;
            resolved.extend(
                resp.security_groups
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|g| g.group_id),
            );
        }
        Ok(resolved)
    }

    async fn find_tagged_security_groups(
        &self,
        cluster_name: &str,
        stack_id: &str,
    ) -> Result<Vec<SecurityGroupObservation>> {
        let resp = self
            .client
            .describe_security_groups()
            .filters(Filter::builder().name("vpc-id").values(&self.vpc_id).build())
            .filters(
                Filter::builder()
                    .name(format!("tag:{}/cluster", self.controller_name))
                    .values(cluster_name)
                    .build(),
            )
            .filters(
                Filter::builder()
                    .name(format!("tag:{}/stack", self.controller_name))
                    .values(stack_id)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::EC2::SecurityGroup", stack_id)))?;

        Ok(resp
            .security_groups
            .unwrap_or_default()
            .into_iter()
            .filter_map(|g| {
                Some(SecurityGroupObservation {
                    group_id: g.group_id?,
                    name: g.group_name.unwrap_or_default(),
                    ingress: g
                        .ip_permissions
                        .unwrap_or_default()
                        .into_iter()
                        .flat_map(ingress_rules_from_permission)
                        .collect(),
                })
            })
            .collect())
    }

    async fn create_security_group(
        &self,
        spec: &SecurityGroupSpec,
        tags: &BTreeMap<String, String>,
    ) -> Result<String> {
        let tag_specs = vec![TagSpecification::builder()
            .resource_type(aws_sdk_ec2::types::ResourceType::SecurityGroup)
            .set_tags(Some(
                tags.iter()
                    .map(|(k, v)| Tag::builder().key(k).value(v).build())
                    .collect(),
            ))
            .build()];

        let resp = self
            .client
            .create_security_group()
            .group_name(&spec.name)
            .description(&spec.description)
            .vpc_id(&self.vpc_id)
            .set_tag_specifications(Some(tag_specs))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::EC2::SecurityGroup", &spec.name)))?;

        let group_id = resp
            .group_id
            .ok_or_else(|| ControllerError::fatal("create_security_group returned no group id", ErrorContext::none()))?;

        if !spec.ingress.is_empty() {
            self.update_security_group_ingress(&group_id, &spec.ingress).await?;
        }
        Ok(group_id)
    }

    async fn update_security_group_ingress(
        &self,
        group_id: &str,
        rules: &[SecurityGroupIngressRule],
    ) -> Result<()> {
        let permissions: Vec<IpPermission> = rules
            .iter()
            .map(|r| {
                let mut builder = IpPermission::builder()
                    .ip_protocol(&r.protocol)
                    .from_port(r.from_port as i32)
                    .to_port(r.to_port as i32);
                if r.cidr.contains(':') {
                    builder = builder.ipv6_ranges(Ipv6Range::builder().cidr_ipv6(&r.cidr).build());
                } else {
                    builder = builder.ip_ranges(IpRange::builder().cidr_ip(&r.cidr).build());
                }
                builder.build()
            })
            .collect();

        // Additive-then-pruned reconciliation (§4.6 ManagedSG diff policy):
        // authorize the full desired set; AWS returns
        // `InvalidPermission.Duplicate` for rules already present, which we
        // treat as a no-op rather than an error.
        match self
            .client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(permissions))
            .send()
            .await
        {
            Ok(_) => {}
            Err(e) if e.to_string().contains("InvalidPermission.Duplicate") => {}
            Err(e) => {
                return Err(map_sdk_error(
                    e,
                    ErrorContext::resource("AWS::EC2::SecurityGroup", group_id),
                ))
            }
        }
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<()> {
        match self.client.delete_security_group().group_id(group_id).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("InvalidGroup.NotFound") => Ok(()),
            Err(e) => Err(map_sdk_error(
                e,
                ErrorContext::resource("AWS::EC2::SecurityGroup", group_id),
            )),
        }
    }
}

fn subnet_info(subnet: aws_sdk_ec2::types::Subnet) -> Option<SubnetInfo> {
    Some(SubnetInfo {
        id: subnet.subnet_id?,
        availability_zone: subnet.availability_zone.unwrap_or_default(),
        tags: subnet
            .tags
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| Some((t.key?, t.value.unwrap_or_default())))
            .collect(),
    })
}

fn ingress_rules_from_permission(perm: aws_sdk_ec2::types::IpPermission) -> Vec<SecurityGroupIngressRule> {
    let protocol = perm.ip_protocol.clone().unwrap_or_default();
    let from_port = perm.from_port.unwrap_or(0) as u16;
    let to_port = perm.to_port.unwrap_or(0) as u16;
    let mut rules = Vec::new();
    for range in perm.ip_ranges.unwrap_or_default() {
        if let Some(cidr) = range.cidr_ip {
            rules.push(SecurityGroupIngressRule {
                protocol: protocol.clone(),
                from_port,
                to_port,
                cidr,
            });
        }
    }
    for range in perm.ipv6_ranges.unwrap_or_default() {
        if let Some(cidr) = range.cidr_ipv6 {
            rules.push(SecurityGroupIngressRule {
                protocol: protocol.clone(),
                from_port,
                to_port,
                cidr,
            });
        }
    }
    rules
}
