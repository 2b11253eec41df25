//! Model Builder (§4.4): a pure function from (group, cluster context) to a
//! [`Stack`] rooted at one [`LoadBalancerSpec`] resource.
//!
//! The builder never touches AWS or Kubernetes directly — its inputs are
//! already-normalized request structs that `index.rs` extracts from watched
//! objects, and its subnet/security-group/certificate lookups go through
//! the [`Cloud`] capability traits so the function stays pure with respect
//! to everything except those injected collaborators.

use crate::cluster_info::ClusterInfo;
use crate::config_merge::MergedLoadBalancerConfig;
use crate::discovery;
use crate::grouping::RouteKind;
use crate::naming::{managed_security_group_name, TargetGroupFingerprint};
use lbc_core::cloud::Cloud;
use lbc_core::model::{
    Action, HealthCheckSpec, IpAddressType, ListenerRuleSpec, ListenerSpec, LoadBalancerSpec,
    LoadBalancerStatus, LoadBalancerType, ResourceSpec, ResourceStatus, RuleCondition, Scheme,
    SecurityGroupIngressRule, SecurityGroupSpec, TargetGroupBindingNetworkingRule,
    TargetGroupBindingSpec, TargetGroupSpec, TargetType,
};
use lbc_core::{ControllerError, ErrorContext, Resource, ResourceId, Stack, StackId, StringToken};
use std::collections::{BTreeMap, BTreeSet};

/// One listener a group's inputs ask for, before conflict-checking and
/// defaulting (§4.4 step 5).
#[derive(Clone, Debug)]
pub struct ListenerRequest {
    /// The Gateway spec listener's own name — `status.listeners[].name`
    /// must echo it back (§4.9 step 6). Empty for Ingress mode, which has
    /// no named-listener concept.
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub ssl_policy: Option<String>,
    pub certificate_arns: Vec<String>,
    pub alpn_policy: Option<String>,
    pub hosts: Vec<String>,
}

/// One backend reference a route or Ingress rule names (§4.4 step 7-8).
#[derive(Clone, Debug)]
pub struct BackendRequest {
    pub route_identity: String,
    /// `None` for an Ingress path rule — Ingress has no Gateway API route
    /// kind, so there is no per-parentRef status to write back for it.
    pub route_kind: Option<RouteKind>,
    pub service_name: String,
    pub service_exists: bool,
    pub service_port: u16,
    pub node_port: Option<u16>,
    pub weight: i32,
    pub target_type: Option<TargetType>,
    pub protocol: String,
    pub protocol_version: Option<String>,
    pub uses_external_traffic_policy_local: bool,
    pub health_check_node_port: Option<u16>,
    pub service_is_ipv6: bool,
}

/// One L7 rule a route contributes (§4.4 step 6).
#[derive(Clone, Debug)]
pub struct RuleRequest {
    pub port: u16,
    pub explicit_priority: Option<i32>,
    pub path_specificity: PathSpecificity,
    pub conditions: Vec<RuleCondition>,
    pub backends: Vec<BackendRequest>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathSpecificity {
    Exact,
    LongestPrefix(std::cmp::Reverse<usize>),
    Default,
}

/// Everything the builder needs about one reconciliation unit, already
/// extracted from Gateways/Routes or an Ingress group by `index.rs`.
#[derive(Clone, Debug)]
pub struct GroupInput {
    pub namespace: String,
    pub name: String,
    pub schemes: Vec<Scheme>,
    pub ip_address_types: Vec<IpAddressType>,
    pub explicit_subnet_ids: Option<Vec<String>>,
    pub explicit_security_groups: Option<Vec<String>>,
    pub listeners: Vec<ListenerRequest>,
    pub rules: Vec<RuleRequest>,
    /// Backends an L4 (TCP/UDP/TLS) route contributes directly to a
    /// listener's default action, keyed by port — NLB listeners have no
    /// rule/priority concept, so these bypass `rules` entirely.
    pub default_backends: BTreeMap<u16, Vec<BackendRequest>>,
    pub source_ranges: Vec<String>,
    pub vpc_ipv6_cidr: Option<String>,
    pub enable_icmp: bool,
    pub merged_config: MergedLoadBalancerConfig,
    pub gateway_uid: String,
    /// The underlying Kubernetes objects this unit was built from, as
    /// (namespace, name) pairs — one Gateway in Gateway mode, or every
    /// Ingress in the group in Ingress mode. Status write-back patches each
    /// one independently (§4.9 step 6).
    pub members: Vec<(String, String)>,
    /// True once every member's `metadata.deletionTimestamp` is set (§4.9
    /// steps 2-3) — the group is winding down, not merely reconciling.
    pub being_deleted: bool,
}

pub struct BuildOutput {
    pub stack: Stack,
    pub load_balancer_id: ResourceId,
}

pub async fn build(
    cluster: &ClusterInfo,
    cloud: &dyn Cloud,
    input: &GroupInput,
) -> Result<BuildOutput, ControllerError> {
    let stack_id = StackId::new(&input.namespace, &input.name);
    let stack_id_str = stack_id.as_str().to_string();
    let mut stack = Stack::new(stack_id);

    // Step 1: scheme.
    let scheme = one_of(&input.schemes, "conflicting scheme")?;

    // Step 2: IP address type.
    let ip_address_type = one_of(&input.ip_address_types, "conflicting ip address type")?;

    // Step 3: subnets.
    let subnet_ids = resolve_subnets(cluster, cloud, input, scheme).await?;

    // LB resource (possibly adopting a pre-existing one, §4.5).
    let lb_id = ResourceId::new("AWS::ELBV2::LoadBalancer", input.name.clone());
    let lb_type = if input.rules.is_empty() && input.listeners.iter().all(|l| is_l4(&l.protocol)) {
        LoadBalancerType::Network
    } else {
        LoadBalancerType::Application
    };

    let mut user_tags = cluster.default_tags.clone();
    user_tags.extend(input.merged_config.tags.clone());
    let tags = discovery::ownership_tags(
        &cluster.controller_name,
        &cluster.cluster_name,
        &stack_id_str,
        &input.name,
        &user_tags,
    );

    // Step 4: security groups.
    let security_group_tokens = resolve_security_groups(&mut stack, cluster, input)?;

    let lb_spec = LoadBalancerSpec {
        name: input.name.clone(),
        lb_type,
        scheme,
        ip_address_type,
        subnet_ids,
        security_groups: security_group_tokens,
        attributes: input.merged_config.load_balancer_attributes.clone(),
        tags: tags.clone(),
    };

    let mut lb_resource = Resource::new(lb_id.clone(), ResourceSpec::LoadBalancer(lb_spec));

    if let Some(existing) =
        discovery::find_existing_load_balancer(cloud, &cluster.cluster_name, &stack_id_str, scheme)
            .await?
    {
        lb_resource.set_status(ResourceStatus::LoadBalancer(LoadBalancerStatus {
            arn: existing.arn,
            dns_name: existing.dns_name,
            canonical_hosted_zone_id: existing.canonical_hosted_zone_id,
        }));
    }
    stack.add_resource(lb_resource)?;

    // Step 5: listeners.
    let listener_ids = build_listeners(&mut stack, cloud, &lb_id, input).await?;

    // Step 5b: L4 routes forward directly from the listener's default
    // action; there is no ListenerRule for NLB traffic.
    apply_default_backends(&mut stack, &listener_ids, input, cluster)?;

    // Step 6: rules (L7 only).
    build_rules(&mut stack, &listener_ids, input, cluster)?;

    // WAFv2 / WAF Classic / Shield associations (§4.6 Associations), driven
    // by the merged LoadBalancerConfiguration's `waf_web_acl_id` /
    // `waf_classic_web_acl_id` / `shield_advanced_protection` fields.
    build_associations(&mut stack, &lb_id, input)?;

    Ok(BuildOutput {
        stack,
        load_balancer_id: lb_id,
    })
}

fn build_associations(
    stack: &mut Stack,
    lb_id: &ResourceId,
    input: &GroupInput,
) -> Result<(), ControllerError> {
    if let Some(web_acl_id) = &input.merged_config.waf_web_acl_id {
        let assoc_id = ResourceId::new("AWS::WAFv2::WebACLAssociation", lb_id.id.clone());
        stack.add_resource(Resource::new(
            assoc_id,
            ResourceSpec::WebAclAssociation(lbc_core::model::WebAclAssociationSpec {
                kind: lbc_core::model::WebAclKind::V2,
                web_acl_id: web_acl_id.clone(),
                resource_arn: StringToken::deferred(lb_id.clone(), "arn"),
            }),
        ))?;
    }
    if let Some(web_acl_id) = &input.merged_config.waf_classic_web_acl_id {
        let assoc_id = ResourceId::new("AWS::WAFRegional::WebACLAssociation", lb_id.id.clone());
        stack.add_resource(Resource::new(
            assoc_id,
            ResourceSpec::WebAclAssociation(lbc_core::model::WebAclAssociationSpec {
                kind: lbc_core::model::WebAclKind::Classic,
                web_acl_id: web_acl_id.clone(),
                resource_arn: StringToken::deferred(lb_id.clone(), "arn"),
            }),
        ))?;
    }
    if let Some(enabled) = input.merged_config.shield_advanced_protection {
        let shield_id = ResourceId::new("AWS::Shield::Protection", lb_id.id.clone());
        stack.add_resource(Resource::new(
            shield_id,
            ResourceSpec::ShieldProtection(lbc_core::model::ShieldProtectionSpec {
                resource_arn: StringToken::deferred(lb_id.clone(), "arn"),
                enabled,
            }),
        ))?;
    }
    Ok(())
}

fn is_l4(protocol: &str) -> bool {
    matches!(protocol, "TCP" | "UDP" | "TLS")
}

fn one_of<T: Copy + PartialEq + std::fmt::Debug>(
    values: &[T],
    conflict_message: &str,
) -> Result<T, ControllerError> {
    let mut iter = values.iter();
    let first = *iter.next().ok_or_else(|| {
        ControllerError::validation("no value supplied", ErrorContext::field(conflict_message))
    })?;
    if iter.any(|v| *v != first) {
        return Err(ControllerError::conflict(
            conflict_message,
            ErrorContext::none(),
        ));
    }
    Ok(first)
}

async fn resolve_subnets(
    cluster: &ClusterInfo,
    cloud: &dyn Cloud,
    input: &GroupInput,
    scheme: Scheme,
) -> Result<Vec<String>, ControllerError> {
    let subnets = if let Some(ids) = &input.explicit_subnet_ids {
        cloud.ec2().describe_subnets_by_ids(ids).await?
    } else {
        cloud
            .ec2()
            .discover_subnets(scheme, &cluster.cluster_name)
            .await?
    };

    // One subnet per AZ: lexicographically-smallest ID wins; the rest are
    // dropped (ignored, per §4.4 step 3).
    let mut by_az: BTreeMap<String, String> = BTreeMap::new();
    for subnet in subnets {
        by_az
            .entry(subnet.availability_zone)
            .and_modify(|existing| {
                if subnet.id < *existing {
                    *existing = subnet.id.clone();
                }
            })
            .or_insert(subnet.id);
    }

    let min_azs = if cluster.allow_single_az_albs { 1 } else { 2 };
    if by_az.len() < min_azs {
        return Err(ControllerError::validation(
            format!(
                "at least {min_azs} availability zone(s) required, found {}",
                by_az.len()
            ),
            ErrorContext::field("subnets"),
        ));
    }

    Ok(by_az.into_values().collect())
}

fn resolve_security_groups(
    stack: &mut Stack,
    cluster: &ClusterInfo,
    input: &GroupInput,
) -> Result<Vec<StringToken>, ControllerError> {
    if let Some(ids) = &input.explicit_security_groups {
        return Ok(ids.iter().cloned().map(StringToken::literal).collect());
    }

    let mut ports: BTreeSet<(String, u16)> = BTreeSet::new();
    for listener in &input.listeners {
        ports.insert((listener.protocol.clone(), listener.port));
    }

    let source_ranges = if input.source_ranges.is_empty() {
        let mut defaults = vec!["0.0.0.0/0".to_string()];
        if matches!(
            input
                .ip_address_types
                .first()
                .copied()
                .unwrap_or(IpAddressType::Ipv4),
            IpAddressType::Dualstack | IpAddressType::DualstackWithoutPublicIpv4
        ) {
            defaults.push("::/0".to_string());
        }
        defaults
    } else {
        input.source_ranges.clone()
    };

    let mut ingress = Vec::new();
    for (protocol, port) in &ports {
        for cidr in &source_ranges {
            ingress.push(SecurityGroupIngressRule {
                protocol: protocol.clone(),
                from_port: *port,
                to_port: *port,
                cidr: cidr.clone(),
            });
        }
    }
    if input.enable_icmp {
        for cidr in &source_ranges {
            if !cidr.contains(':') {
                ingress.push(SecurityGroupIngressRule {
                    protocol: "icmp".to_string(),
                    from_port: 3,
                    to_port: 4,
                    cidr: cidr.clone(),
                });
            }
        }
    }

    let sg_name = managed_security_group_name(
        &cluster.cluster_name,
        &input.namespace,
        &input.name,
        &input.gateway_uid,
    );
    let sg_id = ResourceId::new("AWS::EC2::SecurityGroup", sg_name.clone());
    let sg_resource = Resource::new(
        sg_id.clone(),
        ResourceSpec::SecurityGroup(SecurityGroupSpec {
            name: sg_name,
            description: format!("managed by {} for {}/{}", cluster.controller_name, input.namespace, input.name),
            ingress,
        }),
    );
    let token = sg_resource.arn_token();
    stack.add_resource(sg_resource)?;
    Ok(vec![token])
}

async fn build_listeners(
    stack: &mut Stack,
    cloud: &dyn Cloud,
    lb_id: &ResourceId,
    input: &GroupInput,
) -> Result<BTreeMap<u16, ResourceId>, ControllerError> {
    let mut by_port: BTreeMap<u16, Vec<&ListenerRequest>> = BTreeMap::new();
    for listener in &input.listeners {
        by_port.entry(listener.port).or_default().push(listener);
    }

    let mut listener_ids = BTreeMap::new();
    for (port, requests) in by_port {
        let distinct_protocols: BTreeSet<&str> = requests.iter().map(|r| r.protocol.as_str()).collect();
        let protocol = match distinct_protocols.len() {
            1 => distinct_protocols.into_iter().next().expect("length checked above").to_string(),
            _ => {
                return Err(ControllerError::conflict(
                    format!("conflicting listener protocol for port {port}"),
                    ErrorContext::field(format!("listeners[port={port}].protocol")),
                ))
            }
        };

        let ssl_policy = requests.iter().find_map(|r| r.ssl_policy.clone());

        let mut certificates = Vec::new();
        for req in &requests {
            for cert in &req.certificate_arns {
                if !certificates.contains(cert) {
                    certificates.push(cert.clone());
                }
            }
        }

        let alpn_policy = requests.iter().find_map(|r| r.alpn_policy.clone());
        if alpn_policy.is_some() && protocol != "TLS" {
            return Err(ControllerError::validation(
                "alpnPolicy is only valid when listener protocol is TLS",
                ErrorContext::field(format!("listeners[port={port}].alpnPolicy")),
            ));
        }

        // Certificate ARNs may come explicitly from the merged config; when a
        // terminating listener names hosts but no ARN, fall back to ACM
        // discovery-by-hostname.
        if certificates.is_empty() && matches!(protocol.as_str(), "HTTPS" | "TLS") {
            let mut hosts: Vec<String> = Vec::new();
            for req in &requests {
                for host in &req.hosts {
                    if !hosts.contains(host) {
                        hosts.push(host.clone());
                    }
                }
            }
            if !hosts.is_empty() {
                certificates = cloud.certificates().discover_certificates(&hosts).await?;
            }
        }

        let default_actions = vec![Action::FixedResponse { status_code: 503 }];

        let listener_id = ResourceId::new("AWS::ELBV2::Listener", port.to_string());
        let listener_resource = Resource::new(
            listener_id.clone(),
            ResourceSpec::Listener(ListenerSpec {
                load_balancer_arn: StringToken::deferred(lb_id.clone(), "arn"),
                port,
                protocol,
                ssl_policy,
                certificates,
                alpn_policy,
                default_actions,
            }),
        );
        stack.add_resource(listener_resource)?;
        listener_ids.insert(port, listener_id);
    }

    Ok(listener_ids)
}

/// Wires an L4 route's backends directly into its listener's default
/// action, bypassing the rule/priority machinery that only AWS Application
/// Load Balancers support.
fn apply_default_backends(
    stack: &mut Stack,
    listener_ids: &BTreeMap<u16, ResourceId>,
    input: &GroupInput,
    cluster: &ClusterInfo,
) -> Result<(), ControllerError> {
    for (port, backends) in &input.default_backends {
        let listener_id = listener_ids
            .get(port)
            .ok_or_else(|| {
                ControllerError::validation(
                    format!("default backend for port {port} has no matching listener"),
                    ErrorContext::field("defaultBackends"),
                )
            })?
            .clone();

        let actions = compose_actions(stack, input, cluster, backends)?;

        let listener = stack
            .get_mut(&listener_id)
            .expect("listener_ids only holds ids of resources already added to the stack");
        if let ResourceSpec::Listener(spec) = listener.spec_mut() {
            spec.default_actions = actions;
        }
    }
    Ok(())
}

fn build_rules(
    stack: &mut Stack,
    listener_ids: &BTreeMap<u16, ResourceId>,
    input: &GroupInput,
    cluster: &ClusterInfo,
) -> Result<(), ControllerError> {
    let mut by_listener: BTreeMap<u16, Vec<&RuleRequest>> = BTreeMap::new();
    for rule in &input.rules {
        by_listener.entry(rule.port).or_default().push(rule);
    }

    for (port, mut rules) in by_listener {
        let listener_id = listener_ids.get(&port).ok_or_else(|| {
            ControllerError::validation(
                format!("rule for port {port} has no matching listener"),
                ErrorContext::field("rules"),
            )
        })?;

        rules.sort_by_key(|r| (r.explicit_priority.is_none(), r.path_specificity.clone()));

        let mut used_priorities = BTreeSet::new();
        for rule in rules.iter() {
            if let Some(p) = rule.explicit_priority {
                if !used_priorities.insert(p) {
                    return Err(ControllerError::conflict(
                        format!("duplicate explicit priority {p} on listener port {port}"),
                        ErrorContext::field("priority"),
                    ));
                }
            }
        }

        let mut next_priority = 1;
        for (idx, rule) in rules.iter().enumerate() {
            let priority = match rule.explicit_priority {
                Some(p) => p,
                None => {
                    while used_priorities.contains(&next_priority) {
                        next_priority += 1;
                    }
                    used_priorities.insert(next_priority);
                    next_priority
                }
            };

            let actions = compose_actions(stack, input, cluster, &rule.backends)?;

            let rule_id = ResourceId::new(
                "AWS::ELBV2::ListenerRule",
                format!("{port}-{idx}"),
            );
            let rule_resource = Resource::new(
                rule_id,
                ResourceSpec::ListenerRule(ListenerRuleSpec {
                    listener_arn: StringToken::deferred(listener_id.clone(), "arn"),
                    priority,
                    conditions: rule.conditions.clone(),
                    actions,
                }),
            );
            stack.add_resource(rule_resource)?;
        }
    }
    Ok(())
}

fn compose_actions(
    stack: &mut Stack,
    input: &GroupInput,
    cluster: &ClusterInfo,
    backends: &[BackendRequest],
) -> Result<Vec<Action>, ControllerError> {
    if backends.iter().any(|b| !b.service_exists) {
        if cluster.tolerate_missing_backend_service {
            return Ok(vec![Action::FixedResponse { status_code: 503 }]);
        }
        return Err(ControllerError::validation(
            "backend references a non-existent Service",
            ErrorContext::field("backendRefs"),
        ));
    }

    let mut weighted = Vec::with_capacity(backends.len());
    for backend in backends {
        let tg_id = build_target_group(stack, input, cluster, backend)?;
        weighted.push((StringToken::deferred(tg_id, "arn"), backend.weight));
    }

    if weighted.len() == 1 {
        let (token, weight) = weighted.into_iter().next().expect("length checked above");
        Ok(vec![Action::Forward {
            target_group_arn: token,
            weight,
        }])
    } else {
        Ok(vec![Action::WeightedForward(weighted)])
    }
}

fn build_target_group(
    stack: &mut Stack,
    input: &GroupInput,
    cluster: &ClusterInfo,
    backend: &BackendRequest,
) -> Result<ResourceId, ControllerError> {
    let target_type = backend.target_type.unwrap_or(TargetType::Instance);
    if target_type == TargetType::Ip && cluster.disable_ip_target_type {
        return Err(ControllerError::validation(
            "targetType \"ip\" is disabled for this cluster",
            ErrorContext::field("targetType"),
        ));
    }

    let target_type_str = match target_type {
        TargetType::Ip => "ip",
        TargetType::Instance => "instance",
    };

    let port = match target_type {
        TargetType::Instance => backend.node_port.ok_or_else(|| {
            ControllerError::validation(
                "instance target type requires a NodePort Service",
                ErrorContext::field("service.spec.ports[].nodePort"),
            )
        })?,
        TargetType::Ip => backend.service_port,
    };

    let ip_address_type = if backend.service_is_ipv6 {
        match input.ip_address_types.first().copied() {
            Some(IpAddressType::Dualstack) | Some(IpAddressType::DualstackWithoutPublicIpv4) => {
                IpAddressType::Dualstack
            }
            _ => {
                return Err(ControllerError::validation(
                    "unsupported IP family: Service is IPv6 but load balancer is not dualstack",
                    ErrorContext::field("ipAddressType"),
                ))
            }
        }
    } else {
        IpAddressType::Ipv4
    };

    let health_check = default_health_check(backend);

    let fingerprint = TargetGroupFingerprint {
        cluster_name: &cluster.cluster_name,
        route_identity: &backend.route_identity,
        service_name: &backend.service_name,
        port,
        protocol: &backend.protocol,
        protocol_version: backend.protocol_version.as_deref(),
        target_type: target_type_str,
    };
    let tg_name = fingerprint.target_group_name(&input.namespace);

    let tg_id = ResourceId::new("AWS::ELBV2::TargetGroup", tg_name.clone());
    if stack.get(&tg_id).is_none() {
        let tg_resource = Resource::new(
            tg_id.clone(),
            ResourceSpec::TargetGroup(TargetGroupSpec {
                name: tg_name,
                target_type,
                port,
                protocol: backend.protocol.clone(),
                protocol_version: backend.protocol_version.clone(),
                ip_address_type,
                health_check,
                attributes: BTreeMap::new(),
            }),
        );
        stack.add_resource(tg_resource)?;

        let networking = if cluster.manage_backend_security_group_rules {
            let cidrs = if backend.service_is_ipv6 {
                input
                    .vpc_ipv6_cidr
                    .clone()
                    .map(|c| vec![c])
                    .unwrap_or_default()
            } else {
                input.source_ranges.clone()
            };
            Some(vec![TargetGroupBindingNetworkingRule {
                from_cidrs: cidrs,
                protocol: backend.protocol.clone(),
                port: port as i32,
            }])
        } else {
            None
        };

        let tgb_id = ResourceId::new("TargetGroupBinding", tg_id.id.clone());
        let tgb_resource = Resource::new(
            tgb_id,
            ResourceSpec::TargetGroupBinding(TargetGroupBindingSpec {
                target_group_arn: StringToken::deferred(tg_id.clone(), "arn"),
                target_type,
                service_name: backend.service_name.clone(),
                service_port: backend.service_port.to_string(),
                ip_address_type,
                networking,
            }),
        );
        stack.add_resource(tgb_resource)?;
    }

    Ok(tg_id)
}

fn default_health_check(backend: &BackendRequest) -> HealthCheckSpec {
    let port = if backend.uses_external_traffic_policy_local {
        backend
            .health_check_node_port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "traffic-port".to_string())
    } else {
        "traffic-port".to_string()
    };

    HealthCheckSpec {
        port,
        protocol: backend.protocol.clone(),
        path: if backend.protocol.starts_with("HTTP") {
            Some("/".to_string())
        } else {
            None
        },
        matcher: if backend.protocol_version.as_deref() == Some("GRPC") {
            "0".to_string()
        } else {
            "200-399".to_string()
        },
        interval_seconds: 15,
        timeout_seconds: 5,
        healthy_threshold: 3,
        unhealthy_threshold: 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbc_core::cloud::{CertificateDiscovery, Ec2, ElasticLoadBalancing, ShieldProtection, SubnetInfo, WebAclAssociations};
    use lbc_core::model::Scheme;
    use std::collections::BTreeMap as Map;

    struct FakeEc2 {
        subnets: Vec<SubnetInfo>,
    }

    #[async_trait::async_trait]
    impl Ec2 for FakeEc2 {
        async fn describe_subnets_by_ids(&self, _ids: &[String]) -> lbc_core::Result<Vec<SubnetInfo>> {
            Ok(self.subnets.clone())
        }
        async fn discover_subnets(&self, _scheme: Scheme, _cluster: &str) -> lbc_core::Result<Vec<SubnetInfo>> {
            Ok(self.subnets.clone())
        }
        async fn resolve_security_groups(&self, ids: &[String]) -> lbc_core::Result<Vec<String>> {
            Ok(ids.to_vec())
        }
        async fn find_tagged_security_groups(&self, _cluster: &str, _stack_id: &str) -> lbc_core::Result<Vec<lbc_core::cloud::SecurityGroupObservation>> {
            Ok(vec![])
        }
        async fn create_security_group(&self, _spec: &SecurityGroupSpec, _tags: &Map<String, String>) -> lbc_core::Result<String> {
            Ok("sg-new".to_string())
        }
        async fn update_security_group_ingress(&self, _group_id: &str, _rules: &[SecurityGroupIngressRule]) -> lbc_core::Result<()> {
            Ok(())
        }
        async fn delete_security_group(&self, _group_id: &str) -> lbc_core::Result<()> {
            Ok(())
        }
    }

    struct FakeElbv2;

    #[async_trait::async_trait]
    impl ElasticLoadBalancing for FakeElbv2 {
        async fn find_tagged_load_balancers(&self, _cluster: &str, _stack_id: &str) -> lbc_core::Result<Vec<lbc_core::cloud::ExistingLoadBalancer>> {
            Ok(vec![])
        }
        async fn create_load_balancer(&self, _spec: &LoadBalancerSpec, _tags: &Map<String, String>) -> lbc_core::Result<lbc_core::cloud::ExistingLoadBalancer> {
            unimplemented!("not exercised by the builder")
        }
        async fn modify_load_balancer(&self, _arn: &str, _spec: &LoadBalancerSpec) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn delete_load_balancer(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn wait_for_active(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn list_listeners(&self, _lb_arn: &str) -> lbc_core::Result<Vec<lbc_core::cloud::ListenerObservation>> {
            unimplemented!()
        }
        async fn create_listener(
            &self,
            _lb_arn: &str,
            _spec: &ListenerSpec,
            _statuses: &lbc_core::token::StatusTable,
        ) -> lbc_core::Result<String> {
            unimplemented!()
        }
        async fn modify_listener(
            &self,
            _arn: &str,
            _spec: &ListenerSpec,
            _statuses: &lbc_core::token::StatusTable,
        ) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn delete_listener(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn list_rules(&self, _listener_arn: &str) -> lbc_core::Result<Vec<lbc_core::cloud::RuleObservation>> {
            unimplemented!()
        }
        async fn create_rule(
            &self,
            _listener_arn: &str,
            _spec: &ListenerRuleSpec,
            _statuses: &lbc_core::token::StatusTable,
        ) -> lbc_core::Result<String> {
            unimplemented!()
        }
        async fn modify_rule(
            &self,
            _arn: &str,
            _spec: &ListenerRuleSpec,
            _statuses: &lbc_core::token::StatusTable,
        ) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn set_rule_priorities(&self, _priorities: &[(String, i32)]) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn delete_rule(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn find_tagged_target_groups(&self, _cluster: &str, _stack_id: &str) -> lbc_core::Result<Vec<lbc_core::cloud::TargetGroupObservation>> {
            unimplemented!()
        }
        async fn create_target_group(&self, _spec: &TargetGroupSpec, _tags: &Map<String, String>) -> lbc_core::Result<String> {
            unimplemented!()
        }
        async fn modify_target_group(&self, _arn: &str, _spec: &TargetGroupSpec) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn delete_target_group(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
    }

    struct FakeCerts;
    #[async_trait::async_trait]
    impl CertificateDiscovery for FakeCerts {
        async fn discover_certificates(&self, _hosts: &[String]) -> lbc_core::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    struct FakeWaf;
    #[async_trait::async_trait]
    impl WebAclAssociations for FakeWaf {
        async fn get_associated_web_acl(&self, _arn: &str) -> lbc_core::Result<Option<String>> {
            Ok(None)
        }
        async fn associate_web_acl(
            &self,
            _arn: &str,
            _id: &str,
            _kind: lbc_core::model::WebAclKind,
        ) -> lbc_core::Result<()> {
            Ok(())
        }
        async fn disassociate_web_acl(&self, _arn: &str) -> lbc_core::Result<()> {
            Ok(())
        }
    }

    struct FakeShield;
    #[async_trait::async_trait]
    impl ShieldProtection for FakeShield {
        async fn is_protected(&self, _arn: &str) -> lbc_core::Result<bool> {
            Ok(false)
        }
        async fn enable_protection(&self, _arn: &str) -> lbc_core::Result<()> {
            Ok(())
        }
        async fn disable_protection(&self, _arn: &str) -> lbc_core::Result<()> {
            Ok(())
        }
    }

    struct FakeCloud {
        ec2: FakeEc2,
        elbv2: FakeElbv2,
        certs: FakeCerts,
        waf: FakeWaf,
        shield: FakeShield,
    }

    impl Cloud for FakeCloud {
        fn ec2(&self) -> &dyn Ec2 {
            &self.ec2
        }
        fn elbv2(&self) -> &dyn ElasticLoadBalancing {
            &self.elbv2
        }
        fn certificates(&self) -> &dyn CertificateDiscovery {
            &self.certs
        }
        fn web_acl_associations(&self) -> &dyn WebAclAssociations {
            &self.waf
        }
        fn shield(&self) -> &dyn ShieldProtection {
            &self.shield
        }
    }

    fn two_az_cloud() -> FakeCloud {
        FakeCloud {
            ec2: FakeEc2 {
                subnets: vec![
                    SubnetInfo {
                        id: "subnet-a".into(),
                        availability_zone: "us-east-1a".into(),
                        tags: Map::new(),
                    },
                    SubnetInfo {
                        id: "subnet-b".into(),
                        availability_zone: "us-east-1b".into(),
                        tags: Map::new(),
                    },
                ],
            },
            elbv2: FakeElbv2,
            certs: FakeCerts,
            waf: FakeWaf,
            shield: FakeShield,
        }
    }

    fn s1_input() -> GroupInput {
        GroupInput {
            namespace: "default".into(),
            name: "nlb-ip".into(),
            schemes: vec![Scheme::Internal],
            ip_address_types: vec![IpAddressType::Ipv4],
            explicit_subnet_ids: None,
            explicit_security_groups: None,
            listeners: vec![ListenerRequest {
                name: "tcp-80".into(),
                port: 80,
                protocol: "TCP".into(),
                ssl_policy: None,
                certificate_arns: vec![],
                alpn_policy: None,
                hosts: vec![],
            }],
            rules: vec![],
            default_backends: Map::from([(
                80,
                vec![BackendRequest {
                    route_identity: "default/tcp-route".into(),
                    route_kind: Some(RouteKind::Tcp),
                    service_name: "svc".into(),
                    service_exists: true,
                    service_port: 80,
                    node_port: Some(30080),
                    weight: 1,
                    target_type: Some(TargetType::Instance),
                    protocol: "TCP".into(),
                    protocol_version: None,
                    uses_external_traffic_policy_local: false,
                    health_check_node_port: None,
                    service_is_ipv6: false,
                }],
            )]),
            source_ranges: vec![],
            vpc_ipv6_cidr: None,
            enable_icmp: false,
            merged_config: MergedLoadBalancerConfig::default(),
            gateway_uid: "uid-1".into(),
            members: vec![("default".into(), "nlb-ip".into())],
            being_deleted: false,
        }
    }

    #[tokio::test]
    async fn s1_nlb_single_tcp_route_to_instance_backend() {
        let cluster = ClusterInfo {
            cluster_name: std::sync::Arc::new("test-cluster".into()),
            ..Default::default()
        };
        let cloud = two_az_cloud();
        let output = build(&cluster, &cloud, &s1_input()).await.unwrap();

        assert_eq!(output.stack.list_resources("AWS::ELBV2::LoadBalancer").len(), 1);
        assert_eq!(output.stack.list_resources("AWS::ELBV2::Listener").len(), 1);
        assert_eq!(output.stack.list_resources("AWS::ELBV2::TargetGroup").len(), 1);

        let listeners = output.stack.list_resources("AWS::ELBV2::Listener");
        if let ResourceSpec::Listener(spec) = listeners[0].spec() {
            assert!(matches!(spec.default_actions.as_slice(), [Action::Forward { .. }]));
        } else {
            panic!("expected listener spec");
        }

        let sgs = output.stack.list_resources("AWS::EC2::SecurityGroup");
        assert_eq!(sgs.len(), 1);
        if let ResourceSpec::SecurityGroup(spec) = sgs[0].spec() {
            let v4: Vec<_> = spec.ingress.iter().filter(|r| r.cidr == "0.0.0.0/0").collect();
            assert_eq!(v4.len(), 1);
            assert!(spec.ingress.iter().all(|r| r.cidr != "::/0"), "dualstack off omits v6");
        } else {
            panic!("expected security group spec");
        }
    }

    #[tokio::test]
    async fn s2_dualstack_adds_v6_default_source_range() {
        let cluster = ClusterInfo {
            cluster_name: std::sync::Arc::new("test-cluster".into()),
            ..Default::default()
        };
        let cloud = two_az_cloud();
        let mut input = s1_input();
        input.ip_address_types = vec![IpAddressType::Dualstack];
        input.vpc_ipv6_cidr = Some("2600:1f00::/56".into());

        let output = build(&cluster, &cloud, &input).await.unwrap();
        let sgs = output.stack.list_resources("AWS::EC2::SecurityGroup");
        if let ResourceSpec::SecurityGroup(spec) = sgs[0].spec() {
            assert!(spec.ingress.iter().any(|r| r.cidr == "::/0"));
        } else {
            panic!("expected security group spec");
        }
    }

    #[tokio::test]
    async fn s6_conflicting_listener_protocol_fails_build() {
        let cluster = ClusterInfo {
            cluster_name: std::sync::Arc::new("test-cluster".into()),
            ..Default::default()
        };
        let cloud = two_az_cloud();
        let mut input = s1_input();
        input.name = "ingress-group".into();
        input.listeners = vec![
            ListenerRequest {
                port: 80,
                protocol: "HTTP".into(),
                ssl_policy: None,
                certificate_arns: vec![],
                alpn_policy: None,
                hosts: vec![],
            },
            ListenerRequest {
                port: 80,
                protocol: "HTTPS".into(),
                ssl_policy: None,
                certificate_arns: vec![],
                alpn_policy: None,
                hosts: vec![],
            },
        ];

        let err = build(&cluster, &cloud, &input).await.unwrap_err();
        assert!(matches!(err, ControllerError::Conflict { .. }));
    }

    #[tokio::test]
    async fn s3_https_certs_deduplicated_preserving_first_seen_order() {
        let cluster = ClusterInfo {
            cluster_name: std::sync::Arc::new("test-cluster".into()),
            ..Default::default()
        };
        let cloud = two_az_cloud();
        let mut input = s1_input();
        input.default_backends = Map::new();
        input.listeners = vec![
            ListenerRequest {
                port: 443,
                protocol: "HTTPS".into(),
                ssl_policy: None,
                certificate_arns: vec!["arn:...:cert1".into()],
                alpn_policy: None,
                hosts: vec![],
            },
            ListenerRequest {
                port: 443,
                protocol: "HTTPS".into(),
                ssl_policy: None,
                certificate_arns: vec!["arn:...:cert2".into()],
                alpn_policy: None,
                hosts: vec![],
            },
        ];

        let output = build(&cluster, &cloud, &input).await.unwrap();
        let listeners = output.stack.list_resources("AWS::ELBV2::Listener");
        assert_eq!(listeners.len(), 1);
        if let ResourceSpec::Listener(spec) = listeners[0].spec() {
            assert_eq!(spec.certificates, vec!["arn:...:cert1", "arn:...:cert2"]);
        } else {
            panic!("expected listener spec");
        }
    }

    #[tokio::test]
    async fn too_few_availability_zones_fails_build() {
        let cluster = ClusterInfo {
            cluster_name: std::sync::Arc::new("test-cluster".into()),
            ..Default::default()
        };
        let cloud = FakeCloud {
            ec2: FakeEc2 {
                subnets: vec![SubnetInfo {
                    id: "subnet-a".into(),
                    availability_zone: "us-east-1a".into(),
                    tags: Map::new(),
                }],
            },
            elbv2: FakeElbv2,
            certs: FakeCerts,
            waf: FakeWaf,
            shield: FakeShield,
        };

        let err = build(&cluster, &cloud, &s1_input()).await.unwrap_err();
        assert!(matches!(err, ControllerError::Validation { .. }));
    }
}
