//! ELBv2-backed [`ElasticLoadBalancing`] implementation: load balancers,
//! listeners, rules and target groups (§4.6).

use aws_sdk_elasticloadbalancingv2::types::{
    Action as SdkAction, ActionTypeEnum, AuthenticateCognitoActionConfig, AuthenticateOidcActionConfig,
    Certificate, FixedResponseActionConfig, IpAddressType as SdkIpAddressType, LoadBalancerSchemeEnum,
    LoadBalancerTypeEnum, RulePriorityPair, TargetGroupTuple, TargetTypeEnum, Tag,
};
use lbc_core::cloud::{
    ElasticLoadBalancing, ExistingLoadBalancer, ListenerObservation, RuleObservation, TargetGroupObservation,
};
use lbc_core::model::{
    Action, AuthAction, HealthCheckSpec, IpAddressType, ListenerRuleSpec, ListenerSpec, LoadBalancerSpec,
    LoadBalancerType, RuleCondition, Scheme, TargetGroupSpec, TargetType,
};
use lbc_core::token::{StatusTable, StringToken};
use lbc_core::{ControllerError, ErrorContext, Result};
use std::collections::BTreeMap;

pub struct Elbv2Client {
    client: aws_sdk_elasticloadbalancingv2::Client,
    vpc_id: String,
    controller_name: String,
}

impl Elbv2Client {
    pub fn new(client: aws_sdk_elasticloadbalancingv2::Client, vpc_id: String, controller_name: String) -> Self {
        Self {
            client,
            vpc_id,
            controller_name,
        }
    }
}

fn map_sdk_error(err: impl std::fmt::Display, context: ErrorContext) -> ControllerError {
    let message = err.to_string();
    if message.contains("TooManyRequests") || message.contains("Throttling") {
        ControllerError::AwsThrottling { message, context }
    } else if message.contains("NotFound") {
        ControllerError::AwsNotFound { context }
    } else if message.contains("DuplicateListener") || message.contains("PriorityInUse") || message.contains("DuplicateTagKeys") {
        ControllerError::AwsConflict { message, context }
    } else {
        ControllerError::TransientIo { message, context }
    }
}

fn to_sdk_tags(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

fn to_sdk_actions(actions: &[Action], statuses: &StatusTable) -> Result<Vec<SdkAction>> {
    actions
        .iter()
        .enumerate()
        .map(|(i, action)| {
            let order = (i + 1) as i32;
            Ok(match action {
                Action::Forward { target_group_arn, .. } => {
                    let arn = target_group_arn.resolve(statuses)?;
                    SdkAction::builder()
                        .r#type(ActionTypeEnum::Forward)
                        .target_group_arn(arn)
                        .order(order)
                        .build()
                        .expect("forward action builds")
                }
                Action::WeightedForward(weighted) => {
                    let mut groups = Vec::with_capacity(weighted.len());
                    for (token, weight) in weighted {
                        groups.push(
                            TargetGroupTuple::builder()
                                .target_group_arn(token.resolve(statuses)?)
                                .weight(*weight)
                                .build(),
                        );
                    }
                    SdkAction::builder()
                        .r#type(ActionTypeEnum::Forward)
                        .forward_config(
                            aws_sdk_elasticloadbalancingv2::types::ForwardActionConfig::builder()
                                .set_target_groups(Some(groups))
                                .build(),
                        )
                        .order(order)
                        .build()
                        .expect("weighted forward action builds")
                }
                Action::FixedResponse { status_code } => SdkAction::builder()
                    .r#type(ActionTypeEnum::FixedResponse)
                    .fixed_response_config(
                        FixedResponseActionConfig::builder()
                            .status_code(status_code.to_string())
                            .content_type("text/plain")
                            .build(),
                    )
                    .order(order)
                    .build()
                    .expect("fixed-response action builds"),
                Action::Authenticate(auth) => match auth {
                    lbc_core::model::AuthAction::Oidc { issuer, client_id } => SdkAction::builder()
                        .r#type(ActionTypeEnum::AuthenticateOidc)
                        .authenticate_oidc_config(
                            AuthenticateOidcActionConfig::builder()
                                .issuer(issuer)
                                .client_id(client_id)
                                .build()
                                .expect("oidc config builds"),
                        )
                        .order(order)
                        .build()
                        .expect("authenticate-oidc action builds"),
                    lbc_core::model::AuthAction::Cognito { user_pool_arn } => SdkAction::builder()
                        .r#type(ActionTypeEnum::AuthenticateCognito)
                        .authenticate_cognito_config(
                            AuthenticateCognitoActionConfig::builder()
                                .user_pool_arn(user_pool_arn)
                                .build()
                                .expect("cognito config builds"),
                        )
                        .order(order)
                        .build()
                        .expect("authenticate-cognito action builds"),
                },
            })
        })
        .collect()
}

fn to_sdk_conditions(
    conditions: &[RuleCondition],
) -> Vec<aws_sdk_elasticloadbalancingv2::types::RuleCondition> {
    use aws_sdk_elasticloadbalancingv2::types::{
        HttpHeaderConditionConfig, HttpRequestMethodConditionConfig, PathPatternConditionConfig,
        RuleCondition as SdkCondition,
    };
    conditions
        .iter()
        .map(|c| match c {
            RuleCondition::PathExact(path) | RuleCondition::PathPrefix(path) => SdkCondition::builder()
                .field("path-pattern")
                .path_pattern_config(PathPatternConditionConfig::builder().values(path).build())
                .build(),
            RuleCondition::Header { name, values } => SdkCondition::builder()
                .field("http-header")
                .http_header_config(
                    HttpHeaderConditionConfig::builder()
                        .http_header_name(name)
                        .set_values(Some(values.clone()))
                        .build(),
                )
                .build(),
            RuleCondition::Method(method) => SdkCondition::builder()
                .field("http-request-method")
                .http_request_method_config(
                    HttpRequestMethodConditionConfig::builder().values(method).build(),
                )
                .build(),
        })
        .collect()
}

/// Inverse of [`to_sdk_actions`]: reconstructs a comparable action list from
/// a describe-call response, so a synthesizer can diff desired against live
/// without leaking SDK types past this module (§4.6 step 3, idempotence).
fn from_sdk_actions(actions: Vec<SdkAction>) -> Vec<Action> {
    let mut actions = actions;
    actions.sort_by_key(|a| a.order.unwrap_or_default());
    actions
        .into_iter()
        .filter_map(|action| match action.r#type {
            Some(ActionTypeEnum::Forward) => {
                if let Some(config) = action.forward_config {
                    let mut groups = config.target_groups.unwrap_or_default();
                    if groups.len() > 1 {
                        let weighted = groups
                            .into_iter()
                            .filter_map(|g| Some((StringToken::literal(g.target_group_arn?), g.weight.unwrap_or(1))))
                            .collect();
                        return Some(Action::WeightedForward(weighted));
                    }
                    let group = groups.pop()?;
                    return Some(Action::Forward {
                        target_group_arn: StringToken::literal(group.target_group_arn?),
                        weight: group.weight.unwrap_or(1),
                    });
                }
                Some(Action::Forward {
                    target_group_arn: StringToken::literal(action.target_group_arn?),
                    weight: 1,
                })
            }
            Some(ActionTypeEnum::FixedResponse) => {
                let config = action.fixed_response_config?;
                Some(Action::FixedResponse {
                    status_code: config.status_code?.parse().ok()?,
                })
            }
            Some(ActionTypeEnum::AuthenticateOidc) => {
                let config = action.authenticate_oidc_config?;
                Some(Action::Authenticate(AuthAction::Oidc {
                    issuer: config.issuer?,
                    client_id: config.client_id?,
                }))
            }
            Some(ActionTypeEnum::AuthenticateCognito) => {
                let config = action.authenticate_cognito_config?;
                Some(Action::Authenticate(AuthAction::Cognito {
                    user_pool_arn: config.user_pool_arn?,
                }))
            }
            _ => None,
        })
        .collect()
}

/// Inverse of [`to_sdk_conditions`]. AWS's `path-pattern` field shape can't
/// distinguish an exact match from a prefix match, so every path condition
/// decodes as [`RuleCondition::PathPrefix`] — callers compare through
/// [`lbc_core::model::conditions_equivalent`], which normalizes the same way.
fn from_sdk_conditions(
    conditions: Vec<aws_sdk_elasticloadbalancingv2::types::RuleCondition>,
) -> Vec<RuleCondition> {
    conditions
        .into_iter()
        .filter_map(|c| match c.field.as_deref() {
            Some("path-pattern") => {
                let path = c.path_pattern_config.and_then(|cfg| cfg.values)?.into_iter().next()?;
                Some(RuleCondition::PathPrefix(path))
            }
            Some("http-header") => {
                let cfg = c.http_header_config?;
                Some(RuleCondition::Header {
                    name: cfg.http_header_name?,
                    values: cfg.values.unwrap_or_default(),
                })
            }
            Some("http-request-method") => {
                let method = c
                    .http_request_method_config
                    .and_then(|cfg| cfg.values)?
                    .into_iter()
                    .next()?;
                Some(RuleCondition::Method(method))
            }
            _ => None,
        })
        .collect()
}

fn lb_type_from_sdk(t: Option<LoadBalancerTypeEnum>) -> LoadBalancerType {
    match t {
        Some(LoadBalancerTypeEnum::Network) => LoadBalancerType::Network,
        _ => LoadBalancerType::Application,
    }
}

fn ip_address_type_from_sdk(t: Option<&SdkIpAddressType>) -> IpAddressType {
    match t {
        Some(SdkIpAddressType::Dualstack) => IpAddressType::Dualstack,
        _ => IpAddressType::Ipv4,
    }
}

fn target_type_from_sdk(t: Option<TargetTypeEnum>) -> TargetType {
    match t {
        Some(TargetTypeEnum::Instance) => TargetType::Instance,
        _ => TargetType::Ip,
    }
}

#[async_trait::async_trait]
impl ElasticLoadBalancing for Elbv2Client {
    async fn find_tagged_load_balancers(
        &self,
        cluster_name: &str,
        stack_id: &str,
    ) -> Result<Vec<ExistingLoadBalancer>> {
        let cluster_key = format!("{}/cluster", self.controller_name);
        let stack_key = format!("{}/stack", self.controller_name);

        let resp = self
            .client
            .describe_load_balancers()
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::LoadBalancer", stack_id)))?;

        let mut matches = Vec::new();
        for lb in resp.load_balancers.unwrap_or_default() {
            let Some(arn) = lb.load_balancer_arn.clone() else { continue };
            if lb.vpc_id.as_deref() != Some(self.vpc_id.as_str()) {
                continue;
            }
            let tags_resp = self
                .client
                .describe_tags()
                .resource_arns(&arn)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::LoadBalancer", &arn)))?;
            let tags: BTreeMap<String, String> = tags_resp
                .tag_descriptions
                .unwrap_or_default()
                .into_iter()
                .find(|d| d.resource_arn.as_deref() == Some(arn.as_str()))
                .map(|d| {
                    d.tags
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|t| Some((t.key?, t.value.unwrap_or_default())))
                        .collect()
                })
                .unwrap_or_default();

            if tags.get(&cluster_key).map(String::as_str) == Some(cluster_name)
                && tags.get(&stack_key).map(String::as_str) == Some(stack_id)
            {
                let attrs_resp = self
                    .client
                    .describe_load_balancer_attributes()
                    .load_balancer_arn(&arn)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::LoadBalancer", &arn)))?;
                let attributes: BTreeMap<String, String> = attrs_resp
                    .attributes
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|a| Some((a.key?, a.value.unwrap_or_default())))
                    .collect();

                matches.push(ExistingLoadBalancer {
                    arn,
                    dns_name: lb.dns_name.unwrap_or_default(),
                    canonical_hosted_zone_id: lb.canonical_hosted_zone_id.unwrap_or_default(),
                    lb_type: lb_type_from_sdk(lb.r#type),
                    scheme: match lb.scheme {
                        Some(LoadBalancerSchemeEnum::Internal) => Scheme::Internal,
                        _ => Scheme::InternetFacing,
                    },
                    ip_address_type: ip_address_type_from_sdk(lb.ip_address_type.as_ref()),
                    attributes,
                });
            }
        }
        Ok(matches)
    }

    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerSpec,
        tags: &BTreeMap<String, String>,
    ) -> Result<ExistingLoadBalancer> {
        let resp = self
            .client
            .create_load_balancer()
            .name(&spec.name)
            .r#type(match spec.lb_type {
                LoadBalancerType::Application => LoadBalancerTypeEnum::Application,
                LoadBalancerType::Network => LoadBalancerTypeEnum::Network,
            })
            .scheme(match spec.scheme {
                Scheme::Internal => LoadBalancerSchemeEnum::Internal,
                Scheme::InternetFacing => LoadBalancerSchemeEnum::InternetFacing,
            })
            .ip_address_type(match spec.ip_address_type {
                IpAddressType::Ipv4 => SdkIpAddressType::Ipv4,
                IpAddressType::Dualstack | IpAddressType::DualstackWithoutPublicIpv4 => {
                    SdkIpAddressType::Dualstack
                }
            })
            .set_subnets(Some(spec.subnet_ids.clone()))
            .set_tags(Some(to_sdk_tags(tags)))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::LoadBalancer", &spec.name)))?;

        let lb = resp
            .load_balancers
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| ControllerError::fatal("create_load_balancer returned no load balancer", ErrorContext::none()))?;

        let arn = lb.load_balancer_arn.unwrap_or_default();
        if !spec.attributes.is_empty() {
            self.modify_load_balancer(&arn, spec).await?;
        }

        Ok(ExistingLoadBalancer {
            arn,
            dns_name: lb.dns_name.unwrap_or_default(),
            canonical_hosted_zone_id: lb.canonical_hosted_zone_id.unwrap_or_default(),
            lb_type: spec.lb_type,
            scheme: spec.scheme,
            ip_address_type: spec.ip_address_type,
            attributes: spec.attributes.clone(),
        })
    }

    /// Only attributes are modified in place — type, scheme and IP address
    /// type are immutable on a live load balancer; a change to any of those
    /// is a delete-and-recreate decided by the synthesizer (§4.6 diff
    /// policy), not something this call can express.
    async fn modify_load_balancer(&self, arn: &str, spec: &LoadBalancerSpec) -> Result<()> {
        if !spec.attributes.is_empty() {
            let attrs = spec
                .attributes
                .iter()
                .map(|(k, v)| {
                    aws_sdk_elasticloadbalancingv2::types::LoadBalancerAttribute::builder()
                        .key(k)
                        .value(v)
                        .build()
                })
                .collect::<Vec<_>>();
            self.client
                .modify_load_balancer_attributes()
                .load_balancer_arn(arn)
                .set_attributes(Some(attrs))
                .send()
                .await
                .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::LoadBalancer", arn)))?;
        }
        Ok(())
    }

    async fn delete_load_balancer(&self, arn: &str) -> Result<()> {
        match self.client.delete_load_balancer().load_balancer_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("LoadBalancerNotFound") => Ok(()),
            Err(e) => Err(map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::LoadBalancer", arn))),
        }
    }

    async fn wait_for_active(&self, arn: &str) -> Result<()> {
        crate::waiters::poll_until(|| async {
            let resp = self
                .client
                .describe_load_balancers()
                .load_balancer_arns(arn)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::LoadBalancer", arn)))?;
            let state = resp
                .load_balancers
                .unwrap_or_default()
                .into_iter()
                .next()
                .and_then(|lb| lb.state)
                .and_then(|s| s.code)
                .map(|c| c.as_str().to_string())
                .unwrap_or_default();
            match state.as_str() {
                "active" => Ok(true),
                "failed" => Err(ControllerError::fatal(
                    "load balancer entered failed state",
                    ErrorContext::resource("AWS::ELBV2::LoadBalancer", arn),
                )),
                _ => Ok(false),
            }
        })
        .await
    }

    async fn list_listeners(&self, load_balancer_arn: &str) -> Result<Vec<ListenerObservation>> {
        let resp = self
            .client
            .describe_listeners()
            .load_balancer_arn(load_balancer_arn)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::Listener", load_balancer_arn)))?;

        Ok(resp
            .listeners
            .unwrap_or_default()
            .into_iter()
            .filter_map(|l| {
                Some(ListenerObservation {
                    arn: l.listener_arn?,
                    port: l.port.unwrap_or_default() as u16,
                    protocol: l.protocol.map(|p| p.as_str().to_string()).unwrap_or_default(),
                    ssl_policy: l.ssl_policy,
                    certificates: l
                        .certificates
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|c| c.certificate_arn)
                        .collect(),
                    alpn_policy: l.alpn_policy.and_then(|p| p.into_iter().next()),
                    default_actions: from_sdk_actions(l.default_actions.unwrap_or_default()),
                })
            })
            .collect())
    }

    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        spec: &ListenerSpec,
        statuses: &StatusTable,
    ) -> Result<String> {
        let certs: Vec<Certificate> = spec
            .certificates
            .iter()
            .map(|arn| Certificate::builder().certificate_arn(arn).build())
            .collect();

        let actions = to_sdk_actions(&spec.default_actions, statuses)?;
        let resp = self
            .client
            .create_listener()
            .load_balancer_arn(load_balancer_arn)
            .port(spec.port as i32)
            .protocol(spec.protocol.as_str().into())
            .set_ssl_policy(spec.ssl_policy.clone())
            .set_certificates(if certs.is_empty() { None } else { Some(certs) })
            .set_alpn_policy(spec.alpn_policy.clone().map(|p| vec![p]))
            .set_default_actions(Some(actions))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::Listener", load_balancer_arn)))?;

        resp.listeners
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|l| l.listener_arn)
            .ok_or_else(|| ControllerError::fatal("create_listener returned no listener", ErrorContext::none()))
    }

    async fn modify_listener(&self, arn: &str, spec: &ListenerSpec, statuses: &StatusTable) -> Result<()> {
        let certs: Vec<Certificate> = spec
            .certificates
            .iter()
            .map(|c| Certificate::builder().certificate_arn(c).build())
            .collect();
        let actions = to_sdk_actions(&spec.default_actions, statuses)?;
        self.client
            .modify_listener()
            .listener_arn(arn)
            .set_ssl_policy(spec.ssl_policy.clone())
            .set_certificates(if certs.is_empty() { None } else { Some(certs) })
            .set_alpn_policy(spec.alpn_policy.clone().map(|p| vec![p]))
            .set_default_actions(Some(actions))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::Listener", arn)))?;
        Ok(())
    }

    async fn delete_listener(&self, arn: &str) -> Result<()> {
        match self.client.delete_listener().listener_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("ListenerNotFound") => Ok(()),
            Err(e) => Err(map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::Listener", arn))),
        }
    }

    async fn list_rules(&self, listener_arn: &str) -> Result<Vec<RuleObservation>> {
        let resp = self
            .client
            .describe_rules()
            .listener_arn(listener_arn)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::ListenerRule", listener_arn)))?;

        Ok(resp
            .rules
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                Some(RuleObservation {
                    arn: r.rule_arn?,
                    priority: r.priority.and_then(|p| p.parse().ok()).unwrap_or_default(),
                    is_default: r.is_default,
                    conditions: from_sdk_conditions(r.conditions.unwrap_or_default()),
                    actions: from_sdk_actions(r.actions.unwrap_or_default()),
                })
            })
            .collect())
    }

    async fn create_rule(
        &self,
        listener_arn: &str,
        spec: &ListenerRuleSpec,
        statuses: &StatusTable,
    ) -> Result<String> {
        let actions = to_sdk_actions(&spec.actions, statuses)?;
        let resp = self
            .client
            .create_rule()
            .listener_arn(listener_arn)
            .priority(spec.priority)
            .set_conditions(Some(to_sdk_conditions(&spec.conditions)))
            .set_actions(Some(actions))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::ListenerRule", listener_arn)))?;

        resp.rules
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|r| r.rule_arn)
            .ok_or_else(|| ControllerError::fatal("create_rule returned no rule", ErrorContext::none()))
    }

    async fn modify_rule(&self, arn: &str, spec: &ListenerRuleSpec, statuses: &StatusTable) -> Result<()> {
        let actions = to_sdk_actions(&spec.actions, statuses)?;
        self.client
            .modify_rule()
            .rule_arn(arn)
            .set_conditions(Some(to_sdk_conditions(&spec.conditions)))
            .set_actions(Some(actions))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::ListenerRule", arn)))?;
        Ok(())
    }

    async fn set_rule_priorities(&self, priorities: &[(String, i32)]) -> Result<()> {
        let pairs = priorities
            .iter()
            .map(|(arn, priority)| RulePriorityPair::builder().rule_arn(arn).priority(*priority).build())
            .collect::<Vec<_>>();
        self.client
            .set_rule_priorities()
            .set_rule_priorities(Some(pairs))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::field("rulePriorities")))?;
        Ok(())
    }

    async fn delete_rule(&self, arn: &str) -> Result<()> {
        match self.client.delete_rule().rule_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("RuleNotFound") => Ok(()),
            Err(e) => Err(map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::ListenerRule", arn))),
        }
    }

    async fn find_tagged_target_groups(
        &self,
        cluster_name: &str,
        stack_id: &str,
    ) -> Result<Vec<TargetGroupObservation>> {
        let cluster_key = format!("{}/cluster", self.controller_name);
        let stack_key = format!("{}/stack", self.controller_name);

        let resp = self
            .client
            .describe_target_groups()
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::TargetGroup", stack_id)))?;

        let mut matches = Vec::new();
        for tg in resp.target_groups.unwrap_or_default() {
            let (Some(arn), Some(name)) = (tg.target_group_arn.clone(), tg.target_group_name.clone()) else {
                continue;
            };
            if tg.vpc_id.as_deref() != Some(self.vpc_id.as_str()) {
                continue;
            }
            let tags_resp = self
                .client
                .describe_tags()
                .resource_arns(&arn)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::TargetGroup", &arn)))?;
            let tags: BTreeMap<String, String> = tags_resp
                .tag_descriptions
                .unwrap_or_default()
                .into_iter()
                .find(|d| d.resource_arn.as_deref() == Some(arn.as_str()))
                .map(|d| {
                    d.tags
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|t| Some((t.key?, t.value.unwrap_or_default())))
                        .collect()
                })
                .unwrap_or_default();
            if tags.get(&cluster_key).map(String::as_str) == Some(cluster_name)
                && tags.get(&stack_key).map(String::as_str) == Some(stack_id)
            {
                let attrs_resp = self
                    .client
                    .describe_target_group_attributes()
                    .target_group_arn(&arn)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::TargetGroup", &arn)))?;
                let attributes: BTreeMap<String, String> = attrs_resp
                    .attributes
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|a| Some((a.key?, a.value.unwrap_or_default())))
                    .collect();

                let health_check = HealthCheckSpec {
                    port: tg.health_check_port.unwrap_or_default(),
                    protocol: tg
                        .health_check_protocol
                        .map(|p| p.as_str().to_string())
                        .unwrap_or_default(),
                    path: tg.health_check_path,
                    matcher: tg.matcher.and_then(|m| m.http_code).unwrap_or_default(),
                    interval_seconds: tg.health_check_interval_seconds.unwrap_or_default() as u32,
                    timeout_seconds: tg.health_check_timeout_seconds.unwrap_or_default() as u32,
                    healthy_threshold: tg.healthy_threshold_count.unwrap_or_default() as u32,
                    unhealthy_threshold: tg.unhealthy_threshold_count.unwrap_or_default() as u32,
                };

                matches.push(TargetGroupObservation {
                    arn,
                    name,
                    target_type: target_type_from_sdk(tg.target_type),
                    port: tg.port.unwrap_or_default() as u16,
                    protocol: tg.protocol.map(|p| p.as_str().to_string()).unwrap_or_default(),
                    protocol_version: tg.protocol_version,
                    ip_address_type: ip_address_type_from_sdk(tg.ip_address_type.as_ref()),
                    health_check,
                    attributes,
                });
            }
        }
        Ok(matches)
    }

    async fn create_target_group(&self, spec: &TargetGroupSpec, tags: &BTreeMap<String, String>) -> Result<String> {
        let hc = &spec.health_check;
        let resp = self
            .client
            .create_target_group()
            .name(&spec.name)
            .target_type(match spec.target_type {
                TargetType::Ip => TargetTypeEnum::Ip,
                TargetType::Instance => TargetTypeEnum::Instance,
            })
            .port(spec.port as i32)
            .protocol(spec.protocol.as_str().into())
            .set_protocol_version(spec.protocol_version.clone())
            .vpc_id(&self.vpc_id)
            .ip_address_type(match spec.ip_address_type {
                IpAddressType::Ipv4 => SdkIpAddressType::Ipv4,
                IpAddressType::Dualstack | IpAddressType::DualstackWithoutPublicIpv4 => SdkIpAddressType::Dualstack,
            })
            .health_check_protocol(hc.protocol.as_str().into())
            .set_health_check_path(hc.path.clone())
            .health_check_port(&hc.port)
            .health_check_interval_seconds(hc.interval_seconds as i32)
            .health_check_timeout_seconds(hc.timeout_seconds as i32)
            .healthy_threshold_count(hc.healthy_threshold as i32)
            .unhealthy_threshold_count(hc.unhealthy_threshold as i32)
            .matcher(
                aws_sdk_elasticloadbalancingv2::types::Matcher::builder()
                    .http_code(&hc.matcher)
                    .build(),
            )
            .set_tags(Some(to_sdk_tags(tags)))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::TargetGroup", &spec.name)))?;

        let arn = resp
            .target_groups
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|tg| tg.target_group_arn)
            .ok_or_else(|| ControllerError::fatal("create_target_group returned no target group", ErrorContext::none()))?;

        if !spec.attributes.is_empty() {
            self.modify_target_group(&arn, spec).await?;
        }
        Ok(arn)
    }

    async fn modify_target_group(&self, arn: &str, spec: &TargetGroupSpec) -> Result<()> {
        let hc = &spec.health_check;
        self.client
            .modify_target_group()
            .target_group_arn(arn)
            .health_check_protocol(hc.protocol.as_str().into())
            .set_health_check_path(hc.path.clone())
            .health_check_port(&hc.port)
            .health_check_interval_seconds(hc.interval_seconds as i32)
            .health_check_timeout_seconds(hc.timeout_seconds as i32)
            .healthy_threshold_count(hc.healthy_threshold as i32)
            .unhealthy_threshold_count(hc.unhealthy_threshold as i32)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::TargetGroup", arn)))?;

        if !spec.attributes.is_empty() {
            let attrs = spec
                .attributes
                .iter()
                .map(|(k, v)| {
                    aws_sdk_elasticloadbalancingv2::types::TargetGroupAttribute::builder()
                        .key(k)
                        .value(v)
                        .build()
                })
                .collect::<Vec<_>>();
            self.client
                .modify_target_group_attributes()
                .target_group_arn(arn)
                .set_attributes(Some(attrs))
                .send()
                .await
                .map_err(|e| map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::TargetGroup", arn)))?;
        }
        Ok(())
    }

    async fn delete_target_group(&self, arn: &str) -> Result<()> {
        match self.client.delete_target_group().target_group_arn(arn).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("TargetGroupNotFound") => Ok(()),
            Err(e) => Err(map_sdk_error(e, ErrorContext::resource("AWS::ELBV2::TargetGroup", arn))),
        }
    }
}
