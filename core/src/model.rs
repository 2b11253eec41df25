//! Model entities (§4.2): the declarative Spec/Status pairs for each
//! resource variant in §3's table, wrapped in a common [`Resource`] envelope.

use crate::error::ControllerError;
use crate::graph::ResourceId;
use crate::token::{StatusTable, StringToken};
use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadBalancerType {
    Application,
    Network,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scheme {
    Internal,
    InternetFacing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IpAddressType {
    Ipv4,
    Dualstack,
    DualstackWithoutPublicIpv4,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TargetType {
    Ip,
    Instance,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub lb_type: LoadBalancerType,
    pub scheme: Scheme,
    pub ip_address_type: IpAddressType,
    pub subnet_ids: Vec<String>,
    pub security_groups: Vec<StringToken>,
    pub attributes: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

impl Default for LoadBalancerType {
    fn default() -> Self {
        Self::Application
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Self::Internal
    }
}

impl Default for IpAddressType {
    fn default() -> Self {
        Self::Ipv4
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadBalancerStatus {
    pub arn: String,
    pub dns_name: String,
    pub canonical_hosted_zone_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerSpec {
    pub load_balancer_arn: StringToken,
    pub port: u16,
    pub protocol: String,
    pub ssl_policy: Option<String>,
    /// First-seen order preserved; first entry is the default certificate.
    pub certificates: Vec<String>,
    pub alpn_policy: Option<String>,
    pub default_actions: Vec<Action>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerStatus {
    pub arn: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerRuleSpec {
    pub listener_arn: StringToken,
    pub priority: i32,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerRuleStatus {
    pub arn: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleCondition {
    PathExact(String),
    PathPrefix(String),
    Header { name: String, values: Vec<String> },
    Method(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Forward {
        target_group_arn: StringToken,
        weight: i32,
    },
    WeightedForward(Vec<(StringToken, i32)>),
    FixedResponse {
        status_code: u16,
    },
    Authenticate(AuthAction),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthAction {
    Oidc { issuer: String, client_id: String },
    Cognito { user_pool_arn: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthCheckSpec {
    pub port: String,
    pub protocol: String,
    pub path: Option<String>,
    pub matcher: String,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetGroupSpec {
    pub name: String,
    pub target_type: TargetType,
    pub port: u16,
    pub protocol: String,
    pub protocol_version: Option<String>,
    pub ip_address_type: IpAddressType,
    pub health_check: HealthCheckSpec,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetGroupStatus {
    pub arn: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityGroupIngressRule {
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityGroupSpec {
    pub name: String,
    pub description: String,
    pub ingress: Vec<SecurityGroupIngressRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityGroupStatus {
    pub group_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetGroupBindingNetworkingRule {
    pub from_cidrs: Vec<String>,
    pub protocol: String,
    pub port: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetGroupBindingSpec {
    pub target_group_arn: StringToken,
    pub target_type: TargetType,
    pub service_name: String,
    pub service_port: String,
    pub ip_address_type: IpAddressType,
    /// `None` when "manage backend SG rules" is disabled (§4.4 step 7).
    pub networking: Option<Vec<TargetGroupBindingNetworkingRule>>,
}

/// Which WAF generation a [`WebAclAssociationSpec`] targets — the resource
/// kind string on its owning [`Resource`] already encodes this, but carrying
/// it on the spec too means synthesizers never have to re-derive it from an
/// ARN's shape (§4.6 Associations).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WebAclKind {
    V2,
    Classic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebAclAssociationSpec {
    pub kind: WebAclKind,
    pub web_acl_id: String,
    pub resource_arn: StringToken,
}

/// Shield Advanced protection for one LB ARN (§4.6 Associations). Has no
/// observed status of its own — `is_protected` is read live from AWS, not
/// cached on the resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShieldProtectionSpec {
    pub resource_arn: StringToken,
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceSpec {
    LoadBalancer(LoadBalancerSpec),
    Listener(ListenerSpec),
    ListenerRule(ListenerRuleSpec),
    TargetGroup(TargetGroupSpec),
    SecurityGroup(SecurityGroupSpec),
    TargetGroupBinding(TargetGroupBindingSpec),
    /// Associates a webACL with an LB ARN. Resource kind string
    /// distinguishes WAFv2 (`"AWS::WAFv2::WebACLAssociation"`) from WAF
    /// Classic (`"AWS::WAFRegional::WebACLAssociation"`) — both synthesizers
    /// share this spec shape (§4.6).
    WebAclAssociation(WebAclAssociationSpec),
    ShieldProtection(ShieldProtectionSpec),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceStatus {
    LoadBalancer(LoadBalancerStatus),
    Listener(ListenerStatus),
    ListenerRule(ListenerRuleStatus),
    TargetGroup(TargetGroupStatus),
    SecurityGroup(SecurityGroupStatus),
    /// TargetGroupBinding and WebACLAssociation have no observed status of
    /// their own (§3): the former is written to Kubernetes, the latter is
    /// a pure association.
    None,
}

/// One node in the [`crate::graph::Stack`]: metadata envelope plus a
/// kind-typed Spec and (once synthesized) Status, per §4.2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    id: ResourceId,
    spec: ResourceSpec,
    status: Option<ResourceStatus>,
}

impl Resource {
    pub fn new(id: ResourceId, spec: ResourceSpec) -> Self {
        Self {
            id,
            spec,
            status: None,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id.clone()
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    pub fn spec_mut(&mut self) -> &mut ResourceSpec {
        &mut self.spec
    }

    pub fn status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }

    pub fn set_status(&mut self, status: ResourceStatus) {
        self.status = Some(status);
    }

    /// Returns a token for this resource's own ARN/ID field, so callers can
    /// reference `LoadBalancer.LoadBalancerARN()`-style accessors (§4.2)
    /// without reading `status` directly.
    pub fn arn_token(&self) -> StringToken {
        let field = match self.spec {
            ResourceSpec::SecurityGroup(_) => "groupId",
            _ => "arn",
        };
        StringToken::deferred(self.id.clone(), field)
    }

    /// Publishes this resource's already-known status fields into a
    /// [`StatusTable`], so tokens referencing it resolve without waiting on a
    /// synthesizer to run — used when the Model Builder adopts a
    /// pre-existing AWS resource (§4.5) ahead of the first synthesis pass.
    pub fn publish_status(&self, table: &StatusTable) {
        let Some(status) = &self.status else {
            return;
        };
        match status {
            ResourceStatus::LoadBalancer(lb) => {
                table.set(self.id.clone(), "arn", lb.arn.clone());
                table.set(self.id.clone(), "dnsName", lb.dns_name.clone());
                table.set(
                    self.id.clone(),
                    "canonicalHostedZoneId",
                    lb.canonical_hosted_zone_id.clone(),
                );
            }
            ResourceStatus::Listener(l) => table.set(self.id.clone(), "arn", l.arn.clone()),
            ResourceStatus::ListenerRule(r) => table.set(self.id.clone(), "arn", r.arn.clone()),
            ResourceStatus::TargetGroup(tg) => table.set(self.id.clone(), "arn", tg.arn.clone()),
            ResourceStatus::SecurityGroup(sg) => {
                table.set(self.id.clone(), "groupId", sg.group_id.clone())
            }
            ResourceStatus::None => {}
        }
    }

    /// Resources whose status this resource's Spec reads through tokens;
    /// seeds dependency edges when added to a [`crate::graph::Stack`].
    pub fn dependencies(&self) -> Vec<ResourceId> {
        let mut tokens: Vec<&StringToken> = Vec::new();
        match &self.spec {
            ResourceSpec::LoadBalancer(lb) => tokens.extend(lb.security_groups.iter()),
            ResourceSpec::Listener(l) => {
                tokens.push(&l.load_balancer_arn);
                for action in &l.default_actions {
                    collect_action_tokens(action, &mut tokens);
                }
            }
            ResourceSpec::ListenerRule(r) => {
                tokens.push(&r.listener_arn);
                for action in &r.actions {
                    collect_action_tokens(action, &mut tokens);
                }
            }
            ResourceSpec::TargetGroup(_) => {}
            ResourceSpec::SecurityGroup(_) => {}
            ResourceSpec::TargetGroupBinding(tgb) => tokens.push(&tgb.target_group_arn),
            ResourceSpec::WebAclAssociation(w) => tokens.push(&w.resource_arn),
            ResourceSpec::ShieldProtection(s) => tokens.push(&s.resource_arn),
        }
        tokens
            .into_iter()
            .flat_map(StringToken::dependencies)
            .collect()
    }
}

fn collect_action_tokens<'a>(action: &'a Action, out: &mut Vec<&'a StringToken>) {
    match action {
        Action::Forward { target_group_arn, .. } => out.push(target_group_arn),
        Action::WeightedForward(weighted) => out.extend(weighted.iter().map(|(t, _)| t)),
        Action::FixedResponse { .. } => {}
        Action::Authenticate(_) => {}
    }
}

/// Replaces every [`StringToken`] embedded in `actions` with its resolved
/// literal, so a desired action list can be compared against a live one
/// read back from AWS (§4.6 step 3, idempotence) without leaking
/// [`StatusTable`] lookups into the comparison itself.
pub fn resolve_actions(actions: &[Action], statuses: &StatusTable) -> Result<Vec<Action>, ControllerError> {
    actions
        .iter()
        .map(|action| {
            Ok(match action {
                Action::Forward { target_group_arn, weight } => Action::Forward {
                    target_group_arn: StringToken::literal(target_group_arn.resolve(statuses)?),
                    weight: *weight,
                },
                Action::WeightedForward(weighted) => {
                    let mut resolved = Vec::with_capacity(weighted.len());
                    for (token, weight) in weighted {
                        resolved.push((StringToken::literal(token.resolve(statuses)?), *weight));
                    }
                    Action::WeightedForward(resolved)
                }
                Action::FixedResponse { status_code } => Action::FixedResponse { status_code: *status_code },
                Action::Authenticate(auth) => Action::Authenticate(auth.clone()),
            })
        })
        .collect()
}

/// Compares two resolved action lists for wire-level equivalence. A lone
/// [`Action::Forward`]'s `weight` never reaches AWS — only
/// [`Action::WeightedForward`] actually sends one — so it's normalized away
/// here rather than reported as a diff every reconcile.
pub fn actions_equivalent(a: &[Action], b: &[Action]) -> bool {
    fn normalize(action: &Action) -> Action {
        match action {
            Action::Forward { target_group_arn, .. } => Action::Forward {
                target_group_arn: target_group_arn.clone(),
                weight: 1,
            },
            other => other.clone(),
        }
    }
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| normalize(x) == normalize(y))
}

/// Compares two rule condition sets for equivalence. AWS's `path-pattern`
/// condition field carries the same shape for [`RuleCondition::PathExact`]
/// and [`RuleCondition::PathPrefix`] — both send a single pattern string —
/// so a round trip through the API can't tell which one was originally
/// meant and the two are treated as interchangeable here.
pub fn conditions_equivalent(a: &[RuleCondition], b: &[RuleCondition]) -> bool {
    fn normalize(c: &RuleCondition) -> RuleCondition {
        match c {
            RuleCondition::PathExact(p) => RuleCondition::PathPrefix(p.clone()),
            other => other.clone(),
        }
    }
    let mut a: Vec<RuleCondition> = a.iter().map(normalize).collect();
    let mut b: Vec<RuleCondition> = b.iter().map(normalize).collect();
    a.sort_by_key(|c| format!("{c:?}"));
    b.sort_by_key(|c| format!("{c:?}"));
    a == b
}
