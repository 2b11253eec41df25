//! Capability traits a reconcile-scoped `Cloud` context must implement
//! (§4.4, §4.6, §9 "per-region multiplexing"). The core crate only specifies
//! the shapes synthesizers and the builder need; wiring a concrete AWS SDK
//! client behind them lives in the aws crate.

use crate::error::Result;
use crate::token::StatusTable;
use std::collections::BTreeMap;

/// One subnet as returned by discovery (§4.4 step 3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetInfo {
    pub id: String,
    pub availability_zone: String,
    pub tags: BTreeMap<String, String>,
}

/// One live resource a synthesizer matches against a desired resource by
/// stable key (§4.6 step 3) — name for most kinds, ARN/ID for the rest.
/// Carries every field the matching [`crate::model`] Spec also carries, so a
/// synthesizer can diff desired against observed without an extra round trip
/// (§8 invariant 7, idempotence).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerObservation {
    pub arn: String,
    pub port: u16,
    pub protocol: String,
    pub ssl_policy: Option<String>,
    pub certificates: Vec<String>,
    pub alpn_policy: Option<String>,
    pub default_actions: Vec<crate::model::Action>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleObservation {
    pub arn: String,
    pub priority: i32,
    pub is_default: bool,
    pub conditions: Vec<crate::model::RuleCondition>,
    pub actions: Vec<crate::model::Action>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetGroupObservation {
    pub arn: String,
    pub name: String,
    pub target_type: crate::model::TargetType,
    pub port: u16,
    pub protocol: String,
    pub protocol_version: Option<String>,
    pub ip_address_type: crate::model::IpAddressType,
    pub health_check: crate::model::HealthCheckSpec,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityGroupObservation {
    pub group_id: String,
    pub name: String,
    pub ingress: Vec<crate::model::SecurityGroupIngressRule>,
}

/// A pre-existing load balancer found by tag discovery (§4.5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExistingLoadBalancer {
    pub arn: String,
    pub dns_name: String,
    pub canonical_hosted_zone_id: String,
    pub lb_type: crate::model::LoadBalancerType,
    pub scheme: crate::model::Scheme,
    pub ip_address_type: crate::model::IpAddressType,
    pub attributes: BTreeMap<String, String>,
}

/// Subnet and security-group lookups against EC2 (§4.4 steps 3-4).
#[async_trait::async_trait]
pub trait Ec2: Send + Sync {
    async fn describe_subnets_by_ids(&self, ids: &[String]) -> Result<Vec<SubnetInfo>>;

    /// Subnets carrying the role tag for `scheme` and a cluster-ownership
    /// tag, within the current VPC.
    async fn discover_subnets(
        &self,
        scheme: crate::model::Scheme,
        cluster_name: &str,
    ) -> Result<Vec<SubnetInfo>>;

    async fn resolve_security_groups(&self, ids_or_names: &[String]) -> Result<Vec<String>>;

    /// Managed security groups tagged with this stack's identifier (§4.6
    /// step 2 "lists live resources ... filtered by the ownership tag set").
    async fn find_tagged_security_groups(
        &self,
        cluster_name: &str,
        stack_id: &str,
    ) -> Result<Vec<SecurityGroupObservation>>;

    async fn create_security_group(
        &self,
        spec: &crate::model::SecurityGroupSpec,
        tags: &BTreeMap<String, String>,
    ) -> Result<String>;

    async fn update_security_group_ingress(
        &self,
        group_id: &str,
        rules: &[crate::model::SecurityGroupIngressRule],
    ) -> Result<()>;

    async fn delete_security_group(&self, group_id: &str) -> Result<()>;
}

/// ELBv2 resource discovery and mutation (§4.5, §4.6).
#[async_trait::async_trait]
pub trait ElasticLoadBalancing: Send + Sync {
    /// Load balancers tagged with this stack's identifier in the current
    /// VPC (§4.5). Returns every match so the caller can apply the
    /// exactly-one / scheme-mismatch / multiple-matches rules itself.
    async fn find_tagged_load_balancers(
        &self,
        cluster_name: &str,
        stack_id: &str,
    ) -> Result<Vec<ExistingLoadBalancer>>;

    async fn create_load_balancer(
        &self,
        spec: &crate::model::LoadBalancerSpec,
        tags: &BTreeMap<String, String>,
    ) -> Result<ExistingLoadBalancer>;

    async fn modify_load_balancer(
        &self,
        arn: &str,
        spec: &crate::model::LoadBalancerSpec,
    ) -> Result<()>;

    async fn delete_load_balancer(&self, arn: &str) -> Result<()>;

    /// Polls until the load balancer reaches `active` or `failed` (§4.8).
    async fn wait_for_active(&self, arn: &str) -> Result<()>;

    async fn list_listeners(&self, load_balancer_arn: &str) -> Result<Vec<ListenerObservation>>;

    /// `statuses` resolves the `StringToken`s embedded in `spec`'s actions
    /// (e.g. a forward action's target group ARN) — by the time a
    /// synthesizer reaches Listener creation, every resource it can depend
    /// on has already published its status (§4.6 fixed synthesis order).
    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        spec: &crate::model::ListenerSpec,
        statuses: &StatusTable,
    ) -> Result<String>;

    async fn modify_listener(
        &self,
        arn: &str,
        spec: &crate::model::ListenerSpec,
        statuses: &StatusTable,
    ) -> Result<()>;

    async fn delete_listener(&self, arn: &str) -> Result<()>;

    async fn list_rules(&self, listener_arn: &str) -> Result<Vec<RuleObservation>>;

    async fn create_rule(
        &self,
        listener_arn: &str,
        spec: &crate::model::ListenerRuleSpec,
        statuses: &StatusTable,
    ) -> Result<String>;

    async fn modify_rule(
        &self,
        arn: &str,
        spec: &crate::model::ListenerRuleSpec,
        statuses: &StatusTable,
    ) -> Result<()>;

    /// Two-phase priority swap (§4.6 ListenerRule diff policy): moves `arn`
    /// to a temporary out-of-range priority before the final set-priorities
    /// call establishes the new ordering.
    async fn set_rule_priorities(&self, priorities: &[(String, i32)]) -> Result<()>;

    async fn delete_rule(&self, arn: &str) -> Result<()>;

    /// TargetGroups tagged with this stack's identifier (§4.6 step 2).
    async fn find_tagged_target_groups(
        &self,
        cluster_name: &str,
        stack_id: &str,
    ) -> Result<Vec<TargetGroupObservation>>;

    async fn create_target_group(
        &self,
        spec: &crate::model::TargetGroupSpec,
        tags: &BTreeMap<String, String>,
    ) -> Result<String>;

    async fn modify_target_group(
        &self,
        arn: &str,
        spec: &crate::model::TargetGroupSpec,
    ) -> Result<()>;

    async fn delete_target_group(&self, arn: &str) -> Result<()>;
}

/// ACM certificate discovery (§4.4 step 5 certificate-discovery collaborator).
#[async_trait::async_trait]
pub trait CertificateDiscovery: Send + Sync {
    /// Infers certificate ARNs from a listener's host rules when no
    /// certificate was named explicitly.
    async fn discover_certificates(&self, hosts: &[String]) -> Result<Vec<String>>;
}

/// WAFv2 / WAF Classic / Shield association management (§4.6 Associations).
#[async_trait::async_trait]
pub trait WebAclAssociations: Send + Sync {
    /// Currently-associated webACL identifier for a resource ARN, if any.
    /// Implementations are expected to cache this for about 10 minutes per
    /// resource ARN (§4.6).
    async fn get_associated_web_acl(&self, resource_arn: &str) -> Result<Option<String>>;

    async fn associate_web_acl(
        &self,
        resource_arn: &str,
        web_acl_id: &str,
        kind: crate::model::WebAclKind,
    ) -> Result<()>;

    async fn disassociate_web_acl(&self, resource_arn: &str) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ShieldProtection: Send + Sync {
    async fn is_protected(&self, resource_arn: &str) -> Result<bool>;

    async fn enable_protection(&self, resource_arn: &str) -> Result<()>;

    async fn disable_protection(&self, resource_arn: &str) -> Result<()>;
}

/// A reconcile-scoped bundle of region-scoped clients (§9 per-region
/// multiplexing). The default region is the fast path; other regions are
/// resolved and cached by the aws crate's provider keyed by (region, vpc).
pub trait Cloud: Send + Sync {
    fn ec2(&self) -> &dyn Ec2;
    fn elbv2(&self) -> &dyn ElasticLoadBalancing;
    fn certificates(&self) -> &dyn CertificateDiscovery;
    fn web_acl_associations(&self) -> &dyn WebAclAssociations;
    fn shield(&self) -> &dyn ShieldProtection;
}
