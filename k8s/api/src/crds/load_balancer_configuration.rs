use crate::labels::NamespaceSelector;
use std::collections::BTreeMap;

/// Top-level AWS settings a Gateway or GatewayClass may reference.
///
/// Fields are all optional: an unset field means "defer to the other party in
/// the merge", per the Config Merger's prefer-gatewayclass/prefer-gateway
/// precedence rule.
#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "elbv2.k8s.aws",
    version = "v1beta1",
    kind = "LoadBalancerConfiguration",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfigurationSpec {
    pub scheme: Option<Scheme>,
    pub ip_address_type: Option<IpAddressType>,
    pub subnets: Option<SubnetSelection>,
    pub security_groups: Option<Vec<String>>,
    /// When `false`, the controller does not manage ingress rules on the
    /// backend security group, even if one is attached.
    pub manage_backend_security_group_rules: Option<bool>,
    pub enable_icmp: Option<bool>,
    pub source_ranges: Option<Vec<String>>,
    pub customer_owned_ipv4_pool: Option<String>,
    pub load_balancer_attributes: Option<BTreeMap<String, String>>,
    pub tags: Option<BTreeMap<String, String>>,
    pub listeners: Option<Vec<ListenerConfiguration>>,
    pub waf_web_acl_id: Option<String>,
    pub waf_classic_web_acl_id: Option<String>,
    pub shield_advanced_protection: Option<bool>,
    /// When `true`, a delete of the last group member must not tear down
    /// the group's AWS resources (§4.9 step 3).
    pub deletion_protection: Option<bool>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    Internal,
    InternetFacing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum IpAddressType {
    Ipv4,
    Dualstack,
    DualstackWithoutPublicIpv4,
}

/// Either an explicit subnet ID list or an AWS tag selector; never both (the
/// builder treats whichever is present as take-one, not merged).
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSelection {
    pub ids: Option<Vec<String>>,
    pub tags: Option<BTreeMap<String, Vec<String>>>,
    pub namespace_selector: Option<NamespaceSelector>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfiguration {
    pub protocol: String,
    pub port: u16,
    pub ssl_policy: Option<String>,
    pub certificate_arns: Option<Vec<String>>,
    pub alpn_policy: Option<AlpnPolicy>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
pub enum AlpnPolicy {
    None,
    HTTP1Only,
    HTTP2Only,
    HTTP2Preferred,
    HTTP2Optional,
}
