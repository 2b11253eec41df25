use std::collections::BTreeMap;

/// Per-Service overrides for target-group construction (§4.4 step 7),
/// layered under LoadBalancerConfiguration-level and controller defaults.
#[derive(
    Clone, Debug, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "elbv2.k8s.aws",
    version = "v1alpha1",
    kind = "TargetGroupConfiguration",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupConfigurationSpec {
    pub target_ref: TargetRef,
    pub default: Option<TargetGroupProps>,
    pub port_overrides: Option<Vec<PortOverride>>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
pub struct TargetRef {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupProps {
    pub target_type: Option<String>,
    pub protocol_version: Option<String>,
    pub health_check: Option<HealthCheckConfig>,
    pub attributes: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    pub port: Option<String>,
    pub protocol: Option<String>,
    pub path: Option<String>,
    pub matcher: Option<String>,
    pub interval_seconds: Option<i32>,
    pub timeout_seconds: Option<i32>,
    pub healthy_threshold_count: Option<i32>,
    pub unhealthy_threshold_count: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortOverride {
    pub port: i32,
    #[serde(flatten)]
    pub props: TargetGroupProps,
}
