/// Materializes endpoint registration for one TargetGroup (§4.6). A separate
/// controller (out of scope here, per §1) watches these objects and keeps
/// AWS target registration in sync with matching endpoints; this crate only
/// defines the wire shape the Model Builder and synthesizers write.
#[derive(
    Clone, Debug, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "elbv2.k8s.aws",
    version = "v1beta1",
    kind = "TargetGroupBinding",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupBindingSpec {
    pub target_group_arn: String,
    pub target_type: TargetType,
    pub service_ref: ServiceReference,
    pub ip_address_type: Option<super::IpAddressType>,
    pub networking: Option<TargetGroupBindingNetworking>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Ip,
    Instance,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReference {
    pub name: String,
    pub port: ServicePortRef,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum ServicePortRef {
    Number(i32),
    Name(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupBindingNetworking {
    pub ingress: Vec<TargetGroupBindingIngressRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupBindingIngressRule {
    pub from_cidrs: Vec<String>,
    pub ports: Vec<NetworkingPort>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkingPort {
    pub protocol: String,
    pub port: i32,
}
