use super::{IpAddressType, Scheme, SubnetSelection};
use crate::labels::NamespaceSelector;
use std::collections::BTreeMap;

/// Groups Ingresses that an `IngressClass` points at, the way a
/// `LoadBalancerConfiguration` groups Gateways, except the reference runs the
/// other direction (`IngressClass.spec.parameters` names this object).
#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, serde::Deserialize, serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "elbv2.k8s.aws",
    version = "v1beta1",
    kind = "IngressClassParams"
)]
#[serde(rename_all = "camelCase")]
pub struct IngressClassParamsSpec {
    pub group: Option<IngressGroupRef>,
    pub namespace_selector: Option<NamespaceSelector>,
    pub scheme: Option<Scheme>,
    pub ip_address_type: Option<IpAddressType>,
    pub subnets: Option<SubnetSelection>,
    pub security_groups: Option<Vec<String>>,
    pub tags: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
pub struct IngressGroupRef {
    pub name: String,
}
