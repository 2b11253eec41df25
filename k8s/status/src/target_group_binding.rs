//! Converts a synthesized [`lbc_aws::TargetGroupBindingWrite`] into the
//! `elbv2.k8s.aws/v1beta1` `TargetGroupBinding` CRD a separate controller
//! reads to register endpoints (§4.6).

use lbc_aws::TargetGroupBindingWrite;
use lbc_core::model::{IpAddressType as ModelIpAddressType, TargetType as ModelTargetType};
use lbc_k8s_api::crds::{
    IpAddressType, NetworkingPort, ServicePortRef, ServiceReference, TargetGroupBindingIngressRule,
    TargetGroupBindingNetworking, TargetGroupBindingSpec, TargetType,
};

fn target_type(t: ModelTargetType) -> TargetType {
    match t {
        ModelTargetType::Ip => TargetType::Ip,
        ModelTargetType::Instance => TargetType::Instance,
    }
}

fn ip_address_type(t: ModelIpAddressType) -> IpAddressType {
    match t {
        ModelIpAddressType::Ipv4 => IpAddressType::Ipv4,
        ModelIpAddressType::Dualstack => IpAddressType::Dualstack,
        ModelIpAddressType::DualstackWithoutPublicIpv4 => IpAddressType::DualstackWithoutPublicIpv4,
    }
}

fn service_port_ref(service_port: &str) -> ServicePortRef {
    match service_port.parse::<i32>() {
        Ok(number) => ServicePortRef::Number(number),
        Err(_) => ServicePortRef::Name(service_port.to_string()),
    }
}

/// Builds the desired spec for a `TargetGroupBinding` object; the caller
/// names and applies it alongside the rest of the group's resources.
pub fn spec(write: &TargetGroupBindingWrite) -> TargetGroupBindingSpec {
    let networking = write.networking.as_ref().map(|rules| TargetGroupBindingNetworking {
        ingress: rules
            .iter()
            .map(|rule| TargetGroupBindingIngressRule {
                from_cidrs: rule.from_cidrs.clone(),
                ports: vec![NetworkingPort {
                    protocol: rule.protocol.clone(),
                    port: rule.port,
                }],
            })
            .collect(),
    });

    TargetGroupBindingSpec {
        target_group_arn: write.target_group_arn.clone(),
        target_type: target_type(write.target_type),
        service_ref: ServiceReference {
            name: write.service_name.clone(),
            port: service_port_ref(&write.service_port),
        },
        ip_address_type: Some(ip_address_type(write.ip_address_type)),
        networking,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbc_core::graph::ResourceId;

    fn write(service_port: &str, networking: Option<Vec<lbc_core::model::TargetGroupBindingNetworkingRule>>) -> TargetGroupBindingWrite {
        TargetGroupBindingWrite {
            resource_id: ResourceId::new("TargetGroupBinding", "tgb-1"),
            target_group_arn: "arn:aws:elasticloadbalancing:us-east-1:1:targetgroup/tg/abc".into(),
            target_type: ModelTargetType::Ip,
            service_name: "web".into(),
            service_port: service_port.into(),
            ip_address_type: ModelIpAddressType::Ipv4,
            networking,
        }
    }

    #[test]
    fn numeric_service_port_becomes_a_port_number() {
        let spec = spec(&write("80", None));
        assert_eq!(spec.service_ref.port, ServicePortRef::Number(80));
    }

    #[test]
    fn named_service_port_becomes_a_port_name() {
        let spec = spec(&write("http", None));
        assert_eq!(spec.service_ref.port, ServicePortRef::Name("http".into()));
    }

    #[test]
    fn disabled_backend_sg_management_omits_networking() {
        let spec = spec(&write("80", None));
        assert!(spec.networking.is_none());
    }

    #[test]
    fn each_networking_rule_becomes_a_single_port_ingress_rule() {
        let rules = vec![lbc_core::model::TargetGroupBindingNetworkingRule {
            from_cidrs: vec!["10.0.0.0/16".into()],
            protocol: "TCP".into(),
            port: 8080,
        }];
        let spec = spec(&write("80", Some(rules)));
        let networking = spec.networking.expect("networking set");
        assert_eq!(networking.ingress.len(), 1);
        assert_eq!(networking.ingress[0].ports.len(), 1);
        assert_eq!(networking.ingress[0].ports[0].port, 8080);
    }
}
