//! Custom resources the controller consumes or writes, defined with
//! `kube::CustomResource` the way upstream policy CRDs are defined.

mod ingress_class_params;
mod load_balancer_configuration;
mod target_group_binding;
mod target_group_configuration;

pub use self::{
    ingress_class_params::{IngressClassParams, IngressClassParamsSpec, IngressGroupRef},
    load_balancer_configuration::{
        AlpnPolicy, IpAddressType, ListenerConfiguration, LoadBalancerConfiguration,
        LoadBalancerConfigurationSpec, Scheme, SubnetSelection,
    },
    target_group_binding::{
        NetworkingPort, ServicePortRef, ServiceReference, TargetGroupBinding,
        TargetGroupBindingIngressRule, TargetGroupBindingNetworking, TargetGroupBindingSpec,
        TargetType,
    },
    target_group_configuration::{
        HealthCheckConfig, PortOverride, TargetGroupConfiguration, TargetGroupConfigurationSpec,
        TargetGroupProps, TargetRef,
    },
};
