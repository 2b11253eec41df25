#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod crds;
pub mod labels;

pub use self::labels::Labels;
/// Re-exports the generated Gateway API bindings this crate builds against.
///
/// `Gateway`/`GatewayClass`/`HTTPRoute` ship in the stable channel at the
/// crate root; `GRPCRoute`/`TCPRoute`/`UDPRoute`/`TLSRoute` are experimental
/// channel and live nested under `apis::experimental`.
pub mod gateway {
    pub use gateway_api::{
        gatewayclasses::{GatewayClass, GatewayClassSpec},
        gateways::{
            Gateway, GatewayListeners, GatewayListenersAllowedRoutes,
            GatewayListenersAllowedRoutesKinds, GatewayListenersAllowedRoutesNamespaces,
            GatewayListenersAllowedRoutesNamespacesFrom, GatewayListenersTls,
            GatewayListenersTlsCertificateRefs, GatewayListenersTlsMode, GatewaySpec,
        },
        httproutes::{
            HTTPRoute, HTTPRouteParentRefs, HTTPRouteRules, HTTPRouteRulesBackendRefs,
            HTTPRouteRulesMatches, HTTPRouteRulesMatchesPath, HTTPRouteRulesMatchesPathType,
            HTTPRouteSpec,
        },
    };
    pub use gateway_api::apis::experimental::{
        grpcroutes::{
            GRPCRoute, GRPCRouteParentRefs, GRPCRouteRules, GRPCRouteRulesBackendRefs,
            GRPCRouteSpec,
        },
        tcproutes::{TCPRoute, TCPRouteParentRefs, TCPRouteRules, TCPRouteRulesBackendRefs, TCPRouteSpec},
        tlsroutes::{TLSRoute, TLSRouteParentRefs, TLSRouteRules, TLSRouteRulesBackendRefs, TLSRouteSpec},
        udproutes::{UDPRoute, UDPRouteParentRefs, UDPRouteRules, UDPRouteRulesBackendRefs, UDPRouteSpec},
    };
}
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{
            Endpoints, Namespace, Secret, Service, ServicePort, ServiceSpec,
            TypedLocalObjectReference,
        },
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressClass,
            IngressClassSpec, IngressRule, IngressServiceBackend, IngressSpec, IngressTLS,
            ServiceBackendPort,
        },
    },
    apimachinery::pkg::{
        apis::meta::v1::{Condition, LabelSelector, Time},
        util::intstr::IntOrString,
    },
    NamespaceResourceScope,
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, Patch, PatchParams},
    runtime::watcher::Event as WatchEvent,
    Client, CustomResourceExt, Error, Resource, ResourceExt,
};
