//! Watches Gateways, Routes, Ingresses, Services, and the controller's CRDs,
//! and materializes the grouped [`GroupInput`]s the Model Builder consumes
//! (§4.3). This is the only place in the crate that knows the shape of a
//! generated Kubernetes type; everything downstream works in terms of the
//! primitive request structs in [`crate::builder`].

use crate::builder::{BackendRequest, GroupInput, ListenerRequest, PathSpecificity, RuleRequest};
use crate::config_merge::ConfigMerger;
use crate::grouping::{
    is_attached, parent_ref, sort_group, AllowedNamespaces, AttachmentCandidate, IngressGroupId,
    IngressGroupMember, ListenerAttachmentSpec, ParentRef, RouteKind,
};
use kubert::index::IndexNamespacedResource;
use lbc_core::model::{IpAddressType, RuleCondition, Scheme, TargetType};
use lbc_k8s_api::crds::{
    AlpnPolicy, IngressClassParams, IngressClassParamsSpec, IpAddressType as CrdIpAddressType,
    LoadBalancerConfiguration, LoadBalancerConfigurationSpec, Scheme as CrdScheme,
    TargetGroupConfiguration, TargetGroupConfigurationSpec,
};
use lbc_k8s_api::gateway::{
    Gateway, GatewayClass, GatewayListenersAllowedRoutesNamespacesFrom, GRPCRoute, HTTPRoute,
    HTTPRouteRulesMatchesPathType, TCPRoute, TLSRoute, UDPRoute,
};
use lbc_k8s_api::{Ingress, IngressClass, Labels, Namespace, ResourceExt, Service};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type Shared<T> = Arc<parking_lot::RwLock<T>>;

/// All watched state this controller needs, keyed by (namespace, name) for
/// namespaced kinds. Cluster-scoped kinds (GatewayClass, IngressClass,
/// IngressClassParams) have no `IndexNamespacedResource` counterpart in
/// `kubert`, so their watch streams are drained by plain `apply_*`/`delete_*`
/// calls the runtime crate issues from a `kube_runtime::watcher` loop.
#[derive(Debug, Default)]
pub struct Index {
    controller_name: String,
    namespace_labels: BTreeMap<String, Labels>,
    services: BTreeMap<(String, String), Service>,
    gateway_classes: BTreeMap<String, GatewayClass>,
    ingress_classes: BTreeMap<String, IngressClass>,
    ingress_class_params: BTreeMap<String, IngressClassParamsSpec>,
    load_balancer_configs: BTreeMap<(String, String), LoadBalancerConfigurationSpec>,
    target_group_configs: BTreeMap<(String, String), TargetGroupConfigurationSpec>,
    gateways: BTreeMap<(String, String), GatewayEntry>,
    http_routes: BTreeMap<(String, String), RouteBinding>,
    grpc_routes: BTreeMap<(String, String), RouteBinding>,
    tcp_routes: BTreeMap<(String, String), RouteBinding>,
    udp_routes: BTreeMap<(String, String), RouteBinding>,
    tls_routes: BTreeMap<(String, String), RouteBinding>,
    ingresses: BTreeMap<(String, String), IngressEntry>,
}

#[derive(Clone, Debug)]
struct GatewayEntry {
    uid: String,
    gateway_class_name: String,
    listeners: Vec<ListenerEntry>,
    /// Set from `metadata.deletionTimestamp` (§4.9 step 1-3) — stays present
    /// in the index (and so keeps reporting group membership) until the
    /// status controller clears its finalizer and the apiserver performs
    /// the real delete.
    deleting: bool,
}

#[derive(Clone, Debug)]
struct ListenerEntry {
    name: String,
    port: u16,
    protocol: String,
    hostname: Option<String>,
    allowed_namespaces: AllowedNamespaces,
    allowed_kinds: Vec<RouteKind>,
}

impl ListenerEntry {
    fn attachment_spec(&self) -> ListenerAttachmentSpec {
        ListenerAttachmentSpec {
            name: self.name.clone(),
            port: self.port,
            allowed_namespaces: self.allowed_namespaces.clone(),
            allowed_kinds: self.allowed_kinds.clone(),
        }
    }
}

#[derive(Clone, Debug)]
struct IngressEntry {
    ingress_class_name: Option<String>,
    annotations: BTreeMap<String, String>,
    rules: Vec<IngressHostRule>,
    tls_hosts: Vec<String>,
    /// See [`GatewayEntry::deleting`].
    deleting: bool,
}

#[derive(Clone, Debug)]
struct IngressHostRule {
    host: Option<String>,
    /// (path, pathType, backend)
    paths: Vec<(String, String, RouteBackendRef)>,
}

/// One route object reduced to the fields grouping and rule-building need,
/// independent of which generated per-kind type it came from.
#[derive(Clone, Debug)]
pub struct RouteBinding {
    pub kind: RouteKind,
    pub parents: Vec<ParentRef>,
    pub rules: Vec<RouteRule>,
}

#[derive(Clone, Debug, Default)]
pub struct RouteRule {
    pub matches: Vec<RouteMatch>,
    pub backends: Vec<RouteBackendRef>,
}

#[derive(Clone, Debug, Default)]
pub struct RouteMatch {
    pub path_exact: Option<String>,
    pub path_prefix: Option<String>,
    pub method: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RouteBackendRef {
    pub namespace: Option<String>,
    pub name: String,
    pub port: Option<i32>,
    pub weight: i32,
}

/// A route whose parentRefs couldn't be reduced to at least one Gateway
/// parent — dropped from the index rather than reported, since §4.3 treats
/// "no attachable parent" as the route simply contributing nothing.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RouteBindingError {
    #[error("route has no parentRefs naming a Gateway")]
    NoParents,
}

impl TryFrom<HTTPRoute> for RouteBinding {
    type Error = RouteBindingError;

    fn try_from(route: HTTPRoute) -> Result<Self, Self::Error> {
        let ns = route.namespace().unwrap_or_default();
        let spec = route.spec;
        let parents = collect_parents(
            &ns,
            spec.parent_refs
                .into_iter()
                .flatten()
                .map(|p| (p.kind, p.namespace, p.name, p.section_name, p.port)),
        )?;

        let rules = spec
            .rules
            .into_iter()
            .flatten()
            .map(|rule| RouteRule {
                matches: rule
                    .matches
                    .into_iter()
                    .flatten()
                    .map(|m| {
                        let exact = matches!(
                            m.path.as_ref().and_then(|p| p.r#type.as_ref()),
                            Some(HTTPRouteRulesMatchesPathType::Exact)
                        );
                        let value = m.path.and_then(|p| p.value);
                        RouteMatch {
                            path_exact: if exact { value.clone() } else { None },
                            path_prefix: if exact { None } else { value },
                            method: m.method.map(|v| format!("{v:?}")),
                        }
                    })
                    .collect(),
                backends: rule
                    .backend_refs
                    .into_iter()
                    .flatten()
                    .map(|b| RouteBackendRef {
                        namespace: b.namespace,
                        name: b.name,
                        port: b.port,
                        weight: b.weight.unwrap_or(1),
                    })
                    .collect(),
            })
            .collect();

        Ok(RouteBinding {
            kind: RouteKind::Http,
            parents,
            rules,
        })
    }
}

impl TryFrom<GRPCRoute> for RouteBinding {
    type Error = RouteBindingError;

    fn try_from(route: GRPCRoute) -> Result<Self, Self::Error> {
        let ns = route.namespace().unwrap_or_default();
        let spec = route.spec;
        let parents = collect_parents(
            &ns,
            spec.parent_refs
                .into_iter()
                .flatten()
                .map(|p| (p.kind, p.namespace, p.name, p.section_name, p.port)),
        )?;

        let rules = spec
            .rules
            .into_iter()
            .flatten()
            .map(|rule| RouteRule {
                matches: Vec::new(),
                backends: rule
                    .backend_refs
                    .into_iter()
                    .flatten()
                    .map(|b| RouteBackendRef {
                        namespace: b.namespace,
                        name: b.name,
                        port: b.port,
                        weight: b.weight.unwrap_or(1),
                    })
                    .collect(),
            })
            .collect();

        Ok(RouteBinding {
            kind: RouteKind::Grpc,
            parents,
            rules,
        })
    }
}

macro_rules! l4_route_binding {
    ($ty:ty, $kind:expr) => {
        impl TryFrom<$ty> for RouteBinding {
            type Error = RouteBindingError;

            fn try_from(route: $ty) -> Result<Self, Self::Error> {
                let ns = route.namespace().unwrap_or_default();
                let spec = route.spec;
                let parents = collect_parents(
                    &ns,
                    spec.parent_refs
                        .into_iter()
                        .flatten()
                        .map(|p| (p.kind, p.namespace, p.name, p.section_name, p.port)),
                )?;

                let rules = spec
                    .rules
                    .into_iter()
                    .flatten()
                    .map(|rule| RouteRule {
                        matches: Vec::new(),
                        backends: rule
                            .backend_refs
                            .into_iter()
                            .flatten()
                            .map(|b| RouteBackendRef {
                                namespace: b.namespace,
                                name: b.name,
                                port: b.port,
                                weight: b.weight.unwrap_or(1),
                            })
                            .collect(),
                    })
                    .collect();

                Ok(RouteBinding {
                    kind: $kind,
                    parents,
                    rules,
                })
            }
        }
    };
}

l4_route_binding!(TCPRoute, RouteKind::Tcp);
l4_route_binding!(UDPRoute, RouteKind::Udp);
l4_route_binding!(TLSRoute, RouteKind::Tls);

#[allow(clippy::type_complexity)]
fn collect_parents(
    route_namespace: &str,
    entries: impl Iterator<
        Item = (
            Option<String>,
            Option<String>,
            String,
            Option<String>,
            Option<i32>,
        ),
    >,
) -> Result<Vec<ParentRef>, RouteBindingError> {
    let parents: Vec<ParentRef> = entries
        .filter_map(|(kind, namespace, name, section, port)| {
            parent_ref(route_namespace, kind.as_deref(), namespace, name, section, port)
        })
        .collect();
    if parents.is_empty() {
        return Err(RouteBindingError::NoParents);
    }
    Ok(parents)
}

/// Applies one generic route kind to its map, following the same
/// `TryFrom`-bounded pattern used for every route-shaped resource: a route
/// that fails to reduce (no Gateway parent) is dropped rather than indexed.
fn apply_route<R>(map: &mut BTreeMap<(String, String), RouteBinding>, route: R)
where
    R: ResourceExt,
    RouteBinding: TryFrom<R>,
{
    let ns = route.namespace().unwrap_or_default();
    let name = route.name_unchecked();
    match RouteBinding::try_from(route) {
        Ok(binding) => {
            map.insert((ns, name), binding);
        }
        Err(_) => {
            map.remove(&(ns, name));
        }
    }
}

macro_rules! impl_route_index {
    ($ty:ty, $field:ident) => {
        impl IndexNamespacedResource<$ty> for Index {
            fn apply(&mut self, route: $ty) {
                apply_route(&mut self.$field, route);
            }

            fn delete(&mut self, ns: String, name: String) {
                self.$field.remove(&(ns, name));
            }
        }
    };
}

impl_route_index!(HTTPRoute, http_routes);
impl_route_index!(GRPCRoute, grpc_routes);
impl_route_index!(TCPRoute, tcp_routes);
impl_route_index!(UDPRoute, udp_routes);
impl_route_index!(TLSRoute, tls_routes);

impl IndexNamespacedResource<Service> for Index {
    fn apply(&mut self, service: Service) {
        let ns = service.namespace().unwrap_or_default();
        let name = service.name_unchecked();
        self.services.insert((ns, name), service);
    }

    fn delete(&mut self, ns: String, name: String) {
        self.services.remove(&(ns, name));
    }
}

impl IndexNamespacedResource<Gateway> for Index {
    fn apply(&mut self, gateway: Gateway) {
        let ns = gateway.namespace().unwrap_or_default();
        let name = gateway.name_unchecked();
        let uid = gateway.uid().unwrap_or_default();
        let deleting = gateway.meta().deletion_timestamp.is_some();
        let spec = gateway.spec;

        let listeners = spec
            .listeners
            .into_iter()
            .map(|listener| {
                let allowed = listener.allowed_routes;
                let allowed_namespaces = allowed
                    .as_ref()
                    .and_then(|a| a.namespaces.as_ref())
                    .map(|n| match n.from {
                        Some(GatewayListenersAllowedRoutesNamespacesFrom::All) => AllowedNamespaces::All,
                        Some(GatewayListenersAllowedRoutesNamespacesFrom::Selector) => {
                            AllowedNamespaces::Selector(n.selector.clone().unwrap_or_default())
                        }
                        _ => AllowedNamespaces::Same,
                    })
                    .unwrap_or(AllowedNamespaces::Same);

                let allowed_kinds = allowed
                    .as_ref()
                    .and_then(|a| a.kinds.clone())
                    .map(|kinds| {
                        kinds
                            .into_iter()
                            .filter_map(|k| route_kind_from_str(&k.kind))
                            .collect()
                    })
                    .unwrap_or_else(|| default_allowed_kinds(&listener.protocol));

                ListenerEntry {
                    name: listener.name,
                    port: listener.port as u16,
                    protocol: listener.protocol,
                    hostname: listener.hostname,
                    allowed_namespaces,
                    allowed_kinds,
                }
            })
            .collect();

        self.gateways.insert(
            (ns, name),
            GatewayEntry {
                uid,
                gateway_class_name: spec.gateway_class_name,
                listeners,
                deleting,
            },
        );
    }

    fn delete(&mut self, ns: String, name: String) {
        self.gateways.remove(&(ns, name));
    }
}

impl IndexNamespacedResource<Ingress> for Index {
    fn apply(&mut self, ingress: Ingress) {
        let ns = ingress.namespace().unwrap_or_default();
        let name = ingress.name_unchecked();
        let annotations = ingress.annotations().clone();
        let deleting = ingress.meta().deletion_timestamp.is_some();
        let spec = ingress.spec.unwrap_or_default();

        let tls_hosts = spec
            .tls
            .into_iter()
            .flatten()
            .flat_map(|tls| tls.hosts.into_iter().flatten())
            .collect();

        let rules = spec
            .rules
            .into_iter()
            .flatten()
            .filter_map(|rule| {
                let http = rule.http?;
                let paths = http
                    .paths
                    .into_iter()
                    .filter_map(|p| {
                        let backend = ingress_backend(&ns, &p.backend)?;
                        let path_type = p.path_type.unwrap_or_else(|| "Prefix".to_string());
                        Some((p.path.unwrap_or_else(|| "/".to_string()), path_type, backend))
                    })
                    .collect();
                Some(IngressHostRule {
                    host: rule.host,
                    paths,
                })
            })
            .collect();

        self.ingresses.insert(
            (ns, name),
            IngressEntry {
                ingress_class_name: spec.ingress_class_name,
                annotations,
                rules,
                tls_hosts,
                deleting,
            },
        );
    }

    fn delete(&mut self, ns: String, name: String) {
        self.ingresses.remove(&(ns, name));
    }
}

impl IndexNamespacedResource<LoadBalancerConfiguration> for Index {
    fn apply(&mut self, config: LoadBalancerConfiguration) {
        let ns = config.namespace().unwrap_or_default();
        let name = config.name_unchecked();
        self.load_balancer_configs.insert((ns, name), config.spec);
    }

    fn delete(&mut self, ns: String, name: String) {
        self.load_balancer_configs.remove(&(ns, name));
    }
}

impl IndexNamespacedResource<TargetGroupConfiguration> for Index {
    fn apply(&mut self, config: TargetGroupConfiguration) {
        let ns = config.namespace().unwrap_or_default();
        let name = config.name_unchecked();
        self.target_group_configs.insert((ns, name), config.spec);
    }

    fn delete(&mut self, ns: String, name: String) {
        self.target_group_configs.remove(&(ns, name));
    }
}

fn ingress_backend(
    ingress_namespace: &str,
    backend: &lbc_k8s_api::IngressBackend,
) -> Option<RouteBackendRef> {
    let svc = backend.service.as_ref()?;
    let port = svc.port.as_ref().and_then(|p| p.number);
    Some(RouteBackendRef {
        namespace: Some(ingress_namespace.to_string()),
        name: svc.name.clone(),
        port,
        weight: 1,
    })
}

fn route_kind_from_str(kind: &str) -> Option<RouteKind> {
    match kind {
        "HTTPRoute" => Some(RouteKind::Http),
        "GRPCRoute" => Some(RouteKind::Grpc),
        "TCPRoute" => Some(RouteKind::Tcp),
        "UDPRoute" => Some(RouteKind::Udp),
        "TLSRoute" => Some(RouteKind::Tls),
        _ => None,
    }
}

fn default_allowed_kinds(protocol: &str) -> Vec<RouteKind> {
    match protocol {
        "HTTP" | "HTTPS" => vec![RouteKind::Http],
        "TCP" => vec![RouteKind::Tcp],
        "UDP" => vec![RouteKind::Udp],
        "TLS" => vec![RouteKind::Tls, RouteKind::Http],
        _ => vec![],
    }
}

// === impl Index ===

impl Index {
    pub fn shared(controller_name: impl Into<String>) -> Shared<Self> {
        Arc::new(parking_lot::RwLock::new(Self {
            controller_name: controller_name.into(),
            ..Default::default()
        }))
    }

    pub fn apply_namespace(&mut self, namespace: Namespace) {
        let name = namespace.name_unchecked();
        self.namespace_labels
            .insert(name, namespace.metadata.labels.into());
    }

    pub fn delete_namespace(&mut self, name: String) {
        self.namespace_labels.remove(&name);
    }

    pub fn apply_gateway_class(&mut self, class: GatewayClass) {
        self.gateway_classes.insert(class.name_unchecked(), class);
    }

    pub fn delete_gateway_class(&mut self, name: String) {
        self.gateway_classes.remove(&name);
    }

    pub fn apply_ingress_class(&mut self, class: IngressClass) {
        self.ingress_classes.insert(class.name_unchecked(), class);
    }

    pub fn delete_ingress_class(&mut self, name: String) {
        self.ingress_classes.remove(&name);
    }

    pub fn apply_ingress_class_params(&mut self, params: IngressClassParams) {
        self.ingress_class_params
            .insert(params.name_unchecked(), params.spec);
    }

    pub fn delete_ingress_class_params(&mut self, name: String) {
        self.ingress_class_params.remove(&name);
    }

    fn namespace_labels_of(&self, ns: &str) -> Labels {
        self.namespace_labels.get(ns).cloned().unwrap_or_default()
    }

    fn target_group_config_for_service(
        &self,
        ns: &str,
        service_name: &str,
    ) -> Option<&TargetGroupConfigurationSpec> {
        self.target_group_configs
            .get(&(ns.to_string(), service_name.to_string()))
            .or_else(|| {
                self.target_group_configs
                    .values()
                    .find(|c| c.target_ref.name == service_name)
            })
    }

    /// Materializes every Gateway- and Ingress-mode reconciliation unit from
    /// the index's current state, merging each unit's `LoadBalancerConfiguration`
    /// inputs with `merger`.
    pub fn group_inputs(&self, merger: &ConfigMerger) -> Vec<GroupInput> {
        let mut out = self.gateway_group_inputs(merger);
        out.extend(self.ingress_group_inputs(merger));
        out
    }

    fn gateway_group_inputs(&self, merger: &ConfigMerger) -> Vec<GroupInput> {
        let mut inputs = Vec::new();
        for ((gw_ns, gw_name), gateway) in &self.gateways {
            let class_config = self.config_for_gateway_class(&gateway.gateway_class_name);
            let gw_config = self
                .load_balancer_configs
                .get(&(gw_ns.clone(), gw_name.clone()));
            let merged = merger.merge(gw_config, class_config.as_ref());

            let listeners = gateway
                .listeners
                .iter()
                .map(|listener| {
                    let cfg = merged
                        .listeners
                        .get(&(listener.protocol.clone(), listener.port));
                    ListenerRequest {
                        name: listener.name.clone(),
                        port: listener.port,
                        protocol: listener.protocol.clone(),
                        ssl_policy: cfg.and_then(|c| c.ssl_policy.clone()),
                        certificate_arns: cfg
                            .and_then(|c| c.certificate_arns.clone())
                            .unwrap_or_default(),
                        alpn_policy: cfg.and_then(|c| c.alpn_policy).map(alpn_policy_str),
                        hosts: listener.hostname.iter().cloned().collect(),
                    }
                })
                .collect();

            let mut rules = Vec::new();
            let mut default_backends: BTreeMap<u16, Vec<BackendRequest>> = BTreeMap::new();

            for route_map in [
                &self.http_routes,
                &self.grpc_routes,
                &self.tcp_routes,
                &self.udp_routes,
                &self.tls_routes,
            ] {
                for ((route_ns, route_name), binding) in route_map {
                    self.collect_route_into_gateway(
                        gw_ns,
                        gw_name,
                        gateway,
                        route_ns,
                        route_name,
                        binding,
                        &mut rules,
                        &mut default_backends,
                    );
                }
            }

            inputs.push(GroupInput {
                namespace: gw_ns.clone(),
                name: gw_name.clone(),
                schemes: vec![merged.scheme.map(crd_scheme_to_model).unwrap_or_default()],
                ip_address_types: vec![merged
                    .ip_address_type
                    .map(crd_ip_type_to_model)
                    .unwrap_or_default()],
                explicit_subnet_ids: merged.subnets.as_ref().and_then(|s| s.ids.clone()),
                explicit_security_groups: merged.security_groups.clone(),
                listeners,
                rules,
                default_backends,
                source_ranges: merged.source_ranges.clone().unwrap_or_default(),
                vpc_ipv6_cidr: None,
                enable_icmp: merged.enable_icmp.unwrap_or(false),
                merged_config: merged,
                gateway_uid: gateway.uid.clone(),
                members: vec![(gw_ns.clone(), gw_name.clone())],
                being_deleted: gateway.deleting,
            });
        }
        inputs
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_route_into_gateway(
        &self,
        gw_ns: &str,
        gw_name: &str,
        gateway: &GatewayEntry,
        route_ns: &str,
        route_name: &str,
        binding: &RouteBinding,
        rules: &mut Vec<RuleRequest>,
        default_backends: &mut BTreeMap<u16, Vec<BackendRequest>>,
    ) {
        for parent in &binding.parents {
            if parent.gateway_namespace != gw_ns || parent.gateway_name != gw_name {
                continue;
            }
            let route_namespace_labels = self.namespace_labels_of(route_ns);
            let candidate = AttachmentCandidate {
                route_namespace: route_ns,
                route_namespace_labels: &route_namespace_labels,
                route_kind: binding.kind,
                parent,
            };

            for listener in &gateway.listeners {
                if is_attached(&listener.attachment_spec(), gw_ns, &candidate).is_err() {
                    continue;
                }

                let route_identity = format!("{route_ns}/{route_name}");
                if binding.kind.is_l7() {
                    for (idx, rule) in binding.rules.iter().enumerate() {
                        let backends = rule
                            .backends
                            .iter()
                            .map(|b| {
                                self.backend_request(
                                    route_ns,
                                    &route_identity,
                                    Some(binding.kind),
                                    b,
                                    &listener.protocol,
                                )
                            })
                            .collect();
                        let primary_match = rule.matches.first().cloned().unwrap_or_default();
                        let _ = idx;
                        rules.push(RuleRequest {
                            port: listener.port,
                            explicit_priority: explicit_priority(&self.controller_name),
                            path_specificity: path_specificity(&primary_match),
                            conditions: match_to_conditions(&primary_match),
                            backends,
                        });
                    }
                } else {
                    let backends: Vec<BackendRequest> = binding
                        .rules
                        .first()
                        .into_iter()
                        .flat_map(|r| r.backends.iter())
                        .map(|b| {
                            self.backend_request(
                                route_ns,
                                &route_identity,
                                Some(binding.kind),
                                b,
                                &listener.protocol,
                            )
                        })
                        .collect();
                    if !backends.is_empty() {
                        default_backends
                            .entry(listener.port)
                            .or_default()
                            .extend(backends);
                    }
                }
            }
        }
    }

    /// A GatewayClass's parametersRef points at a `LoadBalancerConfiguration`;
    /// since the class is cluster-scoped but the configuration object is
    /// namespaced, we resolve it by the class-naming convention (a config
    /// object named after its GatewayClass) rather than chasing a
    /// parametersRef field whose exact shape isn't pinned down here.
    fn config_for_gateway_class(&self, class_name: &str) -> Option<LoadBalancerConfigurationSpec> {
        self.load_balancer_configs
            .iter()
            .find(|((_, name), _)| name == class_name)
            .map(|(_, spec)| spec.clone())
    }

    fn backend_request(
        &self,
        route_namespace: &str,
        route_identity: &str,
        route_kind: Option<RouteKind>,
        backend: &RouteBackendRef,
        protocol: &str,
    ) -> BackendRequest {
        let ns = backend
            .namespace
            .clone()
            .unwrap_or_else(|| route_namespace.to_string());
        let service = self.services.get(&(ns.clone(), backend.name.clone()));
        let service_exists = service.is_some();
        let spec = service.and_then(|s| s.spec.as_ref());

        let service_port = backend.port.map(|p| p as u16).unwrap_or(0);
        let mut node_port = None;
        let mut uses_external_traffic_policy_local = false;
        let mut health_check_node_port = None;
        let mut service_is_ipv6 = false;

        if let Some(spec) = spec {
            uses_external_traffic_policy_local =
                spec.external_traffic_policy.as_deref() == Some("Local");
            health_check_node_port = spec.health_check_node_port.map(|p| p as u16);
            service_is_ipv6 = spec
                .ip_families
                .as_ref()
                .map(|families| families.iter().any(|f| f == "IPv6"))
                .unwrap_or(false);
            if let Some(ports) = &spec.ports {
                if let Some(port_spec) = ports.iter().find(|p| p.port as u16 == service_port) {
                    node_port = port_spec.node_port.map(|p| p as u16);
                }
            }
        }

        let tgc = self.target_group_config_for_service(&ns, &backend.name);
        let (target_type, protocol_version) = tgc
            .and_then(|c| c.default.as_ref())
            .map(|props| (props.target_type.clone(), props.protocol_version.clone()))
            .unwrap_or((None, None));

        BackendRequest {
            route_identity: route_identity.to_string(),
            route_kind,
            service_name: backend.name.clone(),
            service_exists,
            service_port,
            node_port,
            weight: backend.weight,
            target_type: target_type.map(|t| {
                if t.eq_ignore_ascii_case("ip") {
                    TargetType::Ip
                } else {
                    TargetType::Instance
                }
            }),
            protocol: protocol.to_string(),
            protocol_version,
            uses_external_traffic_policy_local,
            health_check_node_port,
            service_is_ipv6,
        }
    }

    fn ingress_group_inputs(&self, merger: &ConfigMerger) -> Vec<GroupInput> {
        let controller_name = self.controller_name.clone();
        let mut members: BTreeMap<IngressGroupId, Vec<IngressGroupMember>> = BTreeMap::new();

        for ((ns, name), ingress) in &self.ingresses {
            let class_params = self.ingress_class_params_for(ingress);
            let group_id =
                ingress_group_id(&controller_name, ns, name, &ingress.annotations, class_params);
            let order = ingress
                .annotations
                .get(&format!("{controller_name}/group.order"))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            members.entry(group_id).or_default().push(IngressGroupMember {
                order,
                namespace: ns.clone(),
                name: name.clone(),
            });
        }

        let mut inputs = Vec::new();
        for (group_id, members) in members {
            let sorted = sort_group(members);
            let Some(first) = sorted.first() else {
                continue;
            };
            let Some(first_ingress) = self
                .ingresses
                .get(&(first.namespace.clone(), first.name.clone()))
            else {
                continue;
            };
            let class_params = self.ingress_class_params_for(first_ingress);
            let merged = merger.merge(None, ingress_class_params_as_lb_config(class_params).as_ref());

            let mut rules = Vec::new();
            let mut has_http = false;
            let mut has_https = false;

            for member in &sorted {
                let Some(ingress) = self
                    .ingresses
                    .get(&(member.namespace.clone(), member.name.clone()))
                else {
                    continue;
                };
                if !ingress.tls_hosts.is_empty() {
                    has_https = true;
                }
                for rule in &ingress.rules {
                    let terminates_tls = ingress
                        .tls_hosts
                        .iter()
                        .any(|h| rule.host.as_deref() == Some(h.as_str()));
                    has_http = has_http || !terminates_tls;
                    let port = if terminates_tls { 443 } else { 80 };

                    for (idx, (path, path_type, backend)) in rule.paths.iter().enumerate() {
                        let route_identity = format!("{}/{}-{idx}", member.namespace, member.name);
                        let (condition, specificity) = if path_type == "Exact" {
                            (
                                RuleCondition::PathExact(path.clone()),
                                PathSpecificity::Exact,
                            )
                        } else {
                            (
                                RuleCondition::PathPrefix(path.clone()),
                                PathSpecificity::LongestPrefix(std::cmp::Reverse(path.len())),
                            )
                        };
                        rules.push(RuleRequest {
                            port,
                            explicit_priority: None,
                            path_specificity: specificity,
                            conditions: vec![condition],
                            backends: vec![self.backend_request(
                                &member.namespace,
                                &route_identity,
                                None,
                                backend,
                                if port == 443 { "HTTPS" } else { "HTTP" },
                            )],
                        });
                    }
                }
            }

            let mut listeners = Vec::new();
            if has_http {
                listeners.push(ListenerRequest {
                    name: String::new(),
                    port: 80,
                    protocol: "HTTP".into(),
                    ssl_policy: None,
                    certificate_arns: Vec::new(),
                    alpn_policy: None,
                    hosts: Vec::new(),
                });
            }
            if has_https {
                let hosts: Vec<String> = sorted
                    .iter()
                    .filter_map(|m| self.ingresses.get(&(m.namespace.clone(), m.name.clone())))
                    .flat_map(|e| e.tls_hosts.iter().cloned())
                    .collect();
                listeners.push(ListenerRequest {
                    name: String::new(),
                    port: 443,
                    protocol: "HTTPS".into(),
                    ssl_policy: None,
                    certificate_arns: Vec::new(),
                    alpn_policy: None,
                    hosts,
                });
            }

            inputs.push(GroupInput {
                namespace: first.namespace.clone(),
                name: group_id.name.clone(),
                schemes: vec![merged.scheme.map(crd_scheme_to_model).unwrap_or_default()],
                ip_address_types: vec![merged
                    .ip_address_type
                    .map(crd_ip_type_to_model)
                    .unwrap_or_default()],
                explicit_subnet_ids: merged.subnets.as_ref().and_then(|s| s.ids.clone()),
                explicit_security_groups: merged.security_groups.clone(),
                listeners,
                rules,
                default_backends: BTreeMap::new(),
                source_ranges: merged.source_ranges.clone().unwrap_or_default(),
                vpc_ipv6_cidr: None,
                enable_icmp: merged.enable_icmp.unwrap_or(false),
                merged_config: merged,
                gateway_uid: String::new(),
                being_deleted: sorted.iter().all(|m| {
                    self.ingresses
                        .get(&(m.namespace.clone(), m.name.clone()))
                        .map(|e| e.deleting)
                        .unwrap_or(true)
                }),
                members: sorted.iter().map(|m| (m.namespace.clone(), m.name.clone())).collect(),
            });
        }
        inputs
    }

    fn ingress_class_params_for(&self, ingress: &IngressEntry) -> Option<&IngressClassParamsSpec> {
        let class_name = ingress.ingress_class_name.as_ref()?;
        let class = self.ingress_classes.get(class_name)?;
        let params_name = class_params_name(class)?;
        self.ingress_class_params.get(&params_name)
    }
}

fn explicit_priority(_controller_name: &str) -> Option<i32> {
    // No per-rule priority annotation surface exists on route objects;
    // Ingress-mode priority comes from path specificity alone. Left as a
    // named hook for a future per-route priority annotation.
    None
}

fn path_specificity(m: &RouteMatch) -> PathSpecificity {
    if m.path_exact.is_some() {
        PathSpecificity::Exact
    } else if let Some(p) = &m.path_prefix {
        PathSpecificity::LongestPrefix(std::cmp::Reverse(p.len()))
    } else {
        PathSpecificity::Default
    }
}

fn match_to_conditions(m: &RouteMatch) -> Vec<RuleCondition> {
    let mut out = Vec::new();
    if let Some(p) = &m.path_exact {
        out.push(RuleCondition::PathExact(p.clone()));
    }
    if let Some(p) = &m.path_prefix {
        out.push(RuleCondition::PathPrefix(p.clone()));
    }
    if let Some(method) = &m.method {
        out.push(RuleCondition::Method(method.clone()));
    }
    out
}

fn alpn_policy_str(policy: AlpnPolicy) -> String {
    match policy {
        AlpnPolicy::None => "None",
        AlpnPolicy::HTTP1Only => "HTTP1Only",
        AlpnPolicy::HTTP2Only => "HTTP2Only",
        AlpnPolicy::HTTP2Preferred => "HTTP2Preferred",
        AlpnPolicy::HTTP2Optional => "HTTP2Optional",
    }
    .to_string()
}

fn crd_scheme_to_model(scheme: CrdScheme) -> Scheme {
    match scheme {
        CrdScheme::Internal => Scheme::Internal,
        CrdScheme::InternetFacing => Scheme::InternetFacing,
    }
}

fn crd_ip_type_to_model(t: CrdIpAddressType) -> IpAddressType {
    match t {
        CrdIpAddressType::Ipv4 => IpAddressType::Ipv4,
        CrdIpAddressType::Dualstack => IpAddressType::Dualstack,
        CrdIpAddressType::DualstackWithoutPublicIpv4 => IpAddressType::DualstackWithoutPublicIpv4,
    }
}

fn class_params_name(class: &IngressClass) -> Option<String> {
    let params = class.spec.as_ref()?.parameters.as_ref()?;
    if params.kind != "IngressClassParams" {
        return None;
    }
    Some(params.name.clone())
}

fn ingress_group_id(
    controller_name: &str,
    namespace: &str,
    name: &str,
    annotations: &BTreeMap<String, String>,
    class_params: Option<&IngressClassParamsSpec>,
) -> IngressGroupId {
    if let Some(explicit) = annotations.get(&format!("{controller_name}/group.name")) {
        return IngressGroupId::explicit(explicit);
    }
    if let Some(group) = class_params.and_then(|p| p.group.as_ref()) {
        return IngressGroupId::explicit(&group.name);
    }
    IngressGroupId::implicit(namespace, name)
}

/// Ingress mode has no GatewayClass-level config; `IngressClassParams`
/// supplies the equivalent top-level settings, translated into the same
/// merge-input shape `ConfigMerger` expects.
fn ingress_class_params_as_lb_config(
    params: Option<&IngressClassParamsSpec>,
) -> Option<LoadBalancerConfigurationSpec> {
    params.map(|p| LoadBalancerConfigurationSpec {
        scheme: p.scheme,
        ip_address_type: p.ip_address_type,
        subnets: p.subnets.clone(),
        security_groups: p.security_groups.clone(),
        tags: p.tags.clone(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_group_id_falls_back_to_implicit_when_no_annotation_or_class_group() {
        let id = ingress_group_id("elbv2.k8s.aws", "default", "my-ingress", &BTreeMap::new(), None);
        assert_eq!(id, IngressGroupId::implicit("default", "my-ingress"));
    }

    #[test]
    fn ingress_group_id_prefers_explicit_annotation_over_class_params_group() {
        let mut annotations = BTreeMap::new();
        annotations.insert("elbv2.k8s.aws/group.name".to_string(), "shared".to_string());
        let params = IngressClassParamsSpec {
            group: Some(lbc_k8s_api::crds::IngressGroupRef {
                name: "from-class".into(),
            }),
            ..Default::default()
        };
        let id = ingress_group_id(
            "elbv2.k8s.aws",
            "default",
            "my-ingress",
            &annotations,
            Some(&params),
        );
        assert_eq!(id, IngressGroupId::explicit("shared"));
    }

    #[test]
    fn alpn_policy_names_match_the_enumerated_set() {
        assert_eq!(alpn_policy_str(AlpnPolicy::HTTP2Preferred), "HTTP2Preferred");
    }

    #[test]
    fn default_allowed_kinds_matches_protocol_family() {
        assert_eq!(default_allowed_kinds("HTTP"), vec![RouteKind::Http]);
        assert_eq!(default_allowed_kinds("TCP"), vec![RouteKind::Tcp]);
    }
}
