//! Route/Ingress grouping & attachment (§4.3): assembles individually
//! watched Kubernetes objects into the reconciliation units the Model
//! Builder consumes.


/// A route kind the controller accepts, used to filter a listener's
/// `allowedRoutes.kinds` (§4.3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RouteKind {
    Http,
    Grpc,
    Tcp,
    Udp,
    Tls,
}

impl RouteKind {
    /// Whether this route kind belongs to the L7 (rule-bearing) family
    /// (§4.4 step 6) as opposed to the L4 pass-through family.
    pub fn is_l7(self) -> bool {
        matches!(self, Self::Http | Self::Grpc)
    }
}

/// One parentRef naming this Gateway, carried alongside the route so the
/// builder can report per-parentRef conditions (§4.9 step 6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentRef {
    pub gateway_namespace: String,
    pub gateway_name: String,
    pub section_name: Option<String>,
    pub port: Option<u16>,
}

/// Why a route failed to attach to any listener (§4.3); reported on route
/// status but excluded from the model.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("no listener on Gateway {0}/{1} admits this route's namespace")]
    NamespaceNotAdmitted(String, String),

    #[error("no listener on Gateway {0}/{1} admits route kind")]
    KindNotAdmitted(String, String),

    #[error("parentRef names section/port {0} which matches no listener")]
    NoMatchingListener(String),
}

/// One listener exposed by a Gateway, reduced to the fields attachment
/// needs (§4.3 predicate).
#[derive(Clone, Debug)]
pub struct ListenerAttachmentSpec {
    pub name: String,
    pub port: u16,
    pub allowed_namespaces: AllowedNamespaces,
    pub allowed_kinds: Vec<RouteKind>,
}

#[derive(Clone, Debug)]
pub enum AllowedNamespaces {
    All,
    Same,
    Selector(lbc_k8s_api::labels::NamespaceSelector),
}

/// A route plus the namespace labels of the namespace it lives in, the
/// inputs `is_attached` needs without reaching back into a live index.
pub struct AttachmentCandidate<'a> {
    pub route_namespace: &'a str,
    pub route_namespace_labels: &'a lbc_k8s_api::Labels,
    pub route_kind: RouteKind,
    pub parent: &'a ParentRef,
}

/// Evaluates the four-part attachment predicate from §4.3 against one
/// listener. Returns `Ok(())` when attached, or the first failing
/// condition otherwise.
pub fn is_attached(
    listener: &ListenerAttachmentSpec,
    gateway_namespace: &str,
    candidate: &AttachmentCandidate<'_>,
) -> Result<(), AttachmentError> {
    // (iv) section/port match, when the parentRef names one.
    if let Some(section) = &candidate.parent.section_name {
        if section != &listener.name {
            return Err(AttachmentError::NoMatchingListener(section.clone()));
        }
    }
    if let Some(port) = candidate.parent.port {
        if port != listener.port {
            return Err(AttachmentError::NoMatchingListener(port.to_string()));
        }
    }

    // (ii) namespace admission.
    let namespace_ok = match &listener.allowed_namespaces {
        AllowedNamespaces::All => true,
        AllowedNamespaces::Same => candidate.route_namespace == gateway_namespace,
        AllowedNamespaces::Selector(selector) => selector.matches(candidate.route_namespace_labels),
    };
    if !namespace_ok {
        return Err(AttachmentError::NamespaceNotAdmitted(
            gateway_namespace.to_string(),
            listener.name.clone(),
        ));
    }

    // (iii) kind admission.
    if !listener.allowed_kinds.contains(&candidate.route_kind) {
        return Err(AttachmentError::KindNotAdmitted(
            gateway_namespace.to_string(),
            listener.name.clone(),
        ));
    }

    Ok(())
}

/// Deterministic Ingress grouping (§4.3 Ingress mode): either the explicit
/// group annotation, or an implicit single-member group keyed by the
/// Ingress's own identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IngressGroupId {
    pub name: String,
}

impl IngressGroupId {
    pub fn explicit(group_name: &str) -> Self {
        Self {
            name: group_name.to_string(),
        }
    }

    pub fn implicit(namespace: &str, name: &str) -> Self {
        Self {
            name: format!("{namespace}/{name}"),
        }
    }
}

/// One Ingress's position within its group, used to sort group members
/// deterministically by (group-order annotation, namespace, name) per
/// §4.3.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IngressGroupMember {
    pub order: i32,
    pub namespace: String,
    pub name: String,
}

/// Sorts a group's members into the deterministic order the builder
/// consumes (§4.3, also needed for invariant 1, determinism).
pub fn sort_group(mut members: Vec<IngressGroupMember>) -> Vec<IngressGroupMember> {
    members.sort();
    members
}

/// Builds a [`ParentRef`] from one Gateway API `*RouteParentRefs` entry's
/// fields. Each route kind (`HTTPRouteParentRefs`, `TCPRouteParentRefs`, ...)
/// is a distinct generated type with identical fields, so callers in
/// `index.rs` destructure their kind's type and pass the primitives here
/// rather than this crate depending on a shared parent-ref type that the
/// generated bindings don't provide.
pub fn parent_ref(
    route_namespace: &str,
    kind: Option<&str>,
    namespace: Option<String>,
    name: String,
    section_name: Option<String>,
    port: Option<i32>,
) -> Option<ParentRef> {
    if kind.unwrap_or("Gateway") != "Gateway" {
        return None;
    }
    Some(ParentRef {
        gateway_namespace: namespace.unwrap_or_else(|| route_namespace.to_string()),
        gateway_name: name,
        section_name,
        port: port.map(|p| p as u16),
    })
}
