//! Status subresource patches (§4.9 step 6): every patch here is built as a
//! raw JSON merge so it stays correct regardless of which generated struct
//! shapes a particular Gateway API channel exposes, the same way upstream
//! Gateway controllers patch status.

use lbc_core::ControllerError;
use lbc_k8s_api::{Api, Condition, Error, Patch, PatchParams};

use crate::conditions;

/// One listener's observed attachment state, keyed by the listener name the
/// Gateway spec declared.
pub struct ListenerStatus {
    pub name: String,
    pub attached_routes: i32,
    pub accepted: Condition,
    pub resolved_refs: Condition,
    pub programmed: Condition,
}

fn field_manager() -> PatchParams {
    PatchParams::apply("elbv2.k8s.aws/status").force()
}

pub async fn patch_gateway_status(
    api: &Api<lbc_k8s_api::gateway::Gateway>,
    name: &str,
    generation: i64,
    dns_name: &str,
    listeners: &[ListenerStatus],
) -> Result<(), Error> {
    let conditions = vec![
        conditions::accepted(Some(generation)),
        conditions::programmed(Some(generation)),
    ];
    let listener_statuses: Vec<_> = listeners
        .iter()
        .map(|l| {
            serde_json::json!({
                "name": l.name,
                "attachedRoutes": l.attached_routes,
                "conditions": [l.accepted, l.resolved_refs, l.programmed],
            })
        })
        .collect();
    let addresses: Vec<_> = if dns_name.is_empty() {
        Vec::new()
    } else {
        vec![serde_json::json!({ "type": "Hostname", "value": dns_name })]
    };

    let patch = serde_json::json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "status": {
            "addresses": addresses,
            "conditions": conditions,
            "listeners": listener_statuses,
        }
    });
    api.patch_status(name, &field_manager(), &Patch::Apply(patch)).await?;
    Ok(())
}

pub async fn patch_gateway_status_failed(
    api: &Api<lbc_k8s_api::gateway::Gateway>,
    name: &str,
    generation: i64,
    err: &ControllerError,
) -> Result<(), Error> {
    let (accepted, resolved_refs) = conditions::from_error(err, Some(generation));
    let patch = serde_json::json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "status": {
            "conditions": [accepted, resolved_refs],
        }
    });
    api.patch_status(name, &field_manager(), &Patch::Apply(patch)).await?;
    Ok(())
}

/// Patches one route's `parentRefs[].controllerName == "elbv2.k8s.aws"`
/// status entry, generalized across HTTPRoute/GRPCRoute/TCPRoute/UDPRoute/
/// TLSRoute since each exposes the same `status.parents[]` shape.
pub async fn patch_route_parent_status<K>(
    api: &Api<K>,
    name: &str,
    controller_name: &str,
    parent_ref: serde_json::Value,
    accepted: Condition,
    resolved_refs: Condition,
) -> Result<(), Error>
where
    K: lbc_k8s_api::Resource<DynamicType = ()> + Clone + serde::de::DeserializeOwned + serde::Serialize + std::fmt::Debug,
{
    let kind = K::kind(&());
    let api_version = K::api_version(&());
    let patch = serde_json::json!({
        "apiVersion": api_version.as_ref(),
        "kind": kind.as_ref(),
        "status": {
            "parents": [{
                "parentRef": parent_ref,
                "controllerName": controller_name,
                "conditions": [accepted, resolved_refs],
            }]
        }
    });
    api.patch_status(name, &field_manager(), &Patch::Apply(patch)).await?;
    Ok(())
}

/// Patches `status.loadBalancer.ingress[].hostname` on an `Ingress` object
/// (§4.9 step 6) — there is no condition vocabulary for Ingress, only the
/// address.
pub async fn patch_ingress_status(
    api: &Api<lbc_k8s_api::Ingress>,
    name: &str,
    dns_name: &str,
) -> Result<(), Error> {
    let patch = serde_json::json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "status": {
            "loadBalancer": {
                "ingress": [{ "hostname": dns_name }]
            }
        }
    });
    api.patch_status(name, &field_manager(), &Patch::Apply(patch)).await?;
    Ok(())
}
