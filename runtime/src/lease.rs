//! Lease acquisition for §11's leadership gate: every replica watches the
//! cluster and builds a model, but only the current lease holder is allowed
//! to mutate AWS or patch status.

use anyhow::Result;
use k8s_openapi::api::{apps::v1::Deployment, coordination::v1 as coordv1};
use kube::api::PatchParams;
use kube::{Api, Resource, ResourceExt};
use std::sync::Arc;
use tokio::{sync::watch, time::Duration};

pub async fn init<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    deployment_name: &str,
    controller_name: &str,
    hostname: &str,
    lease_duration: Duration,
    renew_grace_period: Duration,
) -> Result<watch::Receiver<Arc<kubert::lease::Claim>>> {
    let lease_name = format!("{controller_name}-leader");

    // Fetch the controller's own Deployment so the Lease can carry it as an
    // owner reference and get garbage-collected with it.
    let api = Api::<Deployment>::namespaced(runtime.client(), ns);
    let deployment = api.get(deployment_name).await?;

    let lease = coordv1::Lease {
        metadata: kube::api::ObjectMeta {
            name: Some(lease_name.clone()),
            namespace: Some(ns.to_string()),
            // "0" means create-only: never clobber an existing lease.
            resource_version: Some("0".to_string()),
            owner_references: Some(vec![deployment.controller_owner_ref(&()).unwrap()]),
            labels: Some(
                [("app.kubernetes.io/managed-by".to_string(), controller_name.to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    };
    let api = Api::<coordv1::Lease>::namespaced(runtime.client(), ns);
    match api
        .patch(
            &lease_name,
            &PatchParams {
                field_manager: Some(controller_name.to_string()),
                ..Default::default()
            },
            &kube::api::Patch::Apply(lease),
        )
        .await
    {
        Ok(lease) => tracing::info!(?lease, "created lease resource"),
        Err(kube::Error::Api(_)) => tracing::debug!("lease already exists, no need to create it"),
        Err(error) => return Err(error.into()),
    };

    let params = kubert::lease::ClaimParams {
        lease_duration,
        renew_grace_period,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, &lease_name)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(claims)
}
