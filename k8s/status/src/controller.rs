//! The reconciliation loop (§4.9): the only place that calls
//! [`lbc_k8s_index::build`] and [`lbc_aws::synthesize`] against live state,
//! and the only place that writes status or manages finalizers.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use lbc_core::{Cloud, ControllerError};
use lbc_k8s_api::{Api, Client, Resource};
use lbc_k8s_index::builder::GroupInput;
use lbc_k8s_index::grouping::RouteKind;
use lbc_k8s_index::index::{Index, Shared};
use lbc_k8s_index::{ClusterInfo, ConfigMerger};
use tokio::sync::{mpsc, watch};

use crate::conditions;
use crate::finalizer;
use crate::metrics::ReconcileMetrics;
use crate::resource_id::ResourceId;
use crate::status_write::{self, ListenerStatus};
use crate::target_group_binding;

/// Wakes the reconcile loop. The index has no per-object diffing of its
/// own — every tick re-derives the full [`GroupInput`] list from scratch —
/// so a single variant carrying no payload is enough to trigger a pass.
pub enum Update {
    Rescan,
}

pub struct Controller {
    client: Client,
    cloud: Arc<dyn Cloud>,
    cluster: ClusterInfo,
    merger: ConfigMerger,
    index: Shared<Index>,
    updates: mpsc::UnboundedReceiver<Update>,
    metrics: ReconcileMetrics,
    finalizer: String,
    claims: watch::Receiver<Arc<kubert::lease::Claim>>,
    hostname: String,
}

impl Controller {
    /// `claims`/`hostname` gate writes to the current lease holder (§11):
    /// every replica still builds a model each tick so a handoff starts
    /// warm, but only the holder synthesizes against AWS and writes status
    /// or finalizers.
    pub fn new(
        client: Client,
        cloud: Arc<dyn Cloud>,
        cluster: ClusterInfo,
        merger: ConfigMerger,
        index: Shared<Index>,
        updates: mpsc::UnboundedReceiver<Update>,
        metrics: ReconcileMetrics,
        claims: watch::Receiver<Arc<kubert::lease::Claim>>,
        hostname: String,
    ) -> Self {
        let finalizer = finalizer::name(&cluster.controller_name);
        Self {
            client,
            cloud,
            cluster,
            merger,
            index,
            updates,
            metrics,
            finalizer,
            claims,
            hostname,
        }
    }

    /// Drains the update channel, collapsing a burst of watch-triggered
    /// wakeups into a single full rescan, until the channel closes.
    pub async fn run(mut self) {
        while let Some(_update) = self.updates.recv().await {
            while self.updates.try_recv().is_ok() {}
            self.reconcile_all().await;
        }
    }

    async fn reconcile_all(&self) {
        let inputs = self.index.read().group_inputs(&self.merger);
        for input in &inputs {
            self.reconcile_one(input).await;
        }
    }

    async fn reconcile_one(&self, input: &GroupInput) {
        let start = Instant::now();
        let group = format!("{}/{}", input.namespace, input.name);

        // §4.9 steps 2-3: every member is mid-deletion.
        if input.being_deleted {
            if !self.is_leader() {
                tracing::debug!(%group, "not lease holder, deferring teardown");
                return;
            }

            if input.merged_config.deletion_protection == Some(true) {
                tracing::error!(%group, "deletion protection enabled, refusing to tear down group");
                self.metrics.record_error(&input.namespace, "Fatal", start.elapsed());
                return;
            }

            if let Err(err) = self.teardown(&input.namespace, &input.name).await {
                tracing::warn!(%group, %err, "teardown failed, will retry next rescan");
                self.metrics.record_error(&input.namespace, err.kind(), start.elapsed());
                return;
            }
            self.clear_finalizers(input).await;
            self.metrics.record_success(&input.namespace, start.elapsed());
            return;
        }

        let build = match lbc_k8s_index::build(&self.cluster, self.cloud.as_ref(), input).await {
            Ok(build) => build,
            Err(err) => {
                if !self.is_leader() {
                    tracing::debug!(%group, %err, "model build failed on non-leader, nothing written");
                    return;
                }
                tracing::warn!(%group, %err, "model build failed");
                self.write_failure(input, &err).await;
                self.metrics.record_error(&input.namespace, err.kind(), start.elapsed());
                return;
            }
        };

        if !self.is_leader() {
            tracing::debug!(%group, "not lease holder, model built but nothing written");
            return;
        }

        self.ensure_finalizers(input).await;

        let mut stack = build.stack;
        let synth = lbc_aws::synthesize(
            self.cloud.as_ref(),
            &mut stack,
            &self.cluster.controller_name,
            &self.cluster.cluster_name,
            self.cluster.load_balancer_stabilization,
        )
        .await;

        match synth {
            Ok(tgb_writes) => {
                self.write_success(input, &stack, &build.load_balancer_id).await;
                self.apply_target_group_bindings(input, &tgb_writes).await;
                self.metrics.record_success(&input.namespace, start.elapsed());
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::info!(%group, %err, "retryable synth error, will retry next rescan");
                } else {
                    tracing::warn!(%group, %err, "synth failed");
                }
                self.write_failure(input, &err).await;
                self.metrics.record_error(&input.namespace, err.kind(), start.elapsed());
            }
        }
    }

    /// Deletes every AWS resource tagged with this group's stack id,
    /// discovered directly from AWS rather than from a locally cached
    /// stack — the group's [`GroupInput`] no longer exists once every
    /// member is deleted, so there is nothing left to rebuild a `Stack`
    /// from (§4.9 step 2).
    async fn teardown(&self, namespace: &str, name: &str) -> lbc_core::Result<()> {
        let stack_id = format!("{namespace}/{name}");
        let cluster_name = &self.cluster.cluster_name;
        let elbv2 = self.cloud.elbv2();

        for lb in elbv2.find_tagged_load_balancers(cluster_name, &stack_id).await? {
            for listener in elbv2.list_listeners(&lb.arn).await? {
                for rule in elbv2.list_rules(&listener.arn).await? {
                    if !rule.is_default {
                        elbv2.delete_rule(&rule.arn).await?;
                    }
                }
                elbv2.delete_listener(&listener.arn).await?;
            }
            elbv2.delete_load_balancer(&lb.arn).await?;
        }

        for tg in elbv2.find_tagged_target_groups(cluster_name, &stack_id).await? {
            elbv2.delete_target_group(&tg.arn).await?;
        }

        for sg in self.cloud.ec2().find_tagged_security_groups(cluster_name, &stack_id).await? {
            self.cloud.ec2().delete_security_group(&sg.group_id).await?;
        }

        Ok(())
    }

    async fn ensure_finalizers(&self, input: &GroupInput) {
        for (namespace, name) in &input.members {
            let result = if is_gateway_mode(input) {
                let api: Api<lbc_k8s_api::gateway::Gateway> = Api::namespaced(self.client.clone(), namespace);
                finalizer::ensure(&api, name, &self.finalizer).await
            } else {
                let api: Api<lbc_k8s_api::Ingress> = Api::namespaced(self.client.clone(), namespace);
                finalizer::ensure(&api, name, &self.finalizer).await
            };
            if let Err(err) = result {
                let member = ResourceId::new(namespace.clone(), name.clone());
                tracing::warn!(%member, %err, "failed to set finalizer");
            }
        }
    }

    async fn clear_finalizers(&self, input: &GroupInput) {
        for (namespace, name) in &input.members {
            let result = if is_gateway_mode(input) {
                let api: Api<lbc_k8s_api::gateway::Gateway> = Api::namespaced(self.client.clone(), namespace);
                finalizer::remove(&api, name, &self.finalizer).await
            } else {
                let api: Api<lbc_k8s_api::Ingress> = Api::namespaced(self.client.clone(), namespace);
                finalizer::remove(&api, name, &self.finalizer).await
            };
            if let Err(err) = result {
                let member = ResourceId::new(namespace.clone(), name.clone());
                tracing::warn!(%member, %err, "failed to clear finalizer");
            }
        }
    }

    async fn write_success(&self, input: &GroupInput, stack: &lbc_core::Stack, lb_id: &lbc_core::ResourceId) {
        let dns_name = stack
            .get(lb_id)
            .and_then(|r| r.status())
            .and_then(|s| match s {
                lbc_core::ResourceStatus::LoadBalancer(lb) => Some(lb.dns_name.clone()),
                _ => None,
            })
            .unwrap_or_default();

        if is_gateway_mode(input) {
            self.write_gateway_success(input, &dns_name).await;
        } else {
            self.write_ingress_success(input, &dns_name).await;
        }
        self.write_route_statuses(input, None).await;
    }

    async fn write_failure(&self, input: &GroupInput, err: &ControllerError) {
        if is_gateway_mode(input) {
            if let Some((namespace, name)) = input.members.first() {
                let api: Api<lbc_k8s_api::gateway::Gateway> = Api::namespaced(self.client.clone(), namespace);
                let generation = self.generation_of(&api, name).await;
                if let Err(patch_err) = status_write::patch_gateway_status_failed(&api, name, generation, err).await {
                    tracing::warn!(%namespace, %name, %patch_err, "failed to patch gateway status");
                }
            }
        }
        self.write_route_statuses(input, Some(err)).await;
    }

    async fn write_gateway_success(&self, input: &GroupInput, dns_name: &str) {
        let Some((namespace, name)) = input.members.first() else {
            return;
        };
        let api: Api<lbc_k8s_api::gateway::Gateway> = Api::namespaced(self.client.clone(), namespace);
        let generation = self.generation_of(&api, name).await;

        let attached: Vec<_> = input
            .listeners
            .iter()
            .map(|listener| {
                let count = attached_route_count(input, listener.port);
                ListenerStatus {
                    name: listener.name.clone(),
                    attached_routes: count,
                    accepted: conditions::accepted(Some(generation)),
                    resolved_refs: conditions::resolved_refs(Some(generation)),
                    programmed: conditions::programmed(Some(generation)),
                }
            })
            .collect();

        if let Err(err) = status_write::patch_gateway_status(&api, name, generation, dns_name, &attached).await {
            tracing::warn!(%namespace, %name, %err, "failed to patch gateway status");
        }
    }

    async fn write_ingress_success(&self, input: &GroupInput, dns_name: &str) {
        for (namespace, name) in &input.members {
            let api: Api<lbc_k8s_api::Ingress> = Api::namespaced(self.client.clone(), namespace);
            if let Err(err) = status_write::patch_ingress_status(&api, name, dns_name).await {
                tracing::warn!(%namespace, %name, %err, "failed to patch ingress status");
            }
        }
    }

    /// Patches each distinct route this group references with its
    /// per-parentRef `Accepted`/`ResolvedRefs` conditions (§4.9 step 6).
    async fn write_route_statuses(&self, input: &GroupInput, err: Option<&ControllerError>) {
        let Some((gateway_namespace, gateway_name)) = (if is_gateway_mode(input) {
            input.members.first().cloned()
        } else {
            None
        }) else {
            return;
        };

        let mut routes: BTreeSet<(String, RouteKind)> = BTreeSet::new();
        for rule in &input.rules {
            for backend in &rule.backends {
                if let Some(kind) = backend.route_kind {
                    routes.insert((backend.route_identity.clone(), kind));
                }
            }
        }
        for backends in input.default_backends.values() {
            for backend in backends {
                if let Some(kind) = backend.route_kind {
                    routes.insert((backend.route_identity.clone(), kind));
                }
            }
        }

        for (identity, kind) in routes {
            let Some((route_namespace, route_name)) = identity.split_once('/') else {
                continue;
            };
            let parent_ref = serde_json::json!({
                "group": "gateway.networking.k8s.io",
                "kind": "Gateway",
                "namespace": gateway_namespace,
                "name": gateway_name,
            });
            let (accepted, resolved_refs) = match err {
                None => (conditions::accepted(None), conditions::resolved_refs(None)),
                Some(err) => conditions::from_error(err, None),
            };
            let result = match kind {
                RouteKind::Http => {
                    let api: Api<lbc_k8s_api::gateway::HTTPRoute> = Api::namespaced(self.client.clone(), route_namespace);
                    status_write::patch_route_parent_status(
                        &api,
                        route_name,
                        &self.cluster.controller_name,
                        parent_ref,
                        accepted,
                        resolved_refs,
                    )
                    .await
                }
                RouteKind::Grpc => {
                    let api: Api<lbc_k8s_api::gateway::GRPCRoute> = Api::namespaced(self.client.clone(), route_namespace);
                    status_write::patch_route_parent_status(
                        &api,
                        route_name,
                        &self.cluster.controller_name,
                        parent_ref,
                        accepted,
                        resolved_refs,
                    )
                    .await
                }
                RouteKind::Tcp => {
                    let api: Api<lbc_k8s_api::gateway::TCPRoute> = Api::namespaced(self.client.clone(), route_namespace);
                    status_write::patch_route_parent_status(
                        &api,
                        route_name,
                        &self.cluster.controller_name,
                        parent_ref,
                        accepted,
                        resolved_refs,
                    )
                    .await
                }
                RouteKind::Udp => {
                    let api: Api<lbc_k8s_api::gateway::UDPRoute> = Api::namespaced(self.client.clone(), route_namespace);
                    status_write::patch_route_parent_status(
                        &api,
                        route_name,
                        &self.cluster.controller_name,
                        parent_ref,
                        accepted,
                        resolved_refs,
                    )
                    .await
                }
                RouteKind::Tls => {
                    let api: Api<lbc_k8s_api::gateway::TLSRoute> = Api::namespaced(self.client.clone(), route_namespace);
                    status_write::patch_route_parent_status(
                        &api,
                        route_name,
                        &self.cluster.controller_name,
                        parent_ref,
                        accepted,
                        resolved_refs,
                    )
                    .await
                }
            };
            if let Err(err) = result {
                tracing::warn!(%route_namespace, %route_name, %err, "failed to patch route status");
            }
        }
    }

    async fn apply_target_group_bindings(
        &self,
        input: &GroupInput,
        writes: &[lbc_aws::TargetGroupBindingWrite],
    ) {
        let Some((namespace, _)) = input.members.first() else {
            return;
        };
        let api: Api<lbc_k8s_api::crds::TargetGroupBinding> = Api::namespaced(self.client.clone(), namespace);
        for write in writes {
            let name = write.resource_id.id.clone();
            let spec = target_group_binding::spec(write);
            let patch = serde_json::json!({
                "apiVersion": "elbv2.k8s.aws/v1beta1",
                "kind": "TargetGroupBinding",
                "metadata": { "name": name },
                "spec": spec,
            });
            let params = lbc_k8s_api::PatchParams::apply("elbv2.k8s.aws/target-group-binding").force();
            if let Err(err) = api
                .patch(&name, &params, &lbc_k8s_api::Patch::Apply(patch))
                .await
            {
                tracing::warn!(%namespace, %name, %err, "failed to apply target group binding");
            }
        }
    }

    async fn generation_of<K>(&self, api: &Api<K>, name: &str) -> i64
    where
        K: lbc_k8s_api::Resource<DynamicType = ()> + Clone + serde::de::DeserializeOwned + serde::Serialize + std::fmt::Debug,
    {
        api.get(name).await.ok().and_then(|o| o.meta().generation).unwrap_or(0)
    }

    fn is_leader(&self) -> bool {
        claim_held_by(&self.claims, &self.hostname)
    }
}

/// §11: only the replica named by the current lease claim may write.
fn claim_held_by(claims: &watch::Receiver<Arc<kubert::lease::Claim>>, hostname: &str) -> bool {
    claims.borrow().holder == hostname
}

fn is_gateway_mode(input: &GroupInput) -> bool {
    !input.gateway_uid.is_empty()
}

/// Counts the distinct route identities bound to a listener's port, either
/// through an L7 rule or an L4 default action (§4.9 step 6).
fn attached_route_count(input: &GroupInput, port: u16) -> i32 {
    let mut identities = BTreeSet::new();
    for rule in input.rules.iter().filter(|r| r.port == port) {
        for backend in &rule.backends {
            identities.insert(backend.route_identity.clone());
        }
    }
    if let Some(backends) = input.default_backends.get(&port) {
        for backend in backends {
            identities.insert(backend.route_identity.clone());
        }
    }
    identities.len() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbc_k8s_index::builder::{BackendRequest, RuleRequest};
    use lbc_k8s_index::config_merge::MergedLoadBalancerConfig;
    use std::collections::BTreeMap;

    fn backend(route_identity: &str) -> BackendRequest {
        BackendRequest {
            route_identity: route_identity.into(),
            route_kind: Some(RouteKind::Http),
            service_name: "svc".into(),
            service_exists: true,
            service_port: 80,
            node_port: None,
            weight: 1,
            target_type: None,
            protocol: "HTTP".into(),
            protocol_version: None,
            uses_external_traffic_policy_local: false,
            health_check_node_port: None,
            service_is_ipv6: false,
        }
    }

    fn group_input(gateway_uid: &str) -> GroupInput {
        GroupInput {
            namespace: "default".into(),
            name: "group".into(),
            schemes: Vec::new(),
            ip_address_types: Vec::new(),
            explicit_subnet_ids: None,
            explicit_security_groups: None,
            listeners: Vec::new(),
            rules: Vec::new(),
            default_backends: BTreeMap::new(),
            source_ranges: Vec::new(),
            vpc_ipv6_cidr: None,
            enable_icmp: false,
            merged_config: MergedLoadBalancerConfig::default(),
            gateway_uid: gateway_uid.into(),
            members: Vec::new(),
            being_deleted: false,
        }
    }

    #[test]
    fn gateway_uid_marks_gateway_mode() {
        assert!(is_gateway_mode(&group_input("uid-1")));
        assert!(!is_gateway_mode(&group_input("")));
    }

    #[test]
    fn attached_route_count_dedupes_route_identity_across_rules() {
        let mut input = group_input("uid-1");
        input.rules = vec![
            RuleRequest {
                port: 80,
                explicit_priority: None,
                path_specificity: lbc_k8s_index::builder::PathSpecificity::Default,
                conditions: Vec::new(),
                backends: vec![backend("default/route-a"), backend("default/route-a")],
            },
            RuleRequest {
                port: 80,
                explicit_priority: None,
                path_specificity: lbc_k8s_index::builder::PathSpecificity::Default,
                conditions: Vec::new(),
                backends: vec![backend("default/route-b")],
            },
            RuleRequest {
                port: 443,
                explicit_priority: None,
                path_specificity: lbc_k8s_index::builder::PathSpecificity::Default,
                conditions: Vec::new(),
                backends: vec![backend("default/route-c")],
            },
        ];

        assert_eq!(attached_route_count(&input, 80), 2);
        assert_eq!(attached_route_count(&input, 443), 1);
        assert_eq!(attached_route_count(&input, 8080), 0);
    }

    #[test]
    fn attached_route_count_includes_default_backends() {
        let mut input = group_input("uid-1");
        input
            .default_backends
            .insert(80, vec![backend("default/tcp-route")]);
        assert_eq!(attached_route_count(&input, 80), 1);
    }

    #[test]
    fn claim_held_by_compares_holder_to_hostname() {
        let claim = Arc::new(kubert::lease::Claim {
            holder: "pod-a".into(),
            expiry: chrono::Utc::now(),
        });
        let (_tx, rx) = watch::channel(claim);
        assert!(claim_held_by(&rx, "pod-a"));
        assert!(!claim_held_by(&rx, "pod-b"));
    }
}
