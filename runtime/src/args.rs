use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use lbc_k8s_api::crds::{IngressClassParams, LoadBalancerConfiguration, TargetGroupConfiguration};
use lbc_k8s_api::gateway::{Gateway, GatewayClass, GRPCRoute, HTTPRoute, TCPRoute, TLSRoute, UDPRoute};
use lbc_k8s_api::{Ingress, IngressClass, Namespace, Service};
use lbc_k8s_index::index::{Index, Shared};
use lbc_k8s_index::{ClusterInfo, ConfigMerger, Precedence};
use lbc_k8s_status::{Controller, ReconcileMetrics, Update};
use prometheus_client::registry::Registry;
use tokio::sync::mpsc;
use tracing::{info_span, Instrument};

use crate::lease;

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// How a Gateway's own `LoadBalancerConfiguration` and its GatewayClass's
/// combine (§4.3's config merger). Exposed as a flag rather than pinned
/// down in code since operators disagree on which should win.
#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum ConfigPrecedence {
    Gateway,
    GatewayClass,
}

impl From<ConfigPrecedence> for Precedence {
    fn from(value: ConfigPrecedence) -> Self {
        match value {
            ConfigPrecedence::Gateway => Precedence::PreferGateway,
            ConfigPrecedence::GatewayClass => Precedence::PreferGatewayClass,
        }
    }
}

fn parse_tag(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    Ok((key.to_string(), value.to_string()))
}

/// AWS Elastic Load Balancer controller for Kubernetes.
#[derive(Debug, Parser)]
#[clap(name = "lbc", about = "AWS load balancer controller")]
pub struct Args {
    #[clap(long, default_value = "lbc=info,warn", env = "LBC_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", env = "LBC_LOG_FORMAT")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Identifies this cluster in AWS resource tags (§6).
    #[clap(long, env = "CLUSTER_NAME")]
    cluster_name: String,

    /// Namespaces the tag keys and the finalizer/lease names this
    /// controller owns, e.g. `elbv2.k8s.aws`.
    #[clap(long, default_value = "elbv2.k8s.aws", env = "CONTROLLER_NAME")]
    controller_name: String,

    /// Namespace the controller's own Deployment runs in, used for the
    /// write lease and its owner reference.
    #[clap(long, env = "CONTROLLER_NAMESPACE")]
    controller_namespace: String,

    /// Name of the controller's own Deployment, set as the lease's owner
    /// reference so the lease is garbage-collected with it.
    #[clap(long, env = "CONTROLLER_DEPLOYMENT_NAME")]
    controller_deployment_name: String,

    #[clap(long, env = "AWS_REGION")]
    aws_region: String,

    #[clap(long, env = "VPC_ID")]
    vpc_id: String,

    /// IAM role to assume when building AWS clients, if any (§9).
    #[clap(long)]
    assume_role_arn: Option<String>,

    /// Tag applied to every AWS resource this controller creates, given as
    /// `key=value`; may be repeated.
    #[clap(long = "default-tag", value_parser = parse_tag)]
    default_tags: Vec<(String, String)>,

    /// §4.4 step 3: allow a single-AZ load balancer instead of requiring at
    /// least two AZs.
    #[clap(long)]
    allow_single_az: bool,

    /// §4.4 step 7: allow `targetType: ip` target groups.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    enable_ip_target_type: bool,

    /// §4.4 step 8: degrade a missing backend Service to a fixed-503 action
    /// instead of a build error.
    #[clap(long)]
    tolerate_non_existent_backend: bool,

    /// §4.4 step 4: manage ingress rules on the pluggable backend security
    /// group.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    manage_backend_sg_rules: bool,

    /// Which of a Gateway's and its GatewayClass's `LoadBalancerConfiguration`
    /// wins when both set the same field.
    #[clap(long, value_enum, default_value = "gateway")]
    config_precedence: ConfigPrecedence,

    /// §4.8 post-create/modify stabilization window, in seconds.
    #[clap(long, default_value = "30")]
    load_balancer_stabilization_secs: u64,

    /// How often the reconciliation loop rescans every group (§4.9), in
    /// seconds.
    #[clap(long, default_value = "10")]
    reconcile_period_secs: u64,
}

impl Args {
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Args {
            log_level,
            log_format,
            client,
            admin,
            cluster_name,
            controller_name,
            controller_namespace,
            controller_deployment_name,
            aws_region,
            vpc_id,
            assume_role_arn,
            default_tags,
            allow_single_az,
            enable_ip_target_type,
            tolerate_non_existent_backend,
            manage_backend_sg_rules,
            config_precedence,
            load_balancer_stabilization_secs,
            reconcile_period_secs,
        } = self;

        let cluster = ClusterInfo {
            cluster_name: Arc::new(cluster_name),
            controller_name: Arc::new(controller_name.clone()),
            vpc_id: Arc::new(vpc_id.clone()),
            default_tags: default_tags.into_iter().collect::<BTreeMap<_, _>>(),
            allow_single_az_albs: allow_single_az,
            disable_ip_target_type: !enable_ip_target_type,
            tolerate_missing_backend_service: tolerate_non_existent_backend,
            manage_backend_security_group_rules: manage_backend_sg_rules,
            load_balancer_stabilization: Duration::from_secs(load_balancer_stabilization_secs),
        };
        let merger = ConfigMerger::new(config_precedence.into());

        let mut prom = Registry::default();
        let reconcile_metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let cloud_provider = lbc_aws::CloudProvider::new(lbc_aws::CloudConfig {
            region: aws_region.clone(),
            controller_name: controller_name.clone(),
            stabilization_window: cluster.load_balancer_stabilization,
            assume_role_arn,
        });
        let cloud = cloud_provider.cloud_for(&aws_region, &vpc_id).await;

        let index = Index::shared(controller_name.clone());

        let hostname =
            std::env::var("HOSTNAME").unwrap_or_else(|_| controller_deployment_name.clone());
        let claims = lease::init(
            &runtime,
            &controller_namespace,
            &controller_deployment_name,
            &controller_name,
            &hostname,
            LEASE_DURATION,
            RENEW_GRACE_PERIOD,
        )
        .await?;

        spawn_namespaced_watches(&mut runtime, &index).await;
        spawn_cluster_scoped_watches(runtime.client(), index.clone());

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let reconcile_period = Duration::from_secs(reconcile_period_secs);
        tokio::spawn(rescan_ticker(updates_tx, reconcile_period));

        let status_controller = Controller::new(
            runtime.client(),
            cloud,
            cluster,
            merger,
            index,
            updates_rx,
            reconcile_metrics,
            claims,
            hostname,
        );
        tokio::spawn(status_controller.run().instrument(info_span!("status_controller")));

        if runtime.run().await.is_err() {
            bail!("aborted");
        }
        Ok(())
    }
}

/// Wakes the reconciliation loop on a fixed period (§4.9) — the index has
/// no per-object diffing, so every tick does a full rescan and a timer is
/// simpler than threading a notification through every watch stream.
async fn rescan_ticker(updates: mpsc::UnboundedSender<Update>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        if updates.send(Update::Rescan).is_err() {
            return;
        }
    }
}

/// Kinds with a [`kubert::index::IndexNamespacedResource`] impl: their watch
/// streams are drained by `kubert::index::namespaced`.
async fn spawn_namespaced_watches<S>(runtime: &mut kubert::Runtime<S>, index: &Shared<Index>) {
    let services = runtime.watch_all::<Service>(watcher::Config::default());
    tokio::spawn(kubert::index::namespaced(index.clone(), services).instrument(info_span!("services")));

    let ingresses = runtime.watch_all::<Ingress>(watcher::Config::default());
    tokio::spawn(kubert::index::namespaced(index.clone(), ingresses).instrument(info_span!("ingresses")));

    let gateways = runtime.watch_all::<Gateway>(watcher::Config::default());
    tokio::spawn(kubert::index::namespaced(index.clone(), gateways).instrument(info_span!("gateways")));

    let load_balancer_configs = runtime.watch_all::<LoadBalancerConfiguration>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(index.clone(), load_balancer_configs)
            .instrument(info_span!("loadbalancerconfigurations")),
    );

    let target_group_configs = runtime.watch_all::<TargetGroupConfiguration>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(index.clone(), target_group_configs)
            .instrument(info_span!("targetgroupconfigurations")),
    );

    let http_routes = runtime.watch_all::<HTTPRoute>(watcher::Config::default());
    tokio::spawn(kubert::index::namespaced(index.clone(), http_routes).instrument(info_span!("httproutes")));

    if api_resource_exists::<GRPCRoute>(&runtime.client()).await {
        let grpc_routes = runtime.watch_all::<GRPCRoute>(watcher::Config::default());
        tokio::spawn(kubert::index::namespaced(index.clone(), grpc_routes).instrument(info_span!("grpcroutes")));
    } else {
        tracing::warn!("grpcroutes.gateway.networking.k8s.io resource kind not found, skipping watch");
    }

    if api_resource_exists::<TCPRoute>(&runtime.client()).await {
        let tcp_routes = runtime.watch_all::<TCPRoute>(watcher::Config::default());
        tokio::spawn(kubert::index::namespaced(index.clone(), tcp_routes).instrument(info_span!("tcproutes")));
    } else {
        tracing::warn!("tcproutes.gateway.networking.k8s.io resource kind not found, skipping watch");
    }

    if api_resource_exists::<UDPRoute>(&runtime.client()).await {
        let udp_routes = runtime.watch_all::<UDPRoute>(watcher::Config::default());
        tokio::spawn(kubert::index::namespaced(index.clone(), udp_routes).instrument(info_span!("udproutes")));
    } else {
        tracing::warn!("udproutes.gateway.networking.k8s.io resource kind not found, skipping watch");
    }

    if api_resource_exists::<TLSRoute>(&runtime.client()).await {
        let tls_routes = runtime.watch_all::<TLSRoute>(watcher::Config::default());
        tokio::spawn(kubert::index::namespaced(index.clone(), tls_routes).instrument(info_span!("tlsroutes")));
    } else {
        tracing::warn!("tlsroutes.gateway.networking.k8s.io resource kind not found, skipping watch");
    }
}

/// Cluster-scoped kinds have no `IndexNamespacedResource` impl, so `kubert`'s
/// namespaced helper doesn't apply to them — each is drained by a
/// hand-rolled `kube::runtime::watcher` loop instead, dispatching into the
/// plain `apply_*`/`delete_*` methods `Index` exposes for them.
fn spawn_cluster_scoped_watches(client: Client, index: Shared<Index>) {
    tokio::spawn(
        watch_cluster_scoped::<Namespace, _, _>(
            client.clone(),
            index.clone(),
            |index, ns| index.apply_namespace(ns),
            |index, name| index.delete_namespace(name),
        )
        .instrument(info_span!("namespaces")),
    );

    tokio::spawn(
        watch_cluster_scoped::<GatewayClass, _, _>(
            client.clone(),
            index.clone(),
            |index, class| index.apply_gateway_class(class),
            |index, name| index.delete_gateway_class(name),
        )
        .instrument(info_span!("gatewayclasses")),
    );

    tokio::spawn(
        watch_cluster_scoped::<IngressClass, _, _>(
            client.clone(),
            index.clone(),
            |index, class| index.apply_ingress_class(class),
            |index, name| index.delete_ingress_class(name),
        )
        .instrument(info_span!("ingressclasses")),
    );

    tokio::spawn(
        watch_cluster_scoped::<IngressClassParams, _, _>(
            client,
            index,
            |index, params| index.apply_ingress_class_params(params),
            |index, name| index.delete_ingress_class_params(name),
        )
        .instrument(info_span!("ingressclassparams")),
    );
}

async fn watch_cluster_scoped<K, A, D>(client: Client, index: Shared<Index>, mut apply: A, mut delete: D)
where
    K: Resource + Clone + std::fmt::Debug + for<'de> serde::Deserialize<'de> + Send + Sync + 'static,
    K::DynamicType: Default + Send + Sync,
    A: FnMut(&mut Index, K),
    D: FnMut(&mut Index, String),
{
    let api = Api::<K>::all(client);
    let stream = watcher(api, watcher::Config::default());
    let mut stream = pin!(stream);
    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                apply(&mut index.write(), obj);
            }
            Ok(watcher::Event::Delete(obj)) => {
                delete(&mut index.write(), obj.name_unchecked());
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "watch stream error"),
        }
    }
}

/// Gates the experimental-channel Gateway API route kinds (§11) so the
/// controller doesn't crash-loop when their CRDs aren't installed.
async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = T::DynamicType::default();
    let group_version = T::api_version(&dt).to_string();
    match client.list_api_group_resources(&group_version).await {
        Ok(list) => list.resources.iter().any(|r| r.kind == T::kind(&dt)),
        Err(error) => {
            tracing::debug!(%error, group_version, "failed to list API group resources, assuming kind is absent");
            false
        }
    }
}
