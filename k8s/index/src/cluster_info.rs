//! Cluster-wide context threaded through the Model Builder (§4.4's "(group,
//! cluster context) -> Stack" signature) — the values that cannot be
//! discovered from a single Gateway or Ingress input alone.

use std::sync::Arc;

/// Metadata and feature gates that apply uniformly across every stack this
/// controller builds.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// Identifies this cluster in AWS resource tags (§6).
    pub cluster_name: Arc<String>,

    /// The controller identity namespacing tag keys (§6), e.g.
    /// `elbv2.k8s.aws`.
    pub controller_name: Arc<String>,

    pub vpc_id: Arc<String>,

    /// Tags applied to every AWS resource this controller creates, layered
    /// under the mandatory ownership tags (§6: "never overriding these
    /// keys").
    pub default_tags: std::collections::BTreeMap<String, String>,

    /// §4.4 step 3: allow a single-AZ ALB instead of failing "at least two
    /// AZs required".
    pub allow_single_az_albs: bool,

    /// §4.4 step 7: reject `targetType: ip` when set.
    pub disable_ip_target_type: bool,

    /// §4.4 step 8: degrade a missing backend Service to a fixed-503 action
    /// instead of a build error.
    pub tolerate_missing_backend_service: bool,

    /// §4.4 step 4: whether a managed "backend" security group is obtained
    /// from the pluggable provider when the LB's own managed SG is enabled.
    pub manage_backend_security_group_rules: bool,

    /// The stabilization window enforced after an LB create/modify before
    /// downstream status is read (§4.6, §4.8). Defaults to 30s.
    pub load_balancer_stabilization: std::time::Duration,
}

impl Default for ClusterInfo {
    fn default() -> Self {
        Self {
            cluster_name: Arc::new(String::new()),
            controller_name: Arc::new("elbv2.k8s.aws".to_string()),
            vpc_id: Arc::new(String::new()),
            default_tags: Default::default(),
            allow_single_az_albs: false,
            disable_ip_target_type: false,
            tolerate_missing_backend_service: false,
            manage_backend_security_group_rules: true,
            load_balancer_stabilization: std::time::Duration::from_secs(30),
        }
    }
}
