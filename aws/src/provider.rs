//! Per-region client multiplexing (§9): a reconcile names a region and VPC;
//! the provider hands back a cached [`RegionCloud`] bundle or builds one.

use crate::acm::AcmClient;
use crate::ec2::Ec2Client;
use crate::elbv2::Elbv2Client;
use crate::shield::ShieldClient;
use crate::waf::WafClient;
use aws_config::{BehaviorVersion, Region};
use lbc_core::cloud::{CertificateDiscovery, Cloud, Ec2, ElasticLoadBalancing, ShieldProtection, WebAclAssociations};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Controller-wide settings that shape how AWS clients are built and how
/// synthesizers wait on AWS state (§4.8).
#[derive(Clone, Debug)]
pub struct CloudConfig {
    pub region: String,
    pub controller_name: String,
    /// Post-create stabilization window before a new load balancer's
    /// listeners are attached (§4.8).
    pub stabilization_window: Duration,
    pub assume_role_arn: Option<String>,
}

/// A region- and VPC-scoped bundle of AWS clients implementing
/// [`lbc_core::cloud::Cloud`].
pub struct RegionCloud {
    ec2: Ec2Client,
    elbv2: Elbv2Client,
    acm: AcmClient,
    waf: WafClient,
    shield: ShieldClient,
}

impl Cloud for RegionCloud {
    fn ec2(&self) -> &dyn Ec2 {
        &self.ec2
    }

    fn elbv2(&self) -> &dyn ElasticLoadBalancing {
        &self.elbv2
    }

    fn certificates(&self) -> &dyn CertificateDiscovery {
        &self.acm
    }

    fn web_acl_associations(&self) -> &dyn WebAclAssociations {
        &self.waf
    }

    fn shield(&self) -> &dyn ShieldProtection {
        &self.shield
    }
}

/// Caches one [`RegionCloud`] per (region, VPC) pair behind a single lock, so
/// reconciles against the common case — the controller's own region and VPC
/// — never pay for client construction twice.
pub struct CloudProvider {
    config: CloudConfig,
    cache: RwLock<HashMap<(String, String), Arc<RegionCloud>>>,
}

impl CloudProvider {
    pub fn new(config: CloudConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Returns the cached client bundle for `(region, vpc_id)`, building and
    /// inserting one if this is the first reconcile to need it.
    pub async fn cloud_for(&self, region: &str, vpc_id: &str) -> Arc<RegionCloud> {
        let key = (region.to_string(), vpc_id.to_string());
        if let Some(cached) = self.cache.read().expect("cloud cache lock poisoned").get(&key) {
            return cached.clone();
        }

        let built = Arc::new(self.build_region_cloud(region, vpc_id).await);
        self.cache
            .write()
            .expect("cloud cache lock poisoned")
            .insert(key, built.clone());
        built
    }

    async fn build_region_cloud(&self, region: &str, vpc_id: &str) -> RegionCloud {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(role_arn) = &self.config.assume_role_arn {
            let assume_role = aws_config::sts::AssumeRoleProvider::builder(role_arn)
                .session_name(&self.config.controller_name)
                .region(Region::new(region.to_string()))
                .build()
                .await;
            loader = loader.credentials_provider(assume_role);
        }
        let sdk_config = loader.load().await;
        tracing::info!(region, vpc_id, "built region cloud client bundle");

        RegionCloud {
            ec2: Ec2Client::new(
                aws_sdk_ec2::Client::new(&sdk_config),
                vpc_id.to_string(),
                self.config.controller_name.clone(),
            ),
            elbv2: Elbv2Client::new(
                aws_sdk_elasticloadbalancingv2::Client::new(&sdk_config),
                vpc_id.to_string(),
                self.config.controller_name.clone(),
            ),
            acm: AcmClient::new(aws_sdk_acm::Client::new(&sdk_config)),
            waf: WafClient::new(
                aws_sdk_wafv2::Client::new(&sdk_config),
                aws_sdk_wafregional::Client::new(&sdk_config),
            ),
            shield: ShieldClient::new(aws_sdk_shield::Client::new(&sdk_config)),
        }
    }
}
