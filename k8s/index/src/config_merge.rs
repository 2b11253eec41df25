//! Config Merger (§4.3, §9): combines a Gateway's and its GatewayClass's
//! `LoadBalancerConfiguration` with a declared precedence.
//!
//! Per §9's Open Question note, the richer "loadBalancerConfigMergerImpl"
//! variant — the one that also merges WAFv2/ShieldAdvanced/DisableSecurityGroup
//! — is treated as authoritative; there is a single [`ConfigMerger`], not two.

use lbc_k8s_api::crds::{LoadBalancerConfigurationSpec, Scheme};
use std::collections::BTreeMap;

/// Which input wins when both set a take-one field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Precedence {
    PreferGateway,
    PreferGatewayClass,
}

/// A merged, fully-resolved set of AWS settings for one reconciliation
/// unit, ready for the Model Builder to consume.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedLoadBalancerConfig {
    pub scheme: Option<Scheme>,
    pub ip_address_type: Option<lbc_k8s_api::crds::IpAddressType>,
    pub subnets: Option<lbc_k8s_api::crds::SubnetSelection>,
    pub security_groups: Option<Vec<String>>,
    pub manage_backend_security_group_rules: Option<bool>,
    pub enable_icmp: Option<bool>,
    pub source_ranges: Option<Vec<String>>,
    pub customer_owned_ipv4_pool: Option<String>,
    pub load_balancer_attributes: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub listeners: BTreeMap<(String, u16), lbc_k8s_api::crds::ListenerConfiguration>,
    pub waf_web_acl_id: Option<String>,
    pub waf_classic_web_acl_id: Option<String>,
    pub shield_advanced_protection: Option<bool>,
    pub deletion_protection: Option<bool>,
}

pub struct ConfigMerger {
    pub precedence: Precedence,
}

impl ConfigMerger {
    pub fn new(precedence: Precedence) -> Self {
        Self { precedence }
    }

    /// Merges a Gateway-level and GatewayClass-level config. Either may be
    /// absent (neither input referenced a `LoadBalancerConfiguration`).
    pub fn merge(
        &self,
        gateway: Option<&LoadBalancerConfigurationSpec>,
        gateway_class: Option<&LoadBalancerConfigurationSpec>,
    ) -> MergedLoadBalancerConfig {
        let (high, low) = match self.precedence {
            Precedence::PreferGateway => (gateway, gateway_class),
            Precedence::PreferGatewayClass => (gateway_class, gateway),
        };

        let mut merged = MergedLoadBalancerConfig::default();

        // Take-one fields: higher-priority value wins outright; the lower
        // priority only supplies a value when the higher one omits it.
        merged.scheme = take_one(high.and_then(|c| c.scheme), low.and_then(|c| c.scheme));
        merged.ip_address_type = take_one(
            high.and_then(|c| c.ip_address_type),
            low.and_then(|c| c.ip_address_type),
        );
        merged.subnets = take_one(
            high.and_then(|c| c.subnets.clone()),
            low.and_then(|c| c.subnets.clone()),
        );
        merged.security_groups = take_one(
            high.and_then(|c| c.security_groups.clone()),
            low.and_then(|c| c.security_groups.clone()),
        );
        merged.manage_backend_security_group_rules = take_one(
            high.and_then(|c| c.manage_backend_security_group_rules),
            low.and_then(|c| c.manage_backend_security_group_rules),
        );
        merged.enable_icmp = take_one(
            high.and_then(|c| c.enable_icmp),
            low.and_then(|c| c.enable_icmp),
        );
        merged.source_ranges = take_one(
            high.and_then(|c| c.source_ranges.clone()),
            low.and_then(|c| c.source_ranges.clone()),
        );
        merged.customer_owned_ipv4_pool = take_one(
            high.and_then(|c| c.customer_owned_ipv4_pool.clone()),
            low.and_then(|c| c.customer_owned_ipv4_pool.clone()),
        );
        merged.waf_web_acl_id = take_one(
            high.and_then(|c| c.waf_web_acl_id.clone()),
            low.and_then(|c| c.waf_web_acl_id.clone()),
        );
        merged.waf_classic_web_acl_id = take_one(
            high.and_then(|c| c.waf_classic_web_acl_id.clone()),
            low.and_then(|c| c.waf_classic_web_acl_id.clone()),
        );
        merged.shield_advanced_protection = take_one(
            high.and_then(|c| c.shield_advanced_protection),
            low.and_then(|c| c.shield_advanced_protection),
        );
        merged.deletion_protection = take_one(
            high.and_then(|c| c.deletion_protection),
            low.and_then(|c| c.deletion_protection),
        );

        // Key-wise-merge fields: higher-priority wins per key, lower fills
        // in keys the higher one doesn't set.
        if let Some(low) = low.and_then(|c| c.tags.clone()) {
            merged.tags.extend(low);
        }
        if let Some(high) = high.and_then(|c| c.tags.clone()) {
            merged.tags.extend(high);
        }
        if let Some(low) = low.and_then(|c| c.load_balancer_attributes.clone()) {
            merged.load_balancer_attributes.extend(low);
        }
        if let Some(high) = high.and_then(|c| c.load_balancer_attributes.clone()) {
            merged.load_balancer_attributes.extend(high);
        }

        // Listener configurations merge by (protocol, port) tuple.
        for listener in low.and_then(|c| c.listeners.clone()).into_iter().flatten() {
            merged
                .listeners
                .insert((listener.protocol.clone(), listener.port), listener);
        }
        for listener in high.and_then(|c| c.listeners.clone()).into_iter().flatten() {
            merged
                .listeners
                .insert((listener.protocol.clone(), listener.port), listener);
        }

        merged
    }
}

fn take_one<T>(high: Option<T>, low: Option<T>) -> Option<T> {
    high.or(low)
}
