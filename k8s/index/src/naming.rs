//! Naming hashes (§6): derived names that are a pure function of identity
//! inputs, so that changing any input forces recreation (§3 TargetGroup
//! fingerprint invariant, §8 invariant 2).

use sha2::{Digest, Sha256};

const MAX_NAME_LEN: usize = 32;
const HASH_LEN: usize = 10;

/// `k8s-<ns-prefix>-<name-prefix>-<10-hex-hash>`, total length <= 32 bytes
/// (§6 TargetGroup and ManagedSG naming).
fn k8s_prefixed_name(namespace: &str, name: &str, hash_input: &str) -> String {
    let hash = hex_hash(hash_input);
    // "k8s-" (4) + "-" + "-" + 10 hex chars = 16 fixed bytes, leaving 16 for
    // the two prefixes combined.
    let budget = MAX_NAME_LEN - 4 - 1 - 1 - HASH_LEN;
    let ns_budget = budget / 2;
    let name_budget = budget - ns_budget;
    let ns_prefix = truncate(namespace, ns_budget);
    let name_prefix = truncate(name, name_budget);
    format!("k8s-{ns_prefix}-{name_prefix}-{hash}")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn hex_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(HASH_LEN);
    for byte in digest.iter() {
        hex.push_str(&format!("{byte:02x}"));
        if hex.len() >= HASH_LEN {
            break;
        }
    }
    hex.truncate(HASH_LEN);
    hex
}

/// One TargetGroup's identity fingerprint (§3 invariant 2, §8 invariant 2):
/// equal inputs must yield an equal name; differing in any one input must
/// yield a different name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetGroupFingerprint<'a> {
    pub cluster_name: &'a str,
    pub route_identity: &'a str,
    pub service_name: &'a str,
    pub port: u16,
    pub protocol: &'a str,
    pub protocol_version: Option<&'a str>,
    pub target_type: &'a str,
}

impl<'a> TargetGroupFingerprint<'a> {
    fn hash_input(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}/{}",
            self.cluster_name,
            self.route_identity,
            self.service_name,
            self.port,
            self.protocol,
            self.protocol_version.unwrap_or(""),
            self.target_type,
        )
    }

    pub fn target_group_name(&self, namespace: &str) -> String {
        k8s_prefixed_name(namespace, self.service_name, &self.hash_input())
    }
}

/// A managed SecurityGroup's name, hashed over `(cluster, gw.namespace,
/// gw.name, gw.uid)` (§6).
pub fn managed_security_group_name(
    cluster_name: &str,
    gateway_namespace: &str,
    gateway_name: &str,
    gateway_uid: &str,
) -> String {
    let hash_input = format!("{cluster_name}/{gateway_namespace}/{gateway_name}/{gateway_uid}");
    k8s_prefixed_name(gateway_namespace, gateway_name, &hash_input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(port: u16, protocol: &'static str, target_type: &'static str) -> TargetGroupFingerprint<'static> {
        TargetGroupFingerprint {
            cluster_name: "my-cluster",
            route_identity: "default/svc-route",
            service_name: "svc",
            port,
            protocol,
            protocol_version: None,
            target_type,
        }
    }

    #[test]
    fn name_is_at_most_32_bytes() {
        let name = fp(80, "HTTP", "ip").target_group_name("a-very-long-namespace-name-here");
        assert!(name.len() <= MAX_NAME_LEN, "{name} is {} bytes", name.len());
    }

    #[test]
    fn equal_fingerprints_yield_equal_names() {
        let a = fp(80, "HTTP", "ip").target_group_name("default");
        let b = fp(80, "HTTP", "ip").target_group_name("default");
        assert_eq!(a, b);
    }

    #[test]
    fn differing_port_yields_different_name() {
        let a = fp(80, "HTTP", "ip").target_group_name("default");
        let b = fp(8080, "HTTP", "ip").target_group_name("default");
        assert_ne!(a, b);
    }

    #[test]
    fn differing_target_type_yields_different_name() {
        let a = fp(80, "HTTP", "ip").target_group_name("default");
        let b = fp(80, "HTTP", "instance").target_group_name("default");
        assert_ne!(a, b);
    }

    #[test]
    fn managed_sg_name_changes_with_gateway_uid() {
        let a = managed_security_group_name("c", "default", "gw", "uid-1");
        let b = managed_security_group_name("c", "default", "gw", "uid-2");
        assert_ne!(a, b);
    }
}
