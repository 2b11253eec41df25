use lbc_core::cloud::ExistingLoadBalancer;
use lbc_core::model::{LoadBalancerSpec, LoadBalancerStatus, ResourceSpec, ResourceStatus};
use lbc_core::token::StatusTable;
use lbc_core::{Cloud, Result, Stack};
use std::collections::BTreeMap;
use std::time::Duration;

const KIND: &str = "AWS::ELBV2::LoadBalancer";

/// Type, scheme and IP address type can't be changed on a live load
/// balancer — a mismatch here means delete-and-recreate, never
/// modify-in-place (§4.6 diff policy, spec §3).
fn immutable_fields_match(existing: &ExistingLoadBalancer, spec: &LoadBalancerSpec) -> bool {
    existing.lb_type == spec.lb_type && existing.scheme == spec.scheme && existing.ip_address_type == spec.ip_address_type
}

fn attributes_match(existing: &ExistingLoadBalancer, spec: &LoadBalancerSpec) -> bool {
    spec.attributes.is_empty() || existing.attributes == spec.attributes
}

pub async fn synthesize(
    cloud: &dyn Cloud,
    stack: &mut Stack,
    cluster_name: &str,
    stack_id: &str,
    tags: &BTreeMap<String, String>,
    statuses: &StatusTable,
    stabilization_window: Duration,
) -> Result<()> {
    let desired_ids: Vec<_> = stack.list_resources(KIND).into_iter().map(|r| r.id()).collect();

    for id in desired_ids {
        let resource = stack.get(&id).expect("listed by kind");
        let ResourceSpec::LoadBalancer(spec) = resource.spec().clone() else {
            unreachable!("list_resources(KIND) only returns LoadBalancer specs")
        };

        // A load balancer already carrying a status was adopted from a
        // pre-existing AWS resource during the build phase (§4.5) — its ARN
        // anchors the match below instead of falling back to the first
        // tagged load balancer found.
        let adopted_arn = match resource.status() {
            Some(ResourceStatus::LoadBalancer(existing)) => Some(existing.arn.clone()),
            _ => None,
        };

        let live = cloud.elbv2().find_tagged_load_balancers(cluster_name, stack_id).await?;
        let matched = match &adopted_arn {
            Some(arn) => live.into_iter().find(|l| &l.arn == arn),
            None => live.into_iter().next(),
        };

        let lb = match matched {
            Some(existing) if immutable_fields_match(&existing, &spec) => {
                if !attributes_match(&existing, &spec) {
                    tracing::debug!(arn = %existing.arn, "applying load balancer attribute changes");
                    cloud.elbv2().modify_load_balancer(&existing.arn, &spec).await?;
                }
                existing
            }
            Some(existing) => {
                tracing::info!(
                    arn = %existing.arn,
                    "load balancer type/scheme/IP address type changed, recreating"
                );
                cloud.elbv2().delete_load_balancer(&existing.arn).await?;
                let created = cloud.elbv2().create_load_balancer(&spec, tags).await?;
                cloud.elbv2().wait_for_active(&created.arn).await?;
                crate::waiters::stabilize(stabilization_window).await;
                created
            }
            None => {
                let created = cloud.elbv2().create_load_balancer(&spec, tags).await?;
                tracing::info!(name = %spec.name, arn = %created.arn, "created load balancer, waiting for active");
                cloud.elbv2().wait_for_active(&created.arn).await?;
                crate::waiters::stabilize(stabilization_window).await;
                created
            }
        };

        statuses.set(id.clone(), "arn", lb.arn.clone());
        statuses.set(id.clone(), "dnsName", lb.dns_name.clone());
        statuses.set(id.clone(), "canonicalHostedZoneId", lb.canonical_hosted_zone_id.clone());
        stack
            .get_mut(&id)
            .expect("id came from this stack")
            .set_status(ResourceStatus::LoadBalancer(LoadBalancerStatus {
                arn: lb.arn,
                dns_name: lb.dns_name,
                canonical_hosted_zone_id: lb.canonical_hosted_zone_id,
            }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbc_core::cloud::{
        CertificateDiscovery, Ec2, ListenerObservation, RuleObservation, SecurityGroupObservation, ShieldProtection,
        TargetGroupObservation, WebAclAssociations,
    };
    use lbc_core::model::{
        IpAddressType, ListenerRuleSpec, ListenerSpec, LoadBalancerType, Scheme, SecurityGroupIngressRule,
        SecurityGroupSpec, TargetGroupSpec, WebAclKind,
    };
    use lbc_core::token::StringToken;
    use lbc_core::{Cloud, Resource, ResourceId, StackId};
    use std::sync::Mutex;

    struct FakeElbv2 {
        live: Vec<ExistingLoadBalancer>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeElbv2 {
        fn new(live: Vec<ExistingLoadBalancer>) -> Self {
            Self {
                live,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait::async_trait]
    impl lbc_core::cloud::ElasticLoadBalancing for FakeElbv2 {
        async fn find_tagged_load_balancers(&self, _c: &str, _s: &str) -> lbc_core::Result<Vec<ExistingLoadBalancer>> {
            Ok(self.live.clone())
        }
        async fn create_load_balancer(&self, spec: &LoadBalancerSpec, _tags: &BTreeMap<String, String>) -> lbc_core::Result<ExistingLoadBalancer> {
            self.calls.lock().expect("lock").push("create_load_balancer".into());
            Ok(ExistingLoadBalancer {
                arn: "arn:lb:new".into(),
                dns_name: "new.elb.amazonaws.com".into(),
                canonical_hosted_zone_id: "Z1NEW".into(),
                lb_type: spec.lb_type,
                scheme: spec.scheme,
                ip_address_type: spec.ip_address_type,
                attributes: spec.attributes.clone(),
            })
        }
        async fn modify_load_balancer(&self, arn: &str, _spec: &LoadBalancerSpec) -> lbc_core::Result<()> {
            self.calls.lock().expect("lock").push(format!("modify_load_balancer:{arn}"));
            Ok(())
        }
        async fn delete_load_balancer(&self, arn: &str) -> lbc_core::Result<()> {
            self.calls.lock().expect("lock").push(format!("delete_load_balancer:{arn}"));
            Ok(())
        }
        async fn wait_for_active(&self, _arn: &str) -> lbc_core::Result<()> {
            Ok(())
        }
        async fn list_listeners(&self, _lb_arn: &str) -> lbc_core::Result<Vec<ListenerObservation>> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn create_listener(&self, _lb_arn: &str, _spec: &ListenerSpec, _statuses: &StatusTable) -> lbc_core::Result<String> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn modify_listener(&self, _arn: &str, _spec: &ListenerSpec, _statuses: &StatusTable) -> lbc_core::Result<()> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn delete_listener(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn list_rules(&self, _listener_arn: &str) -> lbc_core::Result<Vec<RuleObservation>> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn create_rule(&self, _listener_arn: &str, _spec: &ListenerRuleSpec, _statuses: &StatusTable) -> lbc_core::Result<String> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn modify_rule(&self, _arn: &str, _spec: &ListenerRuleSpec, _statuses: &StatusTable) -> lbc_core::Result<()> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn set_rule_priorities(&self, _priorities: &[(String, i32)]) -> lbc_core::Result<()> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn delete_rule(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn find_tagged_target_groups(&self, _c: &str, _s: &str) -> lbc_core::Result<Vec<TargetGroupObservation>> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn create_target_group(&self, _spec: &TargetGroupSpec, _tags: &BTreeMap<String, String>) -> lbc_core::Result<String> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn modify_target_group(&self, _arn: &str, _spec: &TargetGroupSpec) -> lbc_core::Result<()> {
            unimplemented!("not exercised by load balancer synthesis")
        }
        async fn delete_target_group(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!("not exercised by load balancer synthesis")
        }
    }

    struct UnimplementedEc2;
    #[async_trait::async_trait]
    impl Ec2 for UnimplementedEc2 {
        async fn describe_subnets_by_ids(&self, _ids: &[String]) -> lbc_core::Result<Vec<lbc_core::cloud::SubnetInfo>> {
            unimplemented!()
        }
        async fn discover_subnets(&self, _scheme: Scheme, _cluster: &str) -> lbc_core::Result<Vec<lbc_core::cloud::SubnetInfo>> {
            unimplemented!()
        }
        async fn resolve_security_groups(&self, _ids: &[String]) -> lbc_core::Result<Vec<String>> {
            unimplemented!()
        }
        async fn find_tagged_security_groups(&self, _c: &str, _s: &str) -> lbc_core::Result<Vec<SecurityGroupObservation>> {
            unimplemented!()
        }
        async fn create_security_group(&self, _spec: &SecurityGroupSpec, _tags: &BTreeMap<String, String>) -> lbc_core::Result<String> {
            unimplemented!()
        }
        async fn update_security_group_ingress(&self, _group_id: &str, _rules: &[SecurityGroupIngressRule]) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn delete_security_group(&self, _group_id: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
    }

    struct UnimplementedCerts;
    #[async_trait::async_trait]
    impl CertificateDiscovery for UnimplementedCerts {
        async fn discover_certificates(&self, _hosts: &[String]) -> lbc_core::Result<Vec<String>> {
            unimplemented!()
        }
    }

    struct UnimplementedWaf;
    #[async_trait::async_trait]
    impl WebAclAssociations for UnimplementedWaf {
        async fn get_associated_web_acl(&self, _arn: &str) -> lbc_core::Result<Option<String>> {
            unimplemented!()
        }
        async fn associate_web_acl(&self, _arn: &str, _id: &str, _kind: WebAclKind) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn disassociate_web_acl(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
    }

    struct UnimplementedShield;
    #[async_trait::async_trait]
    impl ShieldProtection for UnimplementedShield {
        async fn is_protected(&self, _arn: &str) -> lbc_core::Result<bool> {
            unimplemented!()
        }
        async fn enable_protection(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn disable_protection(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
    }

    struct TestCloud {
        elbv2: FakeElbv2,
        ec2: UnimplementedEc2,
        certs: UnimplementedCerts,
        waf: UnimplementedWaf,
        shield: UnimplementedShield,
    }

    impl TestCloud {
        fn new(live: Vec<ExistingLoadBalancer>) -> Self {
            Self {
                elbv2: FakeElbv2::new(live),
                ec2: UnimplementedEc2,
                certs: UnimplementedCerts,
                waf: UnimplementedWaf,
                shield: UnimplementedShield,
            }
        }
    }

    impl Cloud for TestCloud {
        fn ec2(&self) -> &dyn Ec2 {
            &self.ec2
        }
        fn elbv2(&self) -> &dyn lbc_core::cloud::ElasticLoadBalancing {
            &self.elbv2
        }
        fn certificates(&self) -> &dyn CertificateDiscovery {
            &self.certs
        }
        fn web_acl_associations(&self) -> &dyn WebAclAssociations {
            &self.waf
        }
        fn shield(&self) -> &dyn ShieldProtection {
            &self.shield
        }
    }

    fn lb_spec() -> LoadBalancerSpec {
        LoadBalancerSpec {
            name: "my-lb".into(),
            lb_type: LoadBalancerType::Application,
            scheme: Scheme::InternetFacing,
            ip_address_type: IpAddressType::Ipv4,
            subnet_ids: vec!["subnet-1".into()],
            security_groups: vec![StringToken::literal("sg-1")],
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    fn existing(spec: &LoadBalancerSpec) -> ExistingLoadBalancer {
        ExistingLoadBalancer {
            arn: "arn:lb:1".into(),
            dns_name: "my-lb.elb.amazonaws.com".into(),
            canonical_hosted_zone_id: "Z1ABC".into(),
            lb_type: spec.lb_type,
            scheme: spec.scheme,
            ip_address_type: spec.ip_address_type,
            attributes: spec.attributes.clone(),
        }
    }

    fn stack_with(spec: LoadBalancerSpec) -> Stack {
        let mut stack = Stack::new(StackId::new("default", "gw"));
        stack
            .add_resource(Resource::new(ResourceId::new(KIND, "main"), ResourceSpec::LoadBalancer(spec)))
            .unwrap();
        stack
    }

    #[tokio::test]
    async fn unchanged_load_balancer_performs_no_write_calls() {
        let spec = lb_spec();
        let live = vec![existing(&spec)];
        let mut stack = stack_with(spec);
        let cloud = TestCloud::new(live);
        let statuses = StatusTable::new();

        synthesize(&cloud, &mut stack, "cluster", "stack-1", &BTreeMap::new(), &statuses, Duration::from_millis(0))
            .await
            .unwrap();

        assert!(cloud.elbv2.calls().is_empty(), "expected no writes, got {:?}", cloud.elbv2.calls());
    }

    #[tokio::test]
    async fn attribute_change_calls_modify_not_recreate() {
        let mut spec = lb_spec();
        spec.attributes.insert("deletion_protection.enabled".into(), "true".into());
        let existing_lb = existing(&lb_spec());
        let mut stack = stack_with(spec);
        let cloud = TestCloud::new(vec![existing_lb]);
        let statuses = StatusTable::new();

        synthesize(&cloud, &mut stack, "cluster", "stack-1", &BTreeMap::new(), &statuses, Duration::from_millis(0))
            .await
            .unwrap();

        assert_eq!(cloud.elbv2.calls(), vec!["modify_load_balancer:arn:lb:1".to_string()]);
    }

    #[tokio::test]
    async fn scheme_change_deletes_and_recreates() {
        let mut spec = lb_spec();
        spec.scheme = Scheme::Internal;
        let existing_lb = existing(&lb_spec());
        let mut stack = stack_with(spec);
        let cloud = TestCloud::new(vec![existing_lb]);
        let statuses = StatusTable::new();

        synthesize(&cloud, &mut stack, "cluster", "stack-1", &BTreeMap::new(), &statuses, Duration::from_millis(0))
            .await
            .unwrap();

        let calls = cloud.elbv2.calls();
        assert_eq!(calls, vec!["delete_load_balancer:arn:lb:1".to_string(), "create_load_balancer".to_string()]);
    }
}
