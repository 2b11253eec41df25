use lbc_core::model::{ResourceSpec, ResourceStatus, SecurityGroupIngressRule, SecurityGroupStatus};
use lbc_core::token::StatusTable;
use lbc_core::{Cloud, Result, Stack};
use std::collections::BTreeMap;

const KIND: &str = "AWS::EC2::SecurityGroup";

fn ingress_sort_key(rule: &SecurityGroupIngressRule) -> (String, u16, u16, String) {
    (rule.protocol.clone(), rule.from_port, rule.to_port, rule.cidr.clone())
}

pub async fn synthesize(
    cloud: &dyn Cloud,
    stack: &mut Stack,
    cluster_name: &str,
    stack_id: &str,
    tags: &BTreeMap<String, String>,
    statuses: &StatusTable,
) -> Result<()> {
    let live = cloud.ec2().find_tagged_security_groups(cluster_name, stack_id).await?;
    let desired_ids: Vec<_> = stack.list_resources(KIND).into_iter().map(|r| r.id()).collect();

    for id in desired_ids {
        let ResourceSpec::SecurityGroup(spec) = stack.get(&id).expect("listed by kind").spec().clone() else {
            unreachable!("list_resources(KIND) only returns SecurityGroup specs")
        };

        let matched = live.iter().find(|l| l.name == spec.name);
        let group_id = match matched {
            Some(existing) => {
                let mut desired_ingress = spec.ingress.clone();
                let mut existing_ingress = existing.ingress.clone();
                desired_ingress.sort_by_key(ingress_sort_key);
                existing_ingress.sort_by_key(ingress_sort_key);
                if desired_ingress != existing_ingress {
                    cloud.ec2().update_security_group_ingress(&existing.group_id, &spec.ingress).await?;
                }
                existing.group_id.clone()
            }
            None => {
                let group_id = cloud.ec2().create_security_group(&spec, tags).await?;
                tracing::info!(name = %spec.name, group_id, "created managed security group");
                group_id
            }
        };

        statuses.set(id.clone(), "groupId", group_id.clone());
        stack
            .get_mut(&id)
            .expect("id came from this stack")
            .set_status(ResourceStatus::SecurityGroup(SecurityGroupStatus { group_id }));
    }

    let desired_names: Vec<String> = stack
        .list_resources(KIND)
        .into_iter()
        .filter_map(|r| match r.spec() {
            ResourceSpec::SecurityGroup(spec) => Some(spec.name.clone()),
            _ => None,
        })
        .collect();
    for orphan in live.iter().filter(|l| !desired_names.contains(&l.name)) {
        tracing::info!(group_id = %orphan.group_id, name = %orphan.name, "deleting orphaned security group");
        cloud.ec2().delete_security_group(&orphan.group_id).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbc_core::cloud::{
        CertificateDiscovery, ElasticLoadBalancing, ExistingLoadBalancer, ListenerObservation, RuleObservation,
        ShieldProtection, SubnetInfo, TargetGroupObservation, WebAclAssociations,
    };
    use lbc_core::model::{ListenerRuleSpec, ListenerSpec, LoadBalancerSpec, Scheme, TargetGroupSpec, WebAclKind};
    use lbc_core::{Cloud, Resource, ResourceId, StackId};
    use std::sync::Mutex;

    struct FakeEc2 {
        groups: Vec<SecurityGroupObservation>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeEc2 {
        fn new(groups: Vec<SecurityGroupObservation>) -> Self {
            Self {
                groups,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait::async_trait]
    impl lbc_core::cloud::Ec2 for FakeEc2 {
        async fn describe_subnets_by_ids(&self, _ids: &[String]) -> lbc_core::Result<Vec<SubnetInfo>> {
            unimplemented!("not exercised by security group synthesis")
        }
        async fn discover_subnets(&self, _scheme: Scheme, _cluster: &str) -> lbc_core::Result<Vec<SubnetInfo>> {
            unimplemented!("not exercised by security group synthesis")
        }
        async fn resolve_security_groups(&self, _ids: &[String]) -> lbc_core::Result<Vec<String>> {
            unimplemented!("not exercised by security group synthesis")
        }
        async fn find_tagged_security_groups(&self, _c: &str, _s: &str) -> lbc_core::Result<Vec<SecurityGroupObservation>> {
            Ok(self.groups.clone())
        }
        async fn create_security_group(&self, spec: &SecurityGroupSpec, _tags: &BTreeMap<String, String>) -> lbc_core::Result<String> {
            self.calls.lock().expect("lock").push(format!("create_security_group:{}", spec.name));
            Ok("sg-new".into())
        }
        async fn update_security_group_ingress(&self, group_id: &str, _rules: &[SecurityGroupIngressRule]) -> lbc_core::Result<()> {
            self.calls.lock().expect("lock").push(format!("update_security_group_ingress:{group_id}"));
            Ok(())
        }
        async fn delete_security_group(&self, group_id: &str) -> lbc_core::Result<()> {
            self.calls.lock().expect("lock").push(format!("delete_security_group:{group_id}"));
            Ok(())
        }
    }

    struct UnimplementedElbv2;
    #[async_trait::async_trait]
    impl ElasticLoadBalancing for UnimplementedElbv2 {
        async fn find_tagged_load_balancers(&self, _c: &str, _s: &str) -> lbc_core::Result<Vec<ExistingLoadBalancer>> {
            unimplemented!()
        }
        async fn create_load_balancer(&self, _spec: &LoadBalancerSpec, _tags: &BTreeMap<String, String>) -> lbc_core::Result<ExistingLoadBalancer> {
            unimplemented!()
        }
        async fn modify_load_balancer(&self, _arn: &str, _spec: &LoadBalancerSpec) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn delete_load_balancer(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn wait_for_active(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn list_listeners(&self, _lb_arn: &str) -> lbc_core::Result<Vec<ListenerObservation>> {
            unimplemented!()
        }
        async fn create_listener(&self, _lb_arn: &str, _spec: &ListenerSpec, _statuses: &StatusTable) -> lbc_core::Result<String> {
            unimplemented!()
        }
        async fn modify_listener(&self, _arn: &str, _spec: &ListenerSpec, _statuses: &StatusTable) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn delete_listener(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn list_rules(&self, _listener_arn: &str) -> lbc_core::Result<Vec<RuleObservation>> {
            unimplemented!()
        }
        async fn create_rule(&self, _listener_arn: &str, _spec: &ListenerRuleSpec, _statuses: &StatusTable) -> lbc_core::Result<String> {
            unimplemented!()
        }
        async fn modify_rule(&self, _arn: &str, _spec: &ListenerRuleSpec, _statuses: &StatusTable) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn set_rule_priorities(&self, _priorities: &[(String, i32)]) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn delete_rule(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn find_tagged_target_groups(&self, _c: &str, _s: &str) -> lbc_core::Result<Vec<TargetGroupObservation>> {
            unimplemented!()
        }
        async fn create_target_group(&self, _spec: &TargetGroupSpec, _tags: &BTreeMap<String, String>) -> lbc_core::Result<String> {
            unimplemented!()
        }
        async fn modify_target_group(&self, _arn: &str, _spec: &TargetGroupSpec) -> lbc_core::Result<()> {
            unimplemented!()
        }
        async fn delete_target_group(&self, _arn: &str) -> lbc_core::Result<()> {
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
        ec2: FakeEc2,
        elbv2: UnimplementedElbv2,
        certs: UnimplementedCerts,
        waf: UnimplementedWaf,
        shield: UnimplementedShield,
    }

    impl TestCloud {
        fn new(groups: Vec<SecurityGroupObservation>) -> Self {
            Self {
                ec2: FakeEc2::new(groups),
                elbv2: UnimplementedElbv2,
                certs: UnimplementedCerts,
                waf: UnimplementedWaf,
                shield: UnimplementedShield,
            }
        }
    }

    impl Cloud for TestCloud {
        fn ec2(&self) -> &dyn lbc_core::cloud::Ec2 {
            &self.ec2
        }
        fn elbv2(&self) -> &dyn ElasticLoadBalancing {
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

    fn rule(protocol: &str, from: u16, to: u16, cidr: &str) -> SecurityGroupIngressRule {
        SecurityGroupIngressRule {
            protocol: protocol.to_string(),
            from_port: from,
            to_port: to,
            cidr: cidr.to_string(),
        }
    }

    fn sg_spec(ingress: Vec<SecurityGroupIngressRule>) -> SecurityGroupSpec {
        SecurityGroupSpec {
            name: "k8s-traffic-abcd1234".into(),
            description: "managed ingress for gw".into(),
            ingress,
        }
    }

    fn stack_with(spec: SecurityGroupSpec) -> Stack {
        let mut stack = Stack::new(StackId::new("default", "gw"));
        stack
            .add_resource(Resource::new(ResourceId::new(KIND, spec.name.clone()), ResourceSpec::SecurityGroup(spec)))
            .unwrap();
        stack
    }

    #[tokio::test]
    async fn matching_ingress_in_different_order_performs_no_write_calls() {
        let spec = sg_spec(vec![rule("tcp", 80, 80, "0.0.0.0/0"), rule("tcp", 443, 443, "0.0.0.0/0")]);
        let live = vec![SecurityGroupObservation {
            group_id: "sg-1".into(),
            name: spec.name.clone(),
            ingress: vec![rule("tcp", 443, 443, "0.0.0.0/0"), rule("tcp", 80, 80, "0.0.0.0/0")],
        }];
        let mut stack = stack_with(spec);
        let cloud = TestCloud::new(live);
        let statuses = StatusTable::new();

        synthesize(&cloud, &mut stack, "cluster", "stack-1", &BTreeMap::new(), &statuses).await.unwrap();

        assert!(cloud.ec2.calls().is_empty(), "expected no writes, got {:?}", cloud.ec2.calls());
    }

    #[tokio::test]
    async fn ingress_rule_added_calls_update() {
        let spec = sg_spec(vec![rule("tcp", 80, 80, "0.0.0.0/0"), rule("tcp", 443, 443, "0.0.0.0/0")]);
        let live = vec![SecurityGroupObservation {
            group_id: "sg-1".into(),
            name: spec.name.clone(),
            ingress: vec![rule("tcp", 80, 80, "0.0.0.0/0")],
        }];
        let mut stack = stack_with(spec);
        let cloud = TestCloud::new(live);
        let statuses = StatusTable::new();

        synthesize(&cloud, &mut stack, "cluster", "stack-1", &BTreeMap::new(), &statuses).await.unwrap();

        assert_eq!(cloud.ec2.calls(), vec!["update_security_group_ingress:sg-1".to_string()]);
    }
}
