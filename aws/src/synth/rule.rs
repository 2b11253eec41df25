use lbc_core::cloud::RuleObservation;
use lbc_core::graph::ResourceId;
use lbc_core::model::{
    actions_equivalent, conditions_equivalent, resolve_actions, ListenerRuleSpec, ListenerRuleStatus, ResourceSpec,
    ResourceStatus,
};
use lbc_core::token::StatusTable;
use lbc_core::{Cloud, Result, Stack};
use std::collections::HashMap;

const KIND: &str = "AWS::ELBV2::ListenerRule";

/// Priorities used while swapping a rule to a new slot (§4.6 ListenerRule
/// diff policy) — above the valid 1-50000 range, so a temporary assignment
/// can never collide with a real desired priority.
const SWAP_PRIORITY_BASE: i32 = 100_000;

pub async fn synthesize(cloud: &dyn Cloud, stack: &mut Stack, statuses: &StatusTable) -> Result<()> {
    let desired_ids: Vec<_> = stack.list_resources(KIND).into_iter().map(|r| r.id()).collect();

    let mut live_by_listener: HashMap<String, Vec<RuleObservation>> = HashMap::new();
    let mut desired_by_listener: HashMap<String, Vec<(ResourceId, ListenerRuleSpec)>> = HashMap::new();

    for id in &desired_ids {
        let ResourceSpec::ListenerRule(spec) = stack.get(id).expect("listed by kind").spec().clone() else {
            unreachable!("list_resources(KIND) only returns ListenerRule specs")
        };
        let listener_arn = spec.listener_arn.resolve(statuses)?;
        if !live_by_listener.contains_key(&listener_arn) {
            let live = cloud.elbv2().list_rules(&listener_arn).await?;
            live_by_listener.insert(listener_arn.clone(), live);
        }
        desired_by_listener.entry(listener_arn.clone()).or_default().push((id.clone(), spec));
    }

    for (listener_arn, desired) in &desired_by_listener {
        let live = live_by_listener.get(listener_arn).cloned().unwrap_or_default();
        let mut unmatched_live: Vec<&RuleObservation> = live.iter().filter(|r| !r.is_default).collect();

        // A live rule's match criteria — never its priority, which a
        // reassignment may freely change — is the stable identity linking
        // it back to the desired rule claiming the same logical slot.
        let mut matches: Vec<(ResourceId, ListenerRuleSpec, Option<RuleObservation>)> = Vec::new();
        for (id, spec) in desired {
            let pos = unmatched_live
                .iter()
                .position(|r| conditions_equivalent(&r.conditions, &spec.conditions));
            let existing = pos.map(|p| unmatched_live.remove(p).clone());
            matches.push((id.clone(), spec.clone(), existing));
        }

        // Rules no desired rule claims are gone for good, freeing their
        // priority slot before anything else touches this listener.
        for orphan in unmatched_live {
            tracing::info!(arn = %orphan.arn, priority = orphan.priority, "deleting orphaned listener rule");
            cloud.elbv2().delete_rule(&orphan.arn).await?;
        }

        // Two-phase priority swap (§4.6 ListenerRule diff policy): every
        // matched rule whose priority must change first moves to an
        // out-of-range temporary priority, then all land on their final
        // priorities in one call — so no intermediate state can collide
        // with another rule's current or final priority.
        let mut swap_targets: Vec<(String, i32)> = Vec::new();
        for (_, spec, existing) in &matches {
            if let Some(existing) = existing {
                if existing.priority != spec.priority {
                    swap_targets.push((existing.arn.clone(), spec.priority));
                }
            }
        }
        if !swap_targets.is_empty() {
            let temp_priorities: Vec<(String, i32)> = swap_targets
                .iter()
                .enumerate()
                .map(|(i, (arn, _))| (arn.clone(), SWAP_PRIORITY_BASE + i as i32))
                .collect();
            cloud.elbv2().set_rule_priorities(&temp_priorities).await?;
            cloud.elbv2().set_rule_priorities(&swap_targets).await?;
        }

        for (id, spec, existing) in matches {
            let arn = match existing {
                Some(existing) => {
                    let resolved_actions = resolve_actions(&spec.actions, statuses)?;
                    let unchanged = conditions_equivalent(&existing.conditions, &spec.conditions)
                        && actions_equivalent(&existing.actions, &resolved_actions);
                    if !unchanged {
                        cloud.elbv2().modify_rule(&existing.arn, &spec, statuses).await?;
                    }
                    existing.arn
                }
                None => cloud.elbv2().create_rule(listener_arn, &spec, statuses).await?,
            };

            statuses.set(id.clone(), "arn", arn.clone());
            stack
                .get_mut(&id)
                .expect("id came from this stack")
                .set_status(ResourceStatus::ListenerRule(ListenerRuleStatus { arn }));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbc_core::cloud::{
        CertificateDiscovery, Ec2, ElasticLoadBalancing, ExistingLoadBalancer, ListenerObservation,
        SecurityGroupObservation, ShieldProtection, TargetGroupObservation, WebAclAssociations,
    };
    use lbc_core::model::{
        Action, ListenerRuleSpec, ListenerSpec, LoadBalancerSpec, RuleCondition, Scheme, SecurityGroupIngressRule,
        SecurityGroupSpec, TargetGroupSpec, WebAclKind,
    };
    use lbc_core::{Cloud, Resource, StackId, StringToken};
    use std::collections::BTreeMap as Map;
    use std::sync::Mutex;

    struct FakeElbv2 {
        rules: Vec<RuleObservation>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeElbv2 {
        fn new(rules: Vec<RuleObservation>) -> Self {
            Self {
                rules,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait::async_trait]
    impl ElasticLoadBalancing for FakeElbv2 {
        async fn find_tagged_load_balancers(&self, _c: &str, _s: &str) -> lbc_core::Result<Vec<ExistingLoadBalancer>> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn create_load_balancer(&self, _spec: &LoadBalancerSpec, _tags: &Map<String, String>) -> lbc_core::Result<ExistingLoadBalancer> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn modify_load_balancer(&self, _arn: &str, _spec: &LoadBalancerSpec) -> lbc_core::Result<()> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn delete_load_balancer(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn wait_for_active(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn list_listeners(&self, _lb_arn: &str) -> lbc_core::Result<Vec<ListenerObservation>> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn create_listener(&self, _lb_arn: &str, _spec: &ListenerSpec, _statuses: &StatusTable) -> lbc_core::Result<String> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn modify_listener(&self, _arn: &str, _spec: &ListenerSpec, _statuses: &StatusTable) -> lbc_core::Result<()> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn delete_listener(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn list_rules(&self, _listener_arn: &str) -> lbc_core::Result<Vec<RuleObservation>> {
            Ok(self.rules.clone())
        }
        async fn create_rule(&self, _listener_arn: &str, _spec: &ListenerRuleSpec, _statuses: &StatusTable) -> lbc_core::Result<String> {
            self.calls.lock().expect("lock").push("create_rule".into());
            Ok("arn:rule:new".into())
        }
        async fn modify_rule(&self, arn: &str, _spec: &ListenerRuleSpec, _statuses: &StatusTable) -> lbc_core::Result<()> {
            self.calls.lock().expect("lock").push(format!("modify_rule:{arn}"));
            Ok(())
        }
        async fn set_rule_priorities(&self, priorities: &[(String, i32)]) -> lbc_core::Result<()> {
            self.calls.lock().expect("lock").push(format!("set_rule_priorities:{priorities:?}"));
            Ok(())
        }
        async fn delete_rule(&self, arn: &str) -> lbc_core::Result<()> {
            self.calls.lock().expect("lock").push(format!("delete_rule:{arn}"));
            Ok(())
        }
        async fn find_tagged_target_groups(&self, _c: &str, _s: &str) -> lbc_core::Result<Vec<TargetGroupObservation>> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn create_target_group(&self, _spec: &TargetGroupSpec, _tags: &Map<String, String>) -> lbc_core::Result<String> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn modify_target_group(&self, _arn: &str, _spec: &TargetGroupSpec) -> lbc_core::Result<()> {
            unimplemented!("not exercised by rule synthesis")
        }
        async fn delete_target_group(&self, _arn: &str) -> lbc_core::Result<()> {
            unimplemented!("not exercised by rule synthesis")
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
        async fn create_security_group(&self, _spec: &SecurityGroupSpec, _tags: &Map<String, String>) -> lbc_core::Result<String> {
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
        fn new(rules: Vec<RuleObservation>) -> Self {
            Self {
                elbv2: FakeElbv2::new(rules),
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

    fn rule_resource(idx: usize, priority: i32, path: &str, actions: Vec<Action>) -> Resource {
        Resource::new(
            ResourceId::new(KIND, format!("80-{idx}")),
            ResourceSpec::ListenerRule(ListenerRuleSpec {
                listener_arn: StringToken::literal("arn:listener:1"),
                priority,
                conditions: vec![RuleCondition::PathPrefix(path.to_string())],
                actions,
            }),
        )
    }

    fn forward(tg_arn: &str) -> Vec<Action> {
        vec![Action::Forward {
            target_group_arn: StringToken::literal(tg_arn.to_string()),
            weight: 1,
        }]
    }

    fn stack_with(resources: Vec<Resource>) -> Stack {
        let mut stack = Stack::new(StackId::new("default", "gw"));
        for r in resources {
            stack.add_resource(r).unwrap();
        }
        stack
    }

    #[tokio::test]
    async fn unchanged_rule_performs_no_write_calls() {
        let live = vec![RuleObservation {
            arn: "arn:rule:1".into(),
            priority: 10,
            is_default: false,
            conditions: vec![RuleCondition::PathPrefix("/foo".into())],
            actions: forward("arn:tg:1"),
        }];
        let mut stack = stack_with(vec![rule_resource(0, 10, "/foo", forward("arn:tg:1"))]);
        let cloud = TestCloud::new(live);
        let statuses = StatusTable::new();

        synthesize(&cloud, &mut stack, &statuses).await.unwrap();

        assert!(cloud.elbv2.calls().is_empty(), "expected no writes, got {:?}", cloud.elbv2.calls());
    }

    #[tokio::test]
    async fn priority_change_uses_two_phase_swap_not_modify() {
        let live = vec![RuleObservation {
            arn: "arn:rule:1".into(),
            priority: 10,
            is_default: false,
            conditions: vec![RuleCondition::PathPrefix("/foo".into())],
            actions: forward("arn:tg:1"),
        }];
        let mut stack = stack_with(vec![rule_resource(0, 20, "/foo", forward("arn:tg:1"))]);
        let cloud = TestCloud::new(live);
        let statuses = StatusTable::new();

        synthesize(&cloud, &mut stack, &statuses).await.unwrap();

        let calls = cloud.elbv2.calls();
        assert_eq!(calls.len(), 2, "expected exactly the two swap calls, got {calls:?}");
        assert!(calls[0].starts_with("set_rule_priorities:[(\"arn:rule:1\", 100000)]"));
        assert!(calls[1].starts_with("set_rule_priorities:[(\"arn:rule:1\", 20)]"));
        assert!(!calls.iter().any(|c| c.starts_with("modify_rule")));
    }

    #[tokio::test]
    async fn content_change_calls_modify_rule() {
        let live = vec![RuleObservation {
            arn: "arn:rule:1".into(),
            priority: 10,
            is_default: false,
            conditions: vec![RuleCondition::PathPrefix("/foo".into())],
            actions: forward("arn:tg:1"),
        }];
        let mut stack = stack_with(vec![rule_resource(0, 10, "/foo", forward("arn:tg:2"))]);
        let cloud = TestCloud::new(live);
        let statuses = StatusTable::new();

        synthesize(&cloud, &mut stack, &statuses).await.unwrap();

        assert_eq!(cloud.elbv2.calls(), vec!["modify_rule:arn:rule:1".to_string()]);
    }

    #[tokio::test]
    async fn rule_with_no_desired_match_is_deleted() {
        let live = vec![RuleObservation {
            arn: "arn:rule:stale".into(),
            priority: 10,
            is_default: false,
            conditions: vec![RuleCondition::PathPrefix("/gone".into())],
            actions: forward("arn:tg:1"),
        }];
        let mut stack = stack_with(vec![]);
        let cloud = TestCloud::new(live);
        let statuses = StatusTable::new();

        synthesize(&cloud, &mut stack, &statuses).await.unwrap();

        assert_eq!(cloud.elbv2.calls(), vec!["delete_rule:arn:rule:stale".to_string()]);
    }
}
