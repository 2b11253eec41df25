use lbc_core::model::{actions_equivalent, resolve_actions, ListenerStatus, ResourceSpec, ResourceStatus};
use lbc_core::token::StatusTable;
use lbc_core::{Cloud, Result, Stack};
use std::collections::HashMap;

const KIND: &str = "AWS::ELBV2::Listener";

pub async fn synthesize(cloud: &dyn Cloud, stack: &mut Stack, statuses: &StatusTable) -> Result<()> {
    let desired_ids: Vec<_> = stack.list_resources(KIND).into_iter().map(|r| r.id()).collect();

    let mut live_by_lb = HashMap::new();
    let mut desired_ports_by_lb: HashMap<String, Vec<u16>> = HashMap::new();

    for id in &desired_ids {
        let ResourceSpec::Listener(spec) = stack.get(id).expect("listed by kind").spec().clone() else {
            unreachable!("list_resources(KIND) only returns Listener specs")
        };
        let lb_arn = spec.load_balancer_arn.resolve(statuses)?;

        if !live_by_lb.contains_key(&lb_arn) {
            let live = cloud.elbv2().list_listeners(&lb_arn).await?;
            live_by_lb.insert(lb_arn.clone(), live);
        }
        desired_ports_by_lb.entry(lb_arn.clone()).or_default().push(spec.port);

        let live = &live_by_lb[&lb_arn];
        let matched = live.iter().find(|l| l.port == spec.port);
        let arn = match matched {
            Some(existing) => {
                let resolved_actions = resolve_actions(&spec.default_actions, statuses)?;
                let mut desired_certs = spec.certificates.clone();
                let mut existing_certs = existing.certificates.clone();
                desired_certs.sort();
                existing_certs.sort();

                let unchanged = existing.protocol.eq_ignore_ascii_case(&spec.protocol)
                    && existing.ssl_policy == spec.ssl_policy
                    && desired_certs == existing_certs
                    && existing.alpn_policy == spec.alpn_policy
                    && actions_equivalent(&existing.default_actions, &resolved_actions);

                if !unchanged {
                    cloud.elbv2().modify_listener(&existing.arn, &spec, statuses).await?;
                }
                existing.arn.clone()
            }
            None => cloud.elbv2().create_listener(&lb_arn, &spec, statuses).await?,
        };

        statuses.set(id.clone(), "arn", arn.clone());
        stack
            .get_mut(id)
            .expect("id came from this stack")
            .set_status(ResourceStatus::Listener(ListenerStatus { arn }));
    }

    for (lb_arn, live) in &live_by_lb {
        let desired_ports = desired_ports_by_lb.get(lb_arn).cloned().unwrap_or_default();
        for orphan in live.iter().filter(|l| !desired_ports.contains(&l.port)) {
            cloud.elbv2().delete_listener(&orphan.arn).await?;
        }
    }

    Ok(())
}
