use lbc_core::model::{ResourceSpec, WebAclKind};
use lbc_core::token::StatusTable;
use lbc_core::{Cloud, ControllerError, ErrorContext, Result, Stack};
use std::collections::HashMap;

const WAFV2_KIND: &str = "AWS::WAFv2::WebACLAssociation";
const WAF_CLASSIC_KIND: &str = "AWS::WAFRegional::WebACLAssociation";
const SHIELD_KIND: &str = "AWS::Shield::Protection";
const LB_KIND: &str = "AWS::ELBV2::LoadBalancer";

pub async fn synthesize(cloud: &dyn Cloud, stack: &Stack, statuses: &StatusTable) -> Result<()> {
    let mut desired_web_acl: HashMap<String, (String, WebAclKind)> = HashMap::new();

    for kind in [WAFV2_KIND, WAF_CLASSIC_KIND] {
        for resource in stack.list_resources(kind) {
            let ResourceSpec::WebAclAssociation(spec) = resource.spec() else {
                unreachable!("list_resources(kind) only returns WebAclAssociation specs")
            };
            let resource_arn = spec.resource_arn.resolve(statuses)?;
            if desired_web_acl
                .insert(resource_arn.clone(), (spec.web_acl_id.clone(), spec.kind))
                .is_some()
            {
                tracing::warn!(resource_arn, "conflicting WebACL associations for the same resource");
                return Err(ControllerError::fatal(
                    "two WebACL associations target the same resource",
                    ErrorContext::resource("AWS::WAFv2::WebACLAssociation", &resource_arn),
                ));
            }
        }
    }

    let mut desired_shield: HashMap<String, bool> = HashMap::new();
    for resource in stack.list_resources(SHIELD_KIND) {
        let ResourceSpec::ShieldProtection(spec) = resource.spec() else {
            unreachable!("list_resources(SHIELD_KIND) only returns ShieldProtection specs")
        };
        let resource_arn = spec.resource_arn.resolve(statuses)?;
        desired_shield.insert(resource_arn, spec.enabled);
    }

    for lb in stack.list_resources(LB_KIND) {
        let ResourceSpec::LoadBalancer(_) = lb.spec() else {
            unreachable!("list_resources(LB_KIND) only returns LoadBalancer specs")
        };
        let arn = lb.arn_token().resolve(statuses)?;

        let current_web_acl = cloud.web_acl_associations().get_associated_web_acl(&arn).await?;
        match (desired_web_acl.get(&arn), current_web_acl) {
            (Some((desired_id, _)), Some(current)) if desired_id == &current => {}
            (Some((desired_id, kind)), _) => {
                cloud.web_acl_associations().associate_web_acl(&arn, desired_id, *kind).await?
            }
            (None, Some(_)) => cloud.web_acl_associations().disassociate_web_acl(&arn).await?,
            (None, None) => {}
        }

        let desired_shield_enabled = desired_shield.get(&arn).copied().unwrap_or(false);
        let currently_protected = cloud.shield().is_protected(&arn).await?;
        if desired_shield_enabled && !currently_protected {
            cloud.shield().enable_protection(&arn).await?;
        } else if !desired_shield_enabled && currently_protected {
            cloud.shield().disable_protection(&arn).await?;
        }
    }

    Ok(())
}
