//! Tagging & pre-existing-LB discovery (§4.5).

use lbc_core::cloud::{Cloud, ExistingLoadBalancer};
use lbc_core::model::Scheme;
use lbc_core::{ControllerError, ErrorContext};

/// Looks up load balancers tagged with `stack_id` in the current VPC and
/// applies the exactly-one / scheme-mismatch / multiple-matches rules from
/// §4.5, returning the single resource the builder should adopt, if any.
pub async fn find_existing_load_balancer(
    cloud: &dyn Cloud,
    cluster_name: &str,
    stack_id: &str,
    desired_scheme: Scheme,
) -> Result<Option<ExistingLoadBalancer>, ControllerError> {
    let matches = cloud
        .elbv2()
        .find_tagged_load_balancers(cluster_name, stack_id)
        .await?;

    match matches.len() {
        0 => Ok(None),
        1 => {
            let existing = matches.into_iter().next().expect("length checked above");
            if existing.scheme != desired_scheme {
                return Err(ControllerError::fatal(
                    format!(
                        "existing load balancer {} has scheme {:?}, desired {:?}; \
                         renaming the scheme requires redeployment",
                        existing.arn, existing.scheme, desired_scheme
                    ),
                    ErrorContext::resource("AWS::ELBV2::LoadBalancer", stack_id),
                ));
            }
            Ok(Some(existing))
        }
        _ => Err(ControllerError::fatal(
            format!(
                "{} load balancers tagged with stack {stack_id}; expected at most one",
                matches.len()
            ),
            ErrorContext::resource("AWS::ELBV2::LoadBalancer", stack_id),
        )),
    }
}

/// Builds the mandatory ownership tag set (§6), with user tags layered on
/// top but never overriding the reserved keys.
pub fn ownership_tags(
    controller_name: &str,
    cluster_name: &str,
    stack_id: &str,
    logical_id: &str,
    user_tags: &std::collections::BTreeMap<String, String>,
) -> std::collections::BTreeMap<String, String> {
    let mut tags = user_tags.clone();
    tags.insert(format!("{controller_name}/cluster"), cluster_name.to_string());
    tags.insert(format!("{controller_name}/stack"), stack_id.to_string());
    tags.insert(format!("{controller_name}/resource"), logical_id.to_string());
    tags
}

/// Whether a live AWS resource's tags satisfy the ownership predicate (§3,
/// §5): it must carry both the cluster identifier and this controller's
/// stack tag before this controller may mutate or delete it.
pub fn is_owned(
    tags: &std::collections::BTreeMap<String, String>,
    controller_name: &str,
    cluster_name: &str,
    stack_id: &str,
) -> bool {
    tags.get(&format!("{controller_name}/cluster"))
        .map(String::as_str)
        == Some(cluster_name)
        && tags.get(&format!("{controller_name}/stack")).map(String::as_str) == Some(stack_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_tags_cannot_be_overridden_by_user_tags() {
        let mut user_tags = std::collections::BTreeMap::new();
        user_tags.insert("elbv2.k8s.aws/cluster".to_string(), "attacker-controlled".into());
        let tags = ownership_tags("elbv2.k8s.aws", "prod", "default/gw", "lb", &user_tags);
        assert_eq!(tags.get("elbv2.k8s.aws/cluster").unwrap(), "prod");
    }

    #[test]
    fn is_owned_requires_both_cluster_and_stack_tags() {
        let mut tags = std::collections::BTreeMap::new();
        tags.insert("elbv2.k8s.aws/cluster".to_string(), "prod".to_string());
        assert!(!is_owned(&tags, "elbv2.k8s.aws", "prod", "default/gw"));

        tags.insert("elbv2.k8s.aws/stack".to_string(), "default/gw".to_string());
        assert!(is_owned(&tags, "elbv2.k8s.aws", "prod", "default/gw"));
    }
}
