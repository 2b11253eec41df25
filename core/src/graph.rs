//! The resource graph (§3 Stack, §4.1): a typed DAG of desired AWS resources
//! with forward-reference edges seeded by token dependencies.

use crate::error::{ControllerError, ErrorContext};
use crate::model::Resource;
use std::collections::{BTreeMap, BTreeSet};

/// Identifies a resource uniquely within a [`Stack`]: `(Type, ID)` from §3.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    pub kind: String,
    pub id: String,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A namespace-qualified identifier for a reconciliation unit (§3).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackId(String);

impl StackId {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self(format!("{namespace}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The in-memory DAG of desired resources for one reconciliation unit.
///
/// Invariants (§3): no duplicate `(Type, ID)`; every dependency edge refers
/// to a resource already in the stack; the graph is acyclic. All three are
/// enforced at insertion/traversal time rather than trusted of the caller.
#[derive(Debug, Default)]
pub struct Stack {
    id: Option<StackId>,
    resources: BTreeMap<ResourceId, Resource>,
    // dependee -> dependers: dependee must be visited before its dependers.
    edges: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
}

impl Stack {
    pub fn new(id: StackId) -> Self {
        Self {
            id: Some(id),
            resources: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Option<&StackId> {
        self.id.as_ref()
    }

    pub fn add_resource(&mut self, resource: Resource) -> Result<(), ControllerError> {
        let rid = resource.id();
        if self.resources.contains_key(&rid) {
            return Err(ControllerError::conflict(
                format!("duplicate resource {rid} in stack"),
                ErrorContext::resource(rid.kind.clone(), rid.id.clone()),
            ));
        }
        let deps = resource.dependencies();
        self.resources.insert(rid.clone(), resource);
        for dep in deps {
            self.add_dependency(dep, rid.clone())?;
        }
        Ok(())
    }

    /// Records that `depender` reads state from `dependee`, so `dependee`
    /// must synthesize first.
    pub fn add_dependency(
        &mut self,
        dependee: ResourceId,
        depender: ResourceId,
    ) -> Result<(), ControllerError> {
        if !self.resources.contains_key(&dependee) {
            return Err(ControllerError::fatal(
                format!("dependency edge refers to unknown resource {dependee}"),
                ErrorContext::resource(dependee.kind.clone(), dependee.id.clone()),
            ));
        }
        if !self.resources.contains_key(&depender) {
            return Err(ControllerError::fatal(
                format!("dependency edge refers to unknown resource {depender}"),
                ErrorContext::resource(depender.kind.clone(), depender.id.clone()),
            ));
        }
        self.edges.entry(dependee).or_default().insert(depender);
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn get_mut(&mut self, id: &ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    /// Resources of one kind, in a deterministic (ID-sorted) order — used by
    /// synthesizers to list "desired resources of its kind" (§4.6).
    pub fn list_resources(&self, kind: &str) -> Vec<&Resource> {
        self.resources
            .values()
            .filter(|r| r.id().kind == kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Kahn's algorithm: visits leaves (no dependees) first. Returns a
    /// `Fatal` error if a cycle is reachable, per §4.1.
    pub fn topological_order(&self) -> Result<Vec<ResourceId>, ControllerError> {
        let mut indegree: BTreeMap<ResourceId, usize> =
            self.resources.keys().map(|id| (id.clone(), 0)).collect();
        for dependers in self.edges.values() {
            for depender in dependers {
                *indegree.entry(depender.clone()).or_insert(0) += 1;
            }
        }

        let mut ready: BTreeSet<ResourceId> = indegree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut order = Vec::with_capacity(self.resources.len());

        while let Some(next) = ready.iter().next().cloned() {
            ready.remove(&next);
            order.push(next.clone());
            if let Some(dependers) = self.edges.get(&next) {
                for depender in dependers {
                    let deg = indegree.get_mut(depender).expect("indegree tracked for every node");
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(depender.clone());
                    }
                }
            }
        }

        if order.len() != self.resources.len() {
            return Err(ControllerError::fatal(
                "cycle detected in resource graph",
                ErrorContext::none(),
            ));
        }
        Ok(order)
    }

    /// Visits resources in topological order, the way synthesizers traverse
    /// the stack (§4.1 `TopologicalTraversal`).
    pub fn traverse<'a, F>(&'a self, mut visitor: F) -> Result<(), ControllerError>
    where
        F: FnMut(&'a Resource) -> Result<(), ControllerError>,
    {
        for id in self.topological_order()? {
            visitor(self.resources.get(&id).expect("topological order only lists known ids"))?;
        }
        Ok(())
    }

    /// Resources in reverse topological order — how a group deletion tears
    /// down AWS resources (§4.9 step 2).
    pub fn reverse_topological_order(&self) -> Result<Vec<ResourceId>, ControllerError> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    /// Publishes every resource's already-known status (adopted pre-existing
    /// AWS resources, §4.5) into a fresh [`crate::token::StatusTable`] before
    /// the first synthesis pass, so deferred references to them resolve
    /// immediately instead of waiting on a no-op synthesize step.
    pub fn seed_status_table(&self, table: &crate::token::StatusTable) {
        for resource in self.resources.values() {
            resource.publish_status(table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LoadBalancerSpec, ResourceSpec};

    fn lb_resource(id: &str) -> Resource {
        Resource::new(
            ResourceId::new("AWS::ELBV2::LoadBalancer", id),
            ResourceSpec::LoadBalancer(LoadBalancerSpec {
                name: id.to_string(),
                lb_type: crate::model::LoadBalancerType::Application,
                scheme: crate::model::Scheme::Internal,
                ip_address_type: crate::model::IpAddressType::Ipv4,
                subnet_ids: vec!["subnet-a".into(), "subnet-b".into()],
                security_groups: vec![],
                attributes: Default::default(),
                tags: Default::default(),
            }),
        )
    }

    #[test]
    fn rejects_duplicate_type_and_id() {
        let mut stack = Stack::new(StackId::new("default", "gw"));
        stack.add_resource(lb_resource("main")).unwrap();
        let err = stack.add_resource(lb_resource("main")).unwrap_err();
        assert!(matches!(err, ControllerError::Conflict { .. }));
    }

    #[test]
    fn rejects_edges_to_unknown_resources() {
        let mut stack = Stack::new(StackId::new("default", "gw"));
        stack.add_resource(lb_resource("main")).unwrap();
        let err = stack
            .add_dependency(
                ResourceId::new("AWS::ELBV2::LoadBalancer", "ghost"),
                ResourceId::new("AWS::ELBV2::LoadBalancer", "main"),
            )
            .unwrap_err();
        assert!(matches!(err, ControllerError::Fatal { .. }));
    }

    #[test]
    fn topological_order_visits_leaves_first() {
        let mut stack = Stack::new(StackId::new("default", "gw"));
        stack.add_resource(lb_resource("main")).unwrap();
        let listener = Resource::new(
            ResourceId::new("AWS::ELBV2::Listener", "80"),
            ResourceSpec::Listener(crate::model::ListenerSpec {
                load_balancer_arn: crate::token::StringToken::deferred(
                    ResourceId::new("AWS::ELBV2::LoadBalancer", "main"),
                    "arn",
                ),
                port: 80,
                protocol: "TCP".into(),
                ssl_policy: None,
                certificates: vec![],
                alpn_policy: None,
                default_actions: vec![],
            }),
        );
        stack.add_resource(listener).unwrap();

        let order = stack.topological_order().unwrap();
        let lb_pos = order
            .iter()
            .position(|id| id.id == "main")
            .expect("lb present");
        let listener_pos = order
            .iter()
            .position(|id| id.id == "80")
            .expect("listener present");
        assert!(lb_pos < listener_pos);
    }

    #[test]
    fn detects_cycles() {
        let mut stack = Stack::new(StackId::new("default", "gw"));
        stack.add_resource(lb_resource("a")).unwrap();
        stack.add_resource(lb_resource("b")).unwrap();
        stack
            .add_dependency(
                ResourceId::new("AWS::ELBV2::LoadBalancer", "a"),
                ResourceId::new("AWS::ELBV2::LoadBalancer", "b"),
            )
            .unwrap();
        stack
            .add_dependency(
                ResourceId::new("AWS::ELBV2::LoadBalancer", "b"),
                ResourceId::new("AWS::ELBV2::LoadBalancer", "a"),
            )
            .unwrap();
        assert!(matches!(
            stack.topological_order(),
            Err(ControllerError::Fatal { .. })
        ));
    }
}
