/// A namespace-qualified Kubernetes object identity, the unit status
/// write-back and finalizer management operate on.
#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&(String, String)> for ResourceId {
    fn from((namespace, name): &(String, String)) -> Self {
        Self::new(namespace.clone(), name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_namespace_slash_name() {
        let id = ResourceId::new("default", "my-gateway");
        assert_eq!(id.to_string(), "default/my-gateway");
    }

    #[test]
    fn from_tuple_matches_new() {
        let pair = ("default".to_string(), "my-ingress".to_string());
        assert_eq!(ResourceId::from(&pair), ResourceId::new("default", "my-ingress"));
    }
}
