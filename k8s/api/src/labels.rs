//! A Kubernetes-style label selector, used wherever namespace admission
//! calls for matching by labels rather than by name: a Gateway listener's
//! `allowedRoutes.namespaces.selector`, and `SubnetSelection`/
//! `IngressClassParams.namespaceSelector` in our CRDs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

pub type LabelMap = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

/// A namespace's own labels, as read off its `ObjectMeta` — cheap to clone
/// since every grouping pass hands a copy to each candidate route.
#[derive(Clone, Debug, Default)]
pub struct Labels(Arc<LabelMap>);

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Expression {
    key: String,
    operator: Operator,
    values: Option<BTreeSet<String>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects a set of namespaces by label, the way `IngressClassParams`'s
/// `namespaceSelector` and a Gateway listener's `allowedRoutes.namespaces`
/// both do. `match_labels` and `match_expressions` are ANDed together.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    match_labels: Option<LabelMap>,
    match_expressions: Option<Expressions>,
}

// === NamespaceSelector ===

impl NamespaceSelector {
    #[cfg(test)]
    fn new(labels: LabelMap, exprs: Expressions) -> Self {
        Self {
            match_labels: Some(labels),
            match_expressions: Some(exprs),
        }
    }

    fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    fn from_map(map: LabelMap) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// True when this selector matches every namespace, i.e. both clauses
    /// are absent or empty — the "no restriction" case a caller needs to
    /// special-case before falling back to `Same`/`All` semantics.
    pub fn selects_all(&self) -> bool {
        match (self.match_labels.as_ref(), self.match_expressions.as_ref()) {
            (None, None) => true,
            (Some(l), None) => l.is_empty(),
            (None, Some(e)) => e.is_empty(),
            (Some(l), Some(e)) => l.is_empty() && e.is_empty(),
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        let expressions_match = self
            .match_expressions
            .iter()
            .flatten()
            .all(|expr| expr.matches(labels.as_ref()));
        if !expressions_match {
            return false;
        }

        match self.match_labels.as_ref() {
            Some(required) => required.iter().all(|(k, v)| labels.0.get(k) == Some(v)),
            None => true,
        }
    }
}

impl std::iter::FromIterator<(String, String)> for NamespaceSelector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for NamespaceSelector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }
}

impl std::iter::FromIterator<Expression> for NamespaceSelector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === Labels ===

impl From<Option<LabelMap>> for Labels {
    #[inline]
    fn from(labels: Option<LabelMap>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl From<LabelMap> for Labels {
    #[inline]
    fn from(labels: LabelMap) -> Self {
        Self(Arc::new(labels))
    }
}

impl AsRef<LabelMap> for Labels {
    #[inline]
    fn as_ref(&self) -> &LabelMap {
        self.0.as_ref()
    }
}

impl PartialEq for Labels {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref() == other.as_ref()
    }
}

impl PartialEq<Option<LabelMap>> for Labels {
    #[inline]
    fn eq(&self, other: &Option<LabelMap>) -> bool {
        match other {
            None => self.0.is_empty(),
            Some(other) => other == self.0.as_ref(),
        }
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }
}

// === Expression ===

impl Expression {
    fn matches(&self, labels: &LabelMap) -> bool {
        match (self.operator, &self.key, self.values.as_ref()) {
            (Operator::In, key, Some(values)) => match labels.get(key) {
                Some(v) => values.contains(v),
                None => false,
            },
            (Operator::NotIn, key, Some(values)) => match labels.get(key) {
                Some(v) => !values.contains(v),
                None => true,
            },
            (Operator::Exists, key, None) => labels.contains_key(key),
            (Operator::DoesNotExist, key, None) => !labels.contains_key(key),
            (operator, key, values) => {
                tracing::warn!(?operator, %key, ?values, "illegal match expression");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (NamespaceSelector::default(), Labels::default(), true, "empty selector matches any namespace"),
            (
                NamespaceSelector::from_iter(Some(("team", "platform"))),
                Labels::from_iter(Some(("team", "platform"))),
                true,
                "exact label match",
            ),
            (
                NamespaceSelector::from_iter(Some(("team", "platform"))),
                Labels::from_iter(vec![("team", "platform"), ("env", "prod")]),
                true,
                "sufficient label match",
            ),
            (
                NamespaceSelector::from_iter(Some(Expression {
                    key: "env".into(),
                    operator: Operator::In,
                    values: Some(Some("prod".to_string()).into_iter().collect()),
                })),
                Labels::from_iter(vec![("env", "prod"), ("team", "platform")]),
                true,
                "In expression match",
            ),
            (
                NamespaceSelector::from_iter(Some(Expression {
                    key: "env".into(),
                    operator: Operator::NotIn,
                    values: Some(Some("staging".to_string()).into_iter().collect()),
                })),
                Labels::from_iter(vec![("env", "prod"), ("team", "platform")]),
                true,
                "NotIn expression match",
            ),
            (
                NamespaceSelector::from_iter(Some(Expression {
                    key: "env".into(),
                    operator: Operator::NotIn,
                    values: Some(Some("prod".to_string()).into_iter().collect()),
                })),
                Labels::from_iter(vec![("env", "prod"), ("team", "platform")]),
                false,
                "NotIn expression non-match",
            ),
            (
                NamespaceSelector::new(
                    LabelMap::from([("team".to_string(), "platform".to_string())]),
                    vec![Expression {
                        key: "env".into(),
                        operator: Operator::In,
                        values: Some(Some("prod".to_string()).into_iter().collect()),
                    }],
                ),
                Labels::from_iter(vec![("team", "platform"), ("env", "staging")]),
                false,
                "matches labels but not expressions",
            ),
            (
                NamespaceSelector::new(
                    LabelMap::from([("team".to_string(), "platform".to_string())]),
                    vec![Expression {
                        key: "env".into(),
                        operator: Operator::In,
                        values: Some(Some("prod".to_string()).into_iter().collect()),
                    }],
                ),
                Labels::from_iter(vec![("team", "platform"), ("env", "prod")]),
                true,
                "matches both labels and expressions",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn selects_all_is_true_only_when_both_clauses_are_absent_or_empty() {
        assert!(NamespaceSelector::default().selects_all());
        assert!(!NamespaceSelector::from_iter(Some(("team", "platform"))).selects_all());
        assert!(!NamespaceSelector::from_iter(Some(Expression {
            key: "env".into(),
            operator: Operator::Exists,
            values: None,
        }))
        .selects_all());
    }
}
