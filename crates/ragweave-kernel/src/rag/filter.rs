//! Metadata filter expressions
//!
//! A [`Filter`] is a boolean predicate tree over metadata keys. Embedding
//! stores either evaluate it locally ([`Filter::matches`]) or translate it
//! into their own query language. A key that is absent from the metadata
//! never matches a leaf predicate.

use super::types::{Metadata, MetadataValue, Query};
use crate::error::RagResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Boolean predicate tree over metadata keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { key: String, value: MetadataValue },
    Ne { key: String, value: MetadataValue },
    Gt { key: String, value: MetadataValue },
    Gte { key: String, value: MetadataValue },
    Lt { key: String, value: MetadataValue },
    Lte { key: String, value: MetadataValue },
    In { key: String, values: Vec<MetadataValue> },
    NotIn { key: String, values: Vec<MetadataValue> },
    /// Substring match on string values.
    Contains { key: String, value: String },
    And { left: Box<Filter>, right: Box<Filter> },
    Or { left: Box<Filter>, right: Box<Filter> },
    Not { inner: Box<Filter> },
}

impl Filter {
    pub fn eq(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn ne(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Ne {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn gt(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Gt {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn gte(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Gte {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn lt(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Lt {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn lte(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Lte {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Inclusive range `min <= key <= max`.
    pub fn between(
        key: impl Into<String>,
        min: impl Into<MetadataValue>,
        max: impl Into<MetadataValue>,
    ) -> Self {
        let key = key.into();
        Self::gte(key.clone(), min).and(Self::lte(key, max))
    }

    pub fn is_in<V: Into<MetadataValue>>(
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<V: Into<MetadataValue>>(
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::NotIn {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Contains {
            key: key.into(),
            value: value.into(),
        }
    }

    /// OR of equality predicates, one per value. Returns `None` for no values.
    pub fn any_of<V: Into<MetadataValue>>(
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Option<Self> {
        let key = key.into();
        values
            .into_iter()
            .map(|v| Self::eq(key.clone(), v))
            .reduce(Self::or)
    }

    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        Self::And {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        Self::Or {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not {
            inner: Box::new(self),
        }
    }

    /// Evaluates the predicate against a metadata map.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Eq { key, value } => metadata
                .get(key)
                .is_some_and(|actual| actual.loosely_equals(value)),
            Self::Ne { key, value } => metadata
                .get(key)
                .is_some_and(|actual| !actual.loosely_equals(value)),
            Self::Gt { key, value } => compare(metadata, key, value, |o| o == Ordering::Greater),
            Self::Gte { key, value } => compare(metadata, key, value, |o| o != Ordering::Less),
            Self::Lt { key, value } => compare(metadata, key, value, |o| o == Ordering::Less),
            Self::Lte { key, value } => compare(metadata, key, value, |o| o != Ordering::Greater),
            Self::In { key, values } => metadata
                .get(key)
                .is_some_and(|actual| values.iter().any(|v| actual.loosely_equals(v))),
            Self::NotIn { key, values } => metadata
                .get(key)
                .is_some_and(|actual| !values.iter().any(|v| actual.loosely_equals(v))),
            Self::Contains { key, value } => metadata
                .get_str(key)
                .is_some_and(|actual| actual.contains(value.as_str())),
            Self::And { left, right } => left.matches(metadata) && right.matches(metadata),
            Self::Or { left, right } => left.matches(metadata) || right.matches(metadata),
            Self::Not { inner } => !inner.matches(metadata),
        }
    }
}

fn compare(
    metadata: &Metadata,
    key: &str,
    expected: &MetadataValue,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    let Some(actual) = metadata.get(key) else {
        return false;
    };
    let ordering = match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    ordering.is_some_and(accept)
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { key, value } => write!(f, "{key} = {value}"),
            Self::Ne { key, value } => write!(f, "{key} != {value}"),
            Self::Gt { key, value } => write!(f, "{key} > {value}"),
            Self::Gte { key, value } => write!(f, "{key} >= {value}"),
            Self::Lt { key, value } => write!(f, "{key} < {value}"),
            Self::Lte { key, value } => write!(f, "{key} <= {value}"),
            Self::In { key, values } => write!(f, "{key} IN ({})", join(values)),
            Self::NotIn { key, values } => write!(f, "{key} NOT IN ({})", join(values)),
            Self::Contains { key, value } => write!(f, "{key} CONTAINS {value}"),
            Self::And { left, right } => write!(f, "({left} AND {right})"),
            Self::Or { left, right } => write!(f, "({left} OR {right})"),
            Self::Not { inner } => write!(f, "NOT ({inner})"),
        }
    }
}

fn join(values: &[MetadataValue]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Per-query filters
// =============================================================================

/// Derives a filter for each query at retrieval time.
///
/// Implementations range from pure functions of the query's session
/// metadata to language-model-generated filters. A generated filter that
/// cannot be produced is reported as [`crate::error::RagError::FilterGeneration`];
/// retrievers then search without a filter.
#[async_trait]
pub trait FilterProvider: Send + Sync {
    async fn filter_for(&self, query: &Query) -> RagResult<Option<Filter>>;
}

#[async_trait]
impl<F> FilterProvider for F
where
    F: Fn(&Query) -> Option<Filter> + Send + Sync,
{
    async fn filter_for(&self, query: &Query) -> RagResult<Option<Filter>> {
        Ok(self(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(genre: &str, year: i64) -> Metadata {
        Metadata::new().with("genre", genre).with("year", year)
    }

    #[test]
    fn test_equality_on_category() {
        let dog = Metadata::new().with("category", "dog");
        let bird = Metadata::new().with("category", "bird");
        let only_dogs = Filter::eq("category", "dog");

        assert!(only_dogs.matches(&dog));
        assert!(!only_dogs.matches(&bird));
    }

    #[test]
    fn test_absent_key_never_matches_leaf() {
        let empty = Metadata::new();
        assert!(!Filter::eq("category", "dog").matches(&empty));
        assert!(!Filter::ne("category", "dog").matches(&empty));
        assert!(!Filter::gt("year", 1990).matches(&empty));
        assert!(!Filter::is_in("category", ["dog"]).matches(&empty));
        assert!(!Filter::contains("title", "Die").matches(&empty));
    }

    #[test]
    fn test_range_and_boolean_combinators() {
        let nineties_action =
            Filter::eq("genre", "action").and(Filter::between("year", 1990, 1999));

        assert!(nineties_action.matches(&movie("action", 1998)));
        assert!(!nineties_action.matches(&movie("action", 1988)));
        assert!(!nineties_action.matches(&movie("drama", 1994)));

        let not_drama = Filter::eq("genre", "drama").negate();
        assert!(not_drama.matches(&movie("comedy", 1993)));
    }

    #[test]
    fn test_numeric_comparison_across_int_and_float() {
        let metadata = Metadata::new().with("year", 1994.0);
        assert!(Filter::eq("year", 1994).matches(&metadata));
        assert!(Filter::lte("year", 1994).matches(&metadata));
        assert!(!Filter::lt("year", 1994).matches(&metadata));
    }

    #[test]
    fn test_any_of_builds_or_chain() {
        let light = Filter::any_of(
            "category",
            ["astronomy", "inventions", "physics", "science", "technology"],
        )
        .unwrap();

        assert!(light.matches(&Metadata::new().with("category", "physics")));
        assert!(!light.matches(&Metadata::new().with("category", "cooking")));
        assert!(Filter::any_of::<&str>("category", []).is_none());
    }

    #[test]
    fn test_display_renders_readable_expression() {
        let filter = Filter::eq("genre", "action").or(Filter::is_in("year", [1994, 1998]));
        assert_eq!(filter.to_string(), "(genre = action OR year IN (1994, 1998))");
    }

    #[tokio::test]
    async fn test_closure_filter_provider_uses_session() {
        let by_user = |query: &Query| query.session_id().map(|id| Filter::eq("userId", id));

        let filter = by_user
            .filter_for(&Query::new("Which color?").with_session("2"))
            .await
            .unwrap();
        assert_eq!(filter, Some(Filter::eq("userId", "2")));

        let none = by_user.filter_for(&Query::new("Which color?")).await.unwrap();
        assert!(none.is_none());
    }
}
