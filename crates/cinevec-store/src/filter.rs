//! Pre-filter predicates for similarity queries.
//!
//! A filter is evaluated by the store before ranking, so it narrows the
//! candidate set rather than trimming the result list. Only fields declared
//! filterable on the index may be referenced.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::document::{Document, FieldValue};

/// Boolean predicate over a document's scalar fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFilter {
    Eq(String, FieldValue),
    Ne(String, FieldValue),
    Gt(String, FieldValue),
    Gte(String, FieldValue),
    Lt(String, FieldValue),
    Lte(String, FieldValue),
    In(String, Vec<FieldValue>),
    Nin(String, Vec<FieldValue>),
    And(Vec<QueryFilter>),
    Or(Vec<QueryFilter>),
    Not(Box<QueryFilter>),
}

impl QueryFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        QueryFilter::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        QueryFilter::Ne(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        QueryFilter::Gt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        QueryFilter::Gte(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        QueryFilter::Lt(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        QueryFilter::Lte(field.into(), value.into())
    }

    pub fn is_in<V: Into<FieldValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        QueryFilter::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<V: Into<FieldValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        QueryFilter::Nin(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Inclusive range `low <= field <= high`.
    pub fn between(
        field: impl Into<String>,
        low: impl Into<FieldValue>,
        high: impl Into<FieldValue>,
    ) -> Self {
        let field = field.into();
        QueryFilter::And(vec![
            QueryFilter::Gte(field.clone(), low.into()),
            QueryFilter::Lte(field, high.into()),
        ])
    }

    pub fn and(self, other: QueryFilter) -> Self {
        match self {
            QueryFilter::And(mut clauses) => {
                clauses.push(other);
                QueryFilter::And(clauses)
            }
            first => QueryFilter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: QueryFilter) -> Self {
        match self {
            QueryFilter::Or(mut clauses) => {
                clauses.push(other);
                QueryFilter::Or(clauses)
            }
            first => QueryFilter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        QueryFilter::Not(Box::new(self))
    }

    /// Every field name the predicate references.
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            QueryFilter::Eq(f, _)
            | QueryFilter::Ne(f, _)
            | QueryFilter::Gt(f, _)
            | QueryFilter::Gte(f, _)
            | QueryFilter::Lt(f, _)
            | QueryFilter::Lte(f, _)
            | QueryFilter::In(f, _)
            | QueryFilter::Nin(f, _) => {
                out.insert(f.as_str());
            }
            QueryFilter::And(clauses) | QueryFilter::Or(clauses) => {
                for clause in clauses {
                    clause.collect_fields(out);
                }
            }
            QueryFilter::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Evaluate the predicate against a document.
    ///
    /// A missing field behaves like `Null`: it equals nothing but `Null`
    /// and is never inside a range.
    pub fn matches(&self, doc: &Document) -> bool {
        use std::cmp::Ordering;

        fn value<'a>(doc: &'a Document, field: &str) -> &'a FieldValue {
            doc.get(field).unwrap_or(&FieldValue::Null)
        }

        match self {
            QueryFilter::Eq(f, v) => value(doc, f).matches(v),
            QueryFilter::Ne(f, v) => !value(doc, f).matches(v),
            QueryFilter::Gt(f, v) => value(doc, f).compare(v) == Some(Ordering::Greater),
            QueryFilter::Gte(f, v) => matches!(
                value(doc, f).compare(v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            QueryFilter::Lt(f, v) => value(doc, f).compare(v) == Some(Ordering::Less),
            QueryFilter::Lte(f, v) => {
                matches!(value(doc, f).compare(v), Some(Ordering::Less | Ordering::Equal))
            }
            QueryFilter::In(f, vs) => vs.iter().any(|v| value(doc, f).matches(v)),
            QueryFilter::Nin(f, vs) => !vs.iter().any(|v| value(doc, f).matches(v)),
            QueryFilter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            QueryFilter::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
            QueryFilter::Not(inner) => !inner.matches(doc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(year: i64, genre: &str) -> Document {
        Document::new(format!("m{year}"))
            .with_field("year", year)
            .with_field("genre", genre)
    }

    #[test]
    fn test_between_is_inclusive() {
        let filter = QueryFilter::between("year", 1980, 1989);
        assert!(filter.matches(&movie(1980, "sci-fi")));
        assert!(filter.matches(&movie(1989, "sci-fi")));
        assert!(!filter.matches(&movie(1979, "sci-fi")));
        assert!(!filter.matches(&movie(1990, "sci-fi")));
    }

    #[test]
    fn test_combinators() {
        let filter = QueryFilter::gte("year", 1980)
            .and(QueryFilter::is_in("genre", ["sci-fi", "comedy"]))
            .and(QueryFilter::eq("genre", "drama").negate());

        assert!(filter.matches(&movie(1985, "comedy")));
        assert!(!filter.matches(&movie(1985, "drama")));
        assert!(!filter.matches(&movie(1975, "sci-fi")));

        let either = QueryFilter::lt("year", 1950).or(QueryFilter::gt("year", 2000));
        assert!(either.matches(&movie(1940, "x")));
        assert!(!either.matches(&movie(1985, "x")));
    }

    #[test]
    fn test_missing_field_never_in_range() {
        let doc = Document::new("no-year").with_field("title", "Untitled");
        assert!(!QueryFilter::gte("year", 0).matches(&doc));
        assert!(QueryFilter::ne("year", 1985).matches(&doc));
        assert!(QueryFilter::not_in("year", [1985]).matches(&doc));
    }

    #[test]
    fn test_fields_collects_nested_names() {
        let filter = QueryFilter::between("year", 1980, 1989)
            .or(QueryFilter::eq("genres", "Comedy").negate());
        let fields: Vec<&str> = filter.fields().into_iter().collect();
        assert_eq!(fields, vec!["genres", "year"]);
    }
}
