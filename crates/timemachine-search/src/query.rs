//! Query expression tree.
//!
//! Queries are built either by the text parser or programmatically (the
//! recent-window helpers build a `Range` directly). The `Display` form is
//! the human-readable echo handed back with every result set.

use chrono::{DateTime, SecondsFormat, Utc};

use timemachine_types::schema::{FIELD_BODY, FIELD_TS};

/// A boolean expression over field predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Query {
    /// Exact match on identifier/timestamp fields, token containment on text
    Term { field: String, value: String },
    /// Term against the schema's default field
    BareTerm(String),
    /// Inclusive timestamp range; `None` leaves that side open
    Range {
        field: String,
        low: Option<DateTime<Utc>>,
        high: Option<DateTime<Utc>>,
    },
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn bare(value: impl Into<String>) -> Self {
        Query::BareTerm(value.into())
    }

    /// Inclusive range on a timestamp field.
    pub fn date_range(field: impl Into<String>, low: DateTime<Utc>, high: DateTime<Utc>) -> Self {
        Query::Range {
            field: field.into(),
            low: Some(low),
            high: Some(high),
        }
    }

    /// Inclusive range on the `ts` field.
    pub fn ts_range(low: DateTime<Utc>, high: DateTime<Utc>) -> Self {
        Self::date_range(FIELD_TS, low, high)
    }

    pub fn and(left: Query, right: Query) -> Self {
        Query::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Query, right: Query) -> Self {
        Query::Or(Box::new(left), Box::new(right))
    }

    pub fn not(inner: Query) -> Self {
        Query::Not(Box::new(inner))
    }

    /// Left-fold a non-empty sequence with AND.
    pub fn all_of(queries: impl IntoIterator<Item = Query>) -> Option<Self> {
        queries.into_iter().reduce(Query::and)
    }

    /// Left-fold a non-empty sequence with OR.
    pub fn any_of(queries: impl IntoIterator<Item = Query>) -> Option<Self> {
        queries.into_iter().reduce(Query::or)
    }

    /// Render with an explicit default field for bare terms.
    pub fn describe(&self, default_field: &str) -> String {
        let mut out = String::new();
        self.write_description(&mut out, default_field);
        out
    }

    fn write_description(&self, out: &mut String, default_field: &str) {
        match self {
            Query::Term { field, value } => {
                out.push_str(field);
                out.push(':');
                push_value(out, value);
            }
            Query::BareTerm(value) => {
                out.push_str(default_field);
                out.push(':');
                push_value(out, value);
            }
            Query::Range { field, low, high } => {
                out.push_str(field);
                out.push_str(":[");
                push_bound(out, low);
                out.push_str(" TO ");
                push_bound(out, high);
                out.push(']');
            }
            Query::And(left, right) => {
                out.push('(');
                left.write_description(out, default_field);
                out.push_str(" AND ");
                right.write_description(out, default_field);
                out.push(')');
            }
            Query::Or(left, right) => {
                out.push('(');
                left.write_description(out, default_field);
                out.push_str(" OR ");
                right.write_description(out, default_field);
                out.push(')');
            }
            Query::Not(inner) => {
                out.push_str("NOT ");
                inner.write_description(out, default_field);
            }
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe(FIELD_BODY))
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ':' | '(' | ')' | '[' | ']' | '"' | '*'))
        || matches!(value, "AND" | "OR" | "NOT" | "TO")
}

fn push_value(out: &mut String, value: &str) {
    if needs_quotes(value) {
        out.push('"');
        for c in value.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    } else {
        out.push_str(value);
    }
}

fn push_bound(out: &mut String, bound: &Option<DateTime<Utc>>) {
    match bound {
        Some(ts) => out.push_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
        None => out.push('*'),
    }
}
