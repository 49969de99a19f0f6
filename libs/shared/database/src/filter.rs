use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Case-insensitive substring match on string fields.
    Contains(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Query over one collection: field conditions joined with AND, plus
/// optional ordering and paging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
    order_by: Option<(String, SortOrder)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

fn to_json<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: &str, condition: Condition) -> Self {
        self.clauses.push((field.to_string(), condition));
        self
    }

    pub fn eq<T: Serialize>(self, field: &str, value: T) -> Self {
        self.push(field, Condition::Eq(to_json(value)))
    }

    pub fn ne<T: Serialize>(self, field: &str, value: T) -> Self {
        self.push(field, Condition::Ne(to_json(value)))
    }

    pub fn lt<T: Serialize>(self, field: &str, value: T) -> Self {
        self.push(field, Condition::Lt(to_json(value)))
    }

    pub fn lte<T: Serialize>(self, field: &str, value: T) -> Self {
        self.push(field, Condition::Lte(to_json(value)))
    }

    pub fn gt<T: Serialize>(self, field: &str, value: T) -> Self {
        self.push(field, Condition::Gt(to_json(value)))
    }

    pub fn gte<T: Serialize>(self, field: &str, value: T) -> Self {
        self.push(field, Condition::Gte(to_json(value)))
    }

    pub fn is_in<T: Serialize>(self, field: &str, values: impl IntoIterator<Item = T>) -> Self {
        let values = values.into_iter().map(to_json).collect();
        self.push(field, Condition::In(values))
    }

    pub fn not_in<T: Serialize>(self, field: &str, values: impl IntoIterator<Item = T>) -> Self {
        let values = values.into_iter().map(to_json).collect();
        self.push(field, Condition::NotIn(values))
    }

    pub fn contains(self, field: &str, needle: &str) -> Self {
        self.push(field, Condition::Contains(needle.to_lowercase()))
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.order_by = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn clauses(&self) -> &[(String, Condition)] {
        &self.clauses
    }

    pub fn sort(&self) -> Option<&(String, SortOrder)> {
        self.order_by.as_ref()
    }

    pub fn page(&self) -> (Option<usize>, Option<usize>) {
        (self.limit, self.offset)
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.clauses.iter().all(|(field, condition)| {
            let actual = document.get(field).unwrap_or(&Value::Null);
            condition_holds(condition, actual)
        })
    }

    /// Sort, skip and truncate an already-filtered result set.
    pub fn apply_page(&self, mut documents: Vec<Value>) -> Vec<Value> {
        if let Some((field, order)) = &self.order_by {
            documents.sort_by(|a, b| {
                let left = a.get(field).unwrap_or(&Value::Null);
                let right = b.get(field).unwrap_or(&Value::Null);
                let ordering = compare_values(left, right).unwrap_or(Ordering::Equal);
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        documents
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Render as a PostgREST query string (without the leading `?`).
    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = self
            .clauses
            .iter()
            .map(|(field, condition)| format!("{}={}", field, render_condition(condition)))
            .collect();

        if let Some((field, order)) = &self.order_by {
            let direction = match order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            };
            parts.push(format!("order={}.{}", field, direction));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={}", limit));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("offset={}", offset));
        }

        parts.join("&")
    }
}

fn condition_holds(condition: &Condition, actual: &Value) -> bool {
    match condition {
        Condition::Eq(expected) => values_equal(actual, expected),
        Condition::Ne(expected) => !values_equal(actual, expected),
        Condition::Lt(bound) => compare_values(actual, bound) == Some(Ordering::Less),
        Condition::Lte(bound) => matches!(
            compare_values(actual, bound),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Condition::Gt(bound) => compare_values(actual, bound) == Some(Ordering::Greater),
        Condition::Gte(bound) => matches!(
            compare_values(actual, bound),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Condition::In(options) => options.iter().any(|option| values_equal(actual, option)),
        Condition::NotIn(options) => !options.iter().any(|option| values_equal(actual, option)),
        Condition::Contains(needle) => actual
            .as_str()
            .map(|text| text.to_lowercase().contains(needle.as_str()))
            .unwrap_or(false),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (parse_timestamp(left), parse_timestamp(right)) {
        return a == b;
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

/// Timestamps compare chronologically regardless of fractional-second
/// formatting; numbers numerically; strings lexically.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (parse_timestamp(left), parse_timestamp(right)) {
        return Some(a.cmp(&b));
    }
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => urlencoding::encode(text).into_owned(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_list(values: &[Value]) -> String {
    values.iter().map(render_value).collect::<Vec<_>>().join(",")
}

fn render_condition(condition: &Condition) -> String {
    match condition {
        Condition::Eq(Value::Null) => "is.null".to_string(),
        Condition::Eq(value) => format!("eq.{}", render_value(value)),
        Condition::Ne(value) => format!("neq.{}", render_value(value)),
        Condition::Lt(value) => format!("lt.{}", render_value(value)),
        Condition::Lte(value) => format!("lte.{}", render_value(value)),
        Condition::Gt(value) => format!("gt.{}", render_value(value)),
        Condition::Gte(value) => format!("gte.{}", render_value(value)),
        Condition::In(values) => format!("in.({})", render_list(values)),
        Condition::NotIn(values) => format!("not.in.({})", render_list(values)),
        Condition::Contains(needle) => {
            format!("ilike.{}", urlencoding::encode(&format!("*{}*", needle)))
        }
    }
}
