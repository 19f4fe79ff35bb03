//! Queries, cursors and in-process query evaluation
//!
//! A [`Query`] selects entities of one kind, optionally scoped to a namespace
//! and an ancestor, filtered by property predicates and ordered by properties.
//! Results always fall back to key order after the explicit orders, so every
//! result has a unique position. A [`Cursor`] captures that position (the sort
//! values and key of the last result) as an opaque URL-safe string.

use crate::error::{Result, StoreError};
use crate::key::Key;
use crate::property::{find, PropertyList, Value};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Pseudo-property addressing the entity key in filters and orders
pub const KEY_FIELD: &str = "__key__";

/// Comparison operator of a property filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Property equals any element of an array value
    In,
}

impl FromStr for Operator {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "in" | "IN" => Ok(Operator::In),
            other => Err(StoreError::QueryError(format!("unknown filter operator {:?}", other))),
        }
    }
}

impl Operator {
    fn matches(self, property: &Value, operand: &Value) -> bool {
        let ord = property.total_cmp(operand);
        match self {
            Operator::Eq => ord == Ordering::Equal,
            Operator::Ne => ord != Ordering::Equal,
            Operator::Lt => ord == Ordering::Less,
            Operator::Le => ord != Ordering::Greater,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Ge => ord != Ordering::Less,
            Operator::In => match operand {
                Value::Array(items) => items.iter().any(|v| property.total_cmp(v) == Ordering::Equal),
                _ => ord == Ordering::Equal,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub descending: bool,
}

/// Query over entities of one kind
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) kind: String,
    pub(crate) namespace: Option<String>,
    pub(crate) ancestor: Option<Key>,
    pub(crate) filters: Vec<Filter>,
    pub(crate) orders: Vec<Order>,
    pub(crate) keys_only: bool,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: usize,
    pub(crate) start: Option<Cursor>,
    pub(crate) end: Option<Cursor>,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            ancestor: None,
            filters: Vec::new(),
            orders: Vec::new(),
            keys_only: false,
            limit: None,
            offset: 0,
            start: None,
            end: None,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        let ns = namespace.into();
        self.namespace = if ns.is_empty() { None } else { Some(ns) };
        self
    }

    /// Restrict results to descendants of `ancestor` (inclusive)
    pub fn ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    pub fn filter(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Add a filter written as `"Field op"`, e.g. `"Age >="`
    pub fn filter_str(self, clause: &str, value: impl Into<Value>) -> Result<Self> {
        let clause = clause.trim();
        let split = clause
            .rfind(char::is_whitespace)
            .ok_or_else(|| StoreError::QueryError(format!("invalid filter {:?}", clause)))?;
        let (field, op) = clause.split_at(split);
        let op = op.trim().parse::<Operator>()?;
        Ok(self.filter(field.trim(), op, value))
    }

    /// Add a sort order; a leading `-` sorts descending
    pub fn order(mut self, field: &str) -> Self {
        let (field, descending) = match field.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (field, false),
        };
        self.orders.push(Order {
            field: field.trim().to_string(),
            descending,
        });
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Resume after the position of `cursor`
    pub fn start(mut self, cursor: Cursor) -> Self {
        self.start = Some(cursor);
        self
    }

    /// Stop at the position of `cursor` (inclusive)
    pub fn end(mut self, cursor: Cursor) -> Self {
        self.end = Some(cursor);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    fn matches_scope(&self, key: &Key) -> bool {
        key.kind() == self.kind
            && key.namespace() == self.namespace.as_deref()
            && self.ancestor.as_ref().map_or(true, |a| key.has_ancestor(a))
    }
}

/// Resumable position in an ordered query result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    position: Option<CursorPosition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CursorPosition {
    sort_values: Vec<Value>,
    key: Key,
}

impl Cursor {
    pub(crate) fn at(sort_values: Vec<Value>, key: Key) -> Self {
        Self {
            position: Some(CursorPosition { sort_values, key }),
        }
    }

    /// True for the beginning of the result set
    pub fn is_start(&self) -> bool {
        self.position.is_none()
    }

    /// Opaque string form; the start cursor encodes as the empty string
    pub fn encode(&self) -> String {
        match &self.position {
            None => String::new(),
            Some(_) => URL_SAFE_NO_PAD.encode(serde_json::to_vec(self).unwrap_or_default()),
        }
    }

    /// Parse a string produced by [`Cursor::encode`]
    pub fn decode(encoded: &str) -> Result<Cursor> {
        if encoded.is_empty() {
            return Ok(Cursor::default());
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| StoreError::InvalidCursor(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidCursor(e.to_string()))
    }
}

/// One entity selected by [`evaluate`], in result order
#[derive(Debug)]
pub(crate) struct Hit<'a> {
    pub key: &'a Key,
    pub properties: &'a PropertyList,
    pub sort_values: Vec<Value>,
}

impl Hit<'_> {
    pub fn cursor(&self) -> Cursor {
        Cursor::at(self.sort_values.clone(), self.key.clone())
    }
}

fn field_value<'a>(key: &'a Key, properties: &'a PropertyList, field: &str) -> Option<Value> {
    if field == KEY_FIELD {
        Some(Value::Key(key.clone()))
    } else {
        find(properties, field).cloned()
    }
}

fn matches_filter(key: &Key, properties: &PropertyList, filter: &Filter) -> bool {
    match field_value(key, properties, &filter.field) {
        None => false,
        Some(Value::Array(items)) => items.iter().any(|v| filter.op.matches(v, &filter.value)),
        Some(v) => filter.op.matches(&v, &filter.value),
    }
}

fn compare_position(orders: &[Order], a: (&[Value], &Key), b: (&[Value], &Key)) -> Ordering {
    for (i, order) in orders.iter().enumerate() {
        let ord = match (a.0.get(i), b.0.get(i)) {
            (Some(x), Some(y)) => x.total_cmp(y),
            _ => Ordering::Equal,
        };
        let ord = if order.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.1.cmp(b.1)
}

fn cursor_position<'c>(orders: &[Order], cursor: &'c Option<Cursor>) -> Result<Option<&'c CursorPosition>> {
    match cursor.as_ref().and_then(|c| c.position.as_ref()) {
        Some(pos) if pos.sort_values.len() != orders.len() => Err(StoreError::InvalidCursor(format!(
            "cursor has {} sort values, query has {} orders",
            pos.sort_values.len(),
            orders.len()
        ))),
        other => Ok(other),
    }
}

/// Select, order and window entities for a query
pub(crate) fn evaluate<'a, I>(query: &Query, entries: I) -> Result<Vec<Hit<'a>>>
where
    I: IntoIterator<Item = (&'a Key, &'a PropertyList)>,
{
    let start = cursor_position(&query.orders, &query.start)?;
    let end = cursor_position(&query.orders, &query.end)?;

    let mut hits: Vec<Hit<'a>> = entries
        .into_iter()
        .filter(|(key, props)| {
            query.matches_scope(key) && query.filters.iter().all(|f| matches_filter(key, props, f))
        })
        .filter_map(|(key, properties)| {
            let sort_values = query
                .orders
                .iter()
                .map(|o| field_value(key, properties, &o.field))
                .collect::<Option<Vec<_>>>()?;
            Some(Hit {
                key,
                properties,
                sort_values,
            })
        })
        .collect();

    hits.sort_by(|a, b| compare_position(&query.orders, (&a.sort_values[..], a.key), (&b.sort_values[..], b.key)));

    let hits = hits
        .into_iter()
        .filter(|h| {
            start.map_or(true, |s| {
                compare_position(&query.orders, (&h.sort_values[..], h.key), (&s.sort_values[..], &s.key))
                    == Ordering::Greater
            })
        })
        .filter(|h| {
            end.map_or(true, |e| {
                compare_position(&query.orders, (&h.sort_values[..], h.key), (&e.sort_values[..], &e.key))
                    != Ordering::Greater
            })
        })
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    fn entry(name: &str, age: i64, tags: &[&str]) -> (Key, PropertyList) {
        (
            Key::name("Person", name),
            vec![
                Property::new("Age", age),
                Property::new("Tags", tags.iter().map(|t| Value::from(*t)).collect::<Vec<_>>()),
            ],
        )
    }

    fn people() -> Vec<(Key, PropertyList)> {
        vec![
            entry("carol", 41, &["admin"]),
            entry("alice", 30, &["dev", "admin"]),
            entry("bob", 25, &["dev"]),
            (Key::name("Person", "dave"), vec![]),
            (Key::name("Robot", "r2"), vec![Property::new("Age", 50i64)]),
        ]
    }

    fn names(hits: &[Hit<'_>]) -> Vec<String> {
        hits.iter().map(|h| h.key.name_id().unwrap_or_default().to_string()).collect()
    }

    #[test]
    fn test_default_order_is_by_key() {
        let data = people();
        let hits = evaluate(&Query::new("Person"), data.iter().map(|(k, p)| (k, p))).unwrap();
        assert_eq!(names(&hits), vec!["alice", "bob", "carol", "dave"]);
    }

    #[test]
    fn test_filter_and_descending_order() {
        let data = people();
        let query = Query::new("Person").filter_str("Age >=", 30i64).unwrap().order("-Age");
        let hits = evaluate(&query, data.iter().map(|(k, p)| (k, p))).unwrap();
        assert_eq!(names(&hits), vec!["carol", "alice"]);
    }

    #[test]
    fn test_missing_order_field_excludes_entity() {
        let data = people();
        let hits = evaluate(&Query::new("Person").order("Age"), data.iter().map(|(k, p)| (k, p))).unwrap();
        assert_eq!(names(&hits), vec!["bob", "alice", "carol"]);
    }

    #[test]
    fn test_array_equality_matches_any_element() {
        let data = people();
        let query = Query::new("Person").filter("Tags", Operator::Eq, "admin");
        let hits = evaluate(&query, data.iter().map(|(k, p)| (k, p))).unwrap();
        assert_eq!(names(&hits), vec!["alice", "carol"]);
    }

    #[test]
    fn test_cursor_resumes_after_position() {
        let data = people();
        let query = Query::new("Person").order("Age");
        let first = evaluate(&query.clone().limit(1), data.iter().map(|(k, p)| (k, p))).unwrap();
        let cursor = Cursor::decode(&first[0].cursor().encode()).unwrap();
        let rest = evaluate(&query.start(cursor), data.iter().map(|(k, p)| (k, p))).unwrap();
        assert_eq!(names(&rest), vec!["alice", "carol"]);
    }

    #[test]
    fn test_bad_inputs() {
        assert!(Query::new("Person").filter_str("Age", 1i64).is_err());
        assert!(Query::new("Person").filter_str("Age ~", 1i64).is_err());
        assert!(matches!(Cursor::decode("%%%"), Err(StoreError::InvalidCursor(_))));
        assert!(Cursor::decode("").unwrap().is_start());
    }
}
