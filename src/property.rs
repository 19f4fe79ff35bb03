//! Property lists: the canonical serialized form of an entity
//!
//! A property list is an ordered sequence of named values. It is what the
//! codec produces, what the cache stores and what the backing store persists.

use crate::error::{Result, StoreError};
use crate::key::Key;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// A single property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
    Key(Key),
    Array(Vec<Value>),
    /// Nested entity
    Entity(PropertyList),
}

/// A named value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered list of properties
pub type PropertyList = Vec<Property>;

/// Look up a property by name
pub fn find<'a>(properties: &'a [Property], name: &str) -> Option<&'a Value> {
    properties.iter().find(|p| p.name == name).map(|p| &p.value)
}

/// Size in bytes of the serialized form used by caches
pub fn encoded_size(properties: &[Property]) -> usize {
    serde_json::to_vec(properties).map(|b| b.len()).unwrap_or(usize::MAX)
}

/// Serialize a property list to opaque bytes
pub fn to_bytes(properties: &[Property]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(properties)?)
}

/// Deserialize a property list produced by [`to_bytes`]
pub fn from_bytes(bytes: &[u8]) -> Result<PropertyList> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Parse a timestamp written in chrono's serde form (`2024-05-01T12:00:00.250Z`).
/// Only the canonical UTC rendering is accepted, so reformatting the result
/// reproduces `s` exactly.
pub(crate) fn parse_canonical_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.len() < 20 || !s.ends_with('Z') {
        return None;
    }
    let t = DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc);
    (t.to_rfc3339_opts(SecondsFormat::AutoSi, true) == s).then_some(t)
}

impl Value {
    /// Rank of the value type in the backing store's cross-type ordering
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Timestamp(_) => 2,
            Value::Bool(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
            Value::Key(_) => 6,
            Value::Array(_) => 7,
            Value::Entity(_) => 8,
        }
    }

    /// Total order over values of any type
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::String(b)) => match DateTime::parse_from_rfc3339(b) {
                Ok(b) => a.cmp(&b.with_timezone(&Utc)),
                Err(_) => self.type_rank().cmp(&other.type_rank()),
            },
            (Value::String(_), Value::Timestamp(_)) => other.total_cmp(self).reverse(),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Key(a), Value::Key(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Entity(a), Value::Entity(b)) => a.len().cmp(&b.len()),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Numeric value as f64, for aggregation
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert from the structural JSON form
    pub fn from_json(json: JsonValue) -> Result<Value> {
        Ok(match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if n.is_u64() {
                    return Err(StoreError::SerializationError(format!(
                        "integer {} does not fit in a signed 64-bit property",
                        n
                    )));
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            JsonValue::Object(map) => Value::Entity(
                map.into_iter()
                    .map(|(name, v)| Ok(Property { name, value: Value::from_json(v)? }))
                    .collect::<Result<PropertyList>>()?,
            ),
        })
    }

    /// Convert to the structural JSON form
    pub fn to_json(&self) -> Result<JsonValue> {
        Ok(match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| StoreError::SerializationError(format!("non-finite float {}", f)))?,
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Timestamp(t) => JsonValue::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Bytes(b) => JsonValue::from(b.clone()),
            Value::Key(k) => serde_json::to_value(k)?,
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect::<Result<Vec<_>>>()?),
            Value::Entity(props) => {
                let mut map = serde_json::Map::with_capacity(props.len());
                for p in props {
                    map.insert(p.name.clone(), p.value.to_json()?);
                }
                JsonValue::Object(map)
            }
        })
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Key> for Value {
    fn from(v: Key) -> Self {
        Value::Key(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cross_type_ordering() {
        assert_eq!(Value::Null.total_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(Value::Int(1).total_cmp(&Value::String("0".into())), Ordering::Less);
        assert_eq!(
            Value::String("a".into()).total_cmp(&Value::String("b".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_timestamps_order_by_time() {
        let early: DateTime<Utc> = "2024-05-01T12:00:00.123456Z".parse().unwrap();
        let late: DateTime<Utc> = "2024-05-01T12:00:00.123500Z".parse().unwrap();
        assert_eq!(Value::from(early).total_cmp(&Value::from(late)), Ordering::Less);
        // As strings the shorter fraction sorts after the longer one.
        assert_eq!(
            Value::from(early).total_cmp(&Value::from("2024-05-01T12:00:00.1235Z")),
            Ordering::Less
        );
        assert_eq!(
            Value::from("2025-01-01T00:00:00Z").total_cmp(&Value::from(late)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_canonical_timestamp_parsing() {
        let t = parse_canonical_timestamp("2024-05-01T12:00:00.250Z").unwrap();
        assert_eq!(t.to_rfc3339_opts(SecondsFormat::AutoSi, true), "2024-05-01T12:00:00.250Z");
        assert!(parse_canonical_timestamp("2024-05-01T12:00:00.25Z").is_none());
        assert!(parse_canonical_timestamp("2024-05-01T14:00:00+02:00").is_none());
        assert!(parse_canonical_timestamp("hello").is_none());
    }

    #[test]
    fn test_json_bridge() {
        let value = Value::from_json(json!({"Name": "x", "Count": 3, "Tags": ["a", "b"], "Ratio": 0.5})).unwrap();
        match &value {
            Value::Entity(props) => {
                assert_eq!(find(props, "Count"), Some(&Value::Int(3)));
                assert_eq!(find(props, "Ratio"), Some(&Value::Float(0.5)));
                assert_eq!(
                    find(props, "Tags"),
                    Some(&Value::Array(vec![Value::from("a"), Value::from("b")]))
                );
            }
            other => panic!("expected entity, got {:?}", other),
        }
        assert_eq!(value.to_json().unwrap()["Name"], json!("x"));
    }

    #[test]
    fn test_unsigned_overflow_is_an_error() {
        let err = Value::from_json(json!(u64::MAX)).unwrap_err();
        assert!(matches!(err, StoreError::SerializationError(_)));
    }

    #[test]
    fn test_bytes_roundtrip_through_cache_encoding() {
        let props = vec![Property::new("Value", "x"), Property::new("N", 1i64)];
        let bytes = to_bytes(&props).unwrap();
        assert_eq!(bytes.len(), encoded_size(&props));
        assert_eq!(from_bytes(&bytes).unwrap(), props);
    }
}
