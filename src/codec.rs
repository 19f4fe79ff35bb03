//! Structural conversion between typed values and property lists
//!
//! Any `Serialize` struct maps to a property list, one property per field.
//! Field names follow serde, so `#[serde(rename = "...")]` chooses the stored
//! name and `#[serde(flatten)]` inlines embedded structs such as `EntityBase`.
//!
//! `DateTime<Utc>` fields are stored as [`Value::Timestamp`], so filters and
//! orders on them compare by time. Any string in chrono's canonical UTC form
//! is read as a timestamp; it loads back into a `String` field unchanged.

use crate::error::{Result, StoreError};
use crate::property::{parse_canonical_timestamp, Property, PropertyList, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Convert a struct into a property list
pub fn save_struct<T: Serialize + ?Sized>(value: &T) -> Result<PropertyList> {
    match serde_json::to_value(value)? {
        JsonValue::Object(map) => map
            .into_iter()
            .map(|(name, v)| {
                Value::from_json(v)
                    .map(|value| Property { name, value: typed(value) })
                    .map_err(|e| StoreError::SerializationError(format!("field conversion failed: {}", e)))
            })
            .collect(),
        other => Err(StoreError::SerializationError(format!(
            "entity must serialize to a struct, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Rebuild a struct from a property list
pub fn load_struct<T: DeserializeOwned>(properties: &[Property]) -> Result<T> {
    let mut map = serde_json::Map::with_capacity(properties.len());
    for property in properties {
        map.insert(property.name.clone(), property.value.to_json()?);
    }
    serde_json::from_value(JsonValue::Object(map))
        .map_err(|e| StoreError::SerializationError(format!("cannot load entity: {}", e)))
}

fn typed(value: Value) -> Value {
    match value {
        Value::String(s) => match parse_canonical_timestamp(&s) {
            Some(t) => Value::Timestamp(t),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(typed).collect()),
        Value::Entity(props) => Value::Entity(
            props
                .into_iter()
                .map(|p| Property {
                    name: p.name,
                    value: typed(p.value),
                })
                .collect(),
        ),
        other => other,
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
