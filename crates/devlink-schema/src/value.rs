//! Typed property values.
//!
//! [`PropValue`] is the closed set of value types that flow through
//! command parameters, progress, results and device state.

use std::collections::BTreeMap;

use devlink_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object payload: property name to value, in name order.
pub type ValueMap = BTreeMap<String, PropValue>;

/// Type tag of a value or schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl ValueType {
    /// Name used in definitions and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Parse a type name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Integer(i64),
    Number(f64),
    String(String),
    Boolean(bool),
    Array(Vec<PropValue>),
    Object(ValueMap),
}

impl PropValue {
    /// Type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Integer(_) => ValueType::Integer,
            Self::Number(_) => ValueType::Number,
            Self::String(_) => ValueType::String,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Array(_) => ValueType::Array,
            Self::Object(_) => ValueType::Object,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen losslessly.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropValue]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ValueMap> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Convert from JSON. `null` has no counterpart and is rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Err(Error::Parse("null values are not supported".into())),
            Value::Bool(b) => Ok(Self::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Integer(i)),
                None => n
                    .as_f64()
                    .map(Self::Number)
                    .ok_or_else(|| Error::Parse(format!("unrepresentable number {}", n))),
            },
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>>>()
                .map(Self::Array),
            Value::Object(_) => map_from_json(value).map(Self::Object),
        }
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(v) => Value::from(*v),
            Self::Number(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(v) => Value::String(v.clone()),
            Self::Boolean(v) => Value::Bool(*v),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => map_to_json(map),
        }
    }
}

/// Convert a JSON object into a [`ValueMap`].
pub fn map_from_json(value: &Value) -> Result<ValueMap> {
    let object = value.as_object().ok_or_else(|| {
        Error::Parse(format!("expected a JSON object, got {}", json_type_name(value)))
    })?;
    let mut map = ValueMap::new();
    for (key, item) in object {
        let converted = PropValue::from_json(item)
            .map_err(|e| Error::Parse(format!("property '{}': {}", key, parse_message(e))))?;
        map.insert(key.clone(), converted);
    }
    Ok(map)
}

/// Convert a [`ValueMap`] into a JSON object.
pub fn map_to_json(map: &ValueMap) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_message(err: Error) -> String {
    match err {
        Error::Parse(msg) => msg,
        other => other.to_string(),
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<Vec<PropValue>> for PropValue {
    fn from(v: Vec<PropValue>) -> Self {
        Self::Array(v)
    }
}

impl From<ValueMap> for PropValue {
    fn from(v: ValueMap) -> Self {
        Self::Object(v)
    }
}
