//! JSON definition format for schemas.
//!
//! A property definition is one of:
//!
//! ```json
//! "integer"                                   // type name
//! ["_withKick", "_plain"]                     // enum shorthand
//! {"type": "integer", "minimum": 0, "maximum": 100, "isRequired": true}
//! ```
//!
//! When `type` is omitted it is inferred from the other keys. A property
//! parsed against a base property (inheritance) starts from the base's
//! constraints and only overrides the keys it states.

use devlink_core::{Error, Result};
use serde_json::{Map, Value};

use crate::schema::{ObjectSchema, PropSchema, TypeSpec};
use crate::value::{json_type_name, PropValue, ValueType};

const KNOWN_KEYS: &[&str] = &[
    "type",
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "enum",
    "default",
    "isRequired",
    "properties",
    "additionalProperties",
    "items",
];

impl ObjectSchema {
    /// Parse a `{name: property-definition}` object.
    pub fn from_json(json: &Value) -> Result<ObjectSchema> {
        Self::from_json_with_parent(json, None)
    }

    /// Parse against a parent schema.
    ///
    /// Properties named by both refine the parent's definition; parent
    /// properties not restated are inherited unchanged.
    pub fn from_json_with_parent(json: &Value, parent: Option<&ObjectSchema>) -> Result<ObjectSchema> {
        let map = json.as_object().ok_or_else(|| {
            Error::Parse(format!(
                "schema must be a JSON object, got {}",
                json_type_name(json)
            ))
        })?;

        let mut child = ObjectSchema::new();
        for (name, def) in map {
            let base = parent.and_then(|p| p.property(name));
            let prop = PropSchema::from_json(def, base).map_err(|e| Error::load(name, e))?;
            child = child.with_property(name, prop);
        }

        Ok(match parent {
            Some(parent) => ObjectSchema::extend(parent, &child),
            None => child,
        })
    }

    /// Render as a `{name: property-definition}` object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.properties()
                .iter()
                .map(|(name, prop)| (name.clone(), prop.to_json()))
                .collect(),
        )
    }
}

impl PropSchema {
    /// Parse a property definition, optionally refining `base`.
    pub fn from_json(json: &Value, base: Option<&PropSchema>) -> Result<PropSchema> {
        let mut prop = match json {
            Value::String(name) => {
                let value_type = ValueType::from_name(name)
                    .ok_or_else(|| Error::Parse(format!("unknown type '{}'", name)))?;
                match base {
                    Some(base) => {
                        ensure_same_type(base, value_type)?;
                        base.clone()
                    }
                    None => PropSchema::of_type(value_type).required(),
                }
            }
            Value::Array(items) => {
                let mut obj = Map::new();
                obj.insert("enum".to_string(), Value::Array(items.clone()));
                parse_object(&obj, base)?
            }
            Value::Object(obj) => parse_object(obj, base)?,
            other => {
                return Err(Error::Parse(format!(
                    "invalid property definition of type {}",
                    json_type_name(other)
                )))
            }
        };

        prop.check().map_err(Error::Parse)?;
        prop.default = prop
            .default
            .as_ref()
            .map(|d| prop.validate(d))
            .transpose()
            .map_err(|e| Error::Parse(e.to_string()))?;
        Ok(prop)
    }

    /// Render in the full object form.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "type".to_string(),
            Value::String(self.value_type().name().to_string()),
        );
        match &self.spec {
            TypeSpec::Integer {
                minimum,
                maximum,
                allowed,
            } => {
                insert_opt(&mut obj, "minimum", minimum.map(Value::from));
                insert_opt(&mut obj, "maximum", maximum.map(Value::from));
                insert_opt(&mut obj, "enum", allowed.as_ref().map(|a| Value::from(a.clone())));
            }
            TypeSpec::Number {
                minimum,
                maximum,
                allowed,
            } => {
                insert_opt(&mut obj, "minimum", minimum.map(Value::from));
                insert_opt(&mut obj, "maximum", maximum.map(Value::from));
                insert_opt(&mut obj, "enum", allowed.as_ref().map(|a| Value::from(a.clone())));
            }
            TypeSpec::String {
                min_length,
                max_length,
                allowed,
            } => {
                insert_opt(&mut obj, "minLength", min_length.map(Value::from));
                insert_opt(&mut obj, "maxLength", max_length.map(Value::from));
                insert_opt(&mut obj, "enum", allowed.as_ref().map(|a| Value::from(a.clone())));
            }
            TypeSpec::Boolean { allowed } => {
                insert_opt(&mut obj, "enum", allowed.as_ref().map(|a| Value::from(a.clone())));
            }
            TypeSpec::Array { items } => {
                insert_opt(&mut obj, "items", items.as_ref().map(|i| i.to_json()));
            }
            TypeSpec::Object { schema } => {
                obj.insert("properties".to_string(), schema.to_json());
                if schema.additional_properties() {
                    obj.insert("additionalProperties".to_string(), Value::Bool(true));
                }
            }
        }
        insert_opt(&mut obj, "default", self.default.as_ref().map(PropValue::to_json));
        obj.insert("isRequired".to_string(), Value::Bool(self.required));
        Value::Object(obj)
    }
}

fn insert_opt(obj: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        obj.insert(key.to_string(), value);
    }
}

fn ensure_same_type(base: &PropSchema, value_type: ValueType) -> Result<()> {
    if base.value_type() != value_type {
        return Err(Error::Parse(format!(
            "cannot change inherited type {} to {}",
            base.value_type(),
            value_type
        )));
    }
    Ok(())
}

fn parse_object(obj: &Map<String, Value>, base: Option<&PropSchema>) -> Result<PropSchema> {
    if let Some(key) = obj.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
        return Err(Error::Parse(format!("unknown schema key '{}'", key)));
    }

    let value_type = match obj.get("type") {
        Some(Value::String(name)) => ValueType::from_name(name)
            .ok_or_else(|| Error::Parse(format!("unknown type '{}'", name)))?,
        Some(other) => {
            return Err(Error::Parse(format!(
                "'type' must be a string, got {}",
                json_type_name(other)
            )))
        }
        None => match base {
            Some(base) => base.value_type(),
            None => infer_type(obj)?,
        },
    };

    let mut prop = match base {
        Some(base) => {
            ensure_same_type(base, value_type)?;
            base.clone()
        }
        None => PropSchema::of_type(value_type),
    };

    apply_constraints(&mut prop.spec, obj, base)?;

    if let Some(default) = obj.get("default") {
        prop.default = Some(PropValue::from_json(default)?);
    }

    // Without an explicit flag, a property is required unless it has a default.
    prop.required = match obj.get("isRequired") {
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(Error::Parse(format!(
                "'isRequired' must be a boolean, got {}",
                json_type_name(other)
            )))
        }
        None if base.is_some() && !obj.contains_key("default") => prop.required,
        None => prop.default.is_none(),
    };

    Ok(prop)
}

fn infer_type(obj: &Map<String, Value>) -> Result<ValueType> {
    if obj.contains_key("properties") || obj.contains_key("additionalProperties") {
        return Ok(ValueType::Object);
    }
    if obj.contains_key("items") {
        return Ok(ValueType::Array);
    }
    if let Some(Value::Array(values)) = obj.get("enum") {
        if let Some(first) = values.first() {
            return Ok(PropValue::from_json(first)?.value_type());
        }
        return Err(Error::Parse("enum must not be empty".into()));
    }
    if let Some(default) = obj.get("default") {
        return Ok(PropValue::from_json(default)?.value_type());
    }
    if obj.contains_key("minLength") || obj.contains_key("maxLength") {
        return Ok(ValueType::String);
    }
    let bounds: Vec<&Value> = ["minimum", "maximum"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .collect();
    if !bounds.is_empty() {
        return Ok(if bounds.iter().all(|v| v.is_i64()) {
            ValueType::Integer
        } else {
            ValueType::Number
        });
    }
    Err(Error::Parse("unable to determine property type".into()))
}

fn apply_constraints(
    spec: &mut TypeSpec,
    obj: &Map<String, Value>,
    base: Option<&PropSchema>,
) -> Result<()> {
    let value_type = spec.value_type();
    let reject = |key: &str| -> Result<()> {
        if obj.contains_key(key) {
            return Err(Error::Parse(format!(
                "'{}' is not valid for type {}",
                key, value_type
            )));
        }
        Ok(())
    };

    match spec {
        TypeSpec::Integer {
            minimum,
            maximum,
            allowed,
        } => {
            reject("minLength")?;
            reject("maxLength")?;
            reject("items")?;
            reject("properties")?;
            reject("additionalProperties")?;
            if let Some(v) = obj.get("minimum") {
                *minimum = Some(as_i64(v, "minimum")?);
            }
            if let Some(v) = obj.get("maximum") {
                *maximum = Some(as_i64(v, "maximum")?);
            }
            if let Some(values) = enum_values(obj)? {
                *allowed = Some(
                    values
                        .iter()
                        .map(|v| as_i64(v, "enum"))
                        .collect::<Result<Vec<_>>>()?,
                );
            }
        }
        TypeSpec::Number {
            minimum,
            maximum,
            allowed,
        } => {
            reject("minLength")?;
            reject("maxLength")?;
            reject("items")?;
            reject("properties")?;
            reject("additionalProperties")?;
            if let Some(v) = obj.get("minimum") {
                *minimum = Some(as_f64(v, "minimum")?);
            }
            if let Some(v) = obj.get("maximum") {
                *maximum = Some(as_f64(v, "maximum")?);
            }
            if let Some(values) = enum_values(obj)? {
                *allowed = Some(
                    values
                        .iter()
                        .map(|v| as_f64(v, "enum"))
                        .collect::<Result<Vec<_>>>()?,
                );
            }
        }
        TypeSpec::String {
            min_length,
            max_length,
            allowed,
        } => {
            reject("minimum")?;
            reject("maximum")?;
            reject("items")?;
            reject("properties")?;
            reject("additionalProperties")?;
            if let Some(v) = obj.get("minLength") {
                *min_length = Some(as_usize(v, "minLength")?);
            }
            if let Some(v) = obj.get("maxLength") {
                *max_length = Some(as_usize(v, "maxLength")?);
            }
            if let Some(values) = enum_values(obj)? {
                *allowed = Some(
                    values
                        .iter()
                        .map(|v| {
                            v.as_str().map(str::to_string).ok_or_else(|| {
                                Error::Parse("string enum contains a non-string value".into())
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                );
            }
        }
        TypeSpec::Boolean { allowed } => {
            for key in [
                "minimum",
                "maximum",
                "minLength",
                "maxLength",
                "items",
                "properties",
                "additionalProperties",
            ] {
                reject(key)?;
            }
            if let Some(values) = enum_values(obj)? {
                *allowed = Some(
                    values
                        .iter()
                        .map(|v| {
                            v.as_bool().ok_or_else(|| {
                                Error::Parse("boolean enum contains a non-boolean value".into())
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                );
            }
        }
        TypeSpec::Array { items } => {
            for key in [
                "minimum",
                "maximum",
                "minLength",
                "maxLength",
                "enum",
                "properties",
                "additionalProperties",
            ] {
                reject(key)?;
            }
            if let Some(def) = obj.get("items") {
                let base_items = base.and_then(|b| match &b.spec {
                    TypeSpec::Array { items } => items.as_deref(),
                    _ => None,
                });
                let parsed =
                    PropSchema::from_json(def, base_items).map_err(|e| Error::load("items", e))?;
                *items = Some(Box::new(parsed));
            }
        }
        TypeSpec::Object { schema } => {
            for key in ["minimum", "maximum", "minLength", "maxLength", "enum", "items"] {
                reject(key)?;
            }
            if let Some(def) = obj.get("properties") {
                let base_schema = base.and_then(|b| match &b.spec {
                    TypeSpec::Object { schema } => Some(schema),
                    _ => None,
                });
                let additional = schema.additional_properties();
                *schema = ObjectSchema::from_json_with_parent(def, base_schema)?
                    .with_additional_properties(additional);
            }
            match obj.get("additionalProperties") {
                Some(Value::Bool(b)) => {
                    *schema = schema.clone().with_additional_properties(*b);
                }
                Some(other) => {
                    return Err(Error::Parse(format!(
                        "'additionalProperties' must be a boolean, got {}",
                        json_type_name(other)
                    )))
                }
                None => {}
            }
        }
    }
    Ok(())
}

fn enum_values(obj: &Map<String, Value>) -> Result<Option<&Vec<Value>>> {
    match obj.get("enum") {
        None => Ok(None),
        Some(Value::Array(values)) if values.is_empty() => {
            Err(Error::Parse("enum must not be empty".into()))
        }
        Some(Value::Array(values)) => Ok(Some(values)),
        Some(other) => Err(Error::Parse(format!(
            "'enum' must be an array, got {}",
            json_type_name(other)
        ))),
    }
}

fn as_i64(v: &Value, key: &str) -> Result<i64> {
    v.as_i64()
        .ok_or_else(|| Error::Parse(format!("'{}' expects an integer, got {}", key, v)))
}

fn as_f64(v: &Value, key: &str) -> Result<f64> {
    v.as_f64()
        .ok_or_else(|| Error::Parse(format!("'{}' expects a number, got {}", key, v)))
}

fn as_usize(v: &Value, key: &str) -> Result<usize> {
    v.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| Error::Parse(format!("'{}' expects a non-negative integer, got {}", key, v)))
}
