//! Schema types and validation.

use std::collections::BTreeMap;

use devlink_core::{ValidationError, Violation};

use crate::value::{PropValue, ValueMap, ValueType};

/// Type and constraints of a single property.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Integer {
        minimum: Option<i64>,
        maximum: Option<i64>,
        allowed: Option<Vec<i64>>,
    },
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
        allowed: Option<Vec<f64>>,
    },
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
        allowed: Option<Vec<String>>,
    },
    Boolean {
        allowed: Option<Vec<bool>>,
    },
    Array {
        items: Option<Box<PropSchema>>,
    },
    Object {
        schema: ObjectSchema,
    },
}

impl TypeSpec {
    /// Unconstrained spec for a type.
    pub fn unconstrained(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Integer => Self::Integer {
                minimum: None,
                maximum: None,
                allowed: None,
            },
            ValueType::Number => Self::Number {
                minimum: None,
                maximum: None,
                allowed: None,
            },
            ValueType::String => Self::String {
                min_length: None,
                max_length: None,
                allowed: None,
            },
            ValueType::Boolean => Self::Boolean { allowed: None },
            ValueType::Array => Self::Array { items: None },
            ValueType::Object => Self::Object {
                schema: ObjectSchema::default(),
            },
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Integer { .. } => ValueType::Integer,
            Self::Number { .. } => ValueType::Number,
            Self::String { .. } => ValueType::String,
            Self::Boolean { .. } => ValueType::Boolean,
            Self::Array { .. } => ValueType::Array,
            Self::Object { .. } => ValueType::Object,
        }
    }
}

/// Schema of one property: type, constraints, default and required-ness.
#[derive(Debug, Clone, PartialEq)]
pub struct PropSchema {
    pub spec: TypeSpec,
    pub default: Option<PropValue>,
    pub required: bool,
}

impl PropSchema {
    /// Optional property with the given spec and no default.
    pub fn new(spec: TypeSpec) -> Self {
        Self {
            spec,
            default: None,
            required: false,
        }
    }

    pub fn of_type(value_type: ValueType) -> Self {
        Self::new(TypeSpec::unconstrained(value_type))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<PropValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn value_type(&self) -> ValueType {
        self.spec.value_type()
    }

    /// Validate a value, returning its normalized form.
    ///
    /// Normalization widens integers supplied for number schemas and fills
    /// defaults of absent optional object fields.
    pub fn validate(&self, value: &PropValue) -> Result<PropValue, ValidationError> {
        match (&self.spec, value) {
            (
                TypeSpec::Integer {
                    minimum,
                    maximum,
                    allowed,
                },
                PropValue::Integer(v),
            ) => {
                check_range(*v, *minimum, *maximum)?;
                check_allowed(v, allowed.as_deref())?;
                Ok(PropValue::Integer(*v))
            }
            (
                TypeSpec::Number {
                    minimum,
                    maximum,
                    allowed,
                },
                PropValue::Integer(_) | PropValue::Number(_),
            ) => {
                let v = value.as_f64().unwrap_or_default();
                check_range(v, *minimum, *maximum)?;
                check_allowed(&v, allowed.as_deref())?;
                Ok(PropValue::Number(v))
            }
            (
                TypeSpec::String {
                    min_length,
                    max_length,
                    allowed,
                },
                PropValue::String(s),
            ) => {
                let len = s.chars().count();
                if min_length.is_some_and(|min| len < min) || max_length.is_some_and(|max| len > max)
                {
                    return Err(ValidationError::new(
                        "",
                        Violation::Length,
                        format!(
                            "length {} outside [{}, {}]",
                            len,
                            min_length.map_or("-".to_string(), |v| v.to_string()),
                            max_length.map_or("-".to_string(), |v| v.to_string()),
                        ),
                    ));
                }
                check_allowed(s, allowed.as_deref())?;
                Ok(value.clone())
            }
            (TypeSpec::Boolean { allowed }, PropValue::Boolean(b)) => {
                check_allowed(b, allowed.as_deref())?;
                Ok(value.clone())
            }
            (TypeSpec::Array { items }, PropValue::Array(values)) => match items {
                Some(item_schema) => values
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item_schema.validate(item).map_err(|e| e.at_index(i)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(PropValue::Array),
                None => Ok(value.clone()),
            },
            (TypeSpec::Object { schema }, PropValue::Object(map)) => {
                schema.validate(map).map(PropValue::Object)
            }
            (spec, _) => Err(ValidationError::type_mismatch(
                spec.value_type().name(),
                value.type_name(),
            )),
        }
    }

    /// Check that the constraint set is internally consistent.
    ///
    /// Bounds must be ordered, enums non-empty and within bounds, and a
    /// declared default must itself validate.
    pub fn check(&self) -> Result<(), String> {
        match &self.spec {
            TypeSpec::Integer {
                minimum,
                maximum,
                allowed,
            } => {
                check_bounds_order(*minimum, *maximum)?;
                check_enum(self, allowed.as_ref().map(|a| {
                    a.iter().map(|v| PropValue::Integer(*v)).collect::<Vec<_>>()
                }))?;
            }
            TypeSpec::Number {
                minimum,
                maximum,
                allowed,
            } => {
                check_bounds_order(*minimum, *maximum)?;
                check_enum(self, allowed.as_ref().map(|a| {
                    a.iter().map(|v| PropValue::Number(*v)).collect::<Vec<_>>()
                }))?;
            }
            TypeSpec::String {
                min_length,
                max_length,
                allowed,
            } => {
                check_bounds_order(*min_length, *max_length)?;
                check_enum(self, allowed.as_ref().map(|a| {
                    a.iter().cloned().map(PropValue::String).collect::<Vec<_>>()
                }))?;
            }
            TypeSpec::Boolean { allowed } => {
                check_enum(self, allowed.as_ref().map(|a| {
                    a.iter().map(|v| PropValue::Boolean(*v)).collect::<Vec<_>>()
                }))?;
            }
            TypeSpec::Array { items } => {
                if let Some(items) = items {
                    items.check().map_err(|e| format!("items: {}", e))?;
                }
            }
            TypeSpec::Object { schema } => schema.check()?,
        }

        if let Some(default) = &self.default {
            self.validate(default)
                .map_err(|e| format!("default value does not satisfy constraints: {}", e))?;
        }
        Ok(())
    }
}

/// Schema of an object: named properties and whether others are allowed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    properties: BTreeMap<String, PropSchema>,
    additional_properties: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a property.
    pub fn with_property(mut self, name: impl Into<String>, prop: PropSchema) -> Self {
        self.properties.insert(name.into(), prop);
        self
    }

    pub fn with_additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = allowed;
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropSchema> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, PropSchema> {
        &self.properties
    }

    pub fn additional_properties(&self) -> bool {
        self.additional_properties
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Inheritance merge: parent properties copied, then overridden by the
    /// child's properties of the same name. Extra properties stay allowed if
    /// either side allows them.
    pub fn extend(parent: &ObjectSchema, child: &ObjectSchema) -> ObjectSchema {
        let mut properties = parent.properties.clone();
        for (name, prop) in &child.properties {
            properties.insert(name.clone(), prop.clone());
        }
        ObjectSchema {
            properties,
            additional_properties: parent.additional_properties || child.additional_properties,
        }
    }

    /// Validate an object, returning it with defaults filled in.
    pub fn validate(&self, value: &ValueMap) -> Result<ValueMap, ValidationError> {
        let mut out = ValueMap::new();

        for (name, prop) in &self.properties {
            match value.get(name) {
                Some(v) => {
                    let normalized = prop.validate(v).map_err(|e| e.in_field(name))?;
                    out.insert(name.clone(), normalized);
                }
                None if prop.required => {
                    return Err(ValidationError::new(
                        name.as_str(),
                        Violation::Missing,
                        "required parameter missing",
                    ));
                }
                None => {
                    if let Some(default) = &prop.default {
                        let normalized = prop.validate(default).map_err(|e| e.in_field(name))?;
                        out.insert(name.clone(), normalized);
                    }
                }
            }
        }

        for (name, v) in value {
            if self.properties.contains_key(name) {
                continue;
            }
            if !self.additional_properties {
                return Err(ValidationError::new(
                    name.as_str(),
                    Violation::Unknown,
                    "unknown property",
                ));
            }
            out.insert(name.clone(), v.clone());
        }

        Ok(out)
    }

    /// Check every property's constraint set.
    pub fn check(&self) -> Result<(), String> {
        for (name, prop) in &self.properties {
            prop.check().map_err(|e| format!("{}: {}", name, e))?;
        }
        Ok(())
    }
}

fn check_range<T: PartialOrd + std::fmt::Display + Copy>(
    v: T,
    minimum: Option<T>,
    maximum: Option<T>,
) -> Result<(), ValidationError> {
    if let Some(min) = minimum {
        if v < min {
            return Err(ValidationError::new(
                "",
                Violation::OutOfRange,
                format!("value {} is less than minimum {}", v, min),
            ));
        }
    }
    if let Some(max) = maximum {
        if v > max {
            return Err(ValidationError::new(
                "",
                Violation::OutOfRange,
                format!("value {} is greater than maximum {}", v, max),
            ));
        }
    }
    Ok(())
}

fn check_allowed<T: PartialEq + std::fmt::Debug>(
    v: &T,
    allowed: Option<&[T]>,
) -> Result<(), ValidationError> {
    match allowed {
        Some(list) if !list.contains(v) => Err(ValidationError::new(
            "",
            Violation::NotAllowed,
            format!("value {:?} is not one of {:?}", v, list),
        )),
        _ => Ok(()),
    }
}

fn check_bounds_order<T: PartialOrd + std::fmt::Display>(
    min: Option<T>,
    max: Option<T>,
) -> Result<(), String> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => {
            Err(format!("minimum {} is greater than maximum {}", min, max))
        }
        _ => Ok(()),
    }
}

fn check_enum(prop: &PropSchema, allowed: Option<Vec<PropValue>>) -> Result<(), String> {
    let Some(allowed) = allowed else {
        return Ok(());
    };
    if allowed.is_empty() {
        return Err("enum must not be empty".to_string());
    }
    // Each allowed value must pass the remaining constraints.
    for value in &allowed {
        prop.validate(value)
            .map_err(|e| format!("enum value {:?} is unsatisfiable: {}", value, e.reason))?;
    }
    Ok(())
}
