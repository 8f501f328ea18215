//! State packages and properties.

use std::collections::BTreeMap;

use devlink_core::{Error, NotFoundKind, Result};
use devlink_schema::{PropSchema, PropValue, ValueMap};

/// A typed device-state property.
#[derive(Debug, Clone, PartialEq)]
pub struct StateProperty {
    schema: PropSchema,
    value: Option<PropValue>,
    /// Source that defined the property
    source: String,
}

impl StateProperty {
    /// A property starts out holding its schema default, if any.
    pub fn new(schema: PropSchema, source: impl Into<String>) -> Self {
        Self {
            value: schema.default.clone(),
            schema,
            source: source.into(),
        }
    }

    pub fn schema(&self) -> &PropSchema {
        &self.schema
    }

    pub fn value(&self) -> Option<&PropValue> {
        self.value.as_ref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Validate and store `value`; returns the normalized value.
    ///
    /// `field` names the property in validation errors.
    pub fn set(&mut self, field: &str, value: &PropValue) -> Result<PropValue> {
        let normalized = self.validate(field, value)?;
        self.value = Some(normalized.clone());
        Ok(normalized)
    }

    pub fn validate(&self, field: &str, value: &PropValue) -> Result<PropValue> {
        Ok(self.schema.validate(value).map_err(|e| e.in_field(field))?)
    }
}

/// A named group of state properties, such as `base`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatePackage {
    name: String,
    properties: BTreeMap<String, StateProperty>,
}

impl StatePackage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(&self, name: &str) -> Option<&StateProperty> {
        self.properties.get(name)
    }

    pub fn property_mut(&mut self, name: &str) -> Result<&mut StateProperty> {
        let package = &self.name;
        self.properties
            .get_mut(name)
            .ok_or_else(|| Error::not_found(NotFoundKind::Property, format!("{}.{}", package, name)))
    }

    pub fn properties(&self) -> &BTreeMap<String, StateProperty> {
        &self.properties
    }

    /// Add a property definition. Redefinition is a conflict.
    pub fn define(&mut self, name: impl Into<String>, property: StateProperty) -> Result<()> {
        let name = name.into();
        if let Some(existing) = self.properties.get(&name) {
            return Err(Error::Conflict {
                name: format!("{}.{}", self.name, name),
                category: property.source.clone(),
                existing: existing.source.clone(),
            });
        }
        self.properties.insert(name, property);
        Ok(())
    }

    /// Current values; properties that were never set are omitted.
    pub fn values(&self) -> ValueMap {
        self.properties
            .iter()
            .filter_map(|(name, prop)| prop.value.clone().map(|v| (name.clone(), v)))
            .collect()
    }
}
