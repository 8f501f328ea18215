//! Command definitions.

use devlink_core::{Error, Result};
use devlink_schema::ObjectSchema;
use serde_json::{Map, Value};

const SECTIONS: &[&str] = &["parameters", "progress", "results"];

/// One command's schemas and the category it was loaded from.
///
/// Immutable once loaded; the dictionary hands out shared references.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDefinition {
    category: String,
    parameters: ObjectSchema,
    progress: Option<ObjectSchema>,
    results: Option<ObjectSchema>,
}

impl CommandDefinition {
    pub fn new(category: impl Into<String>, parameters: ObjectSchema) -> Self {
        Self {
            category: category.into(),
            parameters,
            progress: None,
            results: None,
        }
    }

    pub fn with_progress(mut self, progress: ObjectSchema) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_results(mut self, results: ObjectSchema) -> Self {
        self.results = Some(results);
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn parameters(&self) -> &ObjectSchema {
        &self.parameters
    }

    /// Progress schema; `None` accepts any object.
    pub fn progress(&self) -> Option<&ObjectSchema> {
        self.progress.as_ref()
    }

    /// Result schema; `None` accepts any object.
    pub fn results(&self) -> Option<&ObjectSchema> {
        self.results.as_ref()
    }

    /// Parse `{parameters?, progress?, results?}`.
    ///
    /// With a `base` definition each section is parsed on top of the base's
    /// section, and sections the definition omits are inherited.
    pub fn from_json(
        category: &str,
        json: &Value,
        base: Option<&CommandDefinition>,
    ) -> Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| Error::Parse("command definition must be a JSON object".into()))?;
        if let Some(key) = obj.keys().find(|k| !SECTIONS.contains(&k.as_str())) {
            return Err(Error::Parse(format!("unknown command definition key '{}'", key)));
        }

        let parameters = match obj.get("parameters") {
            Some(def) => ObjectSchema::from_json_with_parent(def, base.map(|b| &b.parameters))
                .map_err(|e| Error::load("parameters", e))?,
            None => base.map(|b| b.parameters.clone()).unwrap_or_default(),
        };
        let progress = parse_optional(obj, "progress", base.and_then(|b| b.progress.as_ref()))?;
        let results = parse_optional(obj, "results", base.and_then(|b| b.results.as_ref()))?;

        Ok(Self {
            category: category.to_string(),
            parameters,
            progress,
            results,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("parameters".to_string(), self.parameters.to_json());
        if let Some(progress) = &self.progress {
            obj.insert("progress".to_string(), progress.to_json());
        }
        if let Some(results) = &self.results {
            obj.insert("results".to_string(), results.to_json());
        }
        Value::Object(obj)
    }
}

fn parse_optional(
    obj: &Map<String, Value>,
    section: &str,
    base: Option<&ObjectSchema>,
) -> Result<Option<ObjectSchema>> {
    match obj.get(section) {
        Some(def) => ObjectSchema::from_json_with_parent(def, base)
            .map(Some)
            .map_err(|e| Error::load(section, e)),
        None => Ok(base.cloned()),
    }
}

/// Names a vendor extension adds to a standard command section.
///
/// Returns the first property of `json[section]` that is neither defined by
/// `base` nor prefixed with `_`.
pub(crate) fn find_unprefixed_addition(
    json: &Value,
    base: &CommandDefinition,
) -> Option<(String, String)> {
    for section in SECTIONS {
        let Some(props) = json.get(*section).and_then(Value::as_object) else {
            continue;
        };
        let base_schema = match *section {
            "parameters" => Some(&base.parameters),
            "progress" => base.progress.as_ref(),
            _ => base.results.as_ref(),
        };
        for name in props.keys() {
            let inherited = base_schema.is_some_and(|s| s.property(name).is_some());
            if !inherited && !name.starts_with('_') {
                return Some((section.to_string(), name.clone()));
            }
        }
    }
    None
}
