//! Command dictionary.
//!
//! Merges per-category definition sources into one `package.command`
//! namespace. Each source is loaded all-or-nothing: every command is parsed
//! and checked for conflicts before any entry is inserted. Reloading a
//! category replaces everything it previously contributed.

use std::collections::BTreeMap;
use std::sync::Arc;

use devlink_core::{Error, JsonSource, NotFoundKind, Result};
use serde_json::{Map, Value};
use tracing::info;

use crate::definition::{find_unprefixed_addition, CommandDefinition};

/// Fully-qualified command name to definition.
#[derive(Debug, Clone, Default)]
pub struct CommandDictionary {
    definitions: BTreeMap<String, Arc<CommandDefinition>>,
}

impl CommandDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one category source, replacing the category's prior entries.
    ///
    /// The source body is `{package: {command: definition}}`. When `base` is
    /// given, standard packages (not starting with `_`) may only refine
    /// commands the base defines, and must prefix any property they add
    /// with `_`. A name already owned by another category fails the whole
    /// source with [`Error::Conflict`] and leaves the dictionary untouched.
    pub fn load_category(
        &mut self,
        source: &JsonSource,
        base: Option<&CommandDictionary>,
    ) -> Result<usize> {
        let category = source.name.as_str();
        let staged = parse_source(source, base).map_err(|e| Error::load(category, e))?;

        for name in staged.keys() {
            if let Some(existing) = self.definitions.get(name) {
                if existing.category() != category {
                    return Err(Error::Conflict {
                        name: name.clone(),
                        category: category.to_string(),
                        existing: existing.category().to_string(),
                    });
                }
            }
        }

        let replaced = self.remove_category(category);
        let count = staged.len();
        self.definitions.extend(staged);

        info!(
            category = "commands",
            source = category,
            commands = count,
            replaced,
            "Loaded command definitions"
        );
        Ok(count)
    }

    /// Drop every definition loaded from `category`. Returns how many.
    pub fn remove_category(&mut self, category: &str) -> usize {
        let before = self.definitions.len();
        self.definitions.retain(|_, def| def.category() != category);
        before - self.definitions.len()
    }

    pub fn find(&self, name: &str) -> Option<Arc<CommandDefinition>> {
        self.definitions.get(name).cloned()
    }

    /// Like [`find`](Self::find) but a miss is an error.
    pub fn get(&self, name: &str) -> Result<Arc<CommandDefinition>> {
        self.find(name)
            .ok_or_else(|| Error::not_found(NotFoundKind::Command, name))
    }

    /// All command names, sorted.
    pub fn all_names(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Render as `{package: {command: definition}}`.
    pub fn to_json(&self) -> Value {
        let mut packages: Map<String, Value> = Map::new();
        for (name, def) in &self.definitions {
            let (package, command) = name.split_once('.').unwrap_or((name.as_str(), ""));
            let entry = packages
                .entry(package.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(commands) = entry {
                commands.insert(command.to_string(), def.to_json());
            }
        }
        Value::Object(packages)
    }
}

fn parse_source(
    source: &JsonSource,
    base: Option<&CommandDictionary>,
) -> Result<BTreeMap<String, Arc<CommandDefinition>>> {
    let packages = source
        .value
        .as_object()
        .ok_or_else(|| Error::Parse("definition source must be a JSON object".into()))?;

    let mut staged = BTreeMap::new();
    for (package, commands) in packages {
        if package.is_empty() || package.contains('.') {
            return Err(Error::Parse(format!("invalid package name '{}'", package)));
        }
        let commands = commands.as_object().ok_or_else(|| {
            Error::Parse(format!("package '{}' must be a JSON object", package))
        })?;

        for (command, def) in commands {
            if command.is_empty() || command.contains('.') {
                return Err(Error::Parse(format!("invalid command name '{}'", command)));
            }
            let full_name = format!("{}.{}", package, command);
            let definition = parse_command(&source.name, package, &full_name, def, base)
                .map_err(|e| Error::load(&full_name, e))?;
            staged.insert(full_name, Arc::new(definition));
        }
    }
    Ok(staged)
}

fn parse_command(
    category: &str,
    package: &str,
    full_name: &str,
    def: &Value,
    base: Option<&CommandDictionary>,
) -> Result<CommandDefinition> {
    let Some(base) = base else {
        return CommandDefinition::from_json(category, def, None);
    };

    let base_def = base.find(full_name);
    if !package.starts_with('_') {
        let Some(base_def) = &base_def else {
            return Err(Error::not_found(NotFoundKind::Command, full_name));
        };
        if let Some((section, name)) = find_unprefixed_addition(def, base_def) {
            return Err(Error::Parse(format!(
                "{} property '{}' extends a standard command and must start with '_'",
                section, name
            )));
        }
    }
    CommandDefinition::from_json(category, def, base_def.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn robot_source(category: &str) -> JsonSource {
        JsonSource::new(
            category,
            json!({
                "robot": {
                    "jump": {
                        "parameters": {
                            "height": {"type": "integer", "minimum": 0, "maximum": 100},
                            "_jumpType": {"enum": ["_withKick", "_plain"], "default": "_plain"}
                        }
                    },
                    "_wave": {}
                }
            }),
        )
    }

    #[test]
    fn test_load_and_find() {
        let mut dict = CommandDictionary::new();
        assert_eq!(dict.load_category(&robot_source("robot"), None).unwrap(), 2);
        assert_eq!(dict.all_names(), vec!["robot._wave", "robot.jump"]);
        assert_eq!(dict.find("robot.jump").unwrap().category(), "robot");
        assert!(dict.find("robot.run").is_none());
        assert!(matches!(
            dict.get("robot.run"),
            Err(Error::NotFound {
                kind: NotFoundKind::Command,
                ..
            })
        ));
    }

    #[test]
    fn test_reload_replaces_category() {
        let mut dict = CommandDictionary::new();
        dict.load_category(&robot_source("robot"), None).unwrap();

        let smaller = JsonSource::new("robot", json!({"robot": {"jump": {}}}));
        dict.load_category(&smaller, None).unwrap();
        assert_eq!(dict.all_names(), vec!["robot.jump"]);
        assert!(dict.find("robot.jump").unwrap().parameters().is_empty());
    }

    #[test]
    fn test_bad_command_fails_whole_source() {
        let mut dict = CommandDictionary::new();
        let source = JsonSource::new(
            "mixed",
            json!({"a": {"good": {}, "bad": {"parameters": {"x": "widget"}}}}),
        );
        match dict.load_category(&source, None) {
            Err(Error::Load { name, reason }) => {
                assert_eq!(name, "mixed");
                assert!(matches!(*reason, Error::Load { ref name, .. } if name == "a.bad"));
            }
            other => panic!("expected load error, got {:?}", other),
        }
        assert!(dict.is_empty());
    }

    #[test]
    fn test_base_dictionary_rules() {
        let mut base = CommandDictionary::new();
        base.load_category(
            &JsonSource::new(
                "standard",
                json!({"robot": {"jump": {"parameters": {"height": "integer"}}}}),
            ),
            None,
        )
        .unwrap();

        let mut dict = CommandDictionary::new();

        let unknown = JsonSource::new("vendor", json!({"robot": {"fly": {}}}));
        assert!(dict.load_category(&unknown, Some(&base)).is_err());

        let unprefixed = JsonSource::new(
            "vendor",
            json!({"robot": {"jump": {"parameters": {"speed": "integer"}}}}),
        );
        assert!(dict.load_category(&unprefixed, Some(&base)).is_err());

        let vendor = JsonSource::new(
            "vendor",
            json!({
                "robot": {"jump": {"parameters": {"_spin": "boolean"}}},
                "_acme": {"dance": {}}
            }),
        );
        dict.load_category(&vendor, Some(&base)).unwrap();
        let jump = dict.find("robot.jump").unwrap();
        assert!(jump.parameters().property("height").is_some());
        assert!(jump.parameters().property("_spin").is_some());
        assert!(dict.find("_acme.dance").is_some());
    }

    #[test]
    fn test_to_json_groups_by_package() {
        let mut dict = CommandDictionary::new();
        dict.load_category(&robot_source("robot"), None).unwrap();
        let json = dict.to_json();
        assert!(json["robot"]["jump"]["parameters"]["height"].is_object());
        assert!(json["robot"]["_wave"].is_object());
    }
}
