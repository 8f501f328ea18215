//! Command instances and their lifecycle.
//!
//! ```text
//! queued ──start/progress──▶ inProgress ──▶ done | error | aborted | cancelled
//!    └──────────────────────────────────────▶ (any terminal state)
//! ```
//!
//! Terminal states are absorbing: every mutator on a terminal command fails
//! with [`Error::StateConflict`] and changes nothing.

use std::sync::Arc;

use devlink_core::{Error, Result};
use devlink_schema::{map_from_json, map_to_json, ObjectSchema, ValueMap};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::definition::CommandDefinition;
use crate::dictionary::CommandDictionary;

/// Identifier assigned by the queue on admission.
pub type CommandId = String;

const PAYLOAD_KEYS: &[&str] = &["name", "component", "parameters"];

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandState {
    /// Admitted, not yet claimed by an executor
    Queued,
    /// Claimed by an executor
    InProgress,
    /// Finished successfully
    Done,
    /// Executor reported a failure
    Error,
    /// Forced to fail by a caller
    Aborted,
    /// Withdrawn before or while running
    Cancelled,
}

impl CommandState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandState::Done | CommandState::Error | CommandState::Aborted | CommandState::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandState::Queued => "queued",
            CommandState::InProgress => "inProgress",
            CommandState::Done => "done",
            CommandState::Error => "error",
            CommandState::Aborted => "aborted",
            CommandState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CommandState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Who issued a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandOrigin {
    #[default]
    Local,
    Cloud,
}

impl CommandOrigin {
    pub fn name(&self) -> &'static str {
        match self {
            CommandOrigin::Local => "local",
            CommandOrigin::Cloud => "cloud",
        }
    }
}

/// Diagnostic attached by `abort` or `fail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

/// One issued command.
#[derive(Debug, Clone)]
pub struct CommandInstance {
    id: CommandId,
    name: String,
    component: String,
    origin: CommandOrigin,
    state: CommandState,
    parameters: ValueMap,
    progress: ValueMap,
    results: ValueMap,
    error: Option<CommandError>,
    definition: Arc<CommandDefinition>,
}

impl CommandInstance {
    /// Build a command from a `{"name", "component"?, "parameters"?}` payload.
    ///
    /// The name is resolved through `dictionary` and the parameters are
    /// validated (and defaulted) against the definition. The id stays empty
    /// until the queue admits the command.
    pub fn create(
        dictionary: &CommandDictionary,
        payload: &Value,
        origin: CommandOrigin,
    ) -> Result<Self> {
        let obj = payload
            .as_object()
            .ok_or_else(|| Error::Parse("command payload must be a JSON object".into()))?;
        if let Some(key) = obj.keys().find(|k| !PAYLOAD_KEYS.contains(&k.as_str())) {
            return Err(Error::Parse(format!("unexpected command payload key '{}'", key)));
        }

        let name = match obj.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => return Err(Error::Parse("'name' must be a string".into())),
            None => return Err(Error::Parse("command name is missing".into())),
        };
        let component = match obj.get("component") {
            Some(Value::String(component)) => component.clone(),
            Some(_) => return Err(Error::Parse("'component' must be a string".into())),
            None => String::new(),
        };

        let definition = dictionary.get(&name)?;
        let supplied = match obj.get("parameters") {
            Some(params) => map_from_json(params)?,
            None => ValueMap::new(),
        };
        let parameters = definition.parameters().validate(&supplied)?;

        Ok(Self {
            id: CommandId::new(),
            name,
            component,
            origin,
            state: CommandState::Queued,
            parameters,
            progress: ValueMap::new(),
            results: ValueMap::new(),
            error: None,
            definition,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: CommandId) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Category of the definition this command was created from.
    pub fn category(&self) -> &str {
        self.definition.category()
    }

    pub fn origin(&self) -> CommandOrigin {
        self.origin
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn parameters(&self) -> &ValueMap {
        &self.parameters
    }

    pub fn progress(&self) -> &ValueMap {
        &self.progress
    }

    pub fn results(&self) -> &ValueMap {
        &self.results
    }

    pub fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

    pub fn definition(&self) -> &CommandDefinition {
        &self.definition
    }

    /// Executor claims the command.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = CommandState::InProgress;
        Ok(())
    }

    /// Replace the progress map. A queued command moves to `inProgress`.
    pub fn set_progress(&mut self, progress: ValueMap) -> Result<()> {
        self.ensure_active()?;
        let progress = validate_optional(self.definition.progress(), &progress)?;
        self.progress = progress;
        self.state = CommandState::InProgress;
        Ok(())
    }

    /// Finish successfully. The last progress map is kept.
    pub fn complete(&mut self, results: ValueMap) -> Result<()> {
        self.ensure_active()?;
        let results = validate_optional(self.definition.results(), &results)?;
        self.results = results;
        self.state = CommandState::Done;
        Ok(())
    }

    /// Force a failure with a caller-supplied diagnostic.
    pub fn abort(&mut self, code: impl Into<String>, message: impl Into<String>) -> Result<()> {
        self.ensure_active()?;
        self.error = Some(CommandError {
            code: code.into(),
            message: message.into(),
        });
        self.state = CommandState::Aborted;
        Ok(())
    }

    /// Executor-reported failure.
    pub fn fail(&mut self, code: impl Into<String>, message: impl Into<String>) -> Result<()> {
        self.ensure_active()?;
        self.error = Some(CommandError {
            code: code.into(),
            message: message.into(),
        });
        self.state = CommandState::Error;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = CommandState::Cancelled;
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::StateConflict {
                id: self.id.clone(),
                state: self.state.name().to_string(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "id": self.id,
            "name": self.name,
            "component": self.component,
            "category": self.category(),
            "state": self.state.name(),
            "origin": self.origin.name(),
            "parameters": map_to_json(&self.parameters),
            "progress": map_to_json(&self.progress),
            "results": map_to_json(&self.results),
        });
        if let (Some(error), Value::Object(obj)) = (&self.error, &mut value) {
            obj.insert(
                "error".to_string(),
                json!({"code": error.code, "message": error.message}),
            );
        }
        value
    }
}

fn validate_optional(schema: Option<&ObjectSchema>, value: &ValueMap) -> Result<ValueMap> {
    match schema {
        Some(schema) => Ok(schema.validate(value)?),
        None => Ok(value.clone()),
    }
}
