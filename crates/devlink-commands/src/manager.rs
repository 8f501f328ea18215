//! Command manager.
//!
//! Ties the base dictionary, the merged dictionary and the queue together
//! for the host process.

use std::sync::Arc;

use devlink_core::{read_sources, DevlinkConfig, Error, JsonSource, NotFoundKind, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::info;

use crate::dictionary::CommandDictionary;
use crate::instance::{CommandId, CommandInstance, CommandOrigin};
use crate::queue::CommandQueue;

type DefinitionsChanged = Arc<dyn Fn(&CommandDictionary) + Send + Sync>;

/// Owns the command dictionaries and the live queue.
pub struct CommandManager {
    base: RwLock<CommandDictionary>,
    dictionary: RwLock<CommandDictionary>,
    queue: Arc<CommandQueue>,
    on_definitions_changed: Mutex<Vec<DefinitionsChanged>>,
}

impl CommandManager {
    pub fn new(queue: Arc<CommandQueue>) -> Self {
        Self {
            base: RwLock::new(CommandDictionary::new()),
            dictionary: RwLock::new(CommandDictionary::new()),
            queue,
            on_definitions_changed: Mutex::new(Vec::new()),
        }
    }

    /// Build a manager and load every configured definition source.
    pub fn from_config(config: &DevlinkConfig) -> Result<Self> {
        let manager = Self::new(Arc::new(CommandQueue::from_config(config)));

        if let Some(path) = &config.base_definitions {
            for source in read_sources(std::slice::from_ref(path))? {
                manager.load_base(&source)?;
            }
        }
        for source in read_sources(&config.command_sources)? {
            manager.load_category(&source)?;
        }

        info!(
            category = "commands",
            commands = manager.dictionary.read().len(),
            "Command definitions loaded"
        );
        Ok(manager)
    }

    /// Load standard definitions that categories extend.
    ///
    /// The base only constrains categories; a command becomes available for
    /// submission once a category declares it.
    pub fn load_base(&self, source: &JsonSource) -> Result<()> {
        self.base.write().load_category(source, None)?;
        Ok(())
    }

    /// Load (or reload) one category against the base definitions.
    pub fn load_category(&self, source: &JsonSource) -> Result<()> {
        {
            let base = self.base.read();
            let base = (!base.is_empty()).then_some(&*base);
            self.dictionary.write().load_category(source, base)?;
        }
        self.definitions_changed();
        Ok(())
    }

    /// Register a callback fired after every successful definition load.
    pub fn on_definitions_changed<F>(&self, callback: F)
    where
        F: Fn(&CommandDictionary) + Send + Sync + 'static,
    {
        self.on_definitions_changed.lock().push(Arc::new(callback));
    }

    /// Copy of the merged dictionary.
    pub fn dictionary(&self) -> CommandDictionary {
        self.dictionary.read().clone()
    }

    pub fn all_names(&self) -> Vec<String> {
        self.dictionary.read().all_names()
    }

    /// Supported commands as `{package: {command: definition}}`.
    pub fn definitions_json(&self) -> Value {
        self.dictionary.read().to_json()
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    /// Validate a payload and admit the command. Returns the new id.
    pub fn add_command(&self, payload: &Value, origin: CommandOrigin) -> Result<CommandId> {
        let command = {
            let dictionary = self.dictionary.read();
            CommandInstance::create(&dictionary, payload, origin)?
        };
        Ok(self.queue.add(command))
    }

    /// Like [`add_command`](Self::add_command) for JSON text.
    pub fn add_command_json(&self, text: &str, origin: CommandOrigin) -> Result<CommandId> {
        let payload: Value = serde_json::from_str(text)?;
        self.add_command(&payload, origin)
    }

    pub fn find_command(&self, id: &str) -> Option<CommandInstance> {
        self.queue.find(id)
    }

    pub fn command_json(&self, id: &str) -> Result<Value> {
        self.queue
            .find(id)
            .map(|cmd| cmd.to_json())
            .ok_or_else(|| Error::not_found(NotFoundKind::Id, id))
    }

    fn definitions_changed(&self) {
        let callbacks: Vec<DefinitionsChanged> = self.on_definitions_changed.lock().clone();
        if callbacks.is_empty() {
            return;
        }
        let snapshot = self.dictionary();
        for callback in callbacks {
            callback(&snapshot);
        }
    }
}
