//! Live command registry.
//!
//! The queue owns every admitted [`CommandInstance`]. Callers and adapters
//! hold ids and go through the queue for reads (copies) and lifecycle
//! calls, so a command that has been reaped simply stops being found.
//!
//! Observers run synchronously after the queue lock is released and may
//! call back into the queue.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use devlink_core::config::defaults;
use devlink_core::{DevlinkConfig, Error, NotFoundKind, Result};
use devlink_schema::{map_to_json, ValueMap};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::events::{CommandEvent, CommandEventType};
use crate::instance::{CommandId, CommandInstance};

/// Change observer.
pub type Observer = Arc<dyn Fn(&CommandEvent) + Send + Sync>;

struct Entry {
    command: CommandInstance,
    terminal_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, retention: Duration) -> bool {
        self.terminal_at.is_some_and(|at| at.elapsed() >= retention)
    }
}

#[derive(Default)]
struct QueueInner {
    /// Last issued id number; ids are never reused
    last_id: u64,
    /// Keyed by id number, which is also admission order
    entries: BTreeMap<u64, Entry>,
    index: HashMap<CommandId, u64>,
}

impl QueueInner {
    fn take_expired(&mut self, retention: Duration) -> Vec<CommandInstance> {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(retention))
            .map(|(seq, _)| *seq)
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for seq in expired {
            if let Some(entry) = self.entries.remove(&seq) {
                self.index.remove(entry.command.id());
                removed.push(entry.command);
            }
        }
        removed
    }
}

/// Registry of live commands keyed by id.
pub struct CommandQueue {
    inner: Mutex<QueueInner>,
    observers: RwLock<Vec<Observer>>,
    id_prefix: String,
    retention: Duration,
}

impl CommandQueue {
    /// Create a queue whose ids start with `id_prefix` and which keeps
    /// terminal commands visible for `retention`.
    pub fn new(id_prefix: impl Into<String>, retention: Duration) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            observers: RwLock::new(Vec::new()),
            id_prefix: id_prefix.into(),
            retention,
        }
    }

    pub fn from_config(config: &DevlinkConfig) -> Self {
        Self::new(config.command_id_prefix.clone(), config.command_retention())
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Admit a command and assign its id.
    pub fn add(&self, mut command: CommandInstance) -> CommandId {
        let event = {
            let mut inner = self.inner.lock();
            inner.last_id += 1;
            let seq = inner.last_id;
            let id = format!("{}{}", self.id_prefix, seq);
            command.set_id(id.clone());

            let terminal_at = command.is_terminal().then(Instant::now);
            let event = CommandEvent::new(CommandEventType::Added, &command);
            inner.index.insert(id, seq);
            inner.entries.insert(
                seq,
                Entry {
                    command,
                    terminal_at,
                },
            );
            event
        };

        let id = event.command_id.clone();
        debug!(category = "commands", id = %id, name = %event.name, "Command added");
        self.notify(vec![event]);
        id
    }

    /// Copy of the command with `id`, if still present.
    pub fn find(&self, id: &str) -> Option<CommandInstance> {
        let inner = self.inner.lock();
        inner
            .index
            .get(id)
            .and_then(|seq| inner.entries.get(seq))
            .map(|entry| entry.command.clone())
    }

    /// All commands in admission order.
    ///
    /// Terminal commands older than the retention window are reaped first.
    pub fn list(&self) -> Vec<CommandInstance> {
        let (reaped, listed) = {
            let mut inner = self.inner.lock();
            let reaped = inner.take_expired(self.retention);
            let listed: Vec<CommandInstance> =
                inner.entries.values().map(|e| e.command.clone()).collect();
            (reaped, listed)
        };
        self.notify_removed(reaped);
        listed
    }

    /// Remove a terminal command.
    pub fn remove(&self, id: &str) -> Result<CommandInstance> {
        let removed = {
            let mut inner = self.inner.lock();
            let seq = *inner
                .index
                .get(id)
                .ok_or_else(|| Error::not_found(NotFoundKind::Id, id))?;
            let state = inner
                .entries
                .get(&seq)
                .map(|e| e.command.state())
                .ok_or_else(|| Error::not_found(NotFoundKind::Id, id))?;
            if !state.is_terminal() {
                return Err(Error::NotTerminal {
                    id: id.to_string(),
                    state: state.name().to_string(),
                });
            }
            inner.index.remove(id);
            inner
                .entries
                .remove(&seq)
                .map(|e| e.command)
                .ok_or_else(|| Error::not_found(NotFoundKind::Id, id))?
        };
        self.notify_removed(vec![removed.clone()]);
        Ok(removed)
    }

    /// Reap terminal commands past the retention window. Returns how many.
    pub fn reap_expired(&self) -> usize {
        let reaped = self.inner.lock().take_expired(self.retention);
        let count = reaped.len();
        self.notify_removed(reaped);
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Register an additional observer.
    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn(&CommandEvent) + Send + Sync + 'static,
    {
        self.observers.write().push(Arc::new(observer));
    }

    /// Replace all observers with `on_changed`.
    pub fn set_callback<F>(&self, on_changed: F)
    where
        F: Fn(&CommandEvent) + Send + Sync + 'static,
    {
        let mut observers = self.observers.write();
        observers.clear();
        observers.push(Arc::new(on_changed));
    }

    pub fn start(&self, id: &str) -> Result<CommandInstance> {
        self.update(id, |cmd| cmd.start(), |_| Vec::new())
    }

    pub fn set_progress(&self, id: &str, progress: ValueMap) -> Result<CommandInstance> {
        self.update(
            id,
            move |cmd| cmd.set_progress(progress),
            |cmd| {
                vec![CommandEvent::new(CommandEventType::ProgressChanged, cmd)
                    .with_data(map_to_json(cmd.progress()))]
            },
        )
    }

    pub fn complete(&self, id: &str, results: ValueMap) -> Result<CommandInstance> {
        self.update(
            id,
            move |cmd| cmd.complete(results),
            |cmd| {
                vec![CommandEvent::new(CommandEventType::ResultsChanged, cmd)
                    .with_data(map_to_json(cmd.results()))]
            },
        )
    }

    pub fn abort(&self, id: &str, code: &str, message: &str) -> Result<CommandInstance> {
        self.update(id, |cmd| cmd.abort(code, message), |_| Vec::new())
    }

    pub fn fail(&self, id: &str, code: &str, message: &str) -> Result<CommandInstance> {
        self.update(id, |cmd| cmd.fail(code, message), |_| Vec::new())
    }

    pub fn cancel(&self, id: &str) -> Result<CommandInstance> {
        self.update(id, |cmd| cmd.cancel(), |_| Vec::new())
    }

    /// Apply a lifecycle call under the lock, then notify.
    ///
    /// `extra` produces the payload events; a `StateChanged` event is
    /// added whenever the state moved.
    fn update<M, X>(&self, id: &str, mutate: M, extra: X) -> Result<CommandInstance>
    where
        M: FnOnce(&mut CommandInstance) -> Result<()>,
        X: FnOnce(&CommandInstance) -> Vec<CommandEvent>,
    {
        let (snapshot, events) = {
            let mut inner = self.inner.lock();
            let seq = *inner
                .index
                .get(id)
                .ok_or_else(|| Error::not_found(NotFoundKind::Id, id))?;
            let entry = inner
                .entries
                .get_mut(&seq)
                .ok_or_else(|| Error::not_found(NotFoundKind::Id, id))?;

            let previous = entry.command.state();
            mutate(&mut entry.command)?;
            let current = entry.command.state();

            let mut events = extra(&entry.command);
            if current != previous {
                events.push(
                    CommandEvent::new(CommandEventType::StateChanged, &entry.command)
                        .with_previous_state(previous),
                );
                if current.is_terminal() {
                    entry.terminal_at = Some(Instant::now());
                }
            }
            (entry.command.clone(), events)
        };

        self.notify(events);
        Ok(snapshot)
    }

    fn notify_removed(&self, removed: Vec<CommandInstance>) {
        if removed.is_empty() {
            return;
        }
        for command in &removed {
            debug!(category = "commands", id = %command.id(), state = %command.state(), "Command removed");
        }
        self.notify(
            removed
                .iter()
                .map(|cmd| CommandEvent::new(CommandEventType::Removed, cmd))
                .collect(),
        );
    }

    fn notify(&self, events: Vec<CommandEvent>) {
        if events.is_empty() {
            return;
        }
        let observers: Vec<Observer> = self.observers.read().clone();
        for event in &events {
            for observer in &observers {
                observer(event);
            }
        }
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(
            defaults::COMMAND_ID_PREFIX,
            Duration::from_secs(defaults::COMMAND_RETENTION_SECS),
        )
    }
}
