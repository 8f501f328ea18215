//! Command change events.
//!
//! The queue reports every admission, transition and removal as a
//! [`CommandEvent`] to its synchronous observers. [`CommandEventBus`]
//! is such an observer that fans events out to async subscribers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::instance::{CommandId, CommandInstance, CommandState};

/// What changed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CommandEventType {
    /// Command admitted to the queue
    Added,
    /// Lifecycle state changed
    StateChanged,
    /// Progress map replaced
    ProgressChanged,
    /// Results recorded
    ResultsChanged,
    /// Command removed from the queue
    Removed,
}

/// A command change with the command's state after the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEvent {
    /// Event ID
    pub id: String,
    pub event_type: CommandEventType,
    pub command_id: CommandId,
    /// Fully-qualified command name
    pub name: String,
    pub state: CommandState,
    /// State before the change, for `StateChanged`
    pub previous_state: Option<CommandState>,
    pub timestamp: DateTime<Utc>,
    /// Changed payload (progress or results)
    pub data: Option<serde_json::Value>,
}

impl CommandEvent {
    /// Create an event describing `command` as it is now.
    pub fn new(event_type: CommandEventType, command: &CommandInstance) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            command_id: command.id().to_string(),
            name: command.name().to_string(),
            state: command.state(),
            previous_state: None,
            timestamp: Utc::now(),
            data: None,
        }
    }

    pub fn with_previous_state(mut self, state: CommandState) -> Self {
        self.previous_state = Some(state);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Event filter for subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Filter by command id
    pub command_id: Option<CommandId>,
    /// Filter by command name
    pub name: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<CommandEventType>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_command(mut self, id: impl Into<CommandId>) -> Self {
        self.command_id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_types(mut self, types: Vec<CommandEventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    /// Check if an event matches this filter.
    pub fn matches(&self, event: &CommandEvent) -> bool {
        if let Some(ref id) = self.command_id {
            if &event.command_id != id {
                return false;
            }
        }

        if let Some(ref name) = self.name {
            if &event.name != name {
                return false;
            }
        }

        if let Some(ref event_types) = self.event_types {
            if !event_types.contains(&event.event_type) {
                return false;
            }
        }

        true
    }
}

/// Broadcast fan-out with a bounded history of recent events.
pub struct CommandEventBus {
    broadcast_tx: broadcast::Sender<CommandEvent>,
    recent_events: RwLock<Vec<CommandEvent>>,
    max_stored: usize,
}

impl CommandEventBus {
    /// Create a new event bus.
    pub fn new(max_stored: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1000);

        Self {
            broadcast_tx,
            recent_events: RwLock::new(Vec::new()),
            max_stored,
        }
    }

    /// Observer closure suitable for [`CommandQueue::add_observer`](crate::queue::CommandQueue::add_observer).
    pub fn observer(self: &Arc<Self>) -> impl Fn(&CommandEvent) + Send + Sync + 'static {
        let bus = Arc::clone(self);
        move |event| bus.publish(event.clone())
    }

    /// Publish an event.
    pub fn publish(&self, event: CommandEvent) {
        {
            let mut events = self.recent_events.write();
            events.push(event.clone());
            if events.len() > self.max_stored {
                events.remove(0);
            }
        }

        // No receivers is fine
        let _ = self.broadcast_tx.send(event);
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Subscribe with a filter.
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredSubscriber {
        FilteredSubscriber {
            rx: self.broadcast_tx.subscribe(),
            filter,
        }
    }

    /// Most recent events, oldest first.
    pub fn get_recent(&self, limit: usize) -> Vec<CommandEvent> {
        let events = self.recent_events.read();
        let start = events.len().saturating_sub(limit);
        events[start..].to_vec()
    }

    /// Stored events for one command, oldest first.
    pub fn get_for_command(&self, command_id: &str) -> Vec<CommandEvent> {
        self.recent_events
            .read()
            .iter()
            .filter(|e| e.command_id == command_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.recent_events.write().clear();
    }
}

/// Filtered event subscriber.
pub struct FilteredSubscriber {
    rx: broadcast::Receiver<CommandEvent>,
    filter: EventFilter,
}

impl FilteredSubscriber {
    /// Receive next filtered event.
    pub async fn recv(&mut self) -> Result<CommandEvent, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive next filtered event without blocking.
    pub fn try_recv(&mut self) -> Result<CommandEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.rx.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}
