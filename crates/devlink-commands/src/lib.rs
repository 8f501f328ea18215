//! Command system for device control.
//!
//! Provides:
//! - Command definitions and the merged command dictionary
//! - Command instances and their lifecycle state machine
//! - The live command queue with change observers
//! - An async event bus and a background reaper for the queue

pub mod definition;
pub mod dictionary;
pub mod events;
pub mod instance;
pub mod manager;
pub mod queue;
pub mod reaper;

// Re-exports
pub use definition::CommandDefinition;
pub use dictionary::CommandDictionary;
pub use events::{CommandEvent, CommandEventBus, CommandEventType, EventFilter, FilteredSubscriber};
pub use instance::{CommandError, CommandId, CommandInstance, CommandOrigin, CommandState};
pub use manager::CommandManager;
pub use queue::CommandQueue;
pub use reaper::CommandReaper;
