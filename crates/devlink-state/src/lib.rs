//! Device state.
//!
//! Provides:
//! - Typed state properties grouped in packages
//! - A state manager with validated single and batch writes
//! - The bounded state change queue observers drain from

pub mod change_queue;
pub mod manager;
pub mod package;

pub use change_queue::{Cursor, StateChange, StateChangeQueue};
pub use manager::{StateManager, StateObserver};
pub use package::{StatePackage, StateProperty};
