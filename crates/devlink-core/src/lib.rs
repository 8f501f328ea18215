//! Core types shared by the devlink crates.
//!
//! Provides:
//! - The error taxonomy and its transport representation
//! - Configuration defaults and loading
//! - Named JSON definition sources
//! - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod source;

pub use config::DevlinkConfig;
pub use error::{
    Error, ErrorClass, ErrorInfo, NotFoundKind, PropertyFailure, Result, ValidationError,
    Violation,
};
pub use source::{read_sources, JsonSource};
