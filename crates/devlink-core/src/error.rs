//! Error types shared by every devlink crate.
//!
//! All failures are returned to the immediate caller as [`Error`]. Adapters
//! that expose the core over some transport convert them with
//! [`Error::to_info`], which keeps the distinction between caller errors,
//! state conflicts and missing objects through [`Error::class`].

use serde::{Deserialize, Serialize};

/// Domain attached to every [`ErrorInfo`] produced by this workspace.
pub const ERROR_DOMAIN: &str = "devlink";

/// Result type alias for devlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What kind of object a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundKind {
    /// Command definition (by `package.command` name)
    Command,
    /// State property
    Property,
    /// State package
    Package,
    /// Command instance id
    Id,
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NotFoundKind::Command => "Command",
            NotFoundKind::Property => "Property",
            NotFoundKind::Package => "Package",
            NotFoundKind::Id => "Command id",
        };
        write!(f, "{}", name)
    }
}

/// The constraint a value violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    /// Value has the wrong type
    TypeMismatch,
    /// Numeric value outside `[minimum, maximum]`
    OutOfRange,
    /// String length outside `[minLength, maxLength]`
    Length,
    /// Value not in the enum of allowed values
    NotAllowed,
    /// Required field absent
    Missing,
    /// Field not declared by the schema
    Unknown,
}

/// A schema mismatch, naming the offending field.
///
/// `field` is a path into the validated value: `height`, `config.mode`,
/// `points[2].x`. It is empty when the top-level value itself is wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Path of the offending field
    pub field: String,
    /// Violated constraint
    pub violation: Violation,
    /// Human-readable reason
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error for `field`.
    pub fn new(field: impl Into<String>, violation: Violation, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            violation,
            reason: reason.into(),
        }
    }

    /// Type mismatch on the current value.
    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        Self::new(
            "",
            Violation::TypeMismatch,
            format!("expected {}, got {}", expected, actual),
        )
    }

    /// Prefix the field path with an object key.
    pub fn in_field(mut self, key: &str) -> Self {
        self.field = if self.field.is_empty() {
            key.to_string()
        } else if self.field.starts_with('[') {
            format!("{}{}", key, self.field)
        } else {
            format!("{}.{}", key, self.field)
        };
        self
    }

    /// Prefix the field path with an array index.
    pub fn at_index(mut self, index: usize) -> Self {
        self.field = if self.field.is_empty() || self.field.starts_with('[') {
            format!("[{}]{}", index, self.field)
        } else {
            format!("[{}].{}", index, self.field)
        };
        self
    }

    /// Error code for adapters.
    pub fn code(&self) -> &'static str {
        match self.violation {
            Violation::TypeMismatch => "type_mismatch",
            Violation::OutOfRange => "out_of_range",
            Violation::Length => "invalid_length",
            Violation::NotAllowed => "invalid_value",
            Violation::Missing => "property_missing",
            Violation::Unknown => "unknown_property",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "Invalid value: {}", self.reason)
        } else {
            write!(f, "Invalid value for '{}': {}", self.field, self.reason)
        }
    }
}

impl std::error::Error for ValidationError {}

/// One failed entry of a batch state update.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFailure {
    /// Fully-qualified property name as supplied by the caller
    pub name: String,
    /// Why the write was rejected
    pub error: Error,
}

/// Broad class of an error, used by adapters to pick a transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The caller supplied malformed or invalid input
    Caller,
    /// The target exists but its state forbids the operation
    Conflict,
    /// The target does not exist (any more)
    NotFound,
    /// The device side is misconfigured
    Internal,
}

/// devlink error type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{kind} not found: {name}")]
    NotFound { kind: NotFoundKind, name: String },

    #[error("'{name}' from '{category}' is already defined by '{existing}'")]
    Conflict {
        name: String,
        category: String,
        existing: String,
    },

    #[error("Command '{id}' is already {state}")]
    StateConflict { id: String, state: String },

    #[error("Command '{id}' is still {state} and cannot be removed")]
    NotTerminal { id: String, state: String },

    #[error("State change cursor {cursor} is no longer valid (oldest available: {oldest}); resync required")]
    Gap { cursor: u64, oldest: u64 },

    #[error("Failed to load '{name}': {reason}")]
    Load {
        name: String,
        #[source]
        reason: Box<Error>,
    },

    #[error("{} of {attempted} property updates failed", .failures.len())]
    Batch {
        attempted: usize,
        failures: Vec<PropertyFailure>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on '{path}': {message}")]
    Io { path: String, message: String },
}

impl Error {
    /// Shorthand for a not-found error.
    pub fn not_found(kind: NotFoundKind, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Wrap an error raised while loading the named source or entry.
    pub fn load(name: impl Into<String>, reason: Error) -> Self {
        Error::Load {
            name: name.into(),
            reason: Box::new(reason),
        }
    }

    /// I/O failure on a path.
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Error::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Stable error code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse(_) => "parse_error",
            Error::Validation(e) => e.code(),
            Error::NotFound { kind, .. } => match kind {
                NotFoundKind::Command => "invalid_command_name",
                NotFoundKind::Property => "property_not_defined",
                NotFoundKind::Package => "package_not_defined",
                NotFoundKind::Id => "unknown_command",
            },
            Error::Conflict { .. } => "duplicate_definition",
            Error::StateConflict { .. } => "command_expired",
            Error::NotTerminal { .. } => "command_active",
            Error::Gap { .. } => "state_cursor_gap",
            Error::Load { .. } => "load_failed",
            Error::Batch { .. } => "batch_failed",
            Error::Config(_) => "config_error",
            Error::Io { .. } => "io_error",
        }
    }

    /// Error class for transports.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Parse(_) | Error::Validation(_) | Error::Batch { .. } => ErrorClass::Caller,
            Error::NotFound { .. } => ErrorClass::NotFound,
            Error::StateConflict { .. } | Error::NotTerminal { .. } | Error::Gap { .. } => {
                ErrorClass::Conflict
            }
            Error::Conflict { .. } | Error::Load { .. } | Error::Config(_) | Error::Io { .. } => {
                ErrorClass::Internal
            }
        }
    }

    /// Convert into the transport-neutral representation.
    pub fn to_info(&self) -> ErrorInfo {
        let details = match self {
            Error::Load { reason, .. } => vec![reason.to_info()],
            Error::Batch { failures, .. } => failures
                .iter()
                .map(|f| {
                    let mut info = f.error.to_info();
                    info.message = format!("{}: {}", f.name, info.message);
                    info
                })
                .collect(),
            _ => Vec::new(),
        };

        ErrorInfo {
            domain: ERROR_DOMAIN.to_string(),
            code: self.code().to_string(),
            class: self.class(),
            message: self.to_string(),
            details,
        }
    }
}

/// Serializable error description handed to transport adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error domain
    pub domain: String,
    /// Stable machine-readable code
    pub code: String,
    /// Broad class
    pub class: ErrorClass,
    /// Human-readable message
    pub message: String,
    /// Nested causes (load reason, batch failures)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorInfo>,
}

impl From<&Error> for ErrorInfo {
    fn from(err: &Error) -> Self {
        err.to_info()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_paths() {
        let err = ValidationError::type_mismatch("integer", "string")
            .in_field("x")
            .at_index(2)
            .in_field("points");
        assert_eq!(err.field, "points[2].x");
        assert_eq!(err.code(), "type_mismatch");
    }

    #[test]
    fn test_error_classes() {
        let not_found = Error::not_found(NotFoundKind::Id, "42");
        assert_eq!(not_found.class(), ErrorClass::NotFound);
        assert_eq!(not_found.code(), "unknown_command");

        let expired = Error::StateConflict {
            id: "1".into(),
            state: "done".into(),
        };
        assert_eq!(expired.class(), ErrorClass::Conflict);
        assert_eq!(expired.code(), "command_expired");

        let invalid: Error = ValidationError::new("height", Violation::OutOfRange, "too high").into();
        assert_eq!(invalid.class(), ErrorClass::Caller);
        assert!(invalid.to_string().contains("height"));
    }

    #[test]
    fn test_batch_info_lists_failures() {
        let err = Error::Batch {
            attempted: 3,
            failures: vec![PropertyFailure {
                name: "base.mode".into(),
                error: Error::not_found(NotFoundKind::Property, "base.mode"),
            }],
        };
        let info = err.to_info();
        assert_eq!(info.code, "batch_failed");
        assert_eq!(info.details.len(), 1);
        assert!(info.details[0].message.starts_with("base.mode: "));
        assert_eq!(err.to_string(), "1 of 3 property updates failed");
    }
}
