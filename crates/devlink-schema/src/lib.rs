//! Typed values and object schemas.
//!
//! Command parameters, progress, results and device state properties are
//! all described by an [`ObjectSchema`] and carried as [`PropValue`]s.
//! Schemas are loaded from a compact JSON definition format (see
//! [`ObjectSchema::from_json`]) and validated values come back normalized,
//! with defaults filled in.

pub mod parse;
pub mod schema;
pub mod value;

pub use schema::{ObjectSchema, PropSchema, TypeSpec};
pub use value::{map_from_json, map_to_json, PropValue, ValueMap, ValueType};
