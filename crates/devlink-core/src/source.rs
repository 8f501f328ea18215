//! Named JSON definition sources.
//!
//! Command categories, state packages and state defaults are all loaded
//! from JSON documents identified by name. On disk the name is the file
//! stem; directories contribute their `*.json` files in name order.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// A parsed JSON document and the name it is known by.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSource {
    /// Source identity (category name for command definitions)
    pub name: String,
    /// Document body
    pub value: Value,
}

impl JsonSource {
    /// Create a source from an in-memory document.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Parse a source from JSON text.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let value = serde_json::from_str(text).map_err(|e| Error::load(&name, e.into()))?;
        Ok(Self { name, value })
    }

    /// Read one JSON file; the file stem becomes the source name.
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config(format!("invalid source path {}", path.display())))?;
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        debug!(category = "source", path = %path.display(), "Read definition source");
        Self::parse(name, &text)
    }
}

/// Read every source named by `paths`, expanding directories.
pub fn read_sources(paths: &[PathBuf]) -> Result<Vec<JsonSource>> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut files = Vec::new();
            let entries = std::fs::read_dir(path).map_err(|e| Error::io(path, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| Error::io(path, e))?;
                let file = entry.path();
                if file.extension().and_then(|e| e.to_str()) == Some("json") {
                    files.push(file);
                }
            }
            files.sort();
            for file in files {
                sources.push(JsonSource::from_file(&file)?);
            }
        } else {
            sources.push(JsonSource::from_file(path)?);
        }
    }
    Ok(sources)
}
