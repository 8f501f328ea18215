//! Device state manager.
//!
//! Holds every state package, validates writes against property schemas
//! and records accepted writes in the [`StateChangeQueue`]. The package
//! lock is taken before the change-queue lock, and both are released
//! before observers run.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use devlink_core::{
    read_sources, DevlinkConfig, Error, JsonSource, NotFoundKind, PropertyFailure, Result,
};
use devlink_schema::{map_to_json, PropSchema, PropValue, ValueMap};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{info, trace};

use crate::change_queue::{Cursor, StateChange, StateChangeQueue};
use crate::package::{StatePackage, StateProperty};

/// Observer of accepted state changes.
pub type StateObserver = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Typed device state with a change log.
pub struct StateManager {
    packages: RwLock<BTreeMap<String, StatePackage>>,
    changes: Mutex<StateChangeQueue>,
    observers: RwLock<Vec<StateObserver>>,
}

impl StateManager {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            packages: RwLock::new(BTreeMap::new()),
            changes: Mutex::new(StateChangeQueue::new(queue_capacity)),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Build a manager and load configured definitions, then defaults.
    pub fn from_config(config: &DevlinkConfig) -> Result<Self> {
        let manager = Self::new(config.state_queue_capacity);
        for source in read_sources(&config.state_sources)? {
            manager.load_definitions(&source)?;
        }
        for source in read_sources(&config.state_defaults)? {
            manager.load_defaults(&source)?;
        }
        Ok(manager)
    }

    /// Load `{package: {property: schema}}`. All-or-nothing per source.
    pub fn load_definitions(&self, source: &JsonSource) -> Result<()> {
        let parsed = parse_definitions(source).map_err(|e| Error::load(&source.name, e))?;

        let mut packages = self.packages.write();
        let mut staged = packages.clone();
        let mut count = 0;
        for (package, properties) in parsed {
            let entry = staged
                .entry(package.clone())
                .or_insert_with(|| StatePackage::new(package));
            for (name, schema) in properties {
                entry.define(name, StateProperty::new(schema, &source.name))?;
                count += 1;
            }
        }
        *packages = staged;

        info!(
            category = "state",
            source = %source.name,
            properties = count,
            "Loaded state definitions"
        );
        Ok(())
    }

    /// Load `{package: {property: value}}` as initial values.
    ///
    /// Values are validated like writes but produce no change records. A
    /// source with any invalid entry applies nothing.
    pub fn load_defaults(&self, source: &JsonSource) -> Result<()> {
        let mut packages = self.packages.write();
        let mut staged = packages.clone();
        apply_defaults(&mut staged, &source.value).map_err(|e| Error::load(&source.name, e))?;
        *packages = staged;
        Ok(())
    }

    /// Write one `package.property`.
    ///
    /// A rejected write changes nothing and records nothing. `timestamp` is
    /// raised to the previous change's if it is earlier.
    pub fn set_property(
        &self,
        name: &str,
        value: impl Into<PropValue>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let value = value.into();
        let change = {
            let mut packages = self.packages.write();
            let normalized = property_mut(&mut packages, name)?.set(name, &value)?;
            self.record(StateChange::new(name, normalized, timestamp))
        };
        self.notify(change.as_slice());
        Ok(())
    }

    /// Write several properties, keyed by `package.property`.
    ///
    /// Each entry is applied independently. If any fail, the rest are
    /// still committed and [`Error::Batch`] lists every failure.
    pub fn set_properties(&self, batch: &ValueMap, timestamp: DateTime<Utc>) -> Result<()> {
        let mut failures = Vec::new();
        let mut accepted = Vec::new();
        {
            let mut packages = self.packages.write();
            for (name, value) in batch {
                match property_mut(&mut packages, name).and_then(|prop| prop.set(name, value)) {
                    Ok(normalized) => {
                        accepted.extend(self.record(StateChange::new(name, normalized, timestamp)))
                    }
                    Err(error) => failures.push(PropertyFailure {
                        name: name.clone(),
                        error,
                    }),
                }
            }
        }
        self.notify(&accepted);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Batch {
                attempted: batch.len(),
                failures,
            })
        }
    }

    /// Current value of `package.property`; `None` if never set.
    pub fn get_property(&self, name: &str) -> Result<Option<PropValue>> {
        let packages = self.packages.read();
        let (package, property) = split_name(name)?;
        let package = packages
            .get(package)
            .ok_or_else(|| Error::not_found(NotFoundKind::Package, package))?;
        package
            .property(property)
            .map(|p| p.value().cloned())
            .ok_or_else(|| Error::not_found(NotFoundKind::Property, name))
    }

    /// Current values as `{package: {property: value}}`.
    pub fn get_all_as_structured(&self) -> ValueMap {
        structured(&self.packages.read())
    }

    pub fn to_json(&self) -> Value {
        map_to_json(&self.get_all_as_structured())
    }

    /// Consistent snapshot plus the cursor that continues from it.
    pub fn snapshot_with_cursor(&self) -> (ValueMap, Cursor) {
        let packages = self.packages.read();
        let cursor = self.changes.lock().head();
        (structured(&packages), cursor)
    }

    /// Changes since `cursor`; see [`StateChangeQueue::drain_since`].
    pub fn drain_since(&self, cursor: &mut Cursor) -> Result<Vec<StateChange>> {
        self.changes.lock().drain_since(cursor)
    }

    /// Cursor positioned at the oldest retained change.
    pub fn oldest_cursor(&self) -> Cursor {
        self.changes.lock().oldest()
    }

    pub fn reset_changes(&self) {
        self.changes.lock().reset();
    }

    pub fn package_names(&self) -> Vec<String> {
        self.packages.read().keys().cloned().collect()
    }

    /// Register an observer of accepted changes.
    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.observers.write().push(Arc::new(observer));
    }

    /// Append under the change-queue lock; returns the record as stored.
    fn record(&self, change: StateChange) -> Option<StateChange> {
        let mut changes = self.changes.lock();
        let seq = changes.append(change);
        let stored = changes.newest().cloned();
        trace!(category = "state", seq, "State change recorded");
        stored
    }

    fn notify(&self, changes: &[StateChange]) {
        if changes.is_empty() {
            return;
        }
        let observers: Vec<StateObserver> = self.observers.read().clone();
        for change in changes {
            for observer in &observers {
                observer(change);
            }
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(devlink_core::config::defaults::STATE_QUEUE_CAPACITY)
    }
}

fn split_name(name: &str) -> Result<(&str, &str)> {
    match name.split_once('.') {
        Some((package, property)) if !package.is_empty() && !property.is_empty() => {
            Ok((package, property))
        }
        _ => Err(Error::not_found(NotFoundKind::Property, name)),
    }
}

fn property_mut<'a>(
    packages: &'a mut BTreeMap<String, StatePackage>,
    name: &str,
) -> Result<&'a mut StateProperty> {
    let (package, property) = split_name(name)?;
    packages
        .get_mut(package)
        .ok_or_else(|| Error::not_found(NotFoundKind::Package, package))?
        .property_mut(property)
}

fn structured(packages: &BTreeMap<String, StatePackage>) -> ValueMap {
    packages
        .iter()
        .map(|(name, package)| (name.clone(), PropValue::Object(package.values())))
        .collect()
}

type ParsedDefinitions = Vec<(String, Vec<(String, PropSchema)>)>;

fn parse_definitions(source: &JsonSource) -> Result<ParsedDefinitions> {
    let packages = source
        .value
        .as_object()
        .ok_or_else(|| Error::Parse("state definitions must be a JSON object".into()))?;

    let mut parsed = Vec::new();
    for (package, properties) in packages {
        if package.is_empty() || package.contains('.') {
            return Err(Error::Parse(format!("invalid package name '{}'", package)));
        }
        let properties = properties.as_object().ok_or_else(|| {
            Error::Parse(format!("package '{}' must be a JSON object", package))
        })?;

        let mut schemas = Vec::new();
        for (name, def) in properties {
            let full_name = format!("{}.{}", package, name);
            let schema = PropSchema::from_json(def, None).map_err(|e| Error::load(full_name, e))?;
            schemas.push((name.clone(), schema));
        }
        parsed.push((package.clone(), schemas));
    }
    Ok(parsed)
}

fn apply_defaults(packages: &mut BTreeMap<String, StatePackage>, json: &Value) -> Result<()> {
    let values = devlink_schema::map_from_json(json)?;
    for (package, properties) in &values {
        let properties = properties.as_object().ok_or_else(|| {
            Error::Parse(format!("defaults for package '{}' must be an object", package))
        })?;
        for (property, value) in properties {
            let full_name = format!("{}.{}", package, property);
            property_mut(packages, &full_name)?.set(&full_name, value)?;
        }
    }
    Ok(())
}
