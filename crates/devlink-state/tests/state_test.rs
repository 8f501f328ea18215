//! State manager tests.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use devlink_core::{DevlinkConfig, Error, JsonSource, NotFoundKind, Violation};
use devlink_schema::{map_from_json, PropValue};
use devlink_state::{Cursor, StateChange, StateManager};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::json;

fn definitions() -> JsonSource {
    JsonSource::new(
        "base",
        json!({
            "base": {
                "firmwareVersion": "string",
                "volume": {"type": "integer", "minimum": 0, "maximum": 10},
                "mode": ["eco", "boost"]
            },
            "_acme": {
                "temperature": "number"
            }
        }),
    )
}

fn manager(capacity: usize) -> StateManager {
    let manager = StateManager::new(capacity);
    manager.load_definitions(&definitions()).unwrap();
    manager
}

fn t0() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

#[test]
fn test_set_and_get() {
    let state = manager(100);
    assert_eq!(state.get_property("base.volume").unwrap(), None);

    state.set_property("base.volume", 7, t0()).unwrap();
    assert_eq!(state.get_property("base.volume").unwrap(), Some(PropValue::Integer(7)));

    // number properties store integers widened
    state.set_property("_acme.temperature", 21, t0()).unwrap();
    assert_eq!(
        state.get_property("_acme.temperature").unwrap(),
        Some(PropValue::Number(21.0))
    );
}

#[test]
fn test_rejected_write_changes_nothing() {
    let state = manager(100);
    state.set_property("base.volume", 3, t0()).unwrap();
    let mut cursor = state.oldest_cursor();
    state.drain_since(&mut cursor).unwrap();

    let err = state.set_property("base.volume", 11, t0()).unwrap_err();
    match err {
        Error::Validation(e) => {
            assert_eq!(e.field, "base.volume");
            assert_eq!(e.violation, Violation::OutOfRange);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(matches!(
        state.set_property("base.missing", 1, t0()),
        Err(Error::NotFound {
            kind: NotFoundKind::Property,
            ..
        })
    ));
    assert!(matches!(
        state.set_property("nopkg.x", 1, t0()),
        Err(Error::NotFound {
            kind: NotFoundKind::Package,
            ..
        })
    ));

    assert_eq!(state.get_property("base.volume").unwrap(), Some(PropValue::Integer(3)));
    assert!(state.drain_since(&mut cursor).unwrap().is_empty());
}

#[test]
fn test_batch_partial_success() {
    let state = manager(100);
    let batch = map_from_json(&json!({
        "base.volume": 5,
        "base.mode": "turbo",
        "base.firmwareVersion": "1.2.3"
    }))
    .unwrap();

    match state.set_properties(&batch, t0()) {
        Err(Error::Batch {
            attempted,
            failures,
        }) => {
            assert_eq!(attempted, 3);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].name, "base.mode");
            assert!(matches!(failures[0].error, Error::Validation(_)));
        }
        other => panic!("expected batch error, got {:?}", other),
    }

    assert_eq!(state.get_property("base.volume").unwrap(), Some(PropValue::Integer(5)));
    assert_eq!(
        state.get_property("base.firmwareVersion").unwrap(),
        Some(PropValue::from("1.2.3"))
    );
    assert_eq!(state.get_property("base.mode").unwrap(), None);

    let mut cursor = state.oldest_cursor();
    assert_eq!(state.drain_since(&mut cursor).unwrap().len(), 2);
}

#[test]
fn test_batch_reports_every_failure() {
    let state = manager(100);
    let batch = map_from_json(&json!({"base.volume": -1, "base.mode": 3, "x.y": 1})).unwrap();
    match state.set_properties(&batch, t0()) {
        Err(Error::Batch { failures, .. }) => assert_eq!(failures.len(), 3),
        other => panic!("expected batch error, got {:?}", other),
    }
}

#[test]
fn test_structured_output_omits_unset() {
    let state = manager(100);
    state.set_property("base.mode", "eco", t0()).unwrap();

    assert_eq!(
        state.to_json(),
        json!({"base": {"mode": "eco"}, "_acme": {}})
    );
    let structured = state.get_all_as_structured();
    assert_eq!(structured["base"].as_object().unwrap().len(), 1);
}

#[test]
fn test_overflow_forces_resync() {
    let capacity = 5;
    let state = manager(capacity);
    let mut slow = state.oldest_cursor();

    for n in 0..=capacity as i64 {
        state
            .set_property("base.volume", n % 10, t0() + Duration::seconds(n))
            .unwrap();
    }

    let err = state.drain_since(&mut slow).unwrap_err();
    assert_eq!(err.code(), "state_cursor_gap");

    let (snapshot, mut cursor) = state.snapshot_with_cursor();
    assert_eq!(
        snapshot["base"].as_object().unwrap()["volume"],
        PropValue::Integer(5)
    );
    state.set_property("base.volume", 9, t0()).unwrap();
    let changes = state.drain_since(&mut cursor).unwrap();
    assert_eq!(changes.len(), 1);
    // earlier timestamp was raised to keep the log ordered
    assert_eq!(changes[0].timestamp, t0() + Duration::seconds(capacity as i64));
}

#[test]
fn test_observers_notified_after_write() {
    let state = Arc::new(manager(100));
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let weak = Arc::downgrade(&state);
    state.add_observer(move |change: &StateChange| {
        // Reading back from inside the callback must not deadlock
        if let Some(state) = weak.upgrade() {
            assert!(state.get_property(&change.property).unwrap().is_some());
        }
        sink.lock().push(change.property.clone());
    });

    state.set_property("base.mode", "boost", t0()).unwrap();
    let _ = state.set_property("base.mode", "off", t0());
    assert_eq!(*seen.lock(), vec!["base.mode".to_string()]);
}

#[test]
fn test_definitions_and_defaults() {
    let state = manager(100);

    let redefine = JsonSource::new("vendor", json!({"base": {"volume": "integer"}}));
    assert!(matches!(state.load_definitions(&redefine), Err(Error::Conflict { .. })));

    let bad_defaults = JsonSource::new("defaults", json!({"base": {"volume": 3, "mode": "off"}}));
    assert!(matches!(state.load_defaults(&bad_defaults), Err(Error::Load { .. })));
    assert_eq!(state.get_property("base.volume").unwrap(), None);

    let defaults = JsonSource::new("defaults", json!({"base": {"volume": 3, "mode": "eco"}}));
    state.load_defaults(&defaults).unwrap();
    assert_eq!(state.get_property("base.volume").unwrap(), Some(PropValue::Integer(3)));

    // defaults are not changes
    let mut cursor = state.oldest_cursor();
    assert!(state.drain_since(&mut cursor).unwrap().is_empty());
    assert_eq!(cursor, Cursor(0));
}

#[test]
fn test_schema_default_seeds_initial_value() {
    let state = StateManager::new(16);
    state
        .load_definitions(&JsonSource::new(
            "base",
            json!({"base": {"brightness": {"type": "number", "default": 50}, "label": "string"}}),
        ))
        .unwrap();

    assert_eq!(
        state.get_property("base.brightness").unwrap(),
        Some(PropValue::Number(50.0))
    );
    assert_eq!(state.to_json(), json!({"base": {"brightness": 50.0}}));

    let mut cursor = state.oldest_cursor();
    assert!(state.drain_since(&mut cursor).unwrap().is_empty());
}

#[test]
fn test_from_config_reads_files() {
    let dir = tempfile::tempdir().unwrap();
    let defs = dir.path().join("base.json");
    let values = dir.path().join("initial.json");
    std::fs::write(&defs, definitions().value.to_string()).unwrap();
    std::fs::write(&values, json!({"base": {"firmwareVersion": "0.9"}}).to_string()).unwrap();

    let config = DevlinkConfig {
        state_queue_capacity: 8,
        state_sources: vec![defs],
        state_defaults: vec![values],
        ..DevlinkConfig::default()
    };
    let state = StateManager::from_config(&config).unwrap();
    assert_eq!(
        state.get_property("base.firmwareVersion").unwrap(),
        Some(PropValue::from("0.9"))
    );
    assert_eq!(state.package_names(), vec!["_acme", "base"]);
}

proptest! {
    #[test]
    fn prop_queue_never_exceeds_capacity(capacity in 1usize..20, writes in 0usize..60) {
        let state = manager(capacity);
        for n in 0..writes {
            state.set_property("base.volume", (n % 11) as i64, t0()).unwrap();
        }
        let mut cursor = state.oldest_cursor();
        let retained = state.drain_since(&mut cursor).unwrap();
        prop_assert_eq!(retained.len(), writes.min(capacity));
    }

    #[test]
    fn prop_in_range_writes_accepted(volume in 0i64..=10) {
        let state = manager(4);
        prop_assert!(state.set_property("base.volume", volume, t0()).is_ok());
        prop_assert_eq!(state.get_property("base.volume").unwrap(), Some(PropValue::Integer(volume)));
    }
}
