//! Command dictionary merge tests.

use devlink_commands::{CommandDictionary, CommandManager, CommandOrigin, CommandState};
use devlink_core::{DevlinkConfig, Error, JsonSource};
use proptest::prelude::*;
use serde_json::json;

fn robot(category: &str) -> JsonSource {
    JsonSource::new(
        category,
        json!({
            "robot": {
                "jump": {"parameters": {"height": {"type": "integer", "minimum": 0, "maximum": 100}}},
                "_dance": {"parameters": {"_style": "string"}}
            }
        }),
    )
}

fn snapshot(dict: &CommandDictionary) -> (Vec<String>, serde_json::Value) {
    (dict.all_names(), dict.to_json())
}

#[test]
fn test_reload_is_idempotent() {
    let mut once = CommandDictionary::new();
    once.load_category(&robot("robot"), None).unwrap();

    let mut twice = CommandDictionary::new();
    twice.load_category(&robot("robot"), None).unwrap();
    twice.load_category(&robot("robot"), None).unwrap();

    assert_eq!(snapshot(&once), snapshot(&twice));
}

#[test]
fn test_conflict_leaves_dictionary_unchanged() {
    let mut dict = CommandDictionary::new();
    dict.load_category(&robot("robot"), None).unwrap();
    dict.load_category(&JsonSource::new("lights", json!({"lights": {"on": {}}})), None)
        .unwrap();
    let before = snapshot(&dict);

    let other = JsonSource::new(
        "acme",
        json!({"acme": {"blink": {}}, "robot": {"jump": {}}}),
    );
    match dict.load_category(&other, None) {
        Err(Error::Conflict {
            name,
            category,
            existing,
        }) => {
            assert_eq!(name, "robot.jump");
            assert_eq!(category, "acme");
            assert_eq!(existing, "robot");
        }
        other => panic!("expected conflict, got {:?}", other),
    }

    assert_eq!(snapshot(&dict), before);
    assert!(dict.find("acme.blink").is_none());
}

#[test]
fn test_manager_loads_configured_sources() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("standard.json");
    std::fs::write(
        &base,
        json!({"robot": {"jump": {"parameters": {"height": {"type": "integer", "minimum": 0, "maximum": 100}}}}})
            .to_string(),
    )
    .unwrap();
    let categories = dir.path().join("categories");
    std::fs::create_dir(&categories).unwrap();
    std::fs::write(
        categories.join("vendor.json"),
        json!({"robot": {"jump": {"parameters": {"_jumpType": {"enum": ["_withKick", "_plain"], "default": "_plain"}}}}})
            .to_string(),
    )
    .unwrap();

    let config = DevlinkConfig {
        base_definitions: Some(base),
        command_sources: vec![categories],
        ..DevlinkConfig::default()
    };
    let manager = CommandManager::from_config(&config).unwrap();
    assert_eq!(manager.all_names(), vec!["robot.jump"]);

    let id = manager
        .add_command_json(r#"{"name": "robot.jump", "parameters": {"height": 53}}"#, CommandOrigin::Cloud)
        .unwrap();
    let json = manager.command_json(&id).unwrap();
    assert_eq!(json["category"], "vendor");
    assert_eq!(json["origin"], "cloud");
    assert_eq!(json["parameters"]["_jumpType"], "_plain");
    assert_eq!(manager.find_command(&id).unwrap().state(), CommandState::Queued);

    assert!(matches!(
        manager.add_command_json("{not json", CommandOrigin::Local),
        Err(Error::Parse(_))
    ));
    assert!(matches!(manager.command_json("missing"), Err(Error::NotFound { .. })));
}

#[test]
fn test_manager_notifies_definition_changes() {
    let manager = CommandManager::new(Default::default());
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.on_definitions_changed(move |dict: &CommandDictionary| sink.lock().push(dict.len()));

    manager.load_category(&robot("robot")).unwrap();
    assert!(manager.load_category(&JsonSource::new("bad", json!([]))).is_err());
    manager
        .load_category(&JsonSource::new("lights", json!({"lights": {"on": {}}})))
        .unwrap();

    assert_eq!(*seen.lock(), vec![2, 3]);
}

proptest! {
    #[test]
    fn prop_loading_twice_matches_loading_once(names in proptest::collection::btree_set("[a-z]{1,8}", 1..6)) {
        let commands: serde_json::Map<String, serde_json::Value> =
            names.iter().map(|n| (n.clone(), json!({"parameters": {"x": "integer"}}))).collect();
        let source = JsonSource::new("gen", json!({"pkg": commands}));

        let mut once = CommandDictionary::new();
        once.load_category(&source, None).unwrap();
        let mut twice = once.clone();
        twice.load_category(&source, None).unwrap();

        prop_assert_eq!(snapshot(&once), snapshot(&twice));
        prop_assert_eq!(once.len(), names.len());
    }
}
