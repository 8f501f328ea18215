//! Event bus and reaper tests.

use std::sync::Arc;
use std::time::Duration;

use devlink_commands::{
    CommandDictionary, CommandEventBus, CommandEventType, CommandInstance, CommandOrigin,
    CommandQueue, CommandReaper, CommandState, EventFilter,
};
use devlink_core::JsonSource;
use devlink_schema::ValueMap;
use serde_json::json;

fn make_command(dict: &CommandDictionary) -> CommandInstance {
    CommandInstance::create(dict, &json!({"name": "robot.wave"}), CommandOrigin::Local).unwrap()
}

fn dictionary() -> CommandDictionary {
    let mut dict = CommandDictionary::new();
    dict.load_category(&JsonSource::new("robot", json!({"robot": {"wave": {}}})), None)
        .unwrap();
    dict
}

#[tokio::test]
async fn test_bus_receives_queue_events() {
    let dict = dictionary();
    let queue = CommandQueue::new("", Duration::from_secs(60));
    let bus = Arc::new(CommandEventBus::new(10));
    queue.add_observer(bus.observer());

    let mut rx = bus.subscribe();
    let id = queue.add(make_command(&dict));
    queue.cancel(&id).unwrap();

    let added = rx.recv().await.unwrap();
    assert_eq!(added.event_type, CommandEventType::Added);
    assert_eq!(added.command_id, id);

    let changed = rx.recv().await.unwrap();
    assert_eq!(changed.event_type, CommandEventType::StateChanged);
    assert_eq!(changed.previous_state, Some(CommandState::Queued));
    assert_eq!(changed.state, CommandState::Cancelled);

    assert_eq!(bus.get_for_command(&id).len(), 2);
}

#[tokio::test]
async fn test_filtered_subscriber() {
    let dict = dictionary();
    let queue = CommandQueue::default();
    let bus = Arc::new(CommandEventBus::new(10));
    queue.add_observer(bus.observer());

    let mut states = bus.subscribe_filtered(
        EventFilter::new().with_types(vec![CommandEventType::StateChanged]),
    );

    let id = queue.add(make_command(&dict));
    queue.complete(&id, ValueMap::new()).unwrap();

    let event = states.recv().await.unwrap();
    assert_eq!(event.state, CommandState::Done);
    assert!(states.try_recv().is_err());
}

#[tokio::test]
async fn test_recent_history_is_bounded() {
    let dict = dictionary();
    let queue = CommandQueue::default();
    let bus = Arc::new(CommandEventBus::new(3));
    queue.add_observer(bus.observer());

    let ids: Vec<String> = (0..5).map(|_| queue.add(make_command(&dict))).collect();

    let recent = bus.get_recent(10);
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].command_id, ids[2]);
    assert_eq!(recent[2].command_id, ids[4]);
}

#[tokio::test]
async fn test_reaper_removes_finished_commands() {
    let dict = dictionary();
    let queue = Arc::new(CommandQueue::new("", Duration::from_millis(20)));
    let reaper = CommandReaper::new(queue.clone(), Duration::from_millis(10));

    let done = queue.add(make_command(&dict));
    let active = queue.add(make_command(&dict));
    queue.complete(&done, ValueMap::new()).unwrap();

    reaper.start().await;
    assert!(reaper.is_running().await);

    // Still visible right after completion
    assert!(queue.find(&done).is_some());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(queue.find(&done).is_none());
    assert!(queue.find(&active).is_some());

    reaper.stop().await;
    assert!(!reaper.is_running().await);
}
