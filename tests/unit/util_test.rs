//! Tests for utility functions

use prometheus_activity_pool::util::{now_ms, TaskId};

#[test]
fn test_task_ids_are_unique() {
    let a = TaskId::generate();
    let b = TaskId::generate();
    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 36);
}

#[test]
fn test_task_id_serializes_as_plain_string() {
    let id = TaskId::from("task-1");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"task-1\"");
    assert_eq!(id.to_string(), "task-1");
    let back: TaskId = serde_json::from_str("\"task-1\"").unwrap();
    assert_eq!(back, id);
    assert_eq!(TaskId::from(String::from("task-1")), id);
}

#[test]
fn test_clock_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}
