//! Tests for pool builders

use serde_json::json;

use prometheus_activity_pool::builders::{build_queue, from_config};
use prometheus_activity_pool::config::{QueueBackendConfig, SchedulerConfig};
use prometheus_activity_pool::core::PoolError;

#[test]
fn test_build_in_memory_queue_with_depth() {
    let queue = build_queue(&QueueBackendConfig::InMemory { max_depth: Some(1) }).unwrap();
    queue.enqueue("incoming", json!(1)).unwrap();
    assert!(queue.enqueue("incoming", json!(2)).is_err());
}

#[test]
fn test_build_file_queue() {
    let dir = tempfile::tempdir().unwrap();
    let queue = build_queue(&QueueBackendConfig::File {
        path: dir.path().join("queues"),
        max_depth: None,
    })
    .unwrap();
    queue.enqueue("incoming", json!({"id": 1})).unwrap();
    assert!(dir.path().join("queues").join("incoming.jsonl").exists());
}

#[test]
fn test_from_config_builds_stopped_pool() {
    let cfg = SchedulerConfig::from_json_str(r#"{"pool": {"max_concurrency": 3}}"#).unwrap();
    let pool = from_config(&cfg).unwrap().build().unwrap();
    assert!(!pool.is_running());
    assert_eq!(pool.status().max_concurrency, 3);
}

#[test]
fn test_from_config_rejects_invalid() {
    let mut cfg = SchedulerConfig::default();
    cfg.pool.max_concurrency = 0;
    assert!(matches!(from_config(&cfg), Err(PoolError::InvalidConfig(_))));
}
