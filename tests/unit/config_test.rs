//! Tests for configuration validation

use std::time::Duration;

use prometheus_activity_pool::config::{
    JobConfig, QueueBackendConfig, QueueNames, SchedulerConfig, WorkerPoolConfig,
};

#[test]
fn test_pool_config_validation() {
    let valid = WorkerPoolConfig::new().with_max_concurrency(4);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_concurrency() {
    let invalid = WorkerPoolConfig::new().with_max_concurrency(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_invalid_poll_interval() {
    let invalid = WorkerPoolConfig::new().with_poll_interval(Duration::ZERO);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_empty_queue_name() {
    let invalid = WorkerPoolConfig::new().with_queue_names(QueueNames {
        incoming: " ".into(),
        ..QueueNames::default()
    });
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_from_json() {
    let cfg = WorkerPoolConfig::from_json_str(
        r#"{
            "max_concurrency": 8,
            "poll_interval_ms": 250,
            "activities_root": "/srv/activities",
            "queues": {"incoming": "tasks:in"}
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.max_concurrency, 8);
    assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
    assert_eq!(cfg.queues.incoming, "tasks:in");
    assert_eq!(cfg.queues.complete, "complete");
    assert!(WorkerPoolConfig::from_json_str(r#"{"max_concurrency": 0}"#).is_err());
    assert!(WorkerPoolConfig::from_json_str("not json").is_err());
}

#[test]
fn test_scheduler_config_parsing() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "pool": {"max_concurrency": 2},
            "queue": {"kind": "file", "path": "/var/lib/activity-pool", "max_depth": 100},
            "jobs": [
                {"name": "nightly", "activity": "report.sh", "interval_secs": 86400},
                {"name": "ping", "activity": "ping.sh", "payload": {"host": "db"}, "interval_secs": 30}
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.pool.max_concurrency, 2);
    assert!(matches!(cfg.queue, QueueBackendConfig::File { max_depth: Some(100), .. }));
    assert_eq!(cfg.jobs.len(), 2);
    assert_eq!(cfg.jobs[0].payload, serde_json::Value::Null);
}

#[test]
fn test_scheduler_config_defaults() {
    let cfg = SchedulerConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg.queue, QueueBackendConfig::InMemory { max_depth: None });
    assert!(cfg.jobs.is_empty());
}

#[test]
fn test_scheduler_config_rejects_bad_jobs() {
    let job = |name: &str, interval_secs| JobConfig {
        name: name.into(),
        activity: "a.sh".into(),
        payload: serde_json::Value::Null,
        interval_secs,
    };

    let duplicate = SchedulerConfig {
        jobs: vec![job("a", 1), job("a", 2)],
        ..SchedulerConfig::default()
    };
    assert!(duplicate.validate().unwrap_err().contains("more than once"));

    let zero = SchedulerConfig {
        jobs: vec![job("a", 0)],
        ..SchedulerConfig::default()
    };
    assert!(zero.validate().is_err());
}
