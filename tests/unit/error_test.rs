//! Tests for error types

use prometheus_activity_pool::core::{PoolError, QueueError};

#[test]
fn test_queue_full_error() {
    let err = QueueError::Full("incoming".to_string());
    assert_eq!(format!("{}", err), "queue full: incoming");
}

#[test]
fn test_queue_error_is_transparent_in_pool_error() {
    let err: PoolError = QueueError::Backend("connection failed".to_string()).into();
    assert!(matches!(err, PoolError::Queue(_)));
    assert_eq!(format!("{}", err), "backend error: connection failed");
}

#[test]
fn test_submission_errors() {
    assert_eq!(format!("{}", PoolError::NotRunning), "worker pool is not running");
    assert_eq!(format!("{}", PoolError::Stopping), "worker pool is stopping");
    assert_eq!(
        format!("{}", PoolError::ActivityNotFound("report.sh".into())),
        "activity not found: report.sh"
    );
    assert_eq!(
        format!("{}", PoolError::Configuration("no queue service configured".into())),
        "configuration error: no queue service configured"
    );
}

#[test]
fn test_io_and_serialization_conversions() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: PoolError = io.into();
    assert!(format!("{}", err).contains("pipe closed"));

    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: PoolError = json_err.into();
    assert!(matches!(err, PoolError::Serialization(_)));
}
