//! Tests for Queue Service backends

use std::sync::Arc;
use std::thread;

use serde_json::json;

use prometheus_activity_pool::core::QueueService;
use prometheus_activity_pool::infra::queue::{FileQueueService, InMemoryQueueService};

fn exercise_fifo(queue: &dyn QueueService) {
    for i in 0..5 {
        queue.enqueue("incoming", json!({ "n": i })).unwrap();
    }
    queue.enqueue("complete", json!("done")).unwrap();
    assert_eq!(queue.size("incoming").unwrap(), 5);
    for i in 0..5 {
        assert_eq!(queue.dequeue("incoming").unwrap(), Some(json!({ "n": i })));
    }
    assert_eq!(queue.dequeue("incoming").unwrap(), None);
    assert_eq!(queue.size("complete").unwrap(), 1);
}

#[test]
fn test_in_memory_fifo() {
    exercise_fifo(&InMemoryQueueService::new());
}

#[test]
fn test_file_fifo() {
    let dir = tempfile::tempdir().unwrap();
    exercise_fifo(&FileQueueService::new(dir.path()).unwrap());
}

#[test]
fn test_file_queue_concurrent_producers() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(FileQueueService::new(dir.path()).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..25 {
                    queue.enqueue("incoming", json!({ "p": p, "i": i })).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(queue.size("incoming").unwrap(), 100);

    let reopened = FileQueueService::new(dir.path()).unwrap();
    assert_eq!(reopened.size("incoming").unwrap(), 100);
}
