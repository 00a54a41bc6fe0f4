//! In-memory Queue Service.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::Value;

use crate::core::{QueueError, QueueService};

/// Named FIFO queues held in memory behind a single mutex.
///
/// Each operation holds the lock for its whole duration, so concurrent
/// consumers never receive the same item.
#[derive(Debug, Default)]
pub struct InMemoryQueueService {
    queues: Mutex<HashMap<String, VecDeque<Value>>>,
    max_depth: Option<usize>,
}

impl InMemoryQueueService {
    /// Create unbounded queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create queues that reject items beyond `max_depth` per queue.
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            max_depth: Some(max_depth),
        }
    }

    /// Copy of the items currently in `queue`, head first.
    #[must_use]
    pub fn snapshot(&self, queue: &str) -> Vec<Value> {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl QueueService for InMemoryQueueService {
    fn enqueue(&self, queue: &str, payload: Value) -> Result<(), QueueError> {
        let mut queues = self.queues.lock();
        let items = queues.entry(queue.to_owned()).or_default();
        if self.max_depth.is_some_and(|max| items.len() >= max) {
            return Err(QueueError::Full(queue.to_owned()));
        }
        items.push_back(payload);
        Ok(())
    }

    fn dequeue(&self, queue: &str) -> Result<Option<Value>, QueueError> {
        Ok(self.queues.lock().get_mut(queue).and_then(VecDeque::pop_front))
    }

    fn size(&self, queue: &str) -> Result<usize, QueueError> {
        Ok(self.queues.lock().get(queue).map_or(0, VecDeque::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fifo_per_queue() {
        let q = InMemoryQueueService::new();
        q.enqueue("a", json!(1)).unwrap();
        q.enqueue("b", json!("x")).unwrap();
        q.enqueue("a", json!(2)).unwrap();

        assert_eq!(q.size("a").unwrap(), 2);
        assert_eq!(q.dequeue("a").unwrap(), Some(json!(1)));
        assert_eq!(q.dequeue("a").unwrap(), Some(json!(2)));
        assert_eq!(q.dequeue("a").unwrap(), None);
        assert_eq!(q.dequeue("b").unwrap(), Some(json!("x")));
    }

    #[test]
    fn test_unknown_queue_is_empty() {
        let q = InMemoryQueueService::new();
        assert_eq!(q.size("missing").unwrap(), 0);
        assert!(q.dequeue("missing").unwrap().is_none());
    }

    #[test]
    fn test_queue_full() {
        let q = InMemoryQueueService::with_max_depth(1);
        q.enqueue("a", json!(1)).unwrap();
        assert!(matches!(q.enqueue("a", json!(2)), Err(QueueError::Full(name)) if name == "a"));
        q.enqueue("b", json!(1)).unwrap();
    }

    #[test]
    fn test_concurrent_consumers_never_share_items() {
        use std::sync::Arc;
        use std::thread;

        let q = Arc::new(InMemoryQueueService::new());
        for i in 0..1000 {
            q.enqueue("work", json!(i)).unwrap();
        }
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(v) = q.dequeue("work").unwrap() {
                        seen.push(v.as_i64().unwrap());
                    }
                    seen
                })
            })
            .collect();
        let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<i64>>());
    }
}
