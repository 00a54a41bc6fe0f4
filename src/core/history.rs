//! Bounded in-memory record of terminal task results.

use std::collections::{HashMap, VecDeque};

use crate::core::TaskResult;
use crate::util::serde::TaskId;

/// Terminal results keyed by task id, in recording order.
///
/// The first result recorded for a task wins; later attempts are rejected.
/// Once `capacity` is exceeded the oldest result is evicted.
#[derive(Debug)]
pub struct TaskHistory {
    capacity: usize,
    order: VecDeque<TaskId>,
    results: HashMap<TaskId, TaskResult>,
}

impl TaskHistory {
    /// Create an empty history holding at most `capacity` results.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            results: HashMap::new(),
        }
    }

    /// Record a result. Returns `false` if the task already has one.
    pub fn record(&mut self, result: TaskResult) -> bool {
        if self.results.contains_key(&result.task_id) {
            return false;
        }
        self.order.push_back(result.task_id.clone());
        self.results.insert(result.task_id.clone(), result);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.results.remove(&evicted);
            }
        }
        true
    }

    /// Look up the result for a task.
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<&TaskResult> {
        self.results.get(task_id)
    }

    /// Most recent results, newest first, at most `limit`.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<TaskResult> {
        self.order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| self.results.get(id).cloned())
            .collect()
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when nothing has been recorded (or everything was evicted).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskStatus;
    use serde_json::Value;

    fn result(id: &str, status: TaskStatus) -> TaskResult {
        TaskResult {
            task_id: TaskId::from(id),
            activity_ref: "noop".into(),
            status,
            data: Value::Null,
            error: None,
            queued_at_ms: 1,
            started_at_ms: 2,
            completed_at_ms: 3,
        }
    }

    #[test]
    fn test_first_writer_wins() {
        let mut history = TaskHistory::new(10);
        assert!(history.record(result("a", TaskStatus::Completed)));
        assert!(!history.record(result("a", TaskStatus::Error)));
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(&TaskId::from("a")).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let mut history = TaskHistory::new(10);
        for id in ["a", "b", "c"] {
            history.record(result(id, TaskStatus::Completed));
        }
        let ids: Vec<_> = history
            .recent(2)
            .into_iter()
            .map(|r| r.task_id.to_string())
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let mut history = TaskHistory::new(2);
        for id in ["a", "b", "c"] {
            history.record(result(id, TaskStatus::Completed));
        }
        assert_eq!(history.len(), 2);
        assert!(history.get(&TaskId::from("a")).is_none());
        assert!(history.get(&TaskId::from("c")).is_some());
    }
}
