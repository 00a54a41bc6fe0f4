//! Task and task result models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AppResult;
use crate::util::clock::now_ms;
use crate::util::serde::TaskId;

/// A request to run one activity with one payload.
///
/// This is the record that travels through the incoming queue. The optional
/// completion callback is not serializable and is held by the pool, keyed by
/// [`Task::id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Resolved activity reference (absolute path or registered name).
    pub activity_ref: String,
    /// Input data handed to the activity.
    pub payload: Value,
    /// Submission timestamp in milliseconds since epoch.
    pub queued_at_ms: u64,
}

impl Task {
    /// Create a task with a fresh identifier, stamped with the current time.
    pub fn new(activity_ref: impl Into<String>, payload: Value) -> Self {
        Self {
            id: TaskId::generate(),
            activity_ref: activity_ref.into(),
            payload,
            queued_at_ms: now_ms(),
        }
    }
}

/// Terminal status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The activity reported `completed`.
    Completed,
    /// The activity reported `error`, crashed, or exited without a status.
    Error,
}

impl TaskStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Why a task ended in [`TaskStatus::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Explicit `error` status from the activity.
    Execution,
    /// Crash, fault, forced termination, or exit without a terminal status.
    AbnormalTermination,
}

/// Failure details attached to an errored task result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Failure category.
    pub kind: TaskErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl TaskError {
    /// Failure reported by the activity itself.
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::Execution,
            message: message.into(),
        }
    }

    /// Failure detected by the pool (crash, exit, termination).
    pub fn abnormal(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::AbnormalTermination,
            message: message.into(),
        }
    }
}

/// Terminal outcome of a task. Created exactly once per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task identifier.
    pub task_id: TaskId,
    /// Activity that ran.
    pub activity_ref: String,
    /// Terminal status.
    pub status: TaskStatus,
    /// Data attached to the terminal status message (`null` if none).
    pub data: Value,
    /// Failure details when `status` is [`TaskStatus::Error`].
    pub error: Option<TaskError>,
    /// Submission timestamp (ms).
    pub queued_at_ms: u64,
    /// Slot admission timestamp (ms).
    pub started_at_ms: u64,
    /// Terminal status timestamp (ms).
    pub completed_at_ms: u64,
}

impl TaskResult {
    /// True when the task completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Error message, if the task failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// Callback invoked once with the terminal result of a task.
///
/// Errors and panics are caught by the pool and reported to the event sink.
pub type CompletionCallback = Box<dyn FnOnce(&TaskResult) -> AppResult<()> + Send + 'static>;

/// Box a closure as a [`CompletionCallback`].
pub fn on_complete<F>(f: F) -> CompletionCallback
where
    F: FnOnce(&TaskResult) -> AppResult<()> + Send + 'static,
{
    Box::new(f)
}

/// Extract a readable message from the data of an `error` status.
pub(crate) fn error_message_from(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map_or_else(|| data.to_string(), str::to_owned),
        Value::Null => "activity reported an error".to_owned(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_from_variants() {
        assert_eq!(error_message_from(&json!("boom")), "boom");
        assert_eq!(error_message_from(&json!({"message": "bad input"})), "bad input");
        assert_eq!(error_message_from(&json!({"error": "nope"})), "nope");
        assert_eq!(error_message_from(&Value::Null), "activity reported an error");
        assert_eq!(error_message_from(&json!(42)), "42");
    }

    #[test]
    fn test_task_round_trips_through_json_value() {
        let task = Task::new("/opt/activities/ping.sh", json!({"host": "db"}));
        let value = serde_json::to_value(&task).unwrap();
        let back: Task = serde_json::from_value(value).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&TaskStatus::Completed).unwrap(), "\"completed\"");
        assert_eq!(TaskStatus::Error.as_str(), "error");
    }
}
