//! Queue Service abstraction.

use serde_json::Value;

use crate::core::QueueError;

/// Named FIFO queues of opaque JSON payloads.
///
/// Implementations must be safe under concurrent callers: each `enqueue` and
/// `dequeue` is atomic, so two consumers can never receive the same item.
pub trait QueueService: Send + Sync + 'static {
    /// Append `payload` to the tail of `queue`.
    fn enqueue(&self, queue: &str, payload: Value) -> Result<(), QueueError>;
    /// Remove and return the head of `queue`, or `None` when empty.
    fn dequeue(&self, queue: &str) -> Result<Option<Value>, QueueError>;
    /// Number of items currently in `queue`.
    fn size(&self, queue: &str) -> Result<usize, QueueError>;
}
