//! Event sink implementations.
//!
//! Lifecycle notifications are fire-and-forget: sinks must not block and the
//! pool never looks at whether delivery succeeded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::util::clock::now_ms;
use crate::util::serde::TaskId;

/// Kind of lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Task accepted onto the incoming queue.
    #[serde(rename = "queued")]
    Queued,
    /// Task admitted into a slot.
    #[serde(rename = "started")]
    Started,
    /// Status message from a unit (running or terminal).
    #[serde(rename = "status")]
    Status,
    /// Execution failure, protocol problem, or queue delivery failure.
    #[serde(rename = "error")]
    Error,
    /// Unit exited or was terminated.
    #[serde(rename = "exit")]
    Exit,
    /// A completion callback returned an error or panicked.
    #[serde(rename = "callback:error")]
    CallbackError,
    /// Pool admission loop started.
    #[serde(rename = "manager:started")]
    ManagerStarted,
    /// Pool shutdown began.
    #[serde(rename = "manager:stopping")]
    ManagerStopping,
    /// Pool shutdown finished.
    #[serde(rename = "manager:stopped")]
    ManagerStopped,
    /// Recurring job armed.
    #[serde(rename = "job:started")]
    JobStarted,
    /// Recurring job cancelled.
    #[serde(rename = "job:stopped")]
    JobStopped,
    /// Recurring job start rejected (duplicate name).
    #[serde(rename = "job:rejected")]
    JobRejected,
    /// A recurring job's task reached a terminal status.
    #[serde(rename = "job:executed")]
    TaskExecuted,
}

impl EventKind {
    /// Wire name of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Status => "status",
            Self::Error => "error",
            Self::Exit => "exit",
            Self::CallbackError => "callback:error",
            Self::ManagerStarted => "manager:started",
            Self::ManagerStopping => "manager:stopping",
            Self::ManagerStopped => "manager:stopped",
            Self::JobStarted => "job:started",
            Self::JobStopped => "job:stopped",
            Self::JobRejected => "job:rejected",
            Self::TaskExecuted => "job:executed",
        }
    }

    const fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::CallbackError | Self::JobRejected)
    }
}

/// A lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEvent {
    /// Event identifier.
    pub event_id: String,
    /// What happened.
    pub kind: EventKind,
    /// Related task, if any.
    pub task_id: Option<TaskId>,
    /// Related recurring job, if any.
    pub job: Option<String>,
    /// Additional context.
    pub detail: Value,
    /// Timestamp milliseconds.
    pub created_at_ms: u64,
}

impl PoolEvent {
    /// Build an event with no task or job attached.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            kind,
            task_id: None,
            job: None,
            detail: Value::Null,
            created_at_ms: now_ms(),
        }
    }

    /// Build an event about a task.
    #[must_use]
    pub fn for_task(kind: EventKind, task_id: &TaskId) -> Self {
        let mut event = Self::new(kind);
        event.task_id = Some(task_id.clone());
        event
    }

    /// Tag the event with a recurring job name.
    #[must_use]
    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Attach context.
    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Receives lifecycle notifications.
pub trait EventSink: Send + Sync {
    /// Record an event. Must return quickly and never panic.
    fn emit(&self, event: PoolEvent);
}

/// Default sink: every event becomes a `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: PoolEvent) {
        let task_id = event.task_id.as_ref().map(TaskId::as_str).unwrap_or("-");
        let job = event.job.as_deref().unwrap_or("-");
        if event.kind.is_failure() {
            tracing::warn!(event = event.kind.as_str(), task_id, job, detail = %event.detail, "pool event");
        } else {
            tracing::debug!(event = event.kind.as_str(), task_id, job, detail = %event.detail, "pool event");
        }
    }
}

/// In-memory sink for testing and dev, bounded to the most recent events.
pub struct InMemoryEventSink {
    events: Mutex<VecDeque<PoolEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<PoolEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events of one kind, oldest first.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<PoolEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of stored events of one kind.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: PoolEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Forwards events into a bounded channel, dropping them when it is full.
pub struct ChannelEventSink {
    tx: Sender<PoolEvent>,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<PoolEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Events discarded because the channel was full or disconnected.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: PoolEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Delivers every event to several sinks in order.
#[derive(Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    /// Create an empty fanout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a downstream sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: PoolEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_wire_names_match_serde() {
        for kind in [
            EventKind::Queued,
            EventKind::ManagerStopping,
            EventKind::CallbackError,
            EventKind::TaskExecuted,
        ] {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, Value::String(kind.as_str().to_owned()));
        }
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, rx) = ChannelEventSink::bounded(1);
        sink.emit(PoolEvent::new(EventKind::Queued));
        sink.emit(PoolEvent::new(EventKind::Started));
        assert_eq!(sink.dropped(), 1);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::Queued);
    }
}
