//! Bounded worker pool that runs activity units through named queues.
//!
//! Tasks enter through [`WorkerPool::submit`], which only pushes them onto the
//! incoming queue. A single admission loop moves them into slots while fewer
//! than `max_concurrency` slots are busy; each slot launches one activity unit,
//! waits for its terminal status and records exactly one [`TaskResult`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_activity_pool::builders::WorkerPoolBuilder;
//! use prometheus_activity_pool::config::WorkerPoolConfig;
//! use prometheus_activity_pool::infra::queue::InMemoryQueueService;
//!
//! let pool = WorkerPoolBuilder::new(WorkerPoolConfig::new().with_max_concurrency(4))
//!     .with_queue(InMemoryQueueService::new())
//!     .build()?;
//! pool.start()?;
//! let id = pool.submit("/opt/activities/report.sh", serde_json::json!({"day": "mon"}))?;
//! // ...
//! pool.stop().await;
//! ```

mod admission;
mod slot;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::{
    ActivityLauncher, ActivityRegistry, CompletionCallback, EventKind, EventSink, PoolError,
    PoolEvent, QueueService, Task, TaskHistory, TaskResult, TaskStatus, TracingEventSink,
};
use crate::infra::activity::ProcessLauncher;
use crate::util::serde::TaskId;

/// Depths of the three conventional queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    /// Tasks waiting for a slot.
    pub incoming: usize,
    /// Successful results not yet consumed.
    pub complete: usize,
    /// Failed results not yet consumed.
    pub error: usize,
}

/// Read-only snapshot returned by [`WorkerPool::status`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Whether the admission loop is running.
    pub running: bool,
    /// Concurrency ceiling.
    pub max_concurrency: usize,
    /// Slots currently bound to a running unit.
    pub active_slots: usize,
    /// Queue depths (0 for a queue whose size could not be read).
    pub queue_depths: QueueDepths,
    /// Results currently held in history.
    pub history_size: usize,
    /// Tasks accepted by `submit`.
    pub submitted_tasks: u64,
    /// Tasks recorded as completed.
    pub completed_tasks: u64,
    /// Tasks recorded as failed.
    pub failed_tasks: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// State shared by the pool handle, the admission loop and every slot.
pub(crate) struct PoolShared {
    config: WorkerPoolConfig,
    queue: Option<Arc<dyn QueueService>>,
    registry: Option<Arc<dyn ActivityRegistry>>,
    launcher: Arc<dyn ActivityLauncher>,
    events: Arc<dyn EventSink>,
    running: AtomicBool,
    active_slots: AtomicUsize,
    slots: Mutex<HashMap<TaskId, Option<JoinHandle<()>>>>,
    callbacks: Mutex<HashMap<TaskId, CompletionCallback>>,
    history: Mutex<TaskHistory>,
    wake: Notify,
    terminate: watch::Sender<bool>,
    counters: PoolCounters,
}

struct AdmissionHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Worker pool with a fixed concurrency ceiling.
///
/// The pool is created stopped. [`start`](Self::start) spawns the admission
/// loop on the current tokio runtime; [`stop`](Self::stop) halts admission and
/// terminates every in-flight unit. A stopped pool can be started again and
/// resumes with whatever is still in the incoming queue.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    admission: Mutex<Option<AdmissionHandle>>,
    /// Held by `stop` for its whole run; `start` refuses to proceed meanwhile.
    lifecycle: tokio::sync::Mutex<()>,
}

impl WorkerPool {
    /// Create a pool over `queue` that runs activities as subprocesses.
    pub fn new(config: WorkerPoolConfig, queue: Arc<dyn QueueService>) -> Result<Self, PoolError> {
        Self::from_parts(
            config,
            Some(queue),
            None,
            Arc::new(ProcessLauncher::new()),
            Arc::new(TracingEventSink),
        )
    }

    pub(crate) fn from_parts(
        config: WorkerPoolConfig,
        queue: Option<Arc<dyn QueueService>>,
        registry: Option<Arc<dyn ActivityRegistry>>,
        launcher: Arc<dyn ActivityLauncher>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        let (terminate, _) = watch::channel(false);
        let history = TaskHistory::new(config.history_limit);
        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                queue,
                registry,
                launcher,
                events,
                running: AtomicBool::new(false),
                active_slots: AtomicUsize::new(0),
                slots: Mutex::new(HashMap::new()),
                callbacks: Mutex::new(HashMap::new()),
                history: Mutex::new(history),
                wake: Notify::new(),
                terminate,
                counters: PoolCounters::default(),
            }),
            admission: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    /// Start the admission loop. Calling `start` on a running pool is a no-op.
    ///
    /// Fails with [`PoolError::Configuration`] outside a tokio runtime and
    /// with [`PoolError::Stopping`] while [`stop`](Self::stop) is in progress.
    pub fn start(&self) -> Result<(), PoolError> {
        let Ok(_lifecycle) = self.lifecycle.try_lock() else {
            return Err(PoolError::Stopping);
        };
        let mut admission = self.admission.lock();
        if admission.is_some() {
            return Ok(());
        }
        let handle = Handle::try_current().map_err(|_| {
            PoolError::Configuration("worker pool must be started inside a tokio runtime".into())
        })?;

        self.shared.terminate.send_replace(false);
        self.shared.running.store(true, Ordering::Release);
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = handle.spawn(admission::run(Arc::clone(&self.shared), stop_rx));
        *admission = Some(AdmissionHandle { stop_tx, join });

        info!(
            max_concurrency = self.shared.config.max_concurrency,
            incoming = %self.shared.config.queues.incoming,
            "worker pool started"
        );
        self.shared.emit(PoolEvent::new(EventKind::ManagerStarted).with_detail(json!({
            "max_concurrency": self.shared.config.max_concurrency,
        })));
        Ok(())
    }

    /// Queue `payload` for the activity at `activity_ref`.
    ///
    /// Returns as soon as the task is on the incoming queue.
    pub fn submit(&self, activity_ref: &str, payload: Value) -> Result<TaskId, PoolError> {
        self.shared.submit(activity_ref, payload, None)
    }

    /// Like [`submit`](Self::submit), invoking `callback` once with the
    /// terminal result.
    pub fn submit_with_callback(
        &self,
        activity_ref: &str,
        payload: Value,
        callback: CompletionCallback,
    ) -> Result<TaskId, PoolError> {
        self.shared.submit(activity_ref, payload, Some(callback))
    }

    /// Stop admitting tasks and terminate every in-flight unit.
    ///
    /// Returns once the admission loop has exited and every slot has been
    /// released. Tasks still in the incoming queue are left there.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let admission = self.admission.lock().take();
        let was_running = self.shared.running.swap(false, Ordering::AcqRel);
        if admission.is_none() && !was_running {
            return;
        }

        let active = self.shared.active_slots.load(Ordering::Acquire);
        info!(active_slots = active, "worker pool stopping");
        self.shared.emit(
            PoolEvent::new(EventKind::ManagerStopping).with_detail(json!({ "active_slots": active })),
        );

        if let Some(handle) = admission {
            let _ = handle.stop_tx.send(());
            if let Err(e) = handle.join.await {
                warn!(error = %e, "admission loop ended abnormally");
            }
        }

        self.shared.terminate.send_replace(true);
        let in_flight: Vec<(TaskId, JoinHandle<()>)> = self
            .shared
            .slots
            .lock()
            .drain()
            .filter_map(|(task_id, handle)| handle.map(|handle| (task_id, handle)))
            .collect();
        let terminated = in_flight.len();
        for (task_id, handle) in in_flight {
            if let Err(e) = handle.await {
                warn!(task_id = %task_id, error = %e, "slot ended abnormally during shutdown");
            }
        }

        info!(terminated, "worker pool stopped");
        self.shared.emit(
            PoolEvent::new(EventKind::ManagerStopped).with_detail(json!({ "terminated": terminated })),
        );
    }

    /// Whether the admission loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Snapshot of the pool's current state.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let shared = &self.shared;
        let queues = &shared.config.queues;
        PoolStatus {
            running: self.is_running(),
            max_concurrency: shared.config.max_concurrency,
            active_slots: shared.active_slots.load(Ordering::Acquire),
            queue_depths: QueueDepths {
                incoming: shared.queue_depth(&queues.incoming),
                complete: shared.queue_depth(&queues.complete),
                error: shared.queue_depth(&queues.error),
            },
            history_size: shared.history.lock().len(),
            submitted_tasks: shared.counters.submitted.load(Ordering::Relaxed),
            completed_tasks: shared.counters.completed.load(Ordering::Relaxed),
            failed_tasks: shared.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Most recent results, newest first, at most `limit`.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<TaskResult> {
        self.shared.history.lock().recent(limit)
    }

    /// Recorded result of one task, if it finished and was not evicted.
    #[must_use]
    pub fn task_result(&self, task_id: &TaskId) -> Option<TaskResult> {
        self.shared.history.lock().get(task_id).cloned()
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.shared.config
    }

    /// The sink receiving this pool's lifecycle notifications.
    #[must_use]
    pub fn event_sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.shared.events)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal only; in-flight slots observe `terminate` and wind down on
        // their own.
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.admission.get_mut().take() {
            let _ = handle.stop_tx.send(());
        }
        self.shared.terminate.send_replace(true);
    }
}

impl PoolShared {
    pub(crate) fn emit(&self, event: PoolEvent) {
        self.events.emit(event);
    }

    fn queue_depth(&self, name: &str) -> usize {
        self.queue
            .as_ref()
            .and_then(|q| q.size(name).ok())
            .unwrap_or(0)
    }

    fn submit(
        &self,
        activity_ref: &str,
        payload: Value,
        callback: Option<CompletionCallback>,
    ) -> Result<TaskId, PoolError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(PoolError::NotRunning);
        }
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| PoolError::Configuration("no queue service configured".into()))?;
        let resolved = self.resolve(activity_ref)?;

        let task = Task::new(resolved, payload);
        let task_id = task.id.clone();
        let record = serde_json::to_value(&task)?;
        if let Some(callback) = callback {
            self.callbacks.lock().insert(task_id.clone(), callback);
        }
        let incoming = &self.config.queues.incoming;
        if let Err(e) = queue.enqueue(incoming, record) {
            self.callbacks.lock().remove(&task_id);
            return Err(e.into());
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let depth = self.queue_depth(incoming);
        debug!(task_id = %task_id, activity = %task.activity_ref, queue_depth = depth, "task queued");
        self.emit(PoolEvent::for_task(EventKind::Queued, &task_id).with_detail(json!({
            "activity": task.activity_ref,
            "queue_depth": depth,
        })));
        self.wake.notify_one();
        Ok(task_id)
    }

    fn resolve(&self, reference: &str) -> Result<String, PoolError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(PoolError::ActivityNotFound("empty activity reference".into()));
        }
        if Path::new(reference).is_absolute() {
            return Ok(reference.to_owned());
        }
        if let Some(registry) = &self.registry {
            return registry.resolve(reference);
        }
        if let Some(root) = &self.config.activities_root {
            return Ok(root.join(reference).to_string_lossy().into_owned());
        }
        Ok(reference.to_owned())
    }

    /// Record a terminal result, deliver it and run the callback.
    ///
    /// Returns `false` when the task already had a result.
    fn finish(&self, result: TaskResult, callback: Option<CompletionCallback>) -> bool {
        if !self.history.lock().record(result.clone()) {
            debug!(task_id = %result.task_id, "duplicate terminal result ignored");
            return false;
        }

        let failed = result.status == TaskStatus::Error;
        if failed {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.completed.fetch_add(1, Ordering::Relaxed);
        }

        self.deliver(&result);

        self.emit(PoolEvent::for_task(EventKind::Status, &result.task_id).with_detail(json!({
            "status": result.status.as_str(),
            "activity": result.activity_ref,
            "data": result.data,
        })));
        if let Some(error) = &result.error {
            warn!(task_id = %result.task_id, kind = ?error.kind, message = %error.message, "task failed");
            self.emit(PoolEvent::for_task(EventKind::Error, &result.task_id).with_detail(json!({
                "kind": error.kind,
                "message": error.message,
            })));
        } else {
            debug!(task_id = %result.task_id, "task completed");
        }

        if let Some(callback) = callback {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(&result)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(PoolError::Callback(format!("{e:#}"))),
                Err(panic) => Some(PoolError::Callback(panic_message(panic.as_ref()))),
            };
            if let Some(err) = failure {
                warn!(task_id = %result.task_id, error = %err, "completion callback failed");
                self.emit(
                    PoolEvent::for_task(EventKind::CallbackError, &result.task_id)
                        .with_detail(json!({ "error": err.to_string() })),
                );
            }
        }
        true
    }

    fn deliver(&self, result: &TaskResult) {
        let Some(queue) = &self.queue else {
            return;
        };
        let target = match result.status {
            TaskStatus::Completed => &self.config.queues.complete,
            TaskStatus::Error => &self.config.queues.error,
        };
        let delivered = serde_json::to_value(result)
            .map_err(PoolError::from)
            .and_then(|value| queue.enqueue(target, value).map_err(PoolError::from));
        if let Err(e) = delivered {
            warn!(task_id = %result.task_id, queue = %target, error = %e, "result delivery failed");
            self.emit(PoolEvent::for_task(EventKind::Error, &result.task_id).with_detail(json!({
                "stage": "result_delivery",
                "queue": target,
                "message": e.to_string(),
            })));
        }
    }
}

/// Readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::queue::InMemoryQueueService;

    fn pool() -> WorkerPool {
        WorkerPool::new(
            WorkerPoolConfig::new().with_max_concurrency(1),
            Arc::new(InMemoryQueueService::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_submit_before_start_is_rejected() {
        let pool = pool();
        assert!(matches!(
            pool.submit("/bin/true", Value::Null),
            Err(PoolError::NotRunning)
        ));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let pool = pool();
        assert!(matches!(pool.start(), Err(PoolError::Configuration(_))));
        assert!(!pool.is_running());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = WorkerPool::new(
            WorkerPoolConfig::new().with_max_concurrency(0),
            Arc::new(InMemoryQueueService::new()),
        );
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_resolution_rules() {
        let pool = WorkerPool::new(
            WorkerPoolConfig::new().with_activities_root("/srv/activities"),
            Arc::new(InMemoryQueueService::new()),
        )
        .unwrap();
        let shared = &pool.shared;
        assert_eq!(shared.resolve("/opt/a.sh").unwrap(), "/opt/a.sh");
        assert_eq!(shared.resolve("report.sh").unwrap(), "/srv/activities/report.sh");
        assert!(matches!(shared.resolve("  "), Err(PoolError::ActivityNotFound(_))));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "panic with non-string payload");
    }

    #[test]
    fn test_status_of_idle_pool() {
        let pool = pool();
        let status = pool.status();
        assert!(!status.running);
        assert_eq!(status.max_concurrency, 1);
        assert_eq!(status.active_slots, 0);
        assert_eq!(status.queue_depths, QueueDepths::default());
    }
}
