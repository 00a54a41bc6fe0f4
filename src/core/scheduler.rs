//! Interval scheduler driving a [`WorkerPool`] under named recurring jobs.
//!
//! A job submits its activity once when started and again on every interval
//! tick until it is stopped. Job names are unique; starting a name that is
//! already armed is rejected without touching the existing timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::JobConfig;
use crate::core::{
    on_complete, AppResult, CompletionCallback, EventKind, PoolError, PoolEvent, TaskResult,
    WorkerPool,
};
use crate::util::clock::now_ms;
use crate::util::serde::TaskId;

/// Callback invoked with the terminal result of every run of a job.
pub type JobCallback = Arc<dyn Fn(&TaskResult) -> AppResult<()> + Send + Sync + 'static>;

/// Wrap a closure as a [`JobCallback`].
pub fn job_callback<F>(f: F) -> JobCallback
where
    F: Fn(&TaskResult) -> AppResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Description of a recurring job.
///
/// Only name, activity and interval are required; payload defaults to `null`
/// and the callback is optional.
#[derive(Clone)]
pub struct JobSpec {
    /// Unique job name.
    pub name: String,
    /// Activity reference submitted on every run.
    pub activity_ref: String,
    /// Payload submitted on every run.
    pub payload: Value,
    /// Time between runs.
    pub interval: Duration,
    /// Optional per-run callback.
    pub callback: Option<JobCallback>,
}

impl JobSpec {
    /// A job with a `null` payload and no callback.
    pub fn new(name: impl Into<String>, activity_ref: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            activity_ref: activity_ref.into(),
            payload: Value::Null,
            interval,
            callback: None,
        }
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the per-run callback.
    #[must_use]
    pub fn with_callback(mut self, callback: JobCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl From<&JobConfig> for JobSpec {
    fn from(cfg: &JobConfig) -> Self {
        Self::new(&cfg.name, &cfg.activity, Duration::from_secs(cfg.interval_secs))
            .with_payload(cfg.payload.clone())
    }
}

impl std::fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("activity_ref", &self.activity_ref)
            .field("interval", &self.interval)
            .field("has_callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

/// Submits one job's activity to the pool.
struct JobRunner {
    pool: Arc<WorkerPool>,
    spec: JobSpec,
}

impl JobRunner {
    fn fire(&self) -> Result<TaskId, PoolError> {
        let events = self.pool.event_sink();
        let job = self.spec.name.clone();
        let user = self.spec.callback.clone();
        let callback: CompletionCallback = on_complete(move |result| {
            events.emit(
                PoolEvent::for_task(EventKind::TaskExecuted, &result.task_id)
                    .with_job(job)
                    .with_detail(json!({ "status": result.status.as_str() })),
            );
            user.map_or(Ok(()), |cb| cb(result))
        });
        self.pool
            .submit_with_callback(&self.spec.activity_ref, self.spec.payload.clone(), callback)
    }
}

struct RecurringJob {
    activity_ref: String,
    interval: Duration,
    started_at_ms: u64,
    /// Distinguishes this registration from a later one under the same name.
    serial: u64,
    /// `None` while `start` is still firing the first run.
    timer: Option<JoinHandle<()>>,
}

impl RecurringJob {
    fn cancel(&self) {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
    }
}

/// Named recurring jobs over a shared [`WorkerPool`].
pub struct Scheduler {
    pool: Arc<WorkerPool>,
    jobs: Mutex<HashMap<String, RecurringJob>>,
    next_serial: AtomicU64,
}

impl Scheduler {
    /// Create a scheduler with no jobs.
    #[must_use]
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            jobs: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(0),
        }
    }

    /// The pool this scheduler submits to.
    #[must_use]
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Arm a recurring job: submit now, then every `spec.interval`.
    ///
    /// Starts the pool if it is not running. Returns `Ok(false)` without
    /// side effects other than a `job:rejected` event when the name is
    /// already in use. A failing first submission is returned and the job is
    /// not armed. Fails with [`PoolError::Configuration`] outside a tokio
    /// runtime.
    ///
    /// No scheduler lock is held while the pool runs or events are emitted,
    /// so an [`EventSink`](crate::core::EventSink) may query the scheduler.
    pub fn start(&self, spec: JobSpec) -> Result<bool, PoolError> {
        if spec.interval.is_zero() {
            return Err(PoolError::InvalidConfig(format!(
                "job `{}`: interval must be greater than 0",
                spec.name
            )));
        }
        let runtime = Handle::try_current().map_err(|_| {
            PoolError::Configuration("scheduler jobs must be started inside a tokio runtime".into())
        })?;

        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let reserved = {
            let mut jobs = self.jobs.lock();
            if jobs.contains_key(&spec.name) {
                false
            } else {
                jobs.insert(
                    spec.name.clone(),
                    RecurringJob {
                        activity_ref: spec.activity_ref.clone(),
                        interval: spec.interval,
                        started_at_ms: now_ms(),
                        serial,
                        timer: None,
                    },
                );
                true
            }
        };
        if !reserved {
            warn!(job = %spec.name, "recurring job already running; start ignored");
            self.pool.event_sink().emit(
                PoolEvent::new(EventKind::JobRejected)
                    .with_job(spec.name.clone())
                    .with_detail(json!({ "reason": "duplicate job name" })),
            );
            return Ok(false);
        }

        let name = spec.name.clone();
        let activity_ref = spec.activity_ref.clone();
        let interval = spec.interval;
        let runner = JobRunner {
            pool: Arc::clone(&self.pool),
            spec,
        };
        let first = match self.pool.start().and_then(|()| runner.fire()) {
            Ok(first) => first,
            Err(e) => {
                self.release(&name, serial);
                return Err(e);
            }
        };
        debug!(job = %name, task_id = %first, "recurring job fired");

        let timer = runtime.spawn(run_timer(runner));
        let armed = match self.jobs.lock().get_mut(&name) {
            Some(job) if job.serial == serial => {
                job.timer = Some(timer);
                true
            }
            _ => {
                timer.abort();
                false
            }
        };
        if !armed {
            debug!(job = %name, "recurring job stopped before its timer was armed");
            return Ok(true);
        }

        info!(job = %name, activity = %activity_ref, interval_ms = millis(interval), "recurring job started");
        self.pool.event_sink().emit(
            PoolEvent::new(EventKind::JobStarted).with_job(name).with_detail(json!({
                "activity": activity_ref,
                "interval_ms": millis(interval),
            })),
        );
        Ok(true)
    }

    /// Drop the reservation made by a `start` that failed.
    fn release(&self, name: &str, serial: u64) {
        let mut jobs = self.jobs.lock();
        if jobs.get(name).is_some_and(|job| job.serial == serial) {
            jobs.remove(name);
        }
    }

    /// Canonical five-argument form of [`start`](Self::start).
    pub fn start_job(
        &self,
        name: &str,
        activity_ref: &str,
        payload: Value,
        interval_secs: u64,
        callback: Option<JobCallback>,
    ) -> Result<bool, PoolError> {
        let mut spec = JobSpec::new(name, activity_ref, Duration::from_secs(interval_secs))
            .with_payload(payload);
        spec.callback = callback;
        self.start(spec)
    }

    /// Start every configured job. Returns how many were newly armed.
    pub fn start_configured(&self, jobs: &[JobConfig]) -> Result<usize, PoolError> {
        let mut started = 0;
        for job in jobs {
            if self.start(JobSpec::from(job))? {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Cancel one job. Returns `false` if no job has that name.
    ///
    /// Tasks the job already submitted keep running.
    pub fn stop(&self, name: &str) -> bool {
        let Some(job) = self.jobs.lock().remove(name) else {
            return false;
        };
        job.cancel();
        info!(job = %name, "recurring job stopped");
        self.pool.event_sink().emit(
            PoolEvent::new(EventKind::JobStopped).with_job(name).with_detail(json!({
                "activity": job.activity_ref,
                "interval_ms": millis(job.interval),
                "armed_for_ms": now_ms().saturating_sub(job.started_at_ms),
            })),
        );
        true
    }

    /// Cancel every job, then stop the pool.
    pub async fn stop_all(&self) {
        let drained: Vec<(String, RecurringJob)> = self.jobs.lock().drain().collect();
        for (name, job) in &drained {
            job.cancel();
            self.pool
                .event_sink()
                .emit(PoolEvent::new(EventKind::JobStopped).with_job(name.clone()));
        }
        info!(jobs = drained.len(), "all recurring jobs stopped");
        self.pool.stop().await;
    }

    /// Whether `name` is armed, or with `None`, whether any job is.
    #[must_use]
    pub fn is_running(&self, name: Option<&str>) -> bool {
        let jobs = self.jobs.lock();
        name.map_or(!jobs.is_empty(), |name| jobs.contains_key(name))
    }

    /// Names of armed jobs, sorted.
    #[must_use]
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for job in self.jobs.get_mut().values() {
            job.cancel();
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

async fn run_timer(runner: JobRunner) {
    let period = runner.spec.interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match runner.fire() {
            Ok(task_id) => debug!(job = %runner.spec.name, task_id = %task_id, "recurring job fired"),
            Err(e) => {
                warn!(job = %runner.spec.name, error = %e, "recurring submission failed");
                runner.pool.event_sink().emit(
                    PoolEvent::new(EventKind::Error)
                        .with_job(runner.spec.name.clone())
                        .with_detail(json!({ "stage": "schedule", "message": e.to_string() })),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_spec_from_config() {
        let cfg = JobConfig {
            name: "nightly".into(),
            activity: "report.sh".into(),
            payload: json!({"full": true}),
            interval_secs: 60,
        };
        let spec = JobSpec::from(&cfg);
        assert_eq!(spec.name, "nightly");
        assert_eq!(spec.interval, Duration::from_secs(60));
        assert_eq!(spec.payload, json!({"full": true}));
        assert!(spec.callback.is_none());
    }

    #[test]
    fn test_job_spec_debug_hides_callback() {
        let spec = JobSpec::new("a", "b", Duration::from_secs(1)).with_callback(job_callback(|_| Ok(())));
        let rendered = format!("{spec:?}");
        assert!(rendered.contains("has_callback: true"));
    }
}
