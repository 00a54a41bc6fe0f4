//! One task bound to one running activity unit.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::task::error_message_from;
use crate::core::{
    ActivityChannel, CompletionCallback, EventKind, PoolEvent, PoolMessage, Task, TaskError,
    TaskResult, TaskStatus, UnitEvent, UnitMessage, UnitStatus,
};
use crate::util::clock::now_ms;

use super::PoolShared;

enum Step {
    Event(UnitEvent),
    Terminate,
    GraceElapsed,
}

pub(super) struct Slot {
    shared: Arc<PoolShared>,
    task: Task,
    started_at_ms: u64,
    callback: Option<CompletionCallback>,
    recorded: bool,
}

impl Slot {
    pub(super) fn new(
        shared: Arc<PoolShared>,
        task: Task,
        callback: Option<CompletionCallback>,
    ) -> Self {
        Self {
            shared,
            task,
            started_at_ms: now_ms(),
            callback,
            recorded: false,
        }
    }

    pub(super) async fn run(mut self, mut kill: watch::Receiver<bool>) {
        self.shared.emit(
            PoolEvent::for_task(EventKind::Started, &self.task.id)
                .with_detail(json!({ "activity": self.task.activity_ref })),
        );

        let mut channel = match self.shared.launcher.launch(&self.task.activity_ref).await {
            Ok(channel) => channel,
            Err(e) => {
                self.record(
                    TaskStatus::Error,
                    Value::Null,
                    Some(TaskError::abnormal(format!("failed to launch activity: {e}"))),
                );
                return;
            }
        };

        let start = PoolMessage::Start {
            activity_ref: self.task.activity_ref.clone(),
            payload: self.task.payload.clone(),
        };
        if let Err(e) = channel.send(start).await {
            warn!(task_id = %self.task.id, error = %e, "failed to deliver start message");
            self.shared.emit(PoolEvent::for_task(EventKind::Error, &self.task.id).with_detail(
                json!({ "stage": "start", "message": e.to_string() }),
            ));
        }

        let grace = self.shared.config.exit_grace();
        let mut grace_deadline: Option<Instant> = None;
        loop {
            let deadline = grace_deadline.unwrap_or_else(Instant::now);
            let step = tokio::select! {
                biased;
                () = terminated(&mut kill) => Step::Terminate,
                () = tokio::time::sleep_until(deadline), if grace_deadline.is_some() => Step::GraceElapsed,
                event = channel.receive() => Step::Event(event),
            };

            match step {
                Step::Event(UnitEvent::Message(UnitMessage::Status { status, data })) => {
                    if status.is_terminal() {
                        self.on_terminal(status, data);
                        grace_deadline.get_or_insert_with(|| Instant::now() + grace);
                    } else {
                        self.shared.emit(
                            PoolEvent::for_task(EventKind::Status, &self.task.id)
                                .with_detail(json!({ "status": "running", "data": data })),
                        );
                    }
                }
                Step::Event(UnitEvent::Fault(message)) => {
                    if self.recorded {
                        self.shared.emit(
                            PoolEvent::for_task(EventKind::Error, &self.task.id)
                                .with_detail(json!({ "stage": "fault", "message": message })),
                        );
                    } else {
                        self.record(TaskStatus::Error, Value::Null, Some(TaskError::abnormal(message)));
                    }
                    grace_deadline.get_or_insert_with(|| Instant::now() + grace);
                }
                Step::Event(UnitEvent::Exit { code }) => {
                    self.emit_exit(code, false);
                    if !self.recorded {
                        let code = code.map_or_else(|| "unknown".to_owned(), |c| c.to_string());
                        self.record(
                            TaskStatus::Error,
                            Value::Null,
                            Some(TaskError::abnormal(format!(
                                "exited with code {code} before reporting a terminal status"
                            ))),
                        );
                    }
                    return;
                }
                Step::Terminate => {
                    self.force(channel.as_mut(), "terminated by pool shutdown").await;
                    return;
                }
                Step::GraceElapsed => {
                    debug!(task_id = %self.task.id, "unit still alive after exit grace");
                    self.force(channel.as_mut(), "terminated after exit grace").await;
                    return;
                }
            }
        }
    }

    fn on_terminal(&mut self, status: UnitStatus, data: Value) {
        if self.recorded {
            debug!(task_id = %self.task.id, status = ?status, "ignoring terminal status after result");
            return;
        }
        match status {
            UnitStatus::Completed => self.record(TaskStatus::Completed, data, None),
            _ => {
                let error = TaskError::execution(error_message_from(&data));
                self.record(TaskStatus::Error, data, Some(error));
            }
        }
    }

    async fn force(&mut self, channel: &mut dyn ActivityChannel, reason: &str) {
        if let Err(e) = channel.terminate().await {
            warn!(task_id = %self.task.id, error = %e, "failed to terminate unit");
        }
        self.emit_exit(None, true);
        if !self.recorded {
            self.record(TaskStatus::Error, Value::Null, Some(TaskError::abnormal(reason)));
        }
    }

    fn emit_exit(&self, code: Option<i32>, forced: bool) {
        debug!(task_id = %self.task.id, code = ?code, forced, "unit exited");
        self.shared.emit(
            PoolEvent::for_task(EventKind::Exit, &self.task.id)
                .with_detail(json!({ "code": code, "forced": forced })),
        );
    }

    fn record(&mut self, status: TaskStatus, data: Value, error: Option<TaskError>) {
        self.recorded = true;
        let result = TaskResult {
            task_id: self.task.id.clone(),
            activity_ref: self.task.activity_ref.clone(),
            status,
            data,
            error,
            queued_at_ms: self.task.queued_at_ms,
            started_at_ms: self.started_at_ms,
            completed_at_ms: now_ms(),
        };
        self.shared.finish(result, self.callback.take());
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.shared.slots.lock().remove(&self.task.id);
        self.shared.active_slots.fetch_sub(1, Ordering::AcqRel);
        self.shared.wake.notify_one();
    }
}

async fn terminated(kill: &mut watch::Receiver<bool>) {
    let _ = kill.wait_for(|stop| *stop).await;
}
