//! The admission loop: the only code path that starts tasks.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::core::{EventKind, PoolEvent, Task};

use super::slot::Slot;
use super::PoolShared;

/// Admit tasks on every tick, wake-up or slot release until `stop_rx` fires.
pub(super) async fn run(shared: Arc<PoolShared>, mut stop_rx: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(shared.config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!("admission loop running");

    loop {
        shared.admit_ready();
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            () = shared.wake.notified() => {}
            _ = ticker.tick() => {}
        }
    }
    debug!("admission loop exited");
}

impl PoolShared {
    fn admit_ready(self: &Arc<Self>) {
        let Some(queue) = &self.queue else {
            return;
        };
        let incoming = &self.config.queues.incoming;

        while self.running.load(Ordering::Acquire)
            && self.active_slots.load(Ordering::Acquire) < self.config.max_concurrency
        {
            let raw = match queue.dequeue(incoming) {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    warn!(queue = %incoming, error = %e, "dequeue failed");
                    self.emit(PoolEvent::new(EventKind::Error).with_detail(json!({
                        "stage": "admission",
                        "queue": incoming,
                        "message": e.to_string(),
                    })));
                    break;
                }
            };
            match serde_json::from_value::<Task>(raw) {
                Ok(task) => self.admit(task),
                Err(e) => {
                    warn!(queue = %incoming, error = %e, "discarding malformed task record");
                    self.emit(PoolEvent::new(EventKind::Error).with_detail(json!({
                        "stage": "admission",
                        "queue": incoming,
                        "message": format!("malformed task record: {e}"),
                    })));
                }
            }
        }
    }

    fn admit(self: &Arc<Self>, task: Task) {
        let callback = self.callbacks.lock().remove(&task.id);
        let active = self.active_slots.fetch_add(1, Ordering::AcqRel) + 1;
        let kill = self.terminate.subscribe();
        let task_id = task.id.clone();
        debug!(task_id = %task_id, activity = %task.activity_ref, active_slots = active, "task admitted");

        // The entry exists before the slot runs; if the slot has already
        // released it by the time the handle is ready, the handle is dropped.
        self.slots.lock().insert(task_id.clone(), None);
        let handle = tokio::spawn(Slot::new(Arc::clone(self), task, callback).run(kill));
        if let Some(entry) = self.slots.lock().get_mut(&task_id) {
            *entry = Some(handle);
        }
    }
}
