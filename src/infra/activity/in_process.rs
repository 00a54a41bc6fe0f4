//! Activities that run as isolated tokio tasks inside the host process.
//!
//! [`InProcessActivities`] is both the registry (names must be registered
//! before they can be submitted) and the launcher. Each unit runs in its own
//! spawned task, so a panicking activity surfaces as a fault instead of
//! unwinding into the pool.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::worker_pool::panic_message;
use crate::core::{
    ActivityChannel, ActivityLauncher, ActivityRegistry, AppResult, PoolError, PoolMessage,
    UnitEvent, UnitMessage,
};

/// Handle given to a running activity.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    activity_ref: String,
    reports: mpsc::UnboundedSender<Value>,
}

impl ActivityContext {
    /// Name the activity was launched under.
    #[must_use]
    pub fn activity_ref(&self) -> &str {
        &self.activity_ref
    }

    /// Send a non-terminal `running` status.
    pub fn report(&self, data: Value) {
        let _ = self.reports.send(data);
    }
}

/// An activity executed in-process.
///
/// `Ok` becomes a `completed` status carrying the value; `Err` becomes an
/// `error` status carrying the error message.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Run once with the task payload.
    async fn run(&self, payload: Value, ctx: ActivityContext) -> AppResult<Value>;
}

/// Adapts an async closure into an [`Activity`].
pub struct FnActivity<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Activity for FnActivity<F>
where
    F: Fn(Value, ActivityContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Value>> + Send + 'static,
{
    async fn run(&self, payload: Value, ctx: ActivityContext) -> AppResult<Value> {
        (self.f)(payload, ctx).await
    }
}

/// Build an [`Activity`] from an async closure.
pub fn activity_fn<F, Fut>(f: F) -> FnActivity<F>
where
    F: Fn(Value, ActivityContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Value>> + Send + 'static,
{
    FnActivity { f }
}

/// Name → activity table usable as registry and launcher.
#[derive(Default)]
pub struct InProcessActivities {
    activities: RwLock<HashMap<String, Arc<dyn Activity>>>,
}

impl InProcessActivities {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an activity under `name`.
    pub fn register(&self, name: impl Into<String>, activity: impl Activity) {
        self.activities.write().insert(name.into(), Arc::new(activity));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_activity(self, name: impl Into<String>, activity: impl Activity) -> Self {
        self.register(name, activity);
        self
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.activities.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn Activity>, PoolError> {
        self.activities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::ActivityNotFound(name.to_owned()))
    }
}

impl ActivityRegistry for InProcessActivities {
    fn resolve(&self, reference: &str) -> Result<String, PoolError> {
        self.lookup(reference).map(|_| reference.to_owned())
    }
}

#[async_trait]
impl ActivityLauncher for InProcessActivities {
    async fn launch(&self, activity_ref: &str) -> Result<Box<dyn ActivityChannel>, PoolError> {
        let activity = self.lookup(activity_ref)?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Box::new(InProcessChannel {
            activity: Some(activity),
            ctx: Some(ActivityContext {
                activity_ref: activity_ref.to_owned(),
                reports: tx,
            }),
            reports: rx,
            join: None,
            pending: VecDeque::new(),
        }))
    }
}

struct InProcessChannel {
    activity: Option<Arc<dyn Activity>>,
    ctx: Option<ActivityContext>,
    reports: mpsc::UnboundedReceiver<Value>,
    join: Option<JoinHandle<AppResult<Value>>>,
    pending: VecDeque<UnitEvent>,
}

#[async_trait]
impl ActivityChannel for InProcessChannel {
    async fn send(&mut self, message: PoolMessage) -> Result<(), PoolError> {
        let PoolMessage::Start { payload, .. } = message;
        let (Some(activity), Some(ctx)) = (self.activity.take(), self.ctx.take()) else {
            return Err(PoolError::Protocol("activity already started".into()));
        };
        self.join = Some(tokio::spawn(async move { activity.run(payload, ctx).await }));
        Ok(())
    }

    async fn receive(&mut self) -> UnitEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }
            let Some(join) = self.join.as_mut() else {
                self.pending.push_back(UnitEvent::Exit { code: None });
                return UnitEvent::Fault("activity was never started".into());
            };
            let joined = tokio::select! {
                biased;
                Some(data) = self.reports.recv() => {
                    return UnitEvent::Message(UnitMessage::running(data));
                }
                joined = join => joined,
            };
            self.join = None;
            match joined {
                Ok(Ok(data)) => {
                    self.pending.push_back(UnitEvent::Message(UnitMessage::completed(data)));
                    self.pending.push_back(UnitEvent::Exit { code: Some(0) });
                }
                Ok(Err(e)) => {
                    let data = json!({ "message": format!("{e:#}") });
                    self.pending.push_back(UnitEvent::Message(UnitMessage::error(data)));
                    self.pending.push_back(UnitEvent::Exit { code: Some(0) });
                }
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic().as_ref());
                    self.pending
                        .push_back(UnitEvent::Fault(format!("activity panicked: {message}")));
                    self.pending.push_back(UnitEvent::Exit { code: Some(1) });
                }
                Err(_) => self.pending.push_back(UnitEvent::Exit { code: None }),
            }
        }
    }

    async fn terminate(&mut self) -> Result<(), PoolError> {
        if let Some(join) = self.join.take() {
            join.abort();
            let _ = join.await;
        }
        Ok(())
    }
}

impl Drop for InProcessChannel {
    fn drop(&mut self) {
        if let Some(join) = &self.join {
            join.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> InProcessActivities {
        InProcessActivities::new()
            .with_activity("echo", activity_fn(|payload, _ctx| async move { Ok::<_, anyhow::Error>(payload) }))
            .with_activity(
                "progress",
                activity_fn(|_payload, ctx| async move {
                    ctx.report(json!({"step": 1}));
                    Ok::<_, anyhow::Error>(json!("done"))
                }),
            )
            .with_activity(
                "fail",
                activity_fn(|_payload, _ctx| async move { Err::<Value, _>(anyhow::anyhow!("bad input")) }),
            )
            .with_activity(
                "panic",
                activity_fn(|_payload, _ctx| async move {
                    if true {
                        panic!("kaboom");
                    }
                    Ok::<_, anyhow::Error>(Value::Null)
                }),
            )
    }

    async fn drive(name: &str) -> Vec<UnitEvent> {
        let table = table();
        let mut channel = table.launch(name).await.unwrap();
        channel
            .send(PoolMessage::Start {
                activity_ref: name.into(),
                payload: json!({"x": 1}),
            })
            .await
            .unwrap();
        let mut events = Vec::new();
        loop {
            let event = channel.receive().await;
            let done = matches!(event, UnitEvent::Exit { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[test]
    fn test_registry_resolution() {
        let table = table();
        assert_eq!(table.resolve("echo").unwrap(), "echo");
        assert!(matches!(table.resolve("missing"), Err(PoolError::ActivityNotFound(_))));
        assert_eq!(table.names(), vec!["echo", "fail", "panic", "progress"]);
    }

    #[tokio::test]
    async fn test_success_reports_completed_then_exit() {
        let events = drive("echo").await;
        assert_eq!(
            events,
            vec![
                UnitEvent::Message(UnitMessage::completed(json!({"x": 1}))),
                UnitEvent::Exit { code: Some(0) },
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_reports_arrive_before_terminal() {
        let events = drive("progress").await;
        assert_eq!(events[0], UnitEvent::Message(UnitMessage::running(json!({"step": 1}))));
        assert_eq!(events[1], UnitEvent::Message(UnitMessage::completed(json!("done"))));
    }

    #[tokio::test]
    async fn test_error_and_panic() {
        let events = drive("fail").await;
        assert_eq!(
            events[0],
            UnitEvent::Message(UnitMessage::error(json!({"message": "bad input"})))
        );

        let events = drive("panic").await;
        assert!(matches!(&events[0], UnitEvent::Fault(msg) if msg.contains("kaboom")));
        assert_eq!(events[1], UnitEvent::Exit { code: Some(1) });
    }
}
