//! Core domain: task model, message protocol, collaborator traits, the
//! worker pool and the interval scheduler.

pub mod activity;
pub mod error;
pub mod events;
pub mod history;
pub mod protocol;
pub mod queue;
pub mod scheduler;
pub mod task;
pub mod worker_pool;

pub use activity::{ActivityLauncher, ActivityRegistry};
pub use error::{AppResult, PoolError, QueueError};
pub use events::{
    ChannelEventSink, EventKind, EventSink, FanoutEventSink, InMemoryEventSink, PoolEvent,
    TracingEventSink,
};
pub use history::TaskHistory;
pub use protocol::{ActivityChannel, PoolMessage, UnitEvent, UnitMessage, UnitStatus};
pub use queue::QueueService;
pub use scheduler::{job_callback, JobCallback, JobSpec, Scheduler};
pub use task::{
    on_complete, CompletionCallback, Task, TaskError, TaskErrorKind, TaskResult, TaskStatus,
};
pub use worker_pool::{PoolStatus, QueueDepths, WorkerPool};
