//! # Prometheus Activity Pool
//!
//! A bounded worker pool that runs out-of-process "activity" units through
//! named queues, plus an interval scheduler that drives it.
//!
//! ## Model
//!
//! - **Queue Service**: named FIFO queues. The pool uses three: `incoming`
//!   (tasks waiting for a slot), `complete` and `error` (terminal results).
//! - **Activity Unit**: an isolated executable that receives one `start`
//!   message and answers with status messages, the last of which is
//!   `completed` or `error`.
//! - **Worker Pool**: admits tasks from `incoming` into at most
//!   `max_concurrency` slots, records exactly one result per task into
//!   history and one result queue, and invokes an optional callback.
//! - **Scheduler**: named recurring jobs that submit to the pool once on
//!   start and then on every interval tick.
//! - **Event Sink**: fire-and-forget lifecycle notifications.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use prometheus_activity_pool::builders::WorkerPoolBuilder;
//! use prometheus_activity_pool::config::WorkerPoolConfig;
//! use prometheus_activity_pool::core::{job_callback, JobSpec, Scheduler};
//! use prometheus_activity_pool::infra::activity::{activity_fn, InProcessActivities};
//! use prometheus_activity_pool::infra::queue::InMemoryQueueService;
//!
//! let activities = Arc::new(InProcessActivities::new().with_activity(
//!     "ping",
//!     activity_fn(|payload, _ctx| async move { Ok::<_, anyhow::Error>(payload) }),
//! ));
//! let pool = WorkerPoolBuilder::new(WorkerPoolConfig::new().with_max_concurrency(2))
//!     .with_queue(InMemoryQueueService::new())
//!     .with_in_process(activities)
//!     .build()?;
//!
//! let scheduler = Scheduler::new(Arc::new(pool));
//! scheduler.start(
//!     JobSpec::new("heartbeat", "ping", Duration::from_secs(30))
//!         .with_callback(job_callback(|result| {
//!             println!("heartbeat: {}", result.status.as_str());
//!             Ok(())
//!         })),
//! )?;
//! // ...
//! scheduler.stop_all().await;
//! ```
//!
//! Subprocess activities use [`infra::activity::ProcessLauncher`], which
//! exchanges JSON lines over the child's stdin and stdout.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task model, protocol, collaborator traits, worker pool and scheduler.
pub mod core;
/// Configuration models for the pool, queue backends and recurring jobs.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Queue and activity unit adapters.
pub mod infra;
/// Shared utilities.
pub mod util;
