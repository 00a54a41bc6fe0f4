//! Configuration models for the pool, queue backends and recurring jobs.

pub mod pool;

pub use pool::{JobConfig, QueueBackendConfig, QueueNames, SchedulerConfig, WorkerPoolConfig, ENV_PREFIX};
