//! Construction helpers for worker pools.

pub mod pool_builder;

pub use pool_builder::{build_queue, from_config, WorkerPoolBuilder};
