//! Infrastructure adapters for queues and activity units.

pub mod activity;
pub mod queue;

pub use activity::{FsActivityRegistry, InProcessActivities, ProcessLauncher};
pub use queue::{FileQueueService, InMemoryQueueService};
