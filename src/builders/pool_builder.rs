//! Builders to construct worker pools from configuration.

use std::sync::Arc;

use crate::config::{QueueBackendConfig, SchedulerConfig, WorkerPoolConfig};
use crate::core::{
    ActivityLauncher, ActivityRegistry, EventSink, PoolError, QueueService, TracingEventSink,
    WorkerPool,
};
use crate::infra::activity::{InProcessActivities, ProcessLauncher};
use crate::infra::queue::{FileQueueService, InMemoryQueueService};

/// Assembles a [`WorkerPool`] from its collaborators.
///
/// Without overrides the pool launches activities as subprocesses and
/// reports events through `tracing`. A pool built without a queue can be
/// started but every `submit` fails with [`PoolError::Configuration`].
pub struct WorkerPoolBuilder {
    config: WorkerPoolConfig,
    queue: Option<Arc<dyn QueueService>>,
    registry: Option<Arc<dyn ActivityRegistry>>,
    launcher: Option<Arc<dyn ActivityLauncher>>,
    events: Option<Arc<dyn EventSink>>,
}

impl WorkerPoolBuilder {
    /// Start from a pool configuration.
    #[must_use]
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            queue: None,
            registry: None,
            launcher: None,
            events: None,
        }
    }

    /// Use `queue` as the Queue Service.
    #[must_use]
    pub fn with_queue(self, queue: impl QueueService) -> Self {
        self.with_shared_queue(Arc::new(queue))
    }

    /// Use a queue shared with other components.
    #[must_use]
    pub fn with_shared_queue(mut self, queue: Arc<dyn QueueService>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Verify relative activity references through `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn ActivityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Launch units with `launcher` instead of subprocesses.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn ActivityLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Use an in-process activity table as both registry and launcher.
    #[must_use]
    pub fn with_in_process(self, activities: Arc<InProcessActivities>) -> Self {
        let registry: Arc<dyn ActivityRegistry> = Arc::clone(&activities) as _;
        self.with_registry(registry).with_launcher(activities)
    }

    /// Deliver lifecycle notifications to `events`.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration and build a stopped pool.
    pub fn build(self) -> Result<WorkerPool, PoolError> {
        WorkerPool::from_parts(
            self.config,
            self.queue,
            self.registry,
            self.launcher
                .unwrap_or_else(|| Arc::new(ProcessLauncher::new())),
            self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
        )
    }
}

/// Instantiate the Queue Service described by `cfg`.
pub fn build_queue(cfg: &QueueBackendConfig) -> Result<Arc<dyn QueueService>, PoolError> {
    let queue: Arc<dyn QueueService> = match cfg {
        QueueBackendConfig::InMemory { max_depth: None } => Arc::new(InMemoryQueueService::new()),
        QueueBackendConfig::InMemory {
            max_depth: Some(max),
        } => Arc::new(InMemoryQueueService::with_max_depth(*max)),
        QueueBackendConfig::File { path, max_depth } => {
            let queue = FileQueueService::new(path)?;
            Arc::new(match max_depth {
                Some(max) => queue.with_max_depth(*max),
                None => queue,
            })
        }
    };
    Ok(queue)
}

/// Validate scheduler configuration and prepare a builder with its pool
/// settings and queue backend.
pub fn from_config(cfg: &SchedulerConfig) -> Result<WorkerPoolBuilder, PoolError> {
    cfg.validate().map_err(PoolError::InvalidConfig)?;
    let queue = build_queue(&cfg.queue)?;
    Ok(WorkerPoolBuilder::new(cfg.pool.clone()).with_shared_queue(queue))
}
