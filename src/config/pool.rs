//! Pool and scheduler configuration structures.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment variable prefix read by [`WorkerPoolConfig::from_env`].
pub const ENV_PREFIX: &str = "ACTIVITY_POOL_";

/// Names of the three conventional queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueNames {
    /// Tasks waiting for a slot.
    pub incoming: String,
    /// Results with status `completed`.
    pub complete: String,
    /// Results with status `error`.
    pub error: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            incoming: "incoming".into(),
            complete: "complete".into(),
            error: "error".into(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Maximum number of concurrently running activity units.
    pub max_concurrency: usize,
    /// Admission loop tick in milliseconds.
    pub poll_interval_ms: u64,
    /// How long a unit may keep running after its terminal status.
    pub exit_grace_ms: u64,
    /// Maximum number of results kept in history.
    pub history_limit: usize,
    /// Root directory relative activity references are joined to when no
    /// registry is configured.
    pub activities_root: Option<PathBuf>,
    /// Queue names.
    pub queues: QueueNames,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get().max(1),
            poll_interval_ms: 1000,
            exit_grace_ms: 2000,
            history_limit: 1000,
            activities_root: None,
            queues: QueueNames::default(),
        }
    }
}

impl WorkerPoolConfig {
    /// Defaults: one slot per CPU, 1s admission tick.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency ceiling.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the admission tick.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the post-terminal exit grace period.
    #[must_use]
    pub fn with_exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the history bound.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the activities root.
    #[must_use]
    pub fn with_activities_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.activities_root = Some(root.into());
        self
    }

    /// Override queue names.
    #[must_use]
    pub fn with_queue_names(mut self, queues: QueueNames) -> Self {
        self.queues = queues;
        self
    }

    /// Admission tick as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Exit grace as a `Duration`.
    #[must_use]
    pub const fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.history_limit == 0 {
            return Err("history_limit must be greater than 0".into());
        }
        let names = [&self.queues.incoming, &self.queues.complete, &self.queues.error];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err("queue names must not be empty".into());
        }
        let distinct: HashSet<_> = names.iter().collect();
        if distinct.len() != names.len() {
            return Err("incoming, complete and error queues must have distinct names".into());
        }
        Ok(())
    }

    /// Parse pool configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `ACTIVITY_POOL_*` environment variables,
    /// loading a `.env` file first if present. Unset variables keep defaults.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(v) = env_parse("MAX_CONCURRENCY")? {
            cfg.max_concurrency = v;
        }
        if let Some(v) = env_parse("POLL_INTERVAL_MS")? {
            cfg.poll_interval_ms = v;
        }
        if let Some(v) = env_parse("EXIT_GRACE_MS")? {
            cfg.exit_grace_ms = v;
        }
        if let Some(v) = env_parse("HISTORY_LIMIT")? {
            cfg.history_limit = v;
        }
        if let Some(v) = env_var("ACTIVITIES_ROOT") {
            cfg.activities_root = Some(PathBuf::from(v));
        }
        if let Some(v) = env_var("INCOMING_QUEUE") {
            cfg.queues.incoming = v;
        }
        if let Some(v) = env_var("COMPLETE_QUEUE") {
            cfg.queues.complete = v;
        }
        if let Some(v) = env_var("ERROR_QUEUE") {
            cfg.queues.error = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{ENV_PREFIX}{key}: {e}"))
        })
        .transpose()
}

/// Queue backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueBackendConfig {
    /// In-memory queues for development/testing.
    InMemory {
        /// Optional per-queue depth limit.
        #[serde(default)]
        max_depth: Option<usize>,
    },
    /// JSONL files, one per queue, under `path`.
    File {
        /// Directory holding the queue files.
        path: PathBuf,
        /// Optional per-queue depth limit.
        #[serde(default)]
        max_depth: Option<usize>,
    },
}

impl Default for QueueBackendConfig {
    fn default() -> Self {
        Self::InMemory { max_depth: None }
    }
}

/// A recurring job declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name.
    pub name: String,
    /// Activity reference.
    pub activity: String,
    /// Payload submitted on every run.
    #[serde(default)]
    pub payload: Value,
    /// Seconds between runs.
    pub interval_secs: u64,
}

/// Root configuration: one pool, its queue backend and recurring jobs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pool settings.
    #[serde(default)]
    pub pool: WorkerPoolConfig,
    /// Queue backend.
    #[serde(default)]
    pub queue: QueueBackendConfig,
    /// Recurring jobs started by `Scheduler::start_configured`.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl SchedulerConfig {
    /// Validate the pool and every job; job names must be unique.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err("job name must not be empty".into());
            }
            if !seen.insert(job.name.as_str()) {
                return Err(format!("job `{}` declared more than once", job.name));
            }
            if job.activity.trim().is_empty() {
                return Err(format!("job `{}` invalid: activity must not be empty", job.name));
            }
            if job.interval_secs == 0 {
                return Err(format!(
                    "job `{}` invalid: interval_secs must be greater than 0",
                    job.name
                ));
            }
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
