//! Activity resolution and launch abstractions.
//!
//! An activity reference is resolved once, at submission time, by an
//! [`ActivityRegistry`]. When the task is admitted into a slot, an
//! [`ActivityLauncher`] turns the resolved reference into a running unit and
//! hands back the [`ActivityChannel`] used to talk to it.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use prometheus_activity_pool::core::{ActivityChannel, ActivityLauncher, PoolError};
//!
//! struct DockerLauncher;
//!
//! #[async_trait]
//! impl ActivityLauncher for DockerLauncher {
//!     async fn launch(&self, activity_ref: &str) -> Result<Box<dyn ActivityChannel>, PoolError> {
//!         // start `docker run -i <activity_ref>` and wrap its stdio here
//!         Err(PoolError::ActivityNotFound(activity_ref.to_owned()))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::core::{ActivityChannel, PoolError};

/// Resolves a relative activity reference to the form the launcher expects.
///
/// Absolute references never reach the registry.
pub trait ActivityRegistry: Send + Sync + 'static {
    /// Resolve `reference`, failing with [`PoolError::ActivityNotFound`] when
    /// the activity does not exist.
    fn resolve(&self, reference: &str) -> Result<String, PoolError>;
}

/// Starts an isolated activity unit for a resolved reference.
#[async_trait]
pub trait ActivityLauncher: Send + Sync + 'static {
    /// Launch a unit. The returned channel has not yet received its `start`
    /// message.
    async fn launch(&self, activity_ref: &str) -> Result<Box<dyn ActivityChannel>, PoolError>;
}
