//! Activity unit adapters.

pub mod fs_registry;
pub mod in_process;
pub mod process;

pub use fs_registry::FsActivityRegistry;
pub use in_process::{activity_fn, Activity, ActivityContext, FnActivity, InProcessActivities};
pub use process::ProcessLauncher;
