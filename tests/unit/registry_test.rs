//! Tests for activity registries

use std::fs;

use prometheus_activity_pool::core::{ActivityRegistry, PoolError};
use prometheus_activity_pool::infra::activity::{activity_fn, FsActivityRegistry, InProcessActivities};

#[test]
fn test_fs_registry_passes_absolute_paths_through() {
    let registry = FsActivityRegistry::new("/does/not/matter");
    let absolute = if cfg!(windows) { r"C:\tools\a.exe" } else { "/usr/bin/env" };
    assert_eq!(registry.resolve(absolute).unwrap(), absolute);
}

#[test]
fn test_fs_registry_requires_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("job.py"), "").unwrap();
    let registry = FsActivityRegistry::new(dir.path()).with_extensions(["sh", "py"]);

    let resolved = registry.resolve("job").unwrap();
    assert!(resolved.ends_with("job.py"));
    assert_eq!(registry.root(), dir.path());
    assert!(matches!(registry.resolve("other"), Err(PoolError::ActivityNotFound(_))));
}

#[test]
fn test_in_process_registry() {
    let table = InProcessActivities::new();
    assert!(table.resolve("late").is_err());
    table.register(
        "late",
        activity_fn(|payload, _ctx| async move { Ok::<_, anyhow::Error>(payload) }),
    );
    assert_eq!(table.resolve("late").unwrap(), "late");
}
