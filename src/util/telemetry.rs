//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing for binaries and tests embedding the pool.
///
/// Installs an env-filtered fmt subscriber (`RUST_LOG`) unless a global
/// subscriber is already set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
