//! Tracing bootstrap for engine threads.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "prometheus_task_engine=info";

/// Install a fmt subscriber unless the host already set one.
///
/// `RUST_LOG` wins when present. Thread names are printed so pool workers,
/// dispatchers and scheduler threads can be told apart.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_FILTER);
}

/// Like [`init_tracing`] but with a caller-chosen fallback filter.
///
/// Returns `true` if this call installed the subscriber.
pub fn init_tracing_with(fallback: &str) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
