//! Logging bootstrap for graphzfs binaries.

use env_logger::{Builder, Env};

const LOG_ENV: &str = "GRAPHZFS_LOG";

/// Install the global logger. `GRAPHZFS_LOG` wins over `RUST_LOG`; both fall
/// back to `default_level`. Repeated calls are ignored.
pub fn init(default_level: &str) {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty());

    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    if let Some(filter) = filter {
        builder.parse_filters(&filter);
    }
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}
