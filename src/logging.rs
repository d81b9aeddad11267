//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Log filter read before falling back to `RUST_LOG`.
pub const LOG_ENV: &str = "FOLLOWSYNC_LOG";

const DEFAULT_FILTER: &str = "info";

/// Builds the active filter: `FOLLOWSYNC_LOG`, then `RUST_LOG`, then `info`.
/// Unparseable directives fall through to the next source.
pub fn env_filter() -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(directives.trim()) {
            if !directives.trim().is_empty() {
                return filter;
            }
        }
    }

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global fmt subscriber on stderr. Returns false when one is
/// already set.
pub fn init_logging() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let _ = init_logging();
        assert!(!init_logging());
    }
}
