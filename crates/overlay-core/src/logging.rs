//! Tracing subscriber setup.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

/// Logger configuration.
///
/// `env_filter` uses `tracing-subscriber` directive syntax (e.g.
/// `"info,overlay_bridge=debug"`). When unset, `RUST_LOG` is consulted and
/// `info` is the fallback.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub with_thread_names: bool,
}

static INIT: OnceCell<()> = OnceCell::new();

/// Install the global `fmt` subscriber once. Later calls are ignored, as is
/// a subscriber already installed by the embedding application.
pub fn init_logging(config: LoggingConfig) {
    INIT.get_or_init(|| {
        let filter = config
            .env_filter
            .as_deref()
            .map(EnvFilter::new)
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(config.with_thread_names)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!("logging initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logging(LoggingConfig {
            env_filter: Some("debug".into()),
            with_thread_names: true,
        });
        init_logging(LoggingConfig::default());
        assert!(INIT.get().is_some());
    }
}
