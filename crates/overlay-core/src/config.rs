//! Bridge configuration.
//!
//! Defaults match what the bridge needs for a video underlay: a 1280x720
//! start size, a one-second bounded acquire, ~one frame of back-off after a
//! failed acquire, and a child surface stacked below its parent with
//! independent commits.

use std::time::Duration;

use tracing::warn;

use crate::geometry::{Offset, Size};
use crate::surface::{StackingRelation, SyncMode};

/// Environment variable overriding [`BridgeConfig::acquire_timeout`] (ms).
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "OVERLAY_ACQUIRE_TIMEOUT_MS";
/// Environment variable overriding [`BridgeConfig::retry_backoff`] (ms).
pub const ENV_RETRY_BACKOFF_MS: &str = "OVERLAY_RETRY_BACKOFF_MS";
/// Environment variable selecting HDR10 presentation (`1` or `true`).
pub const ENV_HDR: &str = "OVERLAY_HDR";

/// Which kind of presentable format to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatPreference {
    #[default]
    Sdr,
    Hdr10,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Size of the first swapchain, before any resize arrives.
    pub initial_size: Size,
    /// Upper bound on a single acquire wait.
    pub acquire_timeout: Duration,
    /// Sleep after a failed acquire/present before the next iteration.
    pub retry_backoff: Duration,
    /// Upper bound on waiting for the render thread after shutdown is raised.
    pub shutdown_timeout: Duration,
    pub subsurface_offset: Offset,
    pub stacking: StackingRelation,
    pub sync_mode: SyncMode,
    pub format_preference: FormatPreference,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            initial_size: Size::new(1280, 720),
            acquire_timeout: Duration::from_secs(1),
            retry_backoff: Duration::from_millis(16),
            shutdown_timeout: Duration::from_secs(2),
            subsurface_offset: Offset::ORIGIN,
            stacking: StackingRelation::Below,
            sync_mode: SyncMode::Independent,
            format_preference: FormatPreference::Sdr,
        }
    }
}

impl BridgeConfig {
    /// Defaults with overrides read from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Malformed values are ignored.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ms) = parse_millis(&lookup, ENV_ACQUIRE_TIMEOUT_MS) {
            self.acquire_timeout = ms;
        }
        if let Some(ms) = parse_millis(&lookup, ENV_RETRY_BACKOFF_MS) {
            self.retry_backoff = ms;
        }
        if let Some(value) = lookup(ENV_HDR) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.format_preference = FormatPreference::Hdr10,
                "0" | "false" | "no" | "" => self.format_preference = FormatPreference::Sdr,
                other => warn!("ignoring {ENV_HDR}={other:?}"),
            }
        }
        self
    }

    pub fn with_initial_size(mut self, size: Size) -> Self {
        self.initial_size = size;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_stacking(mut self, stacking: StackingRelation, sync_mode: SyncMode) -> Self {
        self.stacking = stacking;
        self.sync_mode = sync_mode;
        self
    }

    pub fn with_subsurface_offset(mut self, offset: Offset) -> Self {
        self.subsurface_offset = offset;
        self
    }

    pub fn with_format_preference(mut self, preference: FormatPreference) -> Self {
        self.format_preference = preference;
        self
    }
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!("ignoring {key}={raw:?}: expected milliseconds");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_describe_a_video_underlay() {
        let config = BridgeConfig::default();
        assert_eq!(config.initial_size, Size::new(1280, 720));
        assert_eq!(config.stacking, StackingRelation::Below);
        assert_eq!(config.sync_mode, SyncMode::Independent);
        assert_eq!(config.acquire_timeout, Duration::from_secs(1));
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = BridgeConfig::default().with_env_overrides(env(&[
            (ENV_ACQUIRE_TIMEOUT_MS, "250"),
            (ENV_RETRY_BACKOFF_MS, " 5 "),
            (ENV_HDR, "true"),
        ]));
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.retry_backoff, Duration::from_millis(5));
        assert_eq!(config.format_preference, FormatPreference::Hdr10);
    }

    #[test]
    fn malformed_env_values_keep_defaults() {
        let config = BridgeConfig::default().with_env_overrides(env(&[
            (ENV_ACQUIRE_TIMEOUT_MS, "soon"),
            (ENV_HDR, "maybe"),
        ]));
        assert_eq!(config, BridgeConfig::default());
    }
}
