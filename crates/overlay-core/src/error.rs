//! Error taxonomy shared by every overlay crate.
//!
//! Two outcomes have no variant. Resize requests outside a surface's
//! extents are clamped, never reported. Update callbacks firing after teardown
//! has begun cannot happen because the callback is unregistered before the
//! guest render object is freed.

/// Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The guest renderer could not negotiate a compatible GPU backend or
    /// device with the host. Fatal at startup.
    #[error("guest context creation failed: {0}")]
    ContextCreation(String),

    /// A transient presentation failure, e.g. the surface is briefly
    /// unavailable during a resize. Retried on the next loop iteration.
    #[error("presentation failed: {0}")]
    Presentation(String),

    /// The display server refused to create or relate a surface.
    #[error("surface setup failed: {0}")]
    SurfaceCreation(String),

    /// A GPU object (device, swapchain, view, ...) could not be created.
    #[error("GPU backend error: {0}")]
    Backend(String),

    /// An operation was called in a state that does not allow it.
    #[error("invalid bridge state: {0}")]
    InvalidState(&'static str),
}

impl BridgeError {
    pub fn context_creation(reason: impl Into<String>) -> Self {
        Self::ContextCreation(reason.into())
    }

    pub fn presentation(reason: impl Into<String>) -> Self {
        Self::Presentation(reason.into())
    }

    pub fn surface(reason: impl Into<String>) -> Self {
        Self::SurfaceCreation(reason.into())
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend(reason.into())
    }

    /// `true` for failures the steady-state frame loop recovers from by
    /// skipping the frame and retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Presentation(_))
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::Backend(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_presentation_errors_are_transient() {
        assert!(BridgeError::presentation("surface busy").is_transient());
        assert!(!BridgeError::context_creation("no GL").is_transient());
        assert!(!BridgeError::backend("oom").is_transient());
        assert!(!BridgeError::InvalidState("detached").is_transient());
    }

    #[test]
    fn anyhow_chains_are_flattened() {
        let err = anyhow::anyhow!("vkCreateSwapchainKHR").context("rebuilding swapchain");
        let bridge: BridgeError = err.into();
        assert_eq!(
            bridge.to_string(),
            "GPU backend error: rebuilding swapchain: vkCreateSwapchainKHR"
        );
    }
}
