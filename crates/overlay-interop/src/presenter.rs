//! The GPU presentation calls the swapchain reconciler is built on.

use std::fmt;
use std::time::Duration;

use overlay_core::{Result, Size, SurfaceExtents};

use crate::format::SurfaceFormat;

/// A swapchain as created by the backend: its handle and its images, in
/// presentation-engine order. Handles are raw `u64` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSwapchain {
    pub handle: u64,
    pub images: Vec<u64>,
    pub extent: Size,
}

/// An image index handed out by a successful acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    /// The swapchain still works but no longer matches the surface exactly.
    pub suboptimal: bool,
}

/// What the frame loop does after a failed acquire or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Skip the frame, back off, try again.
    Retry,
    /// Skip the frame and rebuild the swapchain at the current size first.
    Rebuild,
    /// Stop the loop.
    Fatal,
}

/// Why an acquire or present did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// No image became available within the bounded wait.
    Timeout,
    /// The surface changed; the swapchain must be rebuilt before reuse.
    OutOfDate,
    /// The surface is temporarily gone (e.g. mid-resize).
    SurfaceLost,
    /// Any other GPU-reported failure.
    Device(String),
    /// The logical device is gone; nothing built on it can be used again.
    DeviceLost,
}

impl AcquireError {
    pub fn action(&self) -> RecoveryAction {
        match self {
            AcquireError::Timeout | AcquireError::Device(_) => RecoveryAction::Retry,
            AcquireError::OutOfDate | AcquireError::SurfaceLost => RecoveryAction::Rebuild,
            AcquireError::DeviceLost => RecoveryAction::Fatal,
        }
    }

    pub fn needs_rebuild(&self) -> bool {
        self.action() == RecoveryAction::Rebuild
    }
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireError::Timeout => f.write_str("timed out waiting for a presentable image"),
            AcquireError::OutOfDate => f.write_str("swapchain out of date"),
            AcquireError::SurfaceLost => f.write_str("surface lost"),
            AcquireError::Device(msg) => write!(f, "device error: {msg}"),
            AcquireError::DeviceLost => f.write_str("device lost"),
        }
    }
}

impl std::error::Error for AcquireError {}

impl From<AcquireError> for overlay_core::BridgeError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::DeviceLost => overlay_core::BridgeError::backend(err.to_string()),
            other => overlay_core::BridgeError::presentation(other.to_string()),
        }
    }
}

/// GPU presentation backend for one surface.
///
/// Implementations exist for Vulkan (`vulkan` feature) and for headless
/// testing ([`crate::headless::HeadlessPresenter`]). All calls happen on the
/// thread that owns the frame loop; device and queue handles are only read.
pub trait PresentBackend: Send {
    /// Current min/max extents the surface accepts.
    fn surface_extents(&mut self) -> Result<SurfaceExtents>;

    /// Formats the surface can present.
    fn surface_formats(&mut self) -> Result<Vec<SurfaceFormat>>;

    /// Create a swapchain. `old` is a hand-off hint: the driver may recycle
    /// its resources, but the caller still destroys it afterwards.
    fn create_swapchain(
        &mut self,
        extent: Size,
        format: SurfaceFormat,
        old: Option<u64>,
    ) -> Result<RawSwapchain>;

    fn create_image_view(&mut self, image: u64, format: SurfaceFormat) -> Result<u64>;

    fn destroy_image_view(&mut self, view: u64);

    fn destroy_swapchain(&mut self, swapchain: u64);

    /// Block until the GPU has finished all submitted work.
    fn wait_idle(&mut self) -> Result<()>;

    /// Acquire the next presentable image, waiting at most `timeout`.
    fn acquire_next_image(
        &mut self,
        swapchain: u64,
        timeout: Duration,
    ) -> std::result::Result<AcquiredImage, AcquireError>;

    /// Queue `image_index` for presentation. `Ok(true)` means suboptimal.
    fn present(&mut self, swapchain: u64, image_index: u32) -> std::result::Result<bool, AcquireError>;

    /// Called once after every swapchain creation that picked an HDR10 format.
    fn apply_hdr_metadata(&mut self, _swapchain: u64) {}
}

impl<B: PresentBackend + ?Sized> PresentBackend for Box<B> {
    fn surface_extents(&mut self) -> Result<SurfaceExtents> {
        (**self).surface_extents()
    }

    fn surface_formats(&mut self) -> Result<Vec<SurfaceFormat>> {
        (**self).surface_formats()
    }

    fn create_swapchain(
        &mut self,
        extent: Size,
        format: SurfaceFormat,
        old: Option<u64>,
    ) -> Result<RawSwapchain> {
        (**self).create_swapchain(extent, format, old)
    }

    fn create_image_view(&mut self, image: u64, format: SurfaceFormat) -> Result<u64> {
        (**self).create_image_view(image, format)
    }

    fn destroy_image_view(&mut self, view: u64) {
        (**self).destroy_image_view(view)
    }

    fn destroy_swapchain(&mut self, swapchain: u64) {
        (**self).destroy_swapchain(swapchain)
    }

    fn wait_idle(&mut self) -> Result<()> {
        (**self).wait_idle()
    }

    fn acquire_next_image(
        &mut self,
        swapchain: u64,
        timeout: Duration,
    ) -> std::result::Result<AcquiredImage, AcquireError> {
        (**self).acquire_next_image(swapchain, timeout)
    }

    fn present(&mut self, swapchain: u64, image_index: u32) -> std::result::Result<bool, AcquireError> {
        (**self).present(swapchain, image_index)
    }

    fn apply_hdr_metadata(&mut self, swapchain: u64) {
        (**self).apply_hdr_metadata(swapchain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_device_loss_is_fatal() {
        assert_eq!(AcquireError::Timeout.action(), RecoveryAction::Retry);
        assert_eq!(AcquireError::Device("busy".into()).action(), RecoveryAction::Retry);
        assert_eq!(AcquireError::OutOfDate.action(), RecoveryAction::Rebuild);
        assert_eq!(AcquireError::SurfaceLost.action(), RecoveryAction::Rebuild);
        assert_eq!(AcquireError::DeviceLost.action(), RecoveryAction::Fatal);
    }

    #[test]
    fn transient_failures_convert_to_transient_bridge_errors() {
        let err: overlay_core::BridgeError = AcquireError::OutOfDate.into();
        assert!(err.is_transient());
        let err: overlay_core::BridgeError = AcquireError::DeviceLost.into();
        assert!(!err.is_transient());
    }
}
