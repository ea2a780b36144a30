//! [`Swapchain`]: presentable images that follow the window size.
//!
//! Resize requests land in a shared [`PendingResize`] slot from any thread.
//! The frame loop calls [`Swapchain::service_resize`] at the top of each
//! iteration; only there is the swapchain rebuilt:
//!
//! 1. wait for the GPU to go idle (nothing in flight references the old
//!    images),
//! 2. clamp the request to the surface's current extents,
//! 3. create the new swapchain with the old one as hand-off hint,
//! 4. destroy the old views, then the old swapchain.
//!
//! Acquire, present and resize all take `&mut self`, so within one frame
//! loop they cannot overlap.

use std::sync::Arc;
use std::time::Duration;

use overlay_core::{FormatPreference, PendingResize, RenderTarget, Result, Size};
use tracing::{debug, info, warn};

use crate::format::{choose_surface_format, SurfaceFormat};
use crate::presenter::{AcquireError, PresentBackend};

/// One generation of presentable images and their views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainState {
    pub handle: u64,
    pub images: Vec<u64>,
    pub views: Vec<u64>,
    pub extent: Size,
    pub format: SurfaceFormat,
    /// Incremented on every rebuild; starts at 1.
    pub generation: u64,
}

impl SwapchainState {
    /// Render target for the image at `index`.
    pub fn target(&self, index: u32) -> Option<RenderTarget> {
        let image = *self.images.get(index as usize)?;
        let view = *self.views.get(index as usize)?;
        Some(RenderTarget::swapchain_image(
            image,
            view,
            self.extent,
            self.format.format,
        ))
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// An acquired image, valid until presented or until the next rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredFrame {
    pub index: u32,
    pub generation: u64,
    pub target: RenderTarget,
}

/// Swapchain plus resize reconciliation over a [`PresentBackend`].
pub struct Swapchain<B: PresentBackend> {
    backend: B,
    state: Option<SwapchainState>,
    format: SurfaceFormat,
    pending: Arc<PendingResize>,
    /// Rebuild at the current extent on the next service, e.g. after an
    /// out-of-date acquire.
    rebuild_requested: bool,
    generation: u64,
}

impl<B: PresentBackend> Swapchain<B> {
    /// Create the first swapchain at `initial` (clamped to the surface).
    ///
    /// Failure here is a startup failure and should abort.
    pub fn new(
        mut backend: B,
        initial: Size,
        preference: FormatPreference,
        pending: Arc<PendingResize>,
    ) -> Result<Self> {
        let formats = backend.surface_formats()?;
        let format = choose_surface_format(&formats, preference);
        debug!(?format, "chose swapchain format");

        let mut swapchain = Self {
            backend,
            state: None,
            format,
            pending,
            rebuild_requested: false,
            generation: 0,
        };
        swapchain.rebuild(initial)?;
        Ok(swapchain)
    }

    /// Shared slot resize requests should be written to.
    pub fn pending_resize(&self) -> Arc<PendingResize> {
        Arc::clone(&self.pending)
    }

    pub fn state(&self) -> Option<&SwapchainState> {
        self.state.as_ref()
    }

    /// Extent of the live swapchain, or zero after [`destroy`](Self::destroy).
    pub fn extent(&self) -> Size {
        self.state.as_ref().map(|s| s.extent).unwrap_or_default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Ask for a rebuild at the current extent on the next service.
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    /// Apply the latest pending resize, if any. Returns the new extent when a
    /// rebuild happened.
    ///
    /// A zero-sized request (minimized window) is consumed without rebuilding.
    pub fn service_resize(&mut self) -> Result<Option<Size>> {
        let requested = match self.pending.take() {
            Some(size) => size,
            None if self.rebuild_requested => self.extent(),
            None => return Ok(None),
        };
        self.rebuild_requested = false;

        if requested.is_empty() {
            debug!(%requested, "ignoring empty resize");
            return Ok(None);
        }
        match self.rebuild(requested) {
            Ok(extent) => Ok(Some(extent)),
            Err(err) => {
                // retry next iteration unless a newer request arrived meanwhile
                self.pending.restore(requested);
                Err(err)
            }
        }
    }

    fn rebuild(&mut self, requested: Size) -> Result<Size> {
        self.backend.wait_idle()?;

        let extents = self.backend.surface_extents()?;
        let extent = match extents.current {
            Some(current) if !current.is_empty() => current,
            _ => extents.clamp(requested),
        };
        if extent != requested {
            debug!(%requested, %extent, "resize clamped to surface extents");
        }

        let old = self.state.as_ref().map(|s| s.handle);
        let raw = self.backend.create_swapchain(extent, self.format, old)?;

        let mut views = Vec::with_capacity(raw.images.len());
        for &image in &raw.images {
            match self.backend.create_image_view(image, self.format) {
                Ok(view) => views.push(view),
                Err(err) => {
                    for view in views {
                        self.backend.destroy_image_view(view);
                    }
                    self.backend.destroy_swapchain(raw.handle);
                    return Err(err);
                }
            }
        }

        if let Some(old) = self.state.take() {
            self.release(old);
        }

        if self.format.is_hdr10() {
            self.backend.apply_hdr_metadata(raw.handle);
        }

        self.generation += 1;
        let built = raw.extent;
        info!(
            extent = %raw.extent,
            images = raw.images.len(),
            generation = self.generation,
            "swapchain built"
        );
        self.state = Some(SwapchainState {
            handle: raw.handle,
            images: raw.images,
            views,
            extent: raw.extent,
            format: self.format,
            generation: self.generation,
        });
        Ok(built)
    }

    fn release(&mut self, state: SwapchainState) {
        for view in state.views {
            self.backend.destroy_image_view(view);
        }
        self.backend.destroy_swapchain(state.handle);
    }

    /// Acquire the next image, waiting at most `timeout`.
    ///
    /// Errors that leave the swapchain unusable schedule a rebuild.
    pub fn acquire(&mut self, timeout: Duration) -> std::result::Result<AcquiredFrame, AcquireError> {
        let state = self.state.as_ref().ok_or(AcquireError::SurfaceLost)?;
        let handle = state.handle;
        let acquired = match self.backend.acquire_next_image(handle, timeout) {
            Ok(acquired) => acquired,
            Err(err) => {
                if err.needs_rebuild() {
                    self.rebuild_requested = true;
                }
                return Err(err);
            }
        };
        if acquired.suboptimal {
            self.rebuild_requested = true;
        }

        let state = self.state.as_ref().ok_or(AcquireError::SurfaceLost)?;
        let target = state
            .target(acquired.index)
            .ok_or_else(|| AcquireError::Device(format!("image index {} out of range", acquired.index)))?;
        Ok(AcquiredFrame {
            index: acquired.index,
            generation: state.generation,
            target,
        })
    }

    /// Present a frame acquired from the current generation.
    pub fn present(&mut self, frame: &AcquiredFrame) -> std::result::Result<(), AcquireError> {
        let handle = match self.state.as_ref() {
            Some(state) if state.generation == frame.generation => state.handle,
            _ => return Err(AcquireError::OutOfDate),
        };
        match self.backend.present(handle, frame.index) {
            Ok(suboptimal) => {
                if suboptimal {
                    self.rebuild_requested = true;
                }
                Ok(())
            }
            Err(err) => {
                if err.needs_rebuild() {
                    self.rebuild_requested = true;
                }
                Err(err)
            }
        }
    }

    /// Destroy views and swapchain after the GPU goes idle. Idempotent.
    pub fn destroy(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        if let Err(err) = self.backend.wait_idle() {
            warn!("wait for idle before swapchain teardown failed: {err}");
        }
        self.release(state);
        debug!("swapchain destroyed");
    }
}

impl<B: PresentBackend> Drop for Swapchain<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
