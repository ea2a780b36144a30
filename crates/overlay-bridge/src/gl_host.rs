//! [`HostPipeline`] for OpenGL scene graphs.
//!
//! Toolkit glue implements the small [`GlWindow`] trait; [`GlSceneHost`]
//! does the GL work: loading entry points from the host context, reading
//! the bound framebuffer, and saving/resetting state around the guest.

use std::sync::Arc;

use overlay_core::{RenderTarget, Size};
use overlay_gl::framebuffer::{bound_framebuffer, clear_errors};
use overlay_gl::{current_target, is_context_current, reset_to_neutral};
use overlay_gl::{GlLoader, GlStateGuard, ProcResolver};
use tracing::debug;

use crate::guest::HostContextDescriptor;
use crate::hooks::HostPipeline;

/// The toolkit window a GL scene graph draws into.
pub trait GlWindow {
    fn logical_size(&self) -> Size;

    fn device_pixel_ratio(&self) -> f64;

    /// Keep the GL context and the scene graph across window hides.
    fn set_persistent(&mut self) {}

    fn set_clear_before_rendering(&mut self, _clear: bool) {}

    fn begin_external_commands(&mut self) {}

    fn end_external_commands(&mut self) {}
}

pub struct GlSceneHost<W> {
    window: W,
    resolver: Arc<dyn ProcResolver>,
    loader: GlLoader,
}

impl<W: GlWindow> GlSceneHost<W> {
    pub fn new(window: W, resolver: Arc<dyn ProcResolver>) -> Self {
        Self {
            window,
            resolver,
            loader: GlLoader::new(),
        }
    }

    /// Switch to the resolver of a recreated host context. Entry points are
    /// loaded through it on the next [`gpu_context`](HostPipeline::gpu_context).
    pub fn replace_resolver(&mut self, resolver: Arc<dyn ProcResolver>) {
        self.resolver = resolver;
        self.loader.invalidate();
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }
}

impl<W: GlWindow> HostPipeline for GlSceneHost<W> {
    // None when GL is unusable; nothing to restore then
    type StateGuard = Option<GlStateGuard>;

    fn gpu_context(&mut self) -> Option<HostContextDescriptor> {
        if !self.loader.ensure_loaded(&*self.resolver) || !is_context_current() {
            return None;
        }
        Some(HostContextDescriptor::OpenGl {
            resolver: Arc::clone(&self.resolver),
        })
    }

    fn window_size(&self) -> Size {
        self.window.logical_size()
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.window.device_pixel_ratio()
    }

    fn render_target(&mut self, size: Size) -> Option<RenderTarget> {
        current_target(size)
    }

    fn save_state(&mut self) -> Option<GlStateGuard> {
        if !is_context_current() {
            return None;
        }
        // SAFETY: a context is current and the function table is loaded.
        unsafe {
            let guard = GlStateGuard::save();
            reset_to_neutral(bound_framebuffer());
            clear_errors();
            Some(guard)
        }
    }

    fn begin_external_commands(&mut self) {
        self.window.begin_external_commands();
    }

    fn end_external_commands(&mut self) {
        self.window.end_external_commands();
    }

    fn on_invalidated(&mut self) {
        self.loader.invalidate();
    }

    fn prepare_underlay(&mut self) {
        self.window.set_persistent();
        self.window.set_clear_before_rendering(false);
        debug!("GL host prepared for underlay rendering");
    }
}
