//! Compositor-level embedding: the guest presents to its own child surface,
//! stacked under the host's surface and driven by a dedicated render thread.

use std::sync::Arc;

use overlay_core::{BridgeConfig, BridgeError, Offset, PendingResize, Result, Size};
use overlay_core::StackingRelation;
use overlay_interop::{DisplayServer, PresentBackend, StackingConfig, SurfaceStack, Swapchain};
use tracing::{error, info};

use crate::guest::{GuestRenderer, HostContextDescriptor};
use crate::render_thread::{FrameStats, LoopExit, RenderThread};

/// A guest rendering into a subsurface of the host window.
///
/// Teardown runs in dependency order: the render thread is stopped and
/// joined, then the swapchain is destroyed, then the child surface and its
/// stacking relation.
pub struct SubsurfaceOverlay<D: DisplayServer, B: PresentBackend> {
    thread: Option<RenderThread<B>>,
    stack: Option<SurfaceStack<D>>,
}

impl<D: DisplayServer, B: PresentBackend + 'static> SubsurfaceOverlay<D, B> {
    /// Stack a child surface under `parent`, build a swapchain on it with
    /// the backend `presenter` returns, and start rendering.
    ///
    /// `presenter` gets the display and the child surface and must return a
    /// backend presenting to that surface.
    pub fn start<R, F>(
        display: D,
        parent: D::Surface,
        config: &BridgeConfig,
        presenter: F,
        renderer: R,
        host: HostContextDescriptor,
    ) -> Result<Self>
    where
        R: GuestRenderer + Send + 'static,
        F: FnOnce(&mut D, &D::Surface) -> Result<B>,
    {
        let mut stack = SurfaceStack::establish(display, parent, StackingConfig::from(config))?;
        let child = stack
            .child()
            .cloned()
            .ok_or(BridgeError::InvalidState("child surface missing after establish"))?;

        let backend = presenter(stack.display_mut(), &child)?;
        let swapchain = Swapchain::new(
            backend,
            config.initial_size,
            config.format_preference,
            Arc::new(PendingResize::new()),
        )?;
        let thread = RenderThread::spawn(renderer, host, swapchain, config)?;

        info!(size = %config.initial_size, "subsurface overlay running");
        Ok(Self {
            thread: Some(thread),
            stack: Some(stack),
        })
    }
}

impl<D: DisplayServer, B: PresentBackend> SubsurfaceOverlay<D, B> {
    /// Forward a host window resize to the render thread.
    pub fn resize(&self, size: Size) {
        if let Some(thread) = &self.thread {
            thread.request_resize(size);
        }
    }

    /// Slot for resize requests from other threads.
    pub fn pending_resize(&self) -> Option<Arc<PendingResize>> {
        self.thread.as_ref().map(RenderThread::pending_resize)
    }

    pub fn stats(&self) -> Option<Arc<FrameStats>> {
        self.thread.as_ref().map(RenderThread::stats)
    }

    /// Whether the render loop is still going.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    pub fn stack(&self) -> Option<&SurfaceStack<D>> {
        self.stack.as_ref()
    }

    pub fn set_offset(&mut self, offset: Offset) {
        if let Some(stack) = self.stack.as_mut() {
            stack.set_offset(offset);
        }
    }

    pub fn restack(&mut self, relation: StackingRelation) {
        if let Some(stack) = self.stack.as_mut() {
            stack.restack(relation);
        }
    }

    /// Stop rendering and release everything.
    ///
    /// If the render thread does not stop within the shutdown timeout, the
    /// swapchain and the child surface are leaked rather than destroyed under
    /// a thread that may still use them.
    pub fn shutdown(mut self) -> Result<LoopExit> {
        self.close()
    }

    fn close(&mut self) -> Result<LoopExit> {
        let thread = self
            .thread
            .take()
            .ok_or(BridgeError::InvalidState("overlay already shut down"))?;

        let outcome = match thread.shutdown() {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Some(stack) = self.stack.take() {
                    error!("leaking child surface, render thread still running");
                    std::mem::forget(stack);
                }
                return Err(err);
            }
        };

        drop(outcome.swapchain);
        if let Some(mut stack) = self.stack.take() {
            stack.teardown();
        }
        info!("subsurface overlay stopped: {:?}", outcome.exit);
        Ok(outcome.exit)
    }
}

impl<D: DisplayServer, B: PresentBackend> Drop for SubsurfaceOverlay<D, B> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.close();
        }
    }
}
